//! Outbound message format, one object per frame with visible markers.
//!
//! ```json
//! {"markers":[{"Id":3,"MessageType":"CONTROLHOVER","Data":{"X":412.5,"Y":96.0}}]}
//! ```

use serde::{Deserialize, Serialize};
use tablemark_core::Marker;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[default]
    #[serde(rename = "CONTROLHOVER")]
    ControlHover,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerMessage {
    #[serde(rename = "Id")]
    pub id: u32,
    #[serde(rename = "MessageType")]
    pub message_type: MessageType,
    #[serde(rename = "Data")]
    pub data: Position,
}

impl From<&Marker> for MarkerMessage {
    fn from(m: &Marker) -> Self {
        let c = m.center();
        Self {
            id: m.id(),
            message_type: MessageType::ControlHover,
            data: Position { x: c.x, y: c.y },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkersPayload {
    pub markers: Vec<MarkerMessage>,
}

impl MarkersPayload {
    pub fn from_markers(markers: &[Marker]) -> Self {
        Self {
            markers: markers.iter().map(MarkerMessage::from).collect(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
