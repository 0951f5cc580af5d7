use crate::GridSpec;
use serde::{Deserialize, Serialize};
use tablemark_core::FlipSpec;

/// Number of physical markers marking the table corners.
pub const TABLE_CORNER_MARKERS: usize = 4;

fn default_max_attempts() -> usize {
    10
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_min_frame_mean() -> f64 {
    5.0
}

fn default_min_marker_spread() -> f64 {
    0.01
}

/// Configuration of a calibration run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub projector_width: u32,
    pub projector_height: u32,
    /// Projector mounting; applied to grid captures before matching.
    #[serde(default)]
    pub flip: FlipSpec,
    #[serde(default)]
    pub grid: GridSpec,
    /// Camera frames tried per stage before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Wait after switching to the blank pattern before capturing.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Frames with a lower mean intensity are treated as black and skipped.
    #[serde(default = "default_min_frame_mean")]
    pub min_frame_mean: f64,
    /// Minimum perpendicular spread of the matched grid marker centers,
    /// relative to their largest distance.
    #[serde(default = "default_min_marker_spread")]
    pub min_marker_spread: f64,
}

impl CalibrationParams {
    pub fn new(projector_width: u32, projector_height: u32) -> Self {
        Self {
            projector_width,
            projector_height,
            flip: FlipSpec::default(),
            grid: GridSpec::default(),
            max_attempts: default_max_attempts(),
            settle_delay_ms: default_settle_delay_ms(),
            min_frame_mean: default_min_frame_mean(),
            min_marker_spread: default_min_marker_spread(),
        }
    }

    pub fn with_flip(mut self, flip: FlipSpec) -> Self {
        self.flip = flip;
        self
    }

    pub fn with_settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be >= 1".into());
        }
        if !self.min_frame_mean.is_finite() || self.min_frame_mean < 0.0 {
            return Err("min_frame_mean must be finite and >= 0".into());
        }
        if !self.min_marker_spread.is_finite() || self.min_marker_spread < 0.0 {
            return Err("min_marker_spread must be finite and >= 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let json = r#"{"projector_width": 1280, "projector_height": 720}"#;
        let params: CalibrationParams = serde_json::from_str(json).unwrap();
        assert_eq!(params, CalibrationParams::new(1280, 720));
        assert_eq!(params.max_attempts, 10);
        assert_eq!(params.grid.rows, 9);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let params = CalibrationParams::new(1280, 720).with_max_attempts(0);
        assert!(params.validate().is_err());
    }
}
