use serde::{Deserialize, Serialize};
use tablemark_core::Homography;

/// Output of a successful calibration run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Camera pixels to projector pixels.
    pub camera_to_projector: Homography,
    /// Projector reference rectangle `[0, W] × [0, H]` to the table quad in
    /// projector pixels.
    pub bounding_box: Homography,
}
