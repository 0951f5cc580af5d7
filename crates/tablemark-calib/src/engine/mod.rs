//! Two-stage calibration: camera-to-projector homography from the projected
//! reference grid, then the table bounding box from four corner markers.

mod acquire;
mod error;
mod params;
mod pipeline;
mod result;

pub use error::{CalibrationError, CalibrationStage};
pub use params::{CalibrationParams, TABLE_CORNER_MARKERS};
pub use pipeline::{CalibrationEngine, CalibrationState};
pub use result::CalibrationResult;
