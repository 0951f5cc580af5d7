//! Projector-camera calibration for table marker tracking.
//!
//! [`CalibrationEngine`] runs two stages against abstract collaborators
//! ([`tablemark_core::Camera`], [`Projector`], two
//! [`tablemark_core::MarkerDetector`]s):
//!
//! 1. the [`ReferenceGrid`] is projected and captured; matching marker ids
//!    give the camera → projector homography;
//! 2. four physical markers at the table corners give the bounding-box
//!    homography of the table inside the projector frame.
//!
//! A [`CalibrationResult`] is persisted with [`CalibrationResult::save`] and
//! read back by the tracker with [`CalibrationResult::load`].

mod corners;
mod display;
mod engine;
mod grid;
mod io;

pub use corners::{order_clockwise_from_top_left, outermost_corners, table_corners};
pub use display::{Pattern, Projector};
pub use engine::{
    CalibrationEngine, CalibrationError, CalibrationParams, CalibrationResult, CalibrationStage,
    CalibrationState, TABLE_CORNER_MARKERS,
};
pub use grid::{GridError, GridSpec, ReferenceGrid};
pub use io::{CalibrationIoError, BOUNDING_BOX_FILE, CAMERA_TO_PROJECTOR_FILE};
