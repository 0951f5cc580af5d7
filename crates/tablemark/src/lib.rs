//! Facade crate for the `tablemark-*` workspace.
//!
//! This crate provides:
//! - re-exports of the geometry, calibration and tracking crates,
//! - the JSON [`TrackerConfig`] of an installation,
//! - replay collaborators ([`ReplayCapture`], [`TrackRecording`]) that drive
//!   calibration and tracking from recorded detector output,
//! - (feature `image`) conversions between image files and frames,
//! - (feature `cli`) the `tablemark` binary.
//!
//! ## API map
//! - `tablemark::core`: homographies, flip matrices, markers, frames.
//! - `tablemark::calib`: the two-stage [`CalibrationEngine`] and persistence.
//! - `tablemark::track`: [`TrackingLoop`] and the broadcast channel.

pub use tablemark_calib as calib;
pub use tablemark_core as core;
pub use tablemark_track as track;

pub use tablemark_calib::{
    CalibrationEngine, CalibrationError, CalibrationIoError, CalibrationResult, Pattern,
    Projector, ReferenceGrid,
};
pub use tablemark_core::{
    Camera, Detection, FlipSpec, Homography, Marker, MarkerDetector, MarkerSet, Point2D,
};
pub use tablemark_track::{
    Broadcast, FanoutBroadcaster, MarkersPayload, OutputSpace, StopHandle, TrackingError,
    TrackingLoop,
};

mod config;
mod replay;

#[cfg(feature = "image")]
pub mod frames;

pub use config::{
    CalibrationConfig, CameraConfig, ConfigError, MarkerConfig, ProjectorConfig, TrackerConfig,
};
pub use replay::{
    calibrate_from_capture, track_recording, NullProjector, ReplayCapture, ReplayDetector,
    SyntheticCamera, TrackRecording,
};

/// Any failure of the facade helpers.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    CalibrationIo(#[from] CalibrationIoError),
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[cfg(feature = "image")]
    #[error(transparent)]
    Frame(#[from] frames::FrameError),
}
