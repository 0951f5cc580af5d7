use std::fmt;
use tablemark_core::{CameraError, GeometryError};

/// Calibration stage that raised an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationStage {
    CameraToProjector,
    BoundingBox,
}

impl fmt::Display for CalibrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CalibrationStage::CameraToProjector => "camera-to-projector stage",
            CalibrationStage::BoundingBox => "bounding-box stage",
        })
    }
}

/// Errors that abort a calibration run. Nothing is persisted after any of them.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("{stage}: no usable detection within {attempts} attempts")]
    DetectionTimeout {
        stage: CalibrationStage,
        attempts: usize,
    },
    #[error("detected {detected} table markers, expected {expected}; check the physical setup and detector settings")]
    AmbiguousSetup { detected: usize, expected: usize },
    #[error("no marker is shared by the reference grid and the captured grid")]
    NoCommonMarkers,
    #[error("{stage}: {source}")]
    DegenerateGeometry {
        stage: CalibrationStage,
        #[source]
        source: GeometryError,
    },
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("invalid calibration parameters: {0}")]
    InvalidParams(String),
}

impl CalibrationError {
    pub(crate) fn degenerate(stage: CalibrationStage, source: GeometryError) -> Self {
        Self::DegenerateGeometry { stage, source }
    }
}
