//! Per-frame tracking: acquire, detect, map into projector/table space,
//! publish.

use crate::{Broadcast, MarkersPayload};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tablemark_calib::{CalibrationIoError, CalibrationResult};
use tablemark_core::{
    compose, Camera, CameraError, CameraSession, FramePreprocessor, GeometryError, GrayImage,
    Homography, Marker, MarkerDetector, UndistortError,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Coordinate frame of the published marker centers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSpace {
    /// Table frame: the calibrated table quad spans `[0, W] × [0, H]`.
    #[default]
    Table,
    /// Raw projector pixels.
    Projector,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingParams {
    #[serde(default)]
    pub output_space: OutputSpace,
}

#[derive(thiserror::Error, Debug)]
pub enum TrackingError {
    #[error("calibration unavailable: {0}")]
    PersistedStateMissing(#[source] CalibrationIoError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("frame preprocessing failed: {0}")]
    Preprocess(#[from] UndistortError),
}

/// Camera → output transform for the chosen space.
pub fn tracking_transform(
    calibration: &CalibrationResult,
    space: OutputSpace,
) -> Result<Homography, GeometryError> {
    let h = match space {
        OutputSpace::Projector => calibration.camera_to_projector,
        OutputSpace::Table => {
            let table_from_projector = calibration
                .bounding_box
                .inverse()
                .ok_or(GeometryError::Degenerate("bounding box homography is singular"))?;
            compose(&table_from_projector, &calibration.camera_to_projector)
        }
    };
    if !h.is_invertible() {
        return Err(GeometryError::Degenerate("tracking transform is singular"));
    }
    Ok(h)
}

/// Cooperative cancellation flag, checked once per frame.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Why [`TrackingLoop::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackingExit {
    Cancelled,
    /// The camera stopped delivering frames.
    FrameAcquisitionFailure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackingSummary {
    pub frames: u64,
    pub published: u64,
    pub exit: TrackingExit,
}

pub struct TrackingLoop<D, B> {
    transform: Homography,
    detector: D,
    broadcast: B,
    preprocessor: FramePreprocessor,
    stop: StopHandle,
}

impl<D: MarkerDetector, B: Broadcast> TrackingLoop<D, B> {
    pub fn new(
        calibration: &CalibrationResult,
        params: TrackingParams,
        detector: D,
        broadcast: B,
    ) -> Result<Self, TrackingError> {
        let transform = tracking_transform(calibration, params.output_space)?;
        Ok(Self {
            transform,
            detector,
            broadcast,
            preprocessor: FramePreprocessor::passthrough(),
            stop: StopHandle::new(),
        })
    }

    /// Load the persisted calibration from `dir`; a missing or corrupt
    /// calibration is fatal.
    pub fn from_calibration_dir(
        dir: impl AsRef<Path>,
        params: TrackingParams,
        detector: D,
        broadcast: B,
    ) -> Result<Self, TrackingError> {
        let calibration =
            CalibrationResult::load(dir).map_err(TrackingError::PersistedStateMissing)?;
        Self::new(&calibration, params, detector, broadcast)
    }

    pub fn with_preprocessor(mut self, preprocessor: FramePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    #[inline]
    pub fn transform(&self) -> &Homography {
        &self.transform
    }

    pub fn broadcast(&self) -> &B {
        &self.broadcast
    }

    /// Detect markers in one frame and publish their mapped centers.
    ///
    /// Returns the published payload, or `None` when nothing was visible.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn process_frame(
        &mut self,
        frame: &GrayImage,
    ) -> Result<Option<MarkersPayload>, TrackingError> {
        let frame = self.preprocessor.process(frame)?;
        let Some(detection) = self.detector.detect(&frame.view()) else {
            return Ok(None);
        };

        let markers: Vec<Marker> = detection
            .iter()
            .filter_map(|(id, quad)| {
                match Marker::new(id, *quad).transformed(&self.transform) {
                    Ok(m) => Some(m),
                    Err(err) => {
                        warn!("marker {id} dropped: {err}");
                        None
                    }
                }
            })
            .collect();
        if markers.is_empty() {
            return Ok(None);
        }

        let payload = MarkersPayload::from_markers(&markers);
        debug!("publishing {} markers", payload.markers.len());
        self.broadcast.publish(&payload);
        Ok(Some(payload))
    }

    /// Process frames until the camera runs dry or the stop handle fires.
    /// The camera is released on every exit path.
    pub fn run<C: Camera + ?Sized>(
        &mut self,
        camera: &mut C,
    ) -> Result<TrackingSummary, TrackingError> {
        let mut session = CameraSession::open(camera)?;
        info!("tracking started");

        let mut frames = 0;
        let mut published = 0;
        let exit = loop {
            if self.stop.is_stopped() {
                break TrackingExit::Cancelled;
            }
            let Some(frame) = session.read() else {
                warn!("camera returned no frame, stopping");
                break TrackingExit::FrameAcquisitionFailure;
            };
            frames += 1;
            if self.process_frame(&frame)?.is_some() {
                published += 1;
            }
        };

        info!("tracking stopped after {frames} frames ({exit:?})");
        Ok(TrackingSummary {
            frames,
            published,
            exit,
        })
    }
}
