//! Recorded-session collaborators.
//!
//! Calibration and tracking only see detector output, so a session can be
//! replayed from the detections observed on a real rig: the camera hands out
//! uniform frames and the detector answers from the recording.

use crate::{Error, TrackerConfig};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::{fs, path::Path};
use tablemark_calib::{CalibrationEngine, CalibrationResult, Pattern, Projector};
use tablemark_core::{Camera, CameraError, Detection, GrayImage, GrayImageView, MarkerDetector};
use tablemark_track::{Broadcast, TrackingLoop, TrackingSummary};

#[cfg(feature = "tracing")]
use tracing::instrument;

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let raw = fs::read_to_string(path).map_err(crate::ConfigError::from)?;
    Ok(serde_json::from_str(&raw).map_err(crate::ConfigError::from)?)
}

/// Detector answers of one calibration session, per attempt. `null` means
/// nothing was found on that attempt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayCapture {
    /// Projected-grid detections, frame coordinates as seen by the detector
    /// (mirrored when the projector is flipped).
    #[serde(default)]
    pub grid_attempts: Vec<Option<Detection>>,
    /// Table-corner detections.
    #[serde(default)]
    pub table_attempts: Vec<Option<Detection>>,
}

impl ReplayCapture {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, Error> {
        read_json(path.as_ref())
    }
}

/// Per-frame detector answers of a tracking session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRecording {
    pub frames: Vec<Option<Detection>>,
}

impl TrackRecording {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, Error> {
        read_json(path.as_ref())
    }
}

/// Detector replaying a fixed sequence of answers, then finding nothing.
#[derive(Clone, Debug, Default)]
pub struct ReplayDetector {
    answers: VecDeque<Option<Detection>>,
}

impl ReplayDetector {
    pub fn new(answers: impl IntoIterator<Item = Option<Detection>>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl MarkerDetector for ReplayDetector {
    fn detect(&mut self, _frame: &GrayImageView<'_>) -> Option<Detection> {
        self.answers.pop_front().flatten()
    }
}

/// Camera producing uniform gray frames, optionally a limited number.
#[derive(Clone, Debug)]
pub struct SyntheticCamera {
    width: usize,
    height: usize,
    level: u8,
    remaining: Option<usize>,
    open: bool,
}

impl SyntheticCamera {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            level: 128,
            remaining: None,
            open: false,
        }
    }

    pub fn with_frame_limit(mut self, frames: usize) -> Self {
        self.remaining = Some(frames);
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Camera for SyntheticCamera {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.open {
            return Err(CameraError::Open("device already in use".into()));
        }
        self.open = true;
        Ok(())
    }

    fn read(&mut self) -> Option<GrayImage> {
        if !self.open {
            return None;
        }
        if let Some(n) = self.remaining.as_mut() {
            if *n == 0 {
                return None;
            }
            *n -= 1;
        }
        Some(GrayImage::filled(self.width, self.height, self.level))
    }

    fn release(&mut self) {
        self.open = false;
    }
}

/// Projector without a screen; logs what would be shown.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProjector;

impl Projector for NullProjector {
    fn show(&mut self, pattern: Pattern<'_>) {
        match pattern {
            Pattern::ReferenceGrid(grid) => {
                info!("projector: reference grid {}x{}", grid.rows(), grid.cols())
            }
            Pattern::Blank => info!("projector: blank"),
        }
    }
}

/// Run a full calibration against a recorded capture.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn calibrate_from_capture(
    config: &TrackerConfig,
    capture: &ReplayCapture,
) -> Result<CalibrationResult, Error> {
    config.validate()?;
    let camera = SyntheticCamera::new(config.camera.width as usize, config.camera.height as usize);
    let params = config.calibration_params().with_settle_delay_ms(0);
    let mut engine = CalibrationEngine::new(
        params,
        camera,
        NullProjector,
        ReplayDetector::new(capture.grid_attempts.iter().cloned()),
        ReplayDetector::new(capture.table_attempts.iter().cloned()),
    )?
    .with_preprocessor(config.build_preprocessor()?);
    Ok(engine.run()?)
}

/// Replay a tracking session through a [`TrackingLoop`].
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn track_recording<B: Broadcast>(
    config: &TrackerConfig,
    calibration: &CalibrationResult,
    recording: &TrackRecording,
    broadcast: B,
) -> Result<TrackingSummary, Error> {
    config.validate()?;
    let mut camera = SyntheticCamera::new(config.camera.width as usize, config.camera.height as usize)
        .with_frame_limit(recording.frames.len());
    let mut tracker = TrackingLoop::new(
        calibration,
        config.tracking_params(),
        ReplayDetector::new(recording.frames.iter().cloned()),
        broadcast,
    )?
    .with_preprocessor(config.build_preprocessor()?);
    Ok(tracker.run(&mut camera)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablemark_core::CameraSession;

    #[test]
    fn synthetic_camera_is_exclusive_and_finite() {
        let mut cam = SyntheticCamera::new(4, 2).with_frame_limit(1);
        {
            let mut session = CameraSession::open(&mut cam).unwrap();
            assert_eq!(session.read().unwrap().view().mean_intensity(), 128.0);
            assert!(session.read().is_none());
        }
        assert!(!cam.is_open());

        cam.open().unwrap();
        assert!(cam.open().is_err());
    }

    #[test]
    fn replay_detector_runs_dry() {
        let det = Detection::new(vec![1], vec![[tablemark_core::Point2D::origin(); 4]]).unwrap();
        let mut replay = ReplayDetector::new([None, Some(det.clone())]);
        let frame = GrayImage::filled(1, 1, 0);
        assert_eq!(replay.detect(&frame.view()), None);
        assert_eq!(replay.detect(&frame.view()), Some(det));
        assert_eq!(replay.detect(&frame.view()), None);
        assert_eq!(replay.remaining(), 0);
    }

    #[test]
    fn capture_parses_null_attempts() {
        let json = r#"{"grid_attempts": [null, {"ids": [], "corners": []}]}"#;
        let capture: ReplayCapture = serde_json::from_str(json).unwrap();
        assert_eq!(capture.grid_attempts.len(), 2);
        assert!(capture.table_attempts.is_empty());
    }
}
