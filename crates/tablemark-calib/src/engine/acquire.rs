//! Bounded detection retries over fresh single-frame camera sessions.

use super::{CalibrationError, CalibrationStage};
use log::{debug, info, warn};
use tablemark_core::{
    warp_perspective_gray, Camera, CameraSession, Detection, FlipSpec, FramePreprocessor,
    GrayImage, MarkerDetector,
};

pub(crate) struct AttemptPolicy {
    pub stage: CalibrationStage,
    pub max_attempts: usize,
    pub min_frame_mean: f64,
    /// Required marker count; `None` accepts any non-empty detection.
    pub expected: Option<usize>,
}

/// Grab one frame, releasing the device right after so every attempt sees
/// the current projector output rather than a buffered frame.
fn grab_frame<C: Camera + ?Sized>(camera: &mut C) -> Result<Option<GrayImage>, CalibrationError> {
    let mut session = CameraSession::open(camera)?;
    Ok(session.read())
}

/// Run the detector on up to `policy.max_attempts` frames.
///
/// With a non-identity `flip` the frame is mirrored before detection and the
/// detected quads are mirrored back, so the result is in raw camera pixels.
pub(crate) fn detect_with_attempts<C, D>(
    camera: &mut C,
    detector: &mut D,
    preprocessor: &FramePreprocessor,
    flip: FlipSpec,
    policy: &AttemptPolicy,
) -> Result<Detection, CalibrationError>
where
    C: Camera + ?Sized,
    D: MarkerDetector + ?Sized,
{
    for attempt in 1..=policy.max_attempts {
        let Some(raw) = grab_frame(camera)? else {
            warn!("{}: attempt {attempt}: camera returned no frame", policy.stage);
            continue;
        };
        let undistorted = preprocessor
            .undistort_frame(&raw)
            .map_err(|e| CalibrationError::InvalidParams(e.to_string()))?;

        // Judged on the unenhanced frame.
        let mean = undistorted.view().mean_intensity();
        if mean < policy.min_frame_mean {
            warn!(
                "{}: attempt {attempt}: captured frame is black (mean {mean:.2}), skipping",
                policy.stage
            );
            continue;
        }
        let frame = preprocessor.enhance_frame(undistorted);

        let flip_h = (!flip.is_identity())
            .then(|| flip.matrix(frame.width as u32, frame.height as u32));
        let detection = match &flip_h {
            Some(h) => {
                let mirrored = warp_perspective_gray(&frame.view(), h, frame.width, frame.height);
                detector.detect(&mirrored.view())
            }
            None => detector.detect(&frame.view()),
        };

        let Some(detection) = detection.filter(|d| !d.is_empty()) else {
            debug!("{}: attempt {attempt}: no markers", policy.stage);
            continue;
        };

        let found = detection.len();
        match policy.expected {
            Some(expected) if found > expected => {
                return Err(CalibrationError::AmbiguousSetup {
                    detected: found,
                    expected,
                });
            }
            Some(expected) if found < expected => {
                debug!(
                    "{}: attempt {attempt}: {found} of {expected} markers",
                    policy.stage
                );
                continue;
            }
            _ => {}
        }

        info!("{}: detected {found} markers on attempt {attempt}", policy.stage);
        return match &flip_h {
            Some(h) => detection
                .map_corners(h)
                .map_err(|e| CalibrationError::degenerate(policy.stage, e)),
            None => Ok(detection),
        };
    }

    Err(CalibrationError::DetectionTimeout {
        stage: policy.stage,
        attempts: policy.max_attempts,
    })
}
