//! Durable storage of a calibration result.
//!
//! Two files in one directory, each a row-major 3×3 JSON array. Both are
//! written to temporary files first and renamed into place only once both
//! writes succeeded.

use crate::CalibrationResult;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tablemark_core::Homography;
use tempfile::NamedTempFile;

pub const CAMERA_TO_PROJECTOR_FILE: &str = "cam_to_proj_H.json";
pub const BOUNDING_BOX_FILE: &str = "bounding_box_H.json";

#[derive(thiserror::Error, Debug)]
pub enum CalibrationIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("calibration state {} unusable: {reason}; run calibration first", path.display())]
    PersistedStateMissing { path: PathBuf, reason: String },
}

fn stage_matrix(dir: &Path, h: &Homography) -> Result<NamedTempFile, CalibrationIoError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, h)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

fn load_matrix(path: &Path) -> Result<Homography, CalibrationIoError> {
    let missing = |reason: String| CalibrationIoError::PersistedStateMissing {
        path: path.to_path_buf(),
        reason,
    };
    let raw = fs::read_to_string(path).map_err(|e| missing(e.to_string()))?;
    let h: Homography = serde_json::from_str(&raw).map_err(|e| missing(e.to_string()))?;
    if h.h.iter().any(|v| !v.is_finite()) {
        return Err(missing("matrix has non-finite entries".into()));
    }
    if !h.is_invertible() {
        return Err(missing("matrix is singular".into()));
    }
    Ok(h)
}

impl CalibrationResult {
    /// Persist both matrices into `dir`, creating it if needed.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(), CalibrationIoError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let c2p = stage_matrix(dir, &self.camera_to_projector)?;
        let bbox = stage_matrix(dir, &self.bounding_box)?;
        c2p.persist(dir.join(CAMERA_TO_PROJECTOR_FILE))
            .map_err(|e| e.error)?;
        bbox.persist(dir.join(BOUNDING_BOX_FILE))
            .map_err(|e| e.error)?;
        log::info!("calibration saved to {}", dir.display());
        Ok(())
    }

    /// Load a result written by [`CalibrationResult::save`].
    ///
    /// Missing, unreadable, non-finite or singular matrices are all reported
    /// as [`CalibrationIoError::PersistedStateMissing`].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, CalibrationIoError> {
        let dir = dir.as_ref();
        Ok(Self {
            camera_to_projector: load_matrix(&dir.join(CAMERA_TO_PROJECTOR_FILE))?,
            bounding_box: load_matrix(&dir.join(BOUNDING_BOX_FILE))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CalibrationResult {
        CalibrationResult {
            camera_to_projector: Homography::from_array([
                [1.2, 0.01, -30.0],
                [0.02, 1.1, -12.5],
                [1e-5, 2e-5, 1.0],
            ]),
            bounding_box: Homography::from_array([
                [0.9, 0.0, 40.0],
                [0.0, 0.85, 25.0],
                [0.0, 0.0, 1.0],
            ]),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("calibration");
        sample().save(&target).unwrap();
        assert!(target.join(CAMERA_TO_PROJECTOR_FILE).is_file());
        assert!(target.join(BOUNDING_BOX_FILE).is_file());
        assert_eq!(CalibrationResult::load(&target).unwrap(), sample());

        let leftovers = fs::read_dir(&target).unwrap().count();
        assert_eq!(leftovers, 2);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        sample().save(dir.path()).unwrap();
        fs::remove_file(dir.path().join(BOUNDING_BOX_FILE)).unwrap();
        let err = CalibrationResult::load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            CalibrationIoError::PersistedStateMissing { ref path, .. }
                if path.ends_with(BOUNDING_BOX_FILE)
        ));
    }

    #[test]
    fn corrupt_and_singular_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        sample().save(dir.path()).unwrap();

        fs::write(dir.path().join(CAMERA_TO_PROJECTOR_FILE), "[[1.0, 2.0]").unwrap();
        assert!(matches!(
            CalibrationResult::load(dir.path()),
            Err(CalibrationIoError::PersistedStateMissing { .. })
        ));

        fs::write(
            dir.path().join(CAMERA_TO_PROJECTOR_FILE),
            "[[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]]",
        )
        .unwrap();
        let err = CalibrationResult::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("singular"), "{err}");
    }
}
