//! JSON configuration of a tracker installation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tablemark_calib::{CalibrationParams, GridSpec, ReferenceGrid};
use tablemark_core::{FlipSpec, FramePreprocessor, PreprocessConfig};
use tablemark_track::TrackingParams;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_fps() -> u32 {
    30
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectorConfig {
    pub width: u32,
    pub height: u32,
    /// Top-left corner of the projector screen on the virtual desktop.
    #[serde(default)]
    pub screen_position: [i32; 2],
}

fn default_dictionary() -> String {
    "DICT_4X4_250".to_string()
}

/// Settings passed through to the external marker detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    #[serde(default = "default_dictionary")]
    pub physical_dictionary: String,
    #[serde(default = "default_dictionary")]
    pub projected_dictionary: String,
    #[serde(default)]
    pub detector_parameters: Map<String, Value>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            physical_dictionary: default_dictionary(),
            projected_dictionary: default_dictionary(),
            detector_parameters: Map::new(),
        }
    }
}

fn default_calibration_dir() -> PathBuf {
    PathBuf::from("calibration")
}

/// Engine defaults; the projector size is irrelevant here.
fn engine_defaults() -> CalibrationParams {
    CalibrationParams::new(0, 0)
}

fn default_max_attempts() -> usize {
    engine_defaults().max_attempts
}

fn default_settle_delay_ms() -> u64 {
    engine_defaults().settle_delay_ms
}

fn default_min_frame_mean() -> f64 {
    engine_defaults().min_frame_mean
}

fn default_min_marker_spread() -> f64 {
    engine_defaults().min_marker_spread
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Directory holding the persisted homographies.
    #[serde(default = "default_calibration_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default)]
    pub grid_rows: Option<u32>,
    #[serde(default)]
    pub marker_length: Option<f64>,
    #[serde(default)]
    pub marker_separation: Option<f64>,
    #[serde(default = "default_min_frame_mean")]
    pub min_frame_mean: f64,
    #[serde(default = "default_min_marker_spread")]
    pub min_marker_spread: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            dir: default_calibration_dir(),
            max_attempts: default_max_attempts(),
            settle_delay_ms: default_settle_delay_ms(),
            grid_rows: None,
            marker_length: None,
            marker_separation: None,
            min_frame_mean: default_min_frame_mean(),
            min_marker_spread: default_min_marker_spread(),
        }
    }
}

impl CalibrationConfig {
    fn grid_spec(&self) -> GridSpec {
        let defaults = GridSpec::default();
        GridSpec {
            rows: self.grid_rows.unwrap_or(defaults.rows),
            marker_length: self.marker_length.unwrap_or(defaults.marker_length),
            marker_separation: self.marker_separation.unwrap_or(defaults.marker_separation),
            ..defaults
        }
    }
}

/// Full tracker configuration (`config.json`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub camera: CameraConfig,
    pub projector: ProjectorConfig,
    #[serde(default)]
    pub markers: MarkerConfig,
    #[serde(default)]
    pub flip: FlipSpec,
    #[serde(default)]
    pub preprocessing: PreprocessConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub tracking: TrackingParams,
}

impl TrackerConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Check everything that would otherwise only fail once hardware is
    /// involved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Invalid("camera resolution must be non-zero".into()));
        }
        if self.camera.fps == 0 {
            return Err(ConfigError::Invalid("camera fps must be non-zero".into()));
        }
        self.calibration_params()
            .validate()
            .map_err(ConfigError::Invalid)?;
        self.reference_grid()?;
        self.build_preprocessor()?;
        Ok(())
    }

    pub fn calibration_params(&self) -> CalibrationParams {
        let cal = &self.calibration;
        CalibrationParams {
            projector_width: self.projector.width,
            projector_height: self.projector.height,
            flip: self.flip,
            grid: cal.grid_spec(),
            max_attempts: cal.max_attempts,
            settle_delay_ms: cal.settle_delay_ms,
            min_frame_mean: cal.min_frame_mean,
            min_marker_spread: cal.min_marker_spread,
        }
    }

    pub fn reference_grid(&self) -> Result<ReferenceGrid, ConfigError> {
        ReferenceGrid::new(
            self.projector.width,
            self.projector.height,
            self.calibration.grid_spec(),
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    #[inline]
    pub fn tracking_params(&self) -> TrackingParams {
        self.tracking
    }

    /// Preprocessor for frames at the configured camera resolution.
    pub fn build_preprocessor(&self) -> Result<FramePreprocessor, ConfigError> {
        FramePreprocessor::from_config(
            &self.preprocessing,
            self.camera.width as usize,
            self.camera.height as usize,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Calibration directory; relative paths resolve against `base`.
    pub fn calibration_dir(&self, base: impl AsRef<Path>) -> PathBuf {
        if self.calibration.dir.is_absolute() {
            self.calibration.dir.clone()
        } else {
            base.as_ref().join(&self.calibration.dir)
        }
    }
}
