//! Optional frame preprocessing applied before marker detection.

use crate::{binarize_otsu, BrownConrady, CameraIntrinsics, GrayImage, UndistortError, UndistortMap};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Lens model used to build an [`UndistortMap`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UndistortionParams {
    pub camera_matrix: CameraIntrinsics,
    #[serde(default)]
    pub distortion: BrownConrady,
    /// Output camera; defaults to `camera_matrix`.
    #[serde(default)]
    pub new_camera_matrix: Option<CameraIntrinsics>,
}

/// Preprocessing switches. Both steps are off by default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Otsu binarization for low-contrast scenes.
    #[serde(default)]
    pub enhance: bool,
    #[serde(default)]
    pub undistortion: Option<UndistortionParams>,
}

/// Undistort, then enhance; either step may be absent.
#[derive(Clone, Debug, Default)]
pub struct FramePreprocessor {
    undistort: Option<UndistortMap>,
    enhance: bool,
}

impl FramePreprocessor {
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Build from config for frames of `width × height` pixels.
    pub fn from_config(
        cfg: &PreprocessConfig,
        width: usize,
        height: usize,
    ) -> Result<Self, UndistortError> {
        let undistort = cfg
            .undistortion
            .as_ref()
            .map(|u| {
                UndistortMap::new(
                    u.camera_matrix,
                    u.distortion,
                    u.new_camera_matrix.unwrap_or(u.camera_matrix),
                    width,
                    height,
                )
            })
            .transpose()?;
        Ok(Self {
            undistort,
            enhance: cfg.enhance,
        })
    }

    pub fn with_undistort(mut self, map: UndistortMap) -> Self {
        self.undistort = Some(map);
        self
    }

    pub fn with_enhance(mut self, enhance: bool) -> Self {
        self.enhance = enhance;
        self
    }

    #[inline]
    pub fn is_passthrough(&self) -> bool {
        self.undistort.is_none() && !self.enhance
    }

    /// Lens step only. Frame statistics such as the black-frame mean are
    /// taken on this output, before enhancement.
    pub fn undistort_frame<'a>(
        &self,
        frame: &'a GrayImage,
    ) -> Result<Cow<'a, GrayImage>, UndistortError> {
        match &self.undistort {
            Some(map) => Ok(Cow::Owned(map.apply(&frame.view())?)),
            None => Ok(Cow::Borrowed(frame)),
        }
    }

    /// Contrast step only.
    pub fn enhance_frame<'a>(&self, frame: Cow<'a, GrayImage>) -> Cow<'a, GrayImage> {
        if self.enhance {
            Cow::Owned(binarize_otsu(&frame.view()))
        } else {
            frame
        }
    }

    /// Both steps. Borrows the frame unchanged when none is configured.
    pub fn process<'a>(&self, frame: &'a GrayImage) -> Result<Cow<'a, GrayImage>, UndistortError> {
        let undistorted = self.undistort_frame(frame)?;
        Ok(self.enhance_frame(undistorted))
    }
}
