//! Lens undistortion as a precomputed per-pixel remap.
//!
//! The map follows the Brown–Conrady model with coefficients
//! `k1, k2, p1, p2, k3`: for every pixel of the undistorted output we find
//! where it was imaged by the real lens and sample there.

use crate::{sample_bilinear_u8, GrayImage, GrayImageView};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx.abs() > f64::EPSILON
            && self.fy.abs() > f64::EPSILON
    }
}

/// Radial (`k1, k2, k3`) and tangential (`p1, p2`) distortion coefficients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady {
    #[serde(default)]
    pub k1: f64,
    #[serde(default)]
    pub k2: f64,
    #[serde(default)]
    pub p1: f64,
    #[serde(default)]
    pub p2: f64,
    #[serde(default)]
    pub k3: f64,
}

impl BrownConrady {
    /// Distort a point given in normalized camera coordinates.
    pub fn distort_normalized(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let kr = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let xd = x * kr + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * kr + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (xd, yd)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum UndistortError {
    #[error("camera intrinsics must be finite with non-zero focal lengths")]
    InvalidIntrinsics,
    #[error("invalid undistortion map size {width}x{height}")]
    InvalidSize { width: usize, height: usize },
    #[error("frame is {got_w}x{got_h}, undistortion map expects {width}x{height}")]
    FrameSizeMismatch {
        width: usize,
        height: usize,
        got_w: usize,
        got_h: usize,
    },
}

/// Source sampling position for every output pixel.
#[derive(Clone, Debug)]
pub struct UndistortMap {
    width: usize,
    height: usize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl UndistortMap {
    /// Build the remap. `new_intrinsics` describes the undistorted output
    /// camera; pass `intrinsics` again to keep the same framing.
    pub fn new(
        intrinsics: CameraIntrinsics,
        distortion: BrownConrady,
        new_intrinsics: CameraIntrinsics,
        width: usize,
        height: usize,
    ) -> Result<Self, UndistortError> {
        if !intrinsics.is_valid() || !new_intrinsics.is_valid() {
            return Err(UndistortError::InvalidIntrinsics);
        }
        if width == 0 || height == 0 {
            return Err(UndistortError::InvalidSize { width, height });
        }

        let mut map_x = Vec::with_capacity(width * height);
        let mut map_y = Vec::with_capacity(width * height);
        for v in 0..height {
            for u in 0..width {
                let x = (u as f64 - new_intrinsics.cx) / new_intrinsics.fx;
                let y = (v as f64 - new_intrinsics.cy) / new_intrinsics.fy;
                let (xd, yd) = distortion.distort_normalized(x, y);
                map_x.push((intrinsics.fx * xd + intrinsics.cx) as f32);
                map_y.push((intrinsics.fy * yd + intrinsics.cy) as f32);
            }
        }

        Ok(Self {
            width,
            height,
            map_x,
            map_y,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Where output pixel `(x, y)` samples the distorted frame.
    pub fn source_position(&self, x: usize, y: usize) -> Option<(f32, f32)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y * self.width + x;
        Some((self.map_x[idx], self.map_y[idx]))
    }

    /// Remap a frame with bilinear sampling; samples outside the frame are black.
    pub fn apply(&self, frame: &GrayImageView<'_>) -> Result<GrayImage, UndistortError> {
        if frame.width != self.width || frame.height != self.height {
            return Err(UndistortError::FrameSizeMismatch {
                width: self.width,
                height: self.height,
                got_w: frame.width,
                got_h: frame.height,
            });
        }

        let data = self
            .map_x
            .iter()
            .zip(&self.map_y)
            .map(|(&x, &y)| sample_bilinear_u8(frame, x, y))
            .collect();

        Ok(GrayImage {
            width: self.width,
            height: self.height,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 800.0,
            fy: 800.0,
            cx: 32.0,
            cy: 24.0,
        }
    }

    #[test]
    fn zero_distortion_is_identity_map() {
        let map = UndistortMap::new(intrinsics(), BrownConrady::default(), intrinsics(), 64, 48)
            .expect("map");
        assert_eq!(map.source_position(10, 7), Some((10.0, 7.0)));

        let frame = GrayImage {
            width: 64,
            height: 48,
            data: (0..64 * 48).map(|i| (i % 251) as u8).collect(),
        };
        assert_eq!(map.apply(&frame.view()).unwrap(), frame);
    }

    #[test]
    fn barrel_distortion_pulls_edges_outward() {
        let dist = BrownConrady {
            k1: 200.0,
            ..BrownConrady::default()
        };
        let map = UndistortMap::new(intrinsics(), dist, intrinsics(), 64, 48).expect("map");
        let (sx, _) = map.source_position(63, 24).unwrap();
        assert!(sx > 63.0, "expected outward sample, got {sx}");
        let (cx, cy) = map.source_position(32, 24).unwrap();
        assert_eq!((cx, cy), (32.0, 24.0));
    }

    #[test]
    fn rejects_bad_inputs() {
        let bad = CameraIntrinsics {
            fx: 0.0,
            ..intrinsics()
        };
        assert_eq!(
            UndistortMap::new(bad, BrownConrady::default(), intrinsics(), 4, 4).unwrap_err(),
            UndistortError::InvalidIntrinsics
        );

        let map =
            UndistortMap::new(intrinsics(), BrownConrady::default(), intrinsics(), 4, 4).unwrap();
        let frame = GrayImage::filled(5, 4, 0);
        assert!(matches!(
            map.apply(&frame.view()),
            Err(UndistortError::FrameSizeMismatch { .. })
        ));
    }
}
