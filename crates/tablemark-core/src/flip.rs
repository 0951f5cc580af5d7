//! Projector mounting compensation.

use crate::{compose, Homography};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// Physical projector mounting: mirrored horizontally and/or vertically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlipSpec {
    #[serde(default)]
    pub horizontal: bool,
    #[serde(default)]
    pub vertical: bool,
}

impl FlipSpec {
    #[inline]
    pub fn is_identity(&self) -> bool {
        !self.horizontal && !self.vertical
    }

    /// Flip matrix for a `width × height` pixel frame.
    pub fn matrix(&self, width: u32, height: u32) -> Homography {
        build_flip_matrix(width, height, self.horizontal, self.vertical)
    }
}

/// Pixel-grid mirror: `x -> (width-1) - x` and/or `y -> (height-1) - y`.
///
/// Both flips compose as `vertical ∘ horizontal`; each is an involution.
pub fn build_flip_matrix(width: u32, height: u32, flip_h: bool, flip_v: bool) -> Homography {
    let mut m = Homography::identity();

    if flip_h {
        let mh = Homography::new(Matrix3::new(
            -1.0,
            0.0,
            f64::from(width) - 1.0,
            0.0,
            1.0,
            0.0,
            0.0,
            0.0,
            1.0,
        ));
        m = compose(&mh, &m);
    }

    if flip_v {
        let mv = Homography::new(Matrix3::new(
            1.0,
            0.0,
            0.0,
            0.0,
            -1.0,
            f64::from(height) - 1.0,
            0.0,
            0.0,
            1.0,
        ));
        m = compose(&mv, &m);
    }

    m
}
