//! Core types and utilities for projector-camera table tracking.
//!
//! This crate is purely geometric plus a few frame containers. It does *not*
//! talk to a camera, a projector or a marker detection library directly;
//! those are modelled as the capability traits in [`Camera`] and
//! [`MarkerDetector`] so calibration and tracking can run against fakes.
//!
//! ## API map
//! - [`Homography`], [`compose`], [`transform_points`], [`estimate_homography`]:
//!   3×3 projective transforms and their estimation from correspondences.
//! - [`FlipSpec`], [`build_flip_matrix`]: projector mounting compensation.
//! - [`Marker`], [`MarkerSet`], [`Detection`]: one detection pass and id-based
//!   correspondence between two passes.
//! - [`GrayImage`], [`UndistortMap`], [`FramePreprocessor`]: optional frame
//!   preprocessing before detection.

mod capture;
mod flip;
mod homography;
mod image;
mod logger;
mod marker;
mod preprocess;
mod threshold;
mod undistort;

pub use capture::{Camera, CameraError, CameraSession, MarkerDetector};
pub use flip::{build_flip_matrix, FlipSpec};
pub use homography::{
    compose, estimate_homography, points_are_collinear, transform_points, GeometryError,
    Homography, Point2D,
};
pub use image::{sample_bilinear, sample_bilinear_u8, warp_perspective_gray, GrayImage, GrayImageView};
pub use marker::{
    intersection_by_id, quad_center, transform_quad, Correspondences, Detection, DetectionError,
    Marker, MarkerPair, MarkerSet, Quad,
};
pub use preprocess::{FramePreprocessor, PreprocessConfig, UndistortionParams};
pub use threshold::{binarize_otsu, otsu_threshold};
pub use undistort::{BrownConrady, CameraIntrinsics, UndistortError, UndistortMap};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
