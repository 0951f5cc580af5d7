//! Reference marker grid projected during camera-to-projector calibration.
//!
//! The layout matches an ArUco grid board rendered into the projector
//! frame: `rows × cols` square markers of side `marker_length` separated by
//! `marker_separation` (board units), scaled uniformly to fit inside the
//! projector image minus a pixel margin and centered along the slack axis.
//! Ids run row-major from 0; each quad is the marker's outer border as
//! `[TL, TR, BR, BL]` in projector pixels.

use serde::{Deserialize, Serialize};
use tablemark_core::{MarkerSet, Point2D, Quad};

fn default_rows() -> u32 {
    9
}

fn default_marker_length() -> f64 {
    0.02
}

fn default_marker_separation() -> f64 {
    0.01
}

fn default_margin_px() -> f64 {
    1.0
}

/// Board geometry of the reference grid. Column count follows from the
/// projector aspect ratio.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    #[serde(default = "default_rows")]
    pub rows: u32,
    #[serde(default = "default_marker_length")]
    pub marker_length: f64,
    #[serde(default = "default_marker_separation")]
    pub marker_separation: f64,
    #[serde(default = "default_margin_px")]
    pub margin_px: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            marker_length: default_marker_length(),
            marker_separation: default_marker_separation(),
            margin_px: default_margin_px(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("projector resolution must be non-zero, got {width}x{height}")]
    InvalidProjector { width: u32, height: u32 },
    #[error("grid needs at least one row and one column (rows={rows}, cols={cols})")]
    InvalidSize { rows: u32, cols: u32 },
    #[error("marker_length must be > 0 and marker_separation >= 0")]
    InvalidMarkerGeometry,
    #[error("margin leaves no room for the board")]
    InvalidMargin,
}

/// Ground-truth layout of the projected grid.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReferenceGrid {
    spec: GridSpec,
    cols: u32,
    projector_width: u32,
    projector_height: u32,
    /// Pixels per board unit.
    scale: f64,
    markers: MarkerSet,
}

impl ReferenceGrid {
    pub fn new(
        projector_width: u32,
        projector_height: u32,
        spec: GridSpec,
    ) -> Result<Self, GridError> {
        if projector_width == 0 || projector_height == 0 {
            return Err(GridError::InvalidProjector {
                width: projector_width,
                height: projector_height,
            });
        }
        let cols = (f64::from(spec.rows) / f64::from(projector_height)
            * f64::from(projector_width))
        .floor() as u32;
        if spec.rows == 0 || cols == 0 {
            return Err(GridError::InvalidSize {
                rows: spec.rows,
                cols,
            });
        }
        if !(spec.marker_length.is_finite() && spec.marker_length > 0.0)
            || !(spec.marker_separation.is_finite() && spec.marker_separation >= 0.0)
        {
            return Err(GridError::InvalidMarkerGeometry);
        }

        let avail_w = f64::from(projector_width) - 2.0 * spec.margin_px;
        let avail_h = f64::from(projector_height) - 2.0 * spec.margin_px;
        if !spec.margin_px.is_finite() || spec.margin_px < 0.0 || avail_w <= 0.0 || avail_h <= 0.0
        {
            return Err(GridError::InvalidMargin);
        }

        let pitch = spec.marker_length + spec.marker_separation;
        let board_w = f64::from(cols) * pitch - spec.marker_separation;
        let board_h = f64::from(spec.rows) * pitch - spec.marker_separation;
        let scale = (avail_w / board_w).min(avail_h / board_h);
        let x0 = spec.margin_px + 0.5 * (avail_w - board_w * scale);
        let y0 = spec.margin_px + 0.5 * (avail_h - board_h * scale);
        let side = spec.marker_length * scale;

        let mut markers = MarkerSet::new();
        for r in 0..spec.rows {
            for c in 0..cols {
                let left = x0 + f64::from(c) * pitch * scale;
                let top = y0 + f64::from(r) * pitch * scale;
                let quad: Quad = [
                    Point2D::new(left, top),
                    Point2D::new(left + side, top),
                    Point2D::new(left + side, top + side),
                    Point2D::new(left, top + side),
                ];
                markers.insert(r * cols + c, quad);
            }
        }

        Ok(Self {
            spec,
            cols,
            projector_width,
            projector_height,
            scale,
            markers,
        })
    }

    #[inline]
    pub fn spec(&self) -> GridSpec {
        self.spec
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.spec.rows
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn projector_size(&self) -> (u32, u32) {
        (self.projector_width, self.projector_height)
    }

    /// Marker side length in projector pixels.
    #[inline]
    pub fn marker_side_px(&self) -> f64 {
        self.spec.marker_length * self.scale
    }

    /// Ground-truth quads keyed by id.
    #[inline]
    pub fn marker_set(&self) -> &MarkerSet {
        &self.markers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}
