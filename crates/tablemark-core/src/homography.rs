use nalgebra::{DMatrix, Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// A point in camera or projector pixel space.
pub type Point2D = Point2<f64>;

/// Perspective divisions by a smaller denominator are treated as points at infinity.
const MIN_PERSPECTIVE_DENOM: f64 = 1e-12;

/// Relative size of the second-smallest singular value of the DLT system
/// below which the solution is not unique.
const RANK_TOLERANCE: f64 = 1e-9;

/// Relative determinant threshold for calling a homography singular.
const DET_TOLERANCE: f64 = 1e-12;

/// Errors produced by projective geometry helpers.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("need at least 4 correspondences, got {got}")]
    NotEnoughCorrespondences { got: usize },
    #[error("correspondence count mismatch (src={src}, dst={dst})")]
    MismatchedCorrespondences { src: usize, dst: usize },
    #[error("degenerate geometry: {0}")]
    Degenerate(&'static str),
    #[error("point ({x:.3}, {y:.3}) maps to infinity")]
    PointAtInfinity { x: f64, y: f64 },
}

/// 3×3 projective transform acting on homogeneous pixel coordinates.
///
/// Serialized as a row-major `[[f64; 3]; 3]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Map one point, dividing by the homogeneous coordinate.
    #[inline]
    pub fn apply(&self, p: Point2D) -> Result<Point2D, GeometryError> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() < MIN_PERSPECTIVE_DENOM {
            return Err(GeometryError::PointAtInfinity { x: p.x, y: p.y });
        }
        let q = Point2D::new(v[0] / w, v[1] / w);
        if !q.x.is_finite() || !q.y.is_finite() {
            return Err(GeometryError::PointAtInfinity { x: p.x, y: p.y });
        }
        Ok(q)
    }

    pub fn inverse(&self) -> Option<Self> {
        if !self.is_invertible() {
            return None;
        }
        self.h.try_inverse().map(Self::new)
    }

    /// Every entry finite and the matrix not (numerically) singular.
    pub fn is_invertible(&self) -> bool {
        let norm = self.h.norm();
        norm.is_finite() && norm > 0.0 && self.h.determinant().abs() > DET_TOLERANCE * norm.powi(3)
    }
}

impl From<[[f64; 3]; 3]> for Homography {
    fn from(rows: [[f64; 3]; 3]) -> Self {
        Self::from_array(rows)
    }
}

impl From<Homography> for [[f64; 3]; 3] {
    fn from(h: Homography) -> Self {
        h.to_array()
    }
}

/// Matrix product `a · b`: the result applies `b` first, then `a`.
#[inline]
pub fn compose(a: &Homography, b: &Homography) -> Homography {
    Homography::new(a.h * b.h)
}

/// Apply `h` to every point, failing on the first point mapped to infinity.
pub fn transform_points(points: &[Point2D], h: &Homography) -> Result<Vec<Point2D>, GeometryError> {
    points.iter().map(|&p| h.apply(p)).collect()
}

/// True when all points lie within `rel_tol * baseline` of the line through
/// the two points farthest apart. Fewer than three points are collinear.
pub fn points_are_collinear(points: &[Point2D], rel_tol: f64) -> bool {
    if points.len() < 3 {
        return true;
    }

    let mut best = (0, 0, 0.0_f64);
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let d = (points[j] - points[i]).norm();
            if d > best.2 {
                best = (i, j, d);
            }
        }
    }
    let (i, j, baseline) = best;
    if baseline <= f64::EPSILON {
        return true;
    }

    let dir = (points[j] - points[i]) / baseline;
    let max_off = points
        .iter()
        .map(|p| {
            let r = p - points[i];
            (r.x * dir.y - r.y * dir.x).abs()
        })
        .fold(0.0_f64, f64::max);
    max_off <= rel_tol * baseline
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = (2.0_f64).sqrt() / mean_dist;
    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Hartley normalization: translate to centroid, scale so mean distance = sqrt(2).
///
/// Returns `None` when all points coincide.
fn normalize_points(pts: &[Point2D]) -> Option<(Vec<Point2D>, Matrix3<f64>)> {
    let n = pts.len() as f64;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist <= 1e-12 {
        return None;
    }

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2D::new(v[0], v[1])
        })
        .collect();
    Some((out, t))
}

/// Least-squares homography `dst ~ H · src` via the normalized DLT.
///
/// Requires at least 4 correspondences that pin down a unique projective
/// map; collinear or duplicated point sets leave the linear system
/// rank-deficient and yield [`GeometryError::Degenerate`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, dst), fields(n = src.len()))
)]
pub fn estimate_homography(src: &[Point2D], dst: &[Point2D]) -> Result<Homography, GeometryError> {
    if src.len() != dst.len() {
        return Err(GeometryError::MismatchedCorrespondences {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.len() < 4 {
        return Err(GeometryError::NotEnoughCorrespondences { got: src.len() });
    }
    if src
        .iter()
        .chain(dst)
        .any(|p| !p.x.is_finite() || !p.y.is_finite())
    {
        return Err(GeometryError::Degenerate("non-finite correspondence"));
    }

    let (s, ts) =
        normalize_points(src).ok_or(GeometryError::Degenerate("coincident source points"))?;
    let (d, td) =
        normalize_points(dst).ok_or(GeometryError::Degenerate("coincident destination points"))?;

    // Pad with zero rows so the SVD always yields a full 9×9 V^T.
    let n = src.len();
    let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);

    for k in 0..n {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or(GeometryError::Degenerate("SVD did not produce V^T"))?;
    let sv = &svd.singular_values;

    let mut order: Vec<usize> = (0..sv.len()).collect();
    order.sort_by(|&i, &j| sv[i].total_cmp(&sv[j]));
    let largest = sv[order[order.len() - 1]];
    if largest.is_nan() || largest <= 0.0 || sv[order[1]] <= RANK_TOLERANCE * largest {
        return Err(GeometryError::Degenerate(
            "correspondences do not determine a unique homography (collinear or duplicate points)",
        ));
    }

    let h = v_t.row(order[0]);
    let hn = Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    // Denormalize: H = Td^{-1} * Hn * Ts
    let td_inv = td
        .try_inverse()
        .ok_or(GeometryError::Degenerate("normalization is not invertible"))?;
    let full = td_inv * hn * ts;

    let scale = full[(2, 2)];
    if scale.abs() < MIN_PERSPECTIVE_DENOM {
        return Err(GeometryError::Degenerate(
            "estimated homography maps the origin to infinity",
        ));
    }
    let estimated = Homography::new(full / scale);
    if !estimated.is_invertible() {
        return Err(GeometryError::Degenerate("estimated homography is singular"));
    }
    Ok(estimated)
}
