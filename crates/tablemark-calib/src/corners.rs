//! Table-corner extraction from the four physical corner markers.

use tablemark_core::{Point2D, Quad};

fn centroid<'a>(points: impl IntoIterator<Item = &'a Point2D>) -> Option<Point2D> {
    let (sum, n) = points
        .into_iter()
        .fold((Point2D::origin().coords, 0usize), |(acc, n), p| {
            (acc + p.coords, n + 1)
        });
    (n > 0).then(|| Point2D::from(sum / n as f64))
}

/// For each quad, the corner farthest from the centroid of all corners.
///
/// With one marker placed at each table corner this is the table corner
/// itself, whatever the marker's rotation.
pub fn outermost_corners(quads: &[Quad]) -> Vec<Point2D> {
    let Some(center) = centroid(quads.iter().flatten()) else {
        return Vec::new();
    };

    quads
        .iter()
        .map(|quad| {
            quad.iter()
                .copied()
                .fold((quad[0], f64::NEG_INFINITY), |best, p| {
                    let d = (p - center).norm_squared();
                    if d > best.1 {
                        (p, d)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect()
}

/// Clockwise order (in image coordinates, y down) starting at the point with
/// the smallest `x + y`.
pub fn order_clockwise_from_top_left(points: &[Point2D]) -> Vec<Point2D> {
    let Some(center) = centroid(points) else {
        return Vec::new();
    };

    let mut ordered = points.to_vec();
    ordered.sort_by(|a, b| {
        let ta = (a.y - center.y).atan2(a.x - center.x);
        let tb = (b.y - center.y).atan2(b.x - center.x);
        ta.total_cmp(&tb)
    });

    let first = ordered
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a.x + a.y).total_cmp(&(b.x + b.y)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    ordered.rotate_left(first);
    ordered
}

/// Table corners `[TL, TR, BR, BL]` in camera pixels.
pub fn table_corners(quads: &[Quad]) -> Vec<Point2D> {
    order_clockwise_from_top_left(&outermost_corners(quads))
}
