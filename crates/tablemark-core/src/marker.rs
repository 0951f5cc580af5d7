//! Marker model: one detection pass and id-based correspondence between passes.

use crate::{GeometryError, Homography, Point2D};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marker corners in fixed winding order `[TL, TR, BR, BL]`.
pub type Quad = [Point2D; 4];

/// Arithmetic mean of the four corners.
#[inline]
pub fn quad_center(q: &Quad) -> Point2D {
    let (sx, sy) = q.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point2D::new(sx / 4.0, sy / 4.0)
}

/// Map all four corners, keeping their order.
pub fn transform_quad(q: &Quad, h: &Homography) -> Result<Quad, GeometryError> {
    Ok([h.apply(q[0])?, h.apply(q[1])?, h.apply(q[2])?, h.apply(q[3])?])
}

/// One detected fiducial marker. Immutable after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    id: u32,
    corners: Quad,
}

impl Marker {
    pub fn new(id: u32, corners: Quad) -> Self {
        Self { id, corners }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn corners(&self) -> &Quad {
        &self.corners
    }

    #[inline]
    pub fn center(&self) -> Point2D {
        quad_center(&self.corners)
    }

    #[inline]
    pub fn tl(&self) -> Point2D {
        self.corners[0]
    }

    #[inline]
    pub fn tr(&self) -> Point2D {
        self.corners[1]
    }

    #[inline]
    pub fn br(&self) -> Point2D {
        self.corners[2]
    }

    #[inline]
    pub fn bl(&self) -> Point2D {
        self.corners[3]
    }

    /// A new marker with the same id and corners mapped through `h`.
    pub fn transformed(&self, h: &Homography) -> Result<Marker, GeometryError> {
        Ok(Marker::new(self.id, transform_quad(&self.corners, h)?))
    }
}

/// Detector output violating the one-quad-per-id contract.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("detector returned {ids} ids but {corners} corner quads")]
    LengthMismatch { ids: usize, corners: usize },
}

/// Raw result of one detector call: `ids[i]` belongs to `corners[i]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DetectionRepr", into = "DetectionRepr")]
pub struct Detection {
    ids: Vec<u32>,
    corners: Vec<Quad>,
}

#[derive(Serialize, Deserialize)]
struct DetectionRepr {
    ids: Vec<u32>,
    corners: Vec<Quad>,
}

impl TryFrom<DetectionRepr> for Detection {
    type Error = DetectionError;

    fn try_from(repr: DetectionRepr) -> Result<Self, Self::Error> {
        Detection::new(repr.ids, repr.corners)
    }
}

impl From<Detection> for DetectionRepr {
    fn from(d: Detection) -> Self {
        DetectionRepr {
            ids: d.ids,
            corners: d.corners,
        }
    }
}

impl Detection {
    pub fn new(ids: Vec<u32>, corners: Vec<Quad>) -> Result<Self, DetectionError> {
        if ids.len() != corners.len() {
            return Err(DetectionError::LengthMismatch {
                ids: ids.len(),
                corners: corners.len(),
            });
        }
        Ok(Self { ids, corners })
    }

    pub fn from_markers(markers: &[Marker]) -> Self {
        Self {
            ids: markers.iter().map(Marker::id).collect(),
            corners: markers.iter().map(|m| *m.corners()).collect(),
        }
    }

    #[inline]
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    #[inline]
    pub fn corners(&self) -> &[Quad] {
        &self.corners
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Quad)> + '_ {
        self.ids.iter().copied().zip(self.corners.iter())
    }

    pub fn markers(&self) -> Vec<Marker> {
        self.iter().map(|(id, q)| Marker::new(id, *q)).collect()
    }

    /// Same ids, every quad mapped through `h`.
    pub fn map_corners(&self, h: &Homography) -> Result<Detection, GeometryError> {
        let corners = self
            .corners
            .iter()
            .map(|q| transform_quad(q, h))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Detection {
            ids: self.ids.clone(),
            corners,
        })
    }

    /// Keyed view; a repeated id keeps the quad seen last.
    pub fn to_marker_set(&self) -> MarkerSet {
        self.iter().map(|(id, q)| (id, *q)).collect()
    }
}

/// Mapping from marker id to its quad, iterated in ascending id order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerSet {
    quads: BTreeMap<u32, Quad>,
}

/// Quads of one id observed in two marker sets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerPair {
    pub id: u32,
    pub first: Quad,
    pub second: Quad,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous quad for `id`.
    pub fn insert(&mut self, id: u32, quad: Quad) -> Option<Quad> {
        self.quads.insert(id, quad)
    }

    pub fn get(&self, id: u32) -> Option<&Quad> {
        self.quads.get(&id)
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.quads.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Quad)> + '_ {
        self.quads.iter().map(|(&id, q)| (id, q))
    }

    pub fn markers(&self) -> Vec<Marker> {
        self.iter().map(|(id, q)| Marker::new(id, *q)).collect()
    }

    /// Ids present in both sets, ascending.
    pub fn common_ids(&self, other: &MarkerSet) -> Vec<u32> {
        self.ids().filter(|id| other.quads.contains_key(id)).collect()
    }

    pub fn intersection_by_id(&self, other: &MarkerSet) -> Vec<MarkerPair> {
        self.iter()
            .filter_map(|(id, first)| {
                other.get(id).map(|second| MarkerPair {
                    id,
                    first: *first,
                    second: *second,
                })
            })
            .collect()
    }
}

impl FromIterator<(u32, Quad)> for MarkerSet {
    fn from_iter<I: IntoIterator<Item = (u32, Quad)>>(iter: I) -> Self {
        Self {
            quads: iter.into_iter().collect(),
        }
    }
}

impl From<&Detection> for MarkerSet {
    fn from(d: &Detection) -> Self {
        d.to_marker_set()
    }
}

/// Shared markers of `a` and `b`, ascending by id.
pub fn intersection_by_id(a: &MarkerSet, b: &MarkerSet) -> Vec<MarkerPair> {
    a.intersection_by_id(b)
}

/// Flattened corner correspondences: four points per shared marker, in the
/// same id order on both sides so the lists pair up positionally.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Correspondences {
    pub ids: Vec<u32>,
    pub first: Vec<Point2D>,
    pub second: Vec<Point2D>,
}

impl Correspondences {
    pub fn from_pairs(pairs: &[MarkerPair]) -> Self {
        let mut out = Correspondences {
            ids: Vec::with_capacity(pairs.len()),
            first: Vec::with_capacity(pairs.len() * 4),
            second: Vec::with_capacity(pairs.len() * 4),
        };
        for pair in pairs {
            out.ids.push(pair.id);
            out.first.extend_from_slice(&pair.first);
            out.second.extend_from_slice(&pair.second);
        }
        out
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
