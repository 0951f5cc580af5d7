//! Projector output used during calibration.

use crate::ReferenceGrid;

/// What the projector should currently show.
#[derive(Clone, Copy, Debug)]
pub enum Pattern<'a> {
    /// The reference marker grid (camera-to-projector stage).
    ReferenceGrid(&'a ReferenceGrid),
    /// Plain white background (bounding-box stage).
    Blank,
}

/// Fullscreen output on the projector. Window placement and rendering of the
/// marker bitmaps are up to the implementation.
pub trait Projector {
    fn show(&mut self, pattern: Pattern<'_>);
}

impl<P: Projector + ?Sized> Projector for &mut P {
    fn show(&mut self, pattern: Pattern<'_>) {
        (**self).show(pattern)
    }
}
