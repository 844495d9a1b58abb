//! Axis-aligned extents that may be empty.
//!
//! `geo::Rect` normalises its corners, so it cannot represent the "nothing
//! known yet" state the filter builder starts from. [`Extent`] keeps the raw
//! bounds and treats `xmin > xmax` or `ymin > ymax` as empty.

use geo::{Coord, LineString, Polygon, Rect};

/// Bounds in map units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Extent {
    /// Western bound.
    pub xmin: f64,
    /// Southern bound.
    pub ymin: f64,
    /// Eastern bound.
    pub xmax: f64,
    /// Northern bound.
    pub ymax: f64,
}

impl Extent {
    /// Construct an extent from raw bounds without normalising them.
    #[must_use]
    pub const fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// The empty extent.
    #[must_use]
    pub const fn empty() -> Self {
        Self::new(1.0, 1.0, 0.0, 0.0)
    }

    /// Whether the bounds describe a (possibly degenerate) region.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.xmin <= self.xmax && self.ymin <= self.ymax
    }

    /// Whether the two extents share at least one point.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.is_valid()
            && other.is_valid()
            && self.xmin <= other.xmax
            && self.xmax >= other.xmin
            && self.ymin <= other.ymax
            && self.ymax >= other.ymin
    }

    /// Shrink to the common part of both extents.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self::new(
            self.xmin.max(other.xmin),
            self.ymin.max(other.ymin),
            self.xmax.min(other.xmax),
            self.ymax.min(other.ymax),
        )
    }

    /// Grow to cover both extents; an empty side is ignored.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        match (self.is_valid(), other.is_valid()) {
            (false, _) => *other,
            (_, false) => *self,
            (true, true) => Self::new(
                self.xmin.min(other.xmin),
                self.ymin.min(other.ymin),
                self.xmax.max(other.xmax),
                self.ymax.max(other.ymax),
            ),
        }
    }

    /// Width times height, zero for empty extents.
    #[must_use]
    pub fn area(&self) -> f64 {
        if self.is_valid() {
            (self.xmax - self.xmin) * (self.ymax - self.ymin)
        } else {
            0.0
        }
    }

    /// Closed five-point rectangular ring, counter-clockwise from the
    /// south-west corner.
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        let ring = LineString::from(vec![
            (self.xmin, self.ymin),
            (self.xmax, self.ymin),
            (self.xmax, self.ymax),
            (self.xmin, self.ymax),
            (self.xmin, self.ymin),
        ]);
        Polygon::new(ring, Vec::new())
    }

    /// Convert to a `geo::Rect` when the extent is valid.
    #[must_use]
    pub fn to_rect(&self) -> Option<Rect<f64>> {
        self.is_valid().then(|| {
            Rect::new(
                Coord {
                    x: self.xmin,
                    y: self.ymin,
                },
                Coord {
                    x: self.xmax,
                    y: self.ymax,
                },
            )
        })
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Rect<f64>> for Extent {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}
