//! Contract for the topology engine that turns raw boundaries into areas.
//!
//! The pipeline writes primitives into the engine, asks it to clean them and
//! then reads back the rebuilt areas. Every cleaning operation reports how
//! many primitives it modified.

use geo::{Coord, LineString};

/// Kind of a topological primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PrimitiveKind {
    /// Free-standing point.
    Point,
    /// Free-standing line.
    Line,
    /// Linear primitive bounding areas.
    Boundary,
    /// Point representing an area.
    Centroid,
}

impl PrimitiveKind {
    /// Every kind in output order.
    pub const ALL: [Self; 4] = [Self::Point, Self::Line, Self::Boundary, Self::Centroid];

    /// Lower-case label used in reports and storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Line => "line",
            Self::Boundary => "boundary",
            Self::Centroid => "centroid",
        }
    }
}

/// A `(field, category)` link from a primitive to an attribute row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CategoryPair {
    /// Layer number, starting at 1.
    pub field: u32,
    /// Category value.
    pub cat: i64,
}

impl CategoryPair {
    /// Construct a pair.
    #[must_use]
    pub const fn new(field: u32, cat: i64) -> Self {
        Self { field, cat }
    }
}

/// A primitive held by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    /// Primitive kind.
    pub kind: PrimitiveKind,
    /// Vertices; a single vertex for points and centroids.
    pub coords: LineString<f64>,
    /// Category links.
    pub cats: Vec<CategoryPair>,
}

/// Topology building and cleaning engine.
///
/// Area ids are `0..area_count()` after [`build_areas`](Self::build_areas)
/// and stay stable until primitives are written again.
pub trait TopologyEngine {
    /// Append a primitive and return its id.
    fn write_primitive(
        &mut self,
        kind: PrimitiveKind,
        coords: LineString<f64>,
        cats: Vec<CategoryPair>,
    ) -> usize;

    /// Number of live primitives of `kind`.
    fn primitive_count(&self, kind: PrimitiveKind) -> usize;

    /// Snap boundary vertices to nearby vertices within `threshold`.
    fn snap(&mut self, threshold: f64) -> usize;

    /// Split boundaries at vertices shared with other boundaries.
    fn break_polygons(&mut self) -> usize;

    /// Drop boundaries duplicating another boundary.
    fn remove_duplicates(&mut self) -> usize;

    /// Split boundaries at every intersection.
    fn break_lines(&mut self) -> usize;

    /// Remove near-zero angles between boundaries sharing a node.
    fn clean_small_angles(&mut self) -> usize;

    /// Join boundaries meeting at nodes of degree two.
    fn merge_boundaries(&mut self) -> usize;

    /// Turn dangling boundaries into lines.
    fn change_dangles_to_lines(&mut self) -> usize;

    /// Delete dangling boundaries.
    fn remove_dangles(&mut self) -> usize;

    /// Turn bridges between areas into lines.
    fn change_bridges_to_lines(&mut self) -> usize;

    /// Delete bridges between areas.
    fn remove_bridges(&mut self) -> usize;

    /// Rebuild areas from boundaries and return their number.
    fn build_areas(&mut self) -> usize;

    /// Number of areas built by the last [`build_areas`](Self::build_areas).
    fn area_count(&self) -> usize;

    /// A point strictly inside the area, when one can be found.
    fn point_in_area(&self, area: usize) -> Option<Coord<f64>>;

    /// Size of the area, excluding its islands.
    fn area_size(&self, area: usize) -> f64;

    /// Snapshot of all live primitives.
    fn primitives(&self) -> Vec<Primitive>;
}
