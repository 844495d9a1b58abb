//! In-memory planar topology engine.
//!
//! [`PlanarTopology`] keeps primitives in a flat list and implements every
//! cleaning step of [`TopologyEngine`] on the boundary subset: vertex
//! snapping, breaking at shared vertices and intersections, duplicate
//! removal, small-angle collapse, merging, dangle and bridge handling. Areas
//! are rebuilt by tracing faces of the boundary graph; nested groups of
//! boundaries become islands of the area enclosing them.
//!
//! ```
//! use geo::line_string;
//! use polyimport_core::{PrimitiveKind, TopologyEngine};
//! use polyimport_topology::PlanarTopology;
//!
//! let mut topology = PlanarTopology::default();
//! let ring = line_string![
//!     (x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0), (x: 0.0, y: 0.0)
//! ];
//! topology.write_primitive(PrimitiveKind::Boundary, ring.clone(), Vec::new());
//! topology.write_primitive(PrimitiveKind::Boundary, ring, Vec::new());
//! topology.break_polygons();
//! topology.remove_duplicates();
//! assert_eq!(topology.build_areas(), 1);
//! assert!((topology.area_size(0) - 16.0).abs() < 1e-9);
//! ```

#![forbid(unsafe_code)]

mod clean;
mod faces;
mod node;
mod noding;

use std::collections::HashSet;

use geo::{Coord, LineString};
use log::debug;
use polyimport_core::{CategoryPair, Primitive, PrimitiveKind, TopologyEngine};

pub use faces::AreaRecord;

use crate::node::{NodeKey, dedup_vertices, end_degrees, ends, has_length};
use crate::noding::Cuts;

/// Angle below which two boundaries leaving a node are collapsed, in radians.
pub const DEFAULT_ANGLE_TOLERANCE: f64 = 1e-8;

/// Planar topology over primitives held in memory.
///
/// Primitive ids returned by [`write_primitive`](TopologyEngine::write_primitive)
/// are positions at write time; cleaning reorders boundaries.
#[derive(Debug, Clone)]
pub struct PlanarTopology {
    primitives: Vec<Primitive>,
    areas: Vec<AreaRecord>,
    angle_tolerance: f64,
}

impl Default for PlanarTopology {
    fn default() -> Self {
        Self::with_angle_tolerance(DEFAULT_ANGLE_TOLERANCE)
    }
}

impl PlanarTopology {
    /// Engine collapsing boundary pairs closer than `angle_tolerance` radians.
    #[must_use]
    pub const fn with_angle_tolerance(angle_tolerance: f64) -> Self {
        Self {
            primitives: Vec::new(),
            areas: Vec::new(),
            angle_tolerance,
        }
    }

    /// Areas from the last build.
    #[must_use]
    pub fn areas(&self) -> &[AreaRecord] {
        &self.areas
    }

    fn boundary_lines(&self) -> Vec<LineString<f64>> {
        self.primitives
            .iter()
            .filter(|p| p.kind == PrimitiveKind::Boundary)
            .map(|p| p.coords.clone())
            .collect()
    }

    /// Remove all boundaries and return them with their categories.
    fn take_boundaries(&mut self) -> Vec<(LineString<f64>, Vec<CategoryPair>)> {
        let (boundaries, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.primitives)
            .into_iter()
            .partition(|p| p.kind == PrimitiveKind::Boundary);
        self.primitives = rest;
        boundaries.into_iter().map(|p| (p.coords, p.cats)).collect()
    }

    fn put_boundaries(
        &mut self,
        boundaries: impl IntoIterator<Item = (LineString<f64>, Vec<CategoryPair>)>,
    ) {
        self.primitives.extend(
            boundaries
                .into_iter()
                .filter(|(coords, _)| has_length(coords))
                .map(|(coords, cats)| Primitive {
                    kind: PrimitiveKind::Boundary,
                    coords,
                    cats,
                }),
        );
    }

    fn split_boundaries(&mut self, cuts_for: fn(&[LineString<f64>]) -> Vec<Cuts>) -> usize {
        let boundaries = self.take_boundaries();
        let lines: Vec<LineString<f64>> = boundaries.iter().map(|(line, _)| line.clone()).collect();
        let cuts = cuts_for(&lines);
        let mut broken = 0;
        let mut pieces = Vec::with_capacity(boundaries.len());
        for ((line, cats), cut) in boundaries.into_iter().zip(cuts) {
            if cut.is_empty() {
                pieces.push((line, cats));
                continue;
            }
            broken += 1;
            pieces.extend(cut.apply(&line).into_iter().map(|piece| (piece, cats.clone())));
        }
        self.put_boundaries(pieces);
        broken
    }

    /// Handle boundaries selected by `pick` until none is left.
    fn drain_boundaries(
        &mut self,
        pick: fn(&[LineString<f64>]) -> Vec<usize>,
        into: Option<PrimitiveKind>,
    ) -> usize {
        let mut handled = 0;
        loop {
            let boundaries = self.take_boundaries();
            let lines: Vec<LineString<f64>> =
                boundaries.iter().map(|(line, _)| line.clone()).collect();
            let picked: HashSet<usize> = pick(&lines).into_iter().collect();
            let mut keep = Vec::with_capacity(boundaries.len());
            for (index, (coords, cats)) in boundaries.into_iter().enumerate() {
                if !picked.contains(&index) {
                    keep.push((coords, cats));
                } else if let Some(kind) = into {
                    self.primitives.push(Primitive { kind, coords, cats });
                }
            }
            self.put_boundaries(keep);
            handled += picked.len();
            if picked.is_empty() {
                return handled;
            }
        }
    }
}

/// Bridges: boundaries with the same face on both sides and no free end.
fn bridges(lines: &[LineString<f64>]) -> Vec<usize> {
    let degrees = end_degrees(lines);
    let attached = |coord: Coord<f64>| degrees.get(&NodeKey::of(coord)).is_some_and(|d| *d > 1);
    faces::single_face_lines(lines)
        .into_iter()
        .filter(|index| {
            lines
                .get(*index)
                .and_then(ends)
                .is_some_and(|(start, end)| attached(start) && attached(end))
        })
        .collect()
}

impl TopologyEngine for PlanarTopology {
    fn write_primitive(
        &mut self,
        kind: PrimitiveKind,
        mut coords: LineString<f64>,
        cats: Vec<CategoryPair>,
    ) -> usize {
        if matches!(kind, PrimitiveKind::Line | PrimitiveKind::Boundary) {
            dedup_vertices(&mut coords);
        }
        self.primitives.push(Primitive { kind, coords, cats });
        self.primitives.len() - 1
    }

    fn primitive_count(&self, kind: PrimitiveKind) -> usize {
        self.primitives.iter().filter(|p| p.kind == kind).count()
    }

    fn snap(&mut self, threshold: f64) -> usize {
        let boundaries = self.take_boundaries();
        let (mut lines, cats): (Vec<_>, Vec<_>) = boundaries.into_iter().unzip();
        let modified = noding::snap_vertices(&mut lines, threshold);
        debug!("snapped {modified} boundaries at threshold {threshold}");
        self.put_boundaries(lines.into_iter().zip(cats));
        modified
    }

    fn break_polygons(&mut self) -> usize {
        let broken = self.split_boundaries(noding::shared_vertex_cuts);
        debug!("broke {broken} boundaries at shared vertices");
        broken
    }

    fn remove_duplicates(&mut self) -> usize {
        let boundaries = self.take_boundaries();
        let lines: Vec<LineString<f64>> = boundaries.iter().map(|(line, _)| line.clone()).collect();
        let duplicate_of = clean::duplicates(&lines);
        let mut kept: Vec<(LineString<f64>, Vec<CategoryPair>)> = Vec::new();
        let mut slot = vec![None; boundaries.len()];
        let mut removed = 0;
        let candidates = boundaries.into_iter().zip(duplicate_of).enumerate();
        for (index, ((coords, cats), original)) in candidates {
            let target = original.and_then(|first| slot.get(first).copied().flatten());
            match target.and_then(|position: usize| kept.get_mut(position)) {
                Some((_, existing)) => {
                    for pair in cats {
                        if !existing.contains(&pair) {
                            existing.push(pair);
                        }
                    }
                    removed += 1;
                }
                None => {
                    if let Some(entry) = slot.get_mut(index) {
                        *entry = Some(kept.len());
                    }
                    kept.push((coords, cats));
                }
            }
        }
        self.put_boundaries(kept);
        debug!("removed {removed} duplicate boundaries");
        removed
    }

    fn break_lines(&mut self) -> usize {
        let broken = self.split_boundaries(noding::intersection_cuts);
        debug!("broke {broken} boundaries at intersections");
        broken
    }

    fn clean_small_angles(&mut self) -> usize {
        let boundaries = self.take_boundaries();
        let (mut lines, cats): (Vec<_>, Vec<_>) = boundaries.into_iter().unzip();
        let modified = clean::collapse_small_angles(&mut lines, self.angle_tolerance);
        self.put_boundaries(lines.into_iter().zip(cats));
        modified
    }

    fn merge_boundaries(&mut self) -> usize {
        let boundaries = self.take_boundaries();
        let lines: Vec<LineString<f64>> = boundaries.iter().map(|(line, _)| line.clone()).collect();
        let (chains, joins) = clean::merge_chains(&lines);
        let merged = chains.into_iter().map(|(line, sources)| {
            let mut cats: Vec<CategoryPair> = Vec::new();
            for pair in sources
                .iter()
                .filter_map(|source| boundaries.get(*source))
                .flat_map(|(_, cats)| cats)
            {
                if !cats.contains(pair) {
                    cats.push(*pair);
                }
            }
            (line, cats)
        });
        let merged: Vec<_> = merged.collect();
        self.put_boundaries(merged);
        debug!("merged boundaries at {joins} nodes");
        joins
    }

    fn change_dangles_to_lines(&mut self) -> usize {
        self.drain_boundaries(clean::dangles, Some(PrimitiveKind::Line))
    }

    fn remove_dangles(&mut self) -> usize {
        self.drain_boundaries(clean::dangles, None)
    }

    fn change_bridges_to_lines(&mut self) -> usize {
        self.drain_boundaries(bridges, Some(PrimitiveKind::Line))
    }

    fn remove_bridges(&mut self) -> usize {
        self.drain_boundaries(bridges, None)
    }

    fn build_areas(&mut self) -> usize {
        self.areas = faces::build_areas(&self.boundary_lines());
        debug!("built {} areas", self.areas.len());
        self.areas.len()
    }

    fn area_count(&self) -> usize {
        self.areas.len()
    }

    fn point_in_area(&self, area: usize) -> Option<Coord<f64>> {
        self.areas.get(area).and_then(|record| record.interior)
    }

    fn area_size(&self, area: usize) -> f64 {
        self.areas.get(area).map_or(0.0, |record| record.size)
    }

    fn primitives(&self) -> Vec<Primitive> {
        self.primitives.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;
    use rstest::{fixture, rstest};

    fn square(x: f64, y: f64, side: f64) -> LineString<f64> {
        line_string![
            (x: x, y: y), (x: x + side, y: y), (x: x + side, y: y + side),
            (x: x, y: y + side), (x: x, y: y)
        ]
    }

    #[fixture]
    fn topology() -> PlanarTopology {
        PlanarTopology::default()
    }

    fn clean(topology: &mut PlanarTopology) -> usize {
        topology.break_polygons();
        topology.remove_duplicates();
        loop {
            topology.break_lines();
            topology.remove_duplicates();
            if topology.clean_small_angles() == 0 {
                break;
            }
        }
        topology.merge_boundaries();
        topology.remove_dangles();
        topology.build_areas();
        topology.remove_bridges();
        topology.build_areas()
    }

    #[rstest]
    fn overlapping_squares_make_three_areas(mut topology: PlanarTopology) {
        topology.write_primitive(PrimitiveKind::Boundary, square(0.0, 0.0, 2.0), Vec::new());
        topology.write_primitive(PrimitiveKind::Boundary, square(1.0, 1.0, 2.0), Vec::new());
        assert_eq!(clean(&mut topology), 3);
        let total: f64 = (0..3).map(|area| topology.area_size(area)).sum();
        assert!((total - 7.0).abs() < 1e-9);
        assert!((0..3).all(|area| topology.point_in_area(area).is_some()));
    }

    #[rstest]
    fn duplicates_keep_all_categories(mut topology: PlanarTopology) {
        let edge = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)];
        topology.write_primitive(PrimitiveKind::Boundary, edge.clone(), vec![CategoryPair::new(1, 1)]);
        topology.write_primitive(PrimitiveKind::Boundary, edge, vec![CategoryPair::new(1, 2)]);
        assert_eq!(topology.remove_duplicates(), 1);
        let remaining = topology.primitives();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].cats.len(), 2);
    }

    #[rstest]
    fn dangle_chains_are_removed_completely(mut topology: PlanarTopology) {
        topology.write_primitive(PrimitiveKind::Boundary, square(0.0, 0.0, 1.0), Vec::new());
        topology.write_primitive(
            PrimitiveKind::Boundary,
            line_string![(x: 0.0, y: 0.0), (x: -1.0, y: 0.0)],
            Vec::new(),
        );
        topology.write_primitive(
            PrimitiveKind::Boundary,
            line_string![(x: -1.0, y: 0.0), (x: -2.0, y: 0.0)],
            Vec::new(),
        );
        assert_eq!(topology.remove_dangles(), 2);
        assert_eq!(topology.primitive_count(PrimitiveKind::Boundary), 1);
    }

    #[rstest]
    fn dangles_become_lines_when_requested(mut topology: PlanarTopology) {
        topology.write_primitive(PrimitiveKind::Boundary, square(0.0, 0.0, 1.0), Vec::new());
        topology.write_primitive(
            PrimitiveKind::Boundary,
            line_string![(x: 0.0, y: 0.0), (x: -1.0, y: 0.0)],
            Vec::new(),
        );
        assert_eq!(topology.change_dangles_to_lines(), 1);
        assert_eq!(topology.primitive_count(PrimitiveKind::Line), 1);
    }

    #[rstest]
    fn bridges_are_removed(mut topology: PlanarTopology) {
        let outer = line_string![
            (x: 10.0, y: 5.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0), (x: 10.0, y: 5.0)
        ];
        let bridge = line_string![(x: 10.0, y: 5.0), (x: 12.0, y: 5.0)];
        let island = line_string![
            (x: 12.0, y: 5.0), (x: 12.0, y: 4.0), (x: 13.0, y: 4.0), (x: 13.0, y: 6.0),
            (x: 12.0, y: 6.0), (x: 12.0, y: 5.0)
        ];
        for line in [outer, bridge, island] {
            topology.write_primitive(PrimitiveKind::Boundary, line, Vec::new());
        }
        assert_eq!(topology.remove_bridges(), 1);
        assert_eq!(topology.build_areas(), 2);
    }

    #[rstest]
    fn lines_and_points_are_left_alone(mut topology: PlanarTopology) {
        topology.write_primitive(
            PrimitiveKind::Line,
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)],
            Vec::new(),
        );
        topology.write_primitive(
            PrimitiveKind::Point,
            line_string![(x: 5.0, y: 5.0)],
            vec![CategoryPair::new(1, 1)],
        );
        assert_eq!(topology.remove_dangles(), 0);
        assert_eq!(topology.build_areas(), 0);
        assert_eq!(topology.primitives().len(), 2);
    }
}
