//! Vertex snapping and line breaking.
//!
//! Breaking first collects cut positions for every line, then rebuilds each
//! line from its cuts. An intersection point is computed once and inserted
//! into both lines, so the resulting nodes are bit-identical.

use std::collections::{BTreeSet, HashMap};

use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, Line, LineString};
use rstar::primitives::{GeomWithData, Line as IndexedLine};
use rstar::RTree;

use crate::node::{NodeKey, dedup_vertices};

/// Where a line must be cut.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Cuts {
    /// Interior vertex indices.
    vertices: BTreeSet<usize>,
    /// Points strictly inside segments: `(segment, position along it, point)`.
    points: Vec<(usize, f64, Coord<f64>)>,
}

impl Cuts {
    pub(crate) fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.points.is_empty()
    }

    /// Record `point` lying on segment `segment` of `line`.
    fn add(&mut self, line: &LineString<f64>, segment: usize, point: Coord<f64>) {
        let (Some(start), Some(end)) = (line.0.get(segment), line.0.get(segment + 1)) else {
            return;
        };
        let last = line.0.len().saturating_sub(1);
        let key = NodeKey::of(point);
        if key == NodeKey::of(*start) {
            if segment > 0 {
                self.vertices.insert(segment);
            }
        } else if key == NodeKey::of(*end) {
            if segment + 1 < last {
                self.vertices.insert(segment + 1);
            }
        } else {
            let along = *end - *start;
            let offset = point - *start;
            let position = (offset.x * along.x + offset.y * along.y)
                / (along.x * along.x + along.y * along.y);
            self.points.push((segment, position, point));
        }
    }

    /// Split `line` at the recorded cuts. Zero-length pieces are dropped.
    pub(crate) fn apply(mut self, line: &LineString<f64>) -> Vec<LineString<f64>> {
        self.points
            .sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
        let mut pieces = Vec::new();
        let mut current: Vec<Coord<f64>> = line.0.first().copied().into_iter().collect();
        let mut points = self.points.into_iter().peekable();
        for (segment, end) in line.0.iter().enumerate().skip(1).map(|(i, c)| (i - 1, *c)) {
            while let Some((_, _, point)) = points.next_if(|(s, _, _)| *s == segment) {
                current.push(point);
                pieces.push(LineString::new(std::mem::replace(&mut current, vec![point])));
            }
            current.push(end);
            if self.vertices.contains(&(segment + 1)) {
                pieces.push(LineString::new(std::mem::replace(&mut current, vec![end])));
            }
        }
        pieces.push(LineString::new(current));
        pieces
            .into_iter()
            .map(|mut piece| {
                dedup_vertices(&mut piece);
                piece
            })
            .filter(|piece| piece.0.len() >= 2)
            .collect()
    }
}

/// Move vertices onto earlier vertices within `threshold`.
///
/// Vertices are visited in line order; a vertex with no anchor in range
/// becomes an anchor itself. Returns the number of lines changed.
pub(crate) fn snap_vertices(lines: &mut [LineString<f64>], threshold: f64) -> usize {
    let limit = threshold * threshold;
    let mut anchors: RTree<[f64; 2]> = RTree::new();
    let mut modified = 0;
    for line in lines.iter_mut() {
        let mut changed = false;
        for coord in &mut line.0 {
            let here = [coord.x, coord.y];
            match anchors.nearest_neighbor(&here) {
                Some(anchor) if distance_2(anchor, &here) <= limit => {
                    if NodeKey::of(*coord) != NodeKey::of(Coord { x: anchor[0], y: anchor[1] }) {
                        *coord = Coord { x: anchor[0], y: anchor[1] };
                        changed = true;
                    }
                }
                _ => anchors.insert(here),
            }
        }
        if changed {
            dedup_vertices(line);
            modified += 1;
        }
    }
    modified
}

fn distance_2(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// Cuts at vertices that occur more than once across all lines.
///
/// The closing vertex of a ring is counted once.
pub(crate) fn shared_vertex_cuts(lines: &[LineString<f64>]) -> Vec<Cuts> {
    let mut counts: HashMap<NodeKey, usize> = HashMap::new();
    for line in lines {
        let closed = line.is_closed() && line.0.len() > 1;
        let take = if closed { line.0.len() - 1 } else { line.0.len() };
        for coord in line.0.iter().take(take) {
            *counts.entry(NodeKey::of(*coord)).or_insert(0) += 1;
        }
    }
    lines
        .iter()
        .map(|line| {
            let last = line.0.len().saturating_sub(1);
            Cuts {
                vertices: line
                    .0
                    .iter()
                    .enumerate()
                    .filter(|(index, coord)| {
                        *index > 0
                            && *index < last
                            && counts.get(&NodeKey::of(**coord)).is_some_and(|n| *n > 1)
                    })
                    .map(|(index, _)| index)
                    .collect(),
                points: Vec::new(),
            }
        })
        .collect()
}

type Segment = GeomWithData<IndexedLine<[f64; 2]>, (usize, usize)>;

/// Cuts at every intersection between segments, including self-intersections.
pub(crate) fn intersection_cuts(lines: &[LineString<f64>]) -> Vec<Cuts> {
    let segments: Vec<Segment> = lines
        .iter()
        .enumerate()
        .flat_map(|(owner, line)| {
            line.lines().enumerate().map(move |(index, segment)| {
                GeomWithData::new(
                    IndexedLine::new(
                        [segment.start.x, segment.start.y],
                        [segment.end.x, segment.end.y],
                    ),
                    (owner, index),
                )
            })
        })
        .collect();
    let tree = RTree::bulk_load(segments);
    let mut cuts = vec![Cuts::default(); lines.len()];

    for (a, b) in tree.intersection_candidates_with_other_tree(&tree) {
        if a.data >= b.data {
            continue;
        }
        let ((line_a, seg_a), (line_b, seg_b)) = (a.data, b.data);
        let (Some(first), Some(second)) = (lines.get(line_a), lines.get(line_b)) else {
            continue;
        };
        let (Some(lhs), Some(rhs)) = (segment(first, seg_a), segment(second, seg_b)) else {
            continue;
        };
        let joint = (line_a == line_b && seg_a + 1 == seg_b).then_some(rhs.start);
        let points = match line_intersection(lhs, rhs) {
            None => continue,
            Some(LineIntersection::SinglePoint { intersection, .. }) => vec![intersection],
            Some(LineIntersection::Collinear { intersection }) => {
                vec![intersection.start, intersection.end]
            }
        };
        for point in points {
            if joint.is_some_and(|shared| NodeKey::of(shared) == NodeKey::of(point)) {
                continue;
            }
            if let Some(target) = cuts.get_mut(line_a) {
                target.add(first, seg_a, point);
            }
            if let Some(target) = cuts.get_mut(line_b) {
                target.add(second, seg_b, point);
            }
        }
    }
    cuts
}

fn segment(line: &LineString<f64>, index: usize) -> Option<Line<f64>> {
    Some(Line::new(*line.0.get(index)?, *line.0.get(index + 1)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;
    use rstest::rstest;

    fn split_all(lines: &[LineString<f64>], cuts: Vec<Cuts>) -> Vec<LineString<f64>> {
        lines
            .iter()
            .zip(cuts)
            .flat_map(|(line, cut)| cut.apply(line))
            .collect()
    }

    #[rstest]
    fn crossing_lines_share_a_new_node() {
        let lines = vec![
            line_string![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0)],
            line_string![(x: 0.0, y: 2.0), (x: 2.0, y: 0.0)],
        ];
        let pieces = split_all(&lines, intersection_cuts(&lines));
        assert_eq!(pieces.len(), 4);
        let node = pieces[0].0[1];
        assert!((node.x - 1.0).abs() < 1e-12 && (node.y - 1.0).abs() < 1e-12);
        assert!(pieces.iter().all(|piece| piece.0.contains(&node)));
    }

    #[rstest]
    fn touching_vertex_splits_only_the_touched_line() {
        let lines = vec![
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 2.0, y: 0.0)],
            line_string![(x: 1.0, y: 0.0), (x: 1.0, y: 1.0)],
        ];
        let cuts = intersection_cuts(&lines);
        assert!(!cuts[0].is_empty());
        assert!(cuts[1].is_empty());
        assert_eq!(split_all(&lines, cuts).len(), 3);
    }

    #[rstest]
    fn collinear_overlap_is_cut_at_both_ends() {
        let lines = vec![
            line_string![(x: 0.0, y: 0.0), (x: 3.0, y: 0.0)],
            line_string![(x: 1.0, y: 0.0), (x: 2.0, y: 0.0)],
        ];
        let pieces = split_all(&lines, intersection_cuts(&lines));
        assert_eq!(pieces.len(), 4);
    }

    #[rstest]
    fn consecutive_segments_are_not_cut_at_their_joint() {
        let lines = vec![line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)]];
        assert!(intersection_cuts(&lines)[0].is_empty());
    }

    #[rstest]
    fn identical_rings_break_at_every_vertex() {
        let ring = line_string![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)
        ];
        let lines = vec![ring.clone(), ring];
        let pieces = split_all(&lines, shared_vertex_cuts(&lines));
        assert_eq!(pieces.len(), 8);
        assert!(pieces.iter().all(|piece| piece.0.len() == 2));
    }

    #[rstest]
    fn isolated_ring_stays_whole() {
        let lines = vec![line_string![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)
        ]];
        assert!(shared_vertex_cuts(&lines)[0].is_empty());
    }

    #[rstest]
    fn snapping_merges_nearby_vertices() {
        let mut lines = vec![
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)],
            line_string![(x: 1.000_01, y: 0.0), (x: 1.0, y: 1.0)],
        ];
        assert_eq!(snap_vertices(&mut lines, 0.001), 1);
        assert_eq!(lines[1].0[0], Coord { x: 1.0, y: 0.0 });
    }
}
