//! Exact node identity and boundary end bookkeeping.

use std::collections::HashMap;

use geo::{Coord, LineString};

/// Bit-exact key of a coordinate; `-0.0` and `0.0` share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeKey(u64, u64);

impl NodeKey {
    pub(crate) fn of(coord: Coord<f64>) -> Self {
        Self((coord.x + 0.0).to_bits(), (coord.y + 0.0).to_bits())
    }
}

/// First and last vertex of a line.
pub(crate) fn ends(line: &LineString<f64>) -> Option<(Coord<f64>, Coord<f64>)> {
    Some((*line.0.first()?, *line.0.last()?))
}

/// Number of line ends meeting at each node.
///
/// A closed line contributes two ends to its node.
pub(crate) fn end_degrees<'a>(
    lines: impl IntoIterator<Item = &'a LineString<f64>>,
) -> HashMap<NodeKey, usize> {
    let mut degrees = HashMap::new();
    for (start, end) in lines.into_iter().filter_map(ends) {
        *degrees.entry(NodeKey::of(start)).or_insert(0) += 1;
        *degrees.entry(NodeKey::of(end)).or_insert(0) += 1;
    }
    degrees
}

/// Drop consecutive repeated vertices.
pub(crate) fn dedup_vertices(line: &mut LineString<f64>) {
    line.0.dedup_by(|a, b| NodeKey::of(*a) == NodeKey::of(*b));
}

/// Whether the line still has a segment of non-zero length.
pub(crate) fn has_length(line: &LineString<f64>) -> bool {
    line.0
        .first()
        .is_some_and(|first| line.0.iter().any(|c| NodeKey::of(*c) != NodeKey::of(*first)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;
    use rstest::rstest;

    #[rstest]
    fn signed_zero_shares_a_key() {
        assert_eq!(
            NodeKey::of(Coord { x: -0.0, y: 1.0 }),
            NodeKey::of(Coord { x: 0.0, y: 1.0 })
        );
    }

    #[rstest]
    fn closed_lines_count_twice() {
        let ring = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)];
        let spur = line_string![(x: 0.0, y: 0.0), (x: -1.0, y: 0.0)];
        let degrees = end_degrees([&ring, &spur]);
        assert_eq!(degrees.get(&NodeKey::of(Coord { x: 0.0, y: 0.0 })), Some(&3));
        assert_eq!(degrees.get(&NodeKey::of(Coord { x: -1.0, y: 0.0 })), Some(&1));
    }

    #[rstest]
    fn collapsed_lines_have_no_length() {
        let mut line = line_string![(x: 2.0, y: 2.0), (x: 2.0, y: 2.0)];
        dedup_vertices(&mut line);
        assert_eq!(line.0.len(), 1);
        assert!(!has_length(&line));
    }
}
