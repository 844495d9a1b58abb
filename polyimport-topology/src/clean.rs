//! Duplicate, small-angle, merge and dangle handling for boundaries.

use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;

use geo::{Coord, LineString};

use crate::node::{NodeKey, end_degrees, ends};

/// For every line, the earlier line it duplicates, if any.
///
/// Lines are duplicates when they share all vertices in the same or
/// reversed order.
pub(crate) fn duplicates(lines: &[LineString<f64>]) -> Vec<Option<usize>> {
    let mut seen: HashMap<Vec<NodeKey>, usize> = HashMap::new();
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let forward: Vec<NodeKey> = line.0.iter().map(|c| NodeKey::of(*c)).collect();
            let mut backward = forward.clone();
            backward.reverse();
            let key = forward.min(backward);
            match seen.get(&key) {
                Some(first) => Some(*first),
                None => {
                    seen.insert(key, index);
                    None
                }
            }
        })
        .collect()
}

/// Indices of lines with an end no other line end touches.
pub(crate) fn dangles(lines: &[LineString<f64>]) -> Vec<usize> {
    let degrees = end_degrees(lines);
    let lonely = |coord: Coord<f64>| degrees.get(&NodeKey::of(coord)).is_some_and(|d| *d == 1);
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| ends(line).is_some_and(|(start, end)| lonely(start) || lonely(end)))
        .map(|(index, _)| index)
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct End {
    line: usize,
    at_start: bool,
    angle: f64,
    length: f64,
    direction: Coord<f64>,
    far: NodeKey,
}

fn end_of(line: &LineString<f64>, index: usize, at_start: bool) -> Option<End> {
    let count = line.0.len();
    let (node, next) = if at_start {
        (*line.0.first()?, *line.0.get(1)?)
    } else {
        (*line.0.last()?, *line.0.get(count.checked_sub(2)?)?)
    };
    let direction = next - node;
    let length = direction.x.hypot(direction.y);
    (length > 0.0).then(|| End {
        line: index,
        at_start,
        angle: direction.y.atan2(direction.x),
        length,
        direction,
        far: NodeKey::of(next),
    })
}

/// Collapse pairs of boundaries leaving a node at nearly the same angle.
///
/// The longer boundary gets a new vertex where the shorter first segment
/// ends, and the shorter boundary's vertex moves onto it, so the two now
/// share an identical segment for breaking and duplicate removal to resolve.
/// Each line is adjusted at most once per call. Returns the pairs fixed.
pub(crate) fn collapse_small_angles(lines: &mut [LineString<f64>], tolerance: f64) -> usize {
    let mut around: HashMap<NodeKey, Vec<End>> = HashMap::new();
    for (index, line) in lines.iter().enumerate() {
        for at_start in [true, false] {
            if let Some(end) = end_of(line, index, at_start) {
                let node = if at_start { line.0.first() } else { line.0.last() };
                if let Some(node) = node {
                    around.entry(NodeKey::of(*node)).or_default().push(end);
                }
            }
        }
    }

    let mut pairs = Vec::new();
    let mut touched = HashSet::new();
    let mut nodes: Vec<_> = around.into_iter().collect();
    nodes.sort_by_key(|(node, _)| *node);
    for (_, mut ends) in nodes {
        if ends.len() < 2 {
            continue;
        }
        ends.sort_by(|a, b| a.angle.total_cmp(&b.angle));
        let count = ends.len();
        for position in 0..count {
            let (Some(a), Some(b)) = (ends.get(position), ends.get((position + 1) % count)) else {
                continue;
            };
            let mut gap = b.angle - a.angle;
            if position + 1 == count {
                gap += TAU;
            }
            if gap.abs() >= tolerance || a.line == b.line || a.far == b.far {
                continue;
            }
            if touched.contains(&a.line) || touched.contains(&b.line) {
                continue;
            }
            touched.insert(a.line);
            touched.insert(b.line);
            pairs.push((*a, *b));
        }
    }

    for (a, b) in &pairs {
        let (short, long) = if a.length <= b.length { (a, b) } else { (b, a) };
        let (Some(short_line), Some(long_line)) = (lines.get(short.line), lines.get(long.line))
        else {
            continue;
        };
        let Some((node, _)) = node_and_far(long_line, long.at_start) else {
            continue;
        };
        let shared = node + long.direction * (short.length / long.length);
        let short_far = if short.at_start { 1 } else { short_line.0.len().saturating_sub(2) };
        if let Some(vertex) = lines.get_mut(short.line).and_then(|line| line.0.get_mut(short_far)) {
            *vertex = shared;
        }
        if let Some(line) = lines.get_mut(long.line) {
            let at = if long.at_start { 1 } else { line.0.len().saturating_sub(1) };
            line.0.insert(at, shared);
        }
    }
    pairs.len()
}

fn node_and_far(line: &LineString<f64>, at_start: bool) -> Option<(Coord<f64>, Coord<f64>)> {
    if at_start {
        Some((*line.0.first()?, *line.0.get(1)?))
    } else {
        Some((*line.0.last()?, *line.0.get(line.0.len().checked_sub(2)?)?))
    }
}

/// Join lines meeting at nodes where exactly two line ends meet.
///
/// Returns the merged lines with the indices they were built from, and the
/// number of joins performed.
pub(crate) fn merge_chains(lines: &[LineString<f64>]) -> (Vec<(LineString<f64>, Vec<usize>)>, usize) {
    let mut chains: Vec<(LineString<f64>, Vec<usize>)> = lines
        .iter()
        .enumerate()
        .map(|(index, line)| (line.clone(), vec![index]))
        .collect();
    let mut joins = 0;
    loop {
        let degrees = end_degrees(chains.iter().map(|(line, _)| line));
        let mut at_node: HashMap<NodeKey, Vec<usize>> = HashMap::new();
        for (index, (line, _)) in chains.iter().enumerate() {
            if let Some((start, end)) = ends(line) {
                at_node.entry(NodeKey::of(start)).or_default().push(index);
                at_node.entry(NodeKey::of(end)).or_default().push(index);
            }
        }
        let mut candidates: Vec<(NodeKey, usize, usize)> = at_node
            .into_iter()
            .filter(|(node, _)| degrees.get(node) == Some(&2))
            .filter_map(|(node, members)| match members.as_slice() {
                [a, b] if a != b => Some((node, *a, *b)),
                _ => None,
            })
            .collect();
        if candidates.is_empty() {
            break;
        }
        candidates.sort_unstable();
        let mut used = HashSet::new();
        let mut merged = Vec::new();
        for (node, a, b) in candidates {
            if used.contains(&a) || used.contains(&b) {
                continue;
            }
            let (Some(first), Some(second)) = (chains.get(a), chains.get(b)) else {
                continue;
            };
            used.insert(a);
            used.insert(b);
            merged.push(join(first, second, node));
            joins += 1;
        }
        let mut next: Vec<_> = chains
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !used.contains(index))
            .map(|(_, chain)| chain)
            .collect();
        next.extend(merged);
        chains = next;
    }
    (chains, joins)
}

fn join(
    first: &(LineString<f64>, Vec<usize>),
    second: &(LineString<f64>, Vec<usize>),
    node: NodeKey,
) -> (LineString<f64>, Vec<usize>) {
    let mut head = first.0.clone();
    if head.0.first().is_some_and(|c| NodeKey::of(*c) == node)
        && !head.0.last().is_some_and(|c| NodeKey::of(*c) == node)
    {
        head.0.reverse();
    }
    let mut tail = second.0.clone();
    if tail.0.last().is_some_and(|c| NodeKey::of(*c) == node)
        && !tail.0.first().is_some_and(|c| NodeKey::of(*c) == node)
    {
        tail.0.reverse();
    }
    head.0.extend(tail.0.into_iter().skip(1));
    let mut sources = first.1.clone();
    sources.extend(second.1.iter().copied());
    (head, sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;
    use rstest::rstest;

    #[rstest]
    fn reversed_lines_are_duplicates() {
        let lines = vec![
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)],
            line_string![(x: 1.0, y: 0.0), (x: 0.0, y: 0.0)],
            line_string![(x: 1.0, y: 0.0), (x: 1.0, y: 1.0)],
        ];
        assert_eq!(duplicates(&lines), vec![None, Some(0), None]);
    }

    #[rstest]
    fn spurs_are_dangles() {
        let lines = vec![
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)],
            line_string![(x: 1.0, y: 0.0), (x: 2.0, y: 0.0)],
        ];
        assert_eq!(dangles(&lines), vec![1]);
    }

    #[rstest]
    fn chains_merge_through_degree_two_nodes() {
        let lines = vec![
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)],
            line_string![(x: 2.0, y: 0.0), (x: 1.0, y: 0.0)],
            line_string![(x: 2.0, y: 0.0), (x: 3.0, y: 0.0)],
        ];
        let (chains, joins) = merge_chains(&lines);
        assert_eq!(joins, 2);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].0.0.len(), 4);
        let mut sources = chains[0].1.clone();
        sources.sort_unstable();
        assert_eq!(sources, vec![0, 1, 2]);
    }

    #[rstest]
    fn closed_ring_does_not_merge_with_itself() {
        let lines = vec![line_string![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)
        ]];
        let (chains, joins) = merge_chains(&lines);
        assert_eq!(joins, 0);
        assert_eq!(chains.len(), 1);
    }

    #[rstest]
    fn nearly_parallel_ends_share_a_segment() {
        let mut lines = vec![
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)],
            line_string![(x: 0.0, y: 0.0), (x: 4.0, y: 1e-12)],
        ];
        assert_eq!(collapse_small_angles(&mut lines, 1e-8), 1);
        assert_eq!(lines[1].0.len(), 3);
        assert_eq!(lines[0].0[1], lines[1].0[1]);
        assert_eq!(collapse_small_angles(&mut lines, 1e-8), 0);
    }
}
