//! Area building by tracing faces of the boundary graph.
//!
//! Each boundary contributes two half-edges. Around every node the outgoing
//! half-edges are ordered by angle; leaving a node through the half-edge just
//! clockwise of the one we arrived on keeps the traced face on the left.
//! Counter-clockwise cycles are areas; clockwise cycles are the outlines of
//! connected groups of boundaries and become islands of the smallest area
//! enclosing them.

use std::collections::HashMap;

use geo::{Area, Contains, Coord, InteriorPoint, LineString, Point, Polygon};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

use crate::node::NodeKey;

/// An area rebuilt from boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaRecord {
    /// Counter-clockwise outer ring.
    pub outer: LineString<f64>,
    /// Outlines of boundary groups nested directly inside.
    pub islands: Vec<LineString<f64>>,
    /// Outer ring area minus island areas.
    pub size: f64,
    /// A point inside the area and outside its islands.
    pub interior: Option<Coord<f64>>,
}

struct HalfEdges<'a> {
    lines: &'a [LineString<f64>],
    around: HashMap<NodeKey, Vec<usize>>,
    slot: Vec<usize>,
}

impl<'a> HalfEdges<'a> {
    fn new(lines: &'a [LineString<f64>]) -> Self {
        let mut around: HashMap<NodeKey, Vec<(f64, usize)>> = HashMap::new();
        for edge in 0..lines.len() * 2 {
            if let Some((origin, toward)) = leaving(lines, edge) {
                let angle = (toward.y - origin.y).atan2(toward.x - origin.x);
                around.entry(NodeKey::of(origin)).or_default().push((angle, edge));
            }
        }
        let mut slot = vec![0; lines.len() * 2];
        let around = around
            .into_iter()
            .map(|(node, mut edges)| {
                edges.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                for (position, (_, edge)) in edges.iter().enumerate() {
                    if let Some(entry) = slot.get_mut(*edge) {
                        *entry = position;
                    }
                }
                (node, edges.into_iter().map(|(_, edge)| edge).collect())
            })
            .collect();
        Self { lines, around, slot }
    }

    fn next(&self, edge: usize) -> Option<usize> {
        let twin = edge ^ 1;
        let (origin, _) = leaving(self.lines, twin)?;
        let ring = self.around.get(&NodeKey::of(origin))?;
        let position = *self.slot.get(twin)?;
        ring.get((position + ring.len() - 1) % ring.len()).copied()
    }

    /// Half-edge cycles and the cycle of every half-edge.
    fn cycles(&self) -> (Vec<Vec<usize>>, Vec<Option<usize>>) {
        let total = self.lines.len() * 2;
        let mut cycle_of = vec![None; total];
        let mut cycles = Vec::new();
        for start in 0..total {
            if cycle_of.get(start).copied().flatten().is_some()
                || leaving(self.lines, start).is_none()
            {
                continue;
            }
            let id = cycles.len();
            let mut cycle = Vec::new();
            let mut edge = start;
            loop {
                match cycle_of.get_mut(edge) {
                    Some(entry @ None) => *entry = Some(id),
                    _ => break,
                }
                cycle.push(edge);
                match self.next(edge) {
                    Some(next) if cycle.len() <= total => edge = next,
                    _ => break,
                }
            }
            cycles.push(cycle);
        }
        (cycles, cycle_of)
    }

    fn ring(&self, cycle: &[usize]) -> LineString<f64> {
        let mut coords: Vec<Coord<f64>> = Vec::new();
        for edge in cycle {
            let Some(line) = self.lines.get(edge / 2) else {
                continue;
            };
            let walk: Box<dyn Iterator<Item = &Coord<f64>>> = if edge % 2 == 0 {
                Box::new(line.0.iter())
            } else {
                Box::new(line.0.iter().rev())
            };
            let skip = usize::from(!coords.is_empty());
            coords.extend(walk.skip(skip).copied());
        }
        let mut ring = LineString::new(coords);
        ring.close();
        ring
    }
}

/// Origin of `edge` and the next vertex along it.
fn leaving(lines: &[LineString<f64>], edge: usize) -> Option<(Coord<f64>, Coord<f64>)> {
    let line = lines.get(edge / 2)?;
    if line.0.len() < 2 {
        return None;
    }
    if edge % 2 == 0 {
        Some((*line.0.first()?, *line.0.get(1)?))
    } else {
        Some((*line.0.last()?, *line.0.get(line.0.len() - 2)?))
    }
}

fn signed_area(ring: &LineString<f64>) -> f64 {
    ring.lines().map(|segment| segment.determinant()).sum::<f64>() / 2.0
}

/// Indices of lines with the same face on both sides.
pub(crate) fn single_face_lines(lines: &[LineString<f64>]) -> Vec<usize> {
    let (_, cycle_of) = HalfEdges::new(lines).cycles();
    (0..lines.len())
        .filter(|line| {
            let forward = cycle_of.get(line * 2).copied().flatten();
            forward.is_some() && forward == cycle_of.get(line * 2 + 1).copied().flatten()
        })
        .collect()
}

/// Build areas from noded boundaries.
pub(crate) fn build_areas(lines: &[LineString<f64>]) -> Vec<AreaRecord> {
    let edges = HalfEdges::new(lines);
    let (cycles, _) = edges.cycles();
    let mut outers = Vec::new();
    let mut holes = Vec::new();
    for cycle in &cycles {
        let ring = edges.ring(cycle);
        let area = signed_area(&ring);
        if area > 0.0 {
            outers.push((ring, area));
        } else if area < 0.0 {
            holes.push(ring);
        }
    }

    let index: RTree<GeomWithData<Rectangle<[f64; 2]>, usize>> = RTree::bulk_load(
        outers
            .iter()
            .enumerate()
            .filter_map(|(id, (ring, _))| {
                let envelope = envelope(ring)?;
                Some(GeomWithData::new(
                    Rectangle::from_corners(envelope.lower(), envelope.upper()),
                    id,
                ))
            })
            .collect(),
    );
    let shells: Vec<Polygon<f64>> = outers
        .iter()
        .map(|(ring, _)| Polygon::new(ring.clone(), Vec::new()))
        .collect();

    let mut islands: Vec<Vec<LineString<f64>>> = vec![Vec::new(); outers.len()];
    for hole in holes {
        let Some(probe) = hole.0.first().copied() else {
            continue;
        };
        let point = Point::from(probe);
        let owner = index
            .locate_all_at_point(&[probe.x, probe.y])
            .map(|candidate| candidate.data)
            .filter(|id| shells.get(*id).is_some_and(|shell| shell.contains(&point)))
            .min_by(|a, b| {
                let size = |id: &usize| outers.get(*id).map_or(f64::INFINITY, |(_, area)| *area);
                size(a).total_cmp(&size(b))
            });
        if let Some(list) = owner.and_then(|id| islands.get_mut(id)) {
            list.push(hole);
        }
    }

    outers
        .into_iter()
        .zip(islands)
        .map(|((outer, area), islands)| {
            let polygon = Polygon::new(outer, islands);
            let size = area - polygon.interiors().iter().map(|ring| signed_area(ring).abs()).sum::<f64>();
            let interior = polygon.interior_point().map(|point| point.0);
            let (outer, islands) = polygon.into_inner();
            AreaRecord {
                outer,
                islands,
                size,
                interior,
            }
        })
        .collect()
}

fn envelope(ring: &LineString<f64>) -> Option<AABB<[f64; 2]>> {
    let points: Vec<[f64; 2]> = ring.0.iter().map(|c| [c.x, c.y]).collect();
    (!points.is_empty()).then(|| AABB::from_points(points.iter()))
}
