//! Decomposition of source geometries into topological primitives.

use geo::{Area, Coord, Geometry, InteriorPoint, LineString, Point, Polygon};
use log::warn;

use crate::{CategoryPair, PrimitiveKind, TopologyEngine, TypeOverrides};

/// Z values with a magnitude above this mark a geometry as 3D.
pub const Z_TOLERANCE: f64 = 1e-9;

/// Polygon structure counted during the survey pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingCount {
    /// Number of polygons.
    pub polygons: usize,
    /// Number of rings that become boundaries.
    pub boundaries: usize,
}

impl std::ops::AddAssign for RingCount {
    fn add_assign(&mut self, rhs: Self) {
        self.polygons += rhs.polygons;
        self.boundaries += rhs.boundaries;
    }
}

/// Count polygons and boundary rings in `geometry`.
///
/// Lines count as boundaries when they will be written as boundaries.
#[must_use]
pub fn count_rings(geometry: &Geometry<f64>, lines_as_boundaries: bool) -> RingCount {
    let line = RingCount {
        polygons: 0,
        boundaries: usize::from(lines_as_boundaries),
    };
    match geometry {
        Geometry::Polygon(polygon) => polygon_rings(polygon),
        Geometry::MultiPolygon(multi) => multi.0.iter().map(polygon_rings).fold(
            RingCount::default(),
            |mut acc, count| {
                acc += count;
                acc
            },
        ),
        Geometry::Rect(_) | Geometry::Triangle(_) => RingCount {
            polygons: 1,
            boundaries: 1,
        },
        Geometry::LineString(_) | Geometry::Line(_) => line,
        Geometry::MultiLineString(multi) => RingCount {
            polygons: 0,
            boundaries: if lines_as_boundaries { multi.0.len() } else { 0 },
        },
        Geometry::GeometryCollection(collection) => {
            let mut total = RingCount::default();
            for member in &collection.0 {
                total += count_rings(member, lines_as_boundaries);
            }
            total
        }
        Geometry::Point(_) | Geometry::MultiPoint(_) => RingCount::default(),
    }
}

fn polygon_rings(polygon: &Polygon<f64>) -> RingCount {
    RingCount {
        polygons: 1,
        boundaries: 1 + polygon.interiors().len(),
    }
}

/// Unsigned area enclosed by a ring.
#[must_use]
pub fn ring_area(ring: &LineString<f64>) -> f64 {
    Polygon::new(ring.clone(), Vec::new()).unsigned_area()
}

/// Cut `line` into pieces whose length first exceeds `split_distance`.
///
/// Pieces end at existing vertices and share their end points. A missing or
/// non-positive distance keeps the line whole.
#[must_use]
pub fn split_boundary(line: &LineString<f64>, split_distance: Option<f64>) -> Vec<LineString<f64>> {
    let Some(limit) = split_distance.filter(|d| *d > 0.0) else {
        return vec![line.clone()];
    };
    let coords = &line.0;
    let mut pieces = Vec::new();
    let mut current: Vec<Coord<f64>> = coords.first().copied().into_iter().collect();
    let mut length = 0.0;
    for pair in coords.windows(2) {
        let [from, to] = pair else { continue };
        length += (to.x - from.x).hypot(to.y - from.y);
        current.push(*to);
        if length > limit {
            pieces.push(LineString::new(std::mem::replace(&mut current, vec![*to])));
            length = 0.0;
        }
    }
    if current.len() > 1 {
        pieces.push(LineString::new(current));
    }
    if pieces.is_empty() {
        pieces.push(line.clone());
    }
    pieces
}

/// Rules that shape how geometries become primitives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecomposeRules {
    /// Rings below this area are dropped.
    pub min_area: f64,
    /// Boundary piece length; `None` writes whole rings.
    pub split_distance: Option<f64>,
    /// Output type conversions.
    pub types: TypeOverrides,
    /// Whether topology cleaning follows ingestion.
    pub clean: bool,
}

/// Write `geometry` into `engine` as primitives carrying `cat`.
///
/// Returns the number of primitives written.
pub fn write_geometry<T: TopologyEngine + ?Sized>(
    engine: &mut T,
    geometry: &Geometry<f64>,
    cat: Option<CategoryPair>,
    rules: &DecomposeRules,
) -> usize {
    let cats: Vec<CategoryPair> = cat.into_iter().collect();
    match geometry {
        Geometry::Point(point) => write_point(engine, *point, &cats, rules),
        Geometry::MultiPoint(multi) => multi
            .0
            .iter()
            .map(|point| write_point(engine, *point, &cats, rules))
            .sum(),
        Geometry::Line(line) => write_line(engine, LineString::from(vec![line.start, line.end]), &cats, rules),
        Geometry::LineString(line) => write_line(engine, line.clone(), &cats, rules),
        Geometry::MultiLineString(multi) => multi
            .0
            .iter()
            .map(|line| write_line(engine, line.clone(), &cats, rules))
            .sum(),
        Geometry::Polygon(polygon) => write_polygon(engine, polygon, &cats, rules),
        Geometry::MultiPolygon(multi) => multi
            .0
            .iter()
            .map(|polygon| write_polygon(engine, polygon, &cats, rules))
            .sum(),
        Geometry::Rect(rect) => write_polygon(engine, &rect.to_polygon(), &cats, rules),
        Geometry::Triangle(triangle) => write_polygon(engine, &triangle.to_polygon(), &cats, rules),
        Geometry::GeometryCollection(collection) => collection
            .0
            .iter()
            .map(|member| write_geometry(engine, member, cat, rules))
            .sum(),
    }
}

fn write_point<T: TopologyEngine + ?Sized>(
    engine: &mut T,
    point: Point<f64>,
    cats: &[CategoryPair],
    rules: &DecomposeRules,
) -> usize {
    let kind = if rules.types.points_as_centroids {
        PrimitiveKind::Centroid
    } else {
        PrimitiveKind::Point
    };
    engine.write_primitive(kind, LineString::new(vec![point.0]), cats.to_vec());
    1
}

fn write_line<T: TopologyEngine + ?Sized>(
    engine: &mut T,
    line: LineString<f64>,
    cats: &[CategoryPair],
    rules: &DecomposeRules,
) -> usize {
    if line.0.len() < 2 {
        warn!("Skipping line with fewer than two vertices");
        return 0;
    }
    let kind = if rules.types.lines_as_boundaries {
        PrimitiveKind::Boundary
    } else {
        PrimitiveKind::Line
    };
    engine.write_primitive(kind, line, cats.to_vec());
    1
}

fn write_polygon<T: TopologyEngine + ?Sized>(
    engine: &mut T,
    polygon: &Polygon<f64>,
    cats: &[CategoryPair],
    rules: &DecomposeRules,
) -> usize {
    if polygon.exterior().0.len() < 4 || ring_area(polygon.exterior()) < rules.min_area {
        return 0;
    }
    let (kind, ring_cats) = if rules.types.boundaries_as_lines {
        (PrimitiveKind::Line, cats.to_vec())
    } else if rules.clean {
        (PrimitiveKind::Boundary, Vec::new())
    } else {
        (PrimitiveKind::Boundary, cats.to_vec())
    };
    let rings = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .filter(|ring| ring.0.len() >= 4 && ring_area(ring) >= rules.min_area);
    let mut written = 0;
    for ring in rings {
        let pieces = if rules.clean && kind == PrimitiveKind::Boundary {
            split_boundary(ring, rules.split_distance)
        } else {
            vec![ring.clone()]
        };
        for piece in pieces {
            engine.write_primitive(kind, piece, ring_cats.clone());
            written += 1;
        }
    }
    if !rules.clean && !rules.types.boundaries_as_lines {
        match polygon.interior_point() {
            Some(point) => {
                engine.write_primitive(
                    PrimitiveKind::Centroid,
                    LineString::new(vec![point.0]),
                    cats.to_vec(),
                );
                written += 1;
            }
            None => warn!("Unable to calculate a centroid for polygon"),
        }
    }
    written
}
