//! Third traversal: link rebuilt areas to the input polygons covering them.
//!
//! Every rebuilt area gets one centroid at an interior point. Interior points
//! are indexed in an R\*-tree so each input polygon only tests the centroids
//! inside its bounding box. A centroid collects the `(field, cat)` pair of
//! every input polygon that contains it. After the traversal a centroid with
//! no pairs marks a gap, and one with several pairs marks an overlap and
//! receives an extra category counting them.

use geo::{BoundingRect, Coord, Geometry, Intersects, LineString, Point, Polygon};
use log::{info, warn};
use rstar::{AABB, RTree, RTreeObject};

use super::{ImportError, Traversal};
use crate::geometry::ring_area;
use crate::{CategoryPair, FeatureSource, FeatureStream, PrimitiveKind, TopologyEngine};

#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedCentroid {
    area: usize,
    location: [f64; 2],
}

impl RTreeObject for IndexedCentroid {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.location)
    }
}

/// Representative point of one rebuilt area.
#[derive(Debug, Clone, PartialEq)]
pub struct Centroid {
    /// Interior point; `None` when the engine could not compute one.
    pub location: Option<Coord<f64>>,
    /// Category pairs collected from covering input polygons.
    pub cats: Vec<CategoryPair>,
}

/// Area totals gathered while writing centroids.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AreaTally {
    /// Number of rebuilt areas.
    pub n_areas: usize,
    /// Summed size of every area.
    pub total_area: f64,
    /// Areas covered by more than one input polygon.
    pub n_overlaps: usize,
    /// Summed size of overlapping areas.
    pub overlap_area: f64,
    /// Areas covered by no input polygon.
    pub n_nocat: usize,
    /// Summed size of uncovered areas.
    pub nocat_area: f64,
}

/// Centroids of all rebuilt areas with their spatial index.
///
/// # Examples
///
/// ```
/// use geo::{Coord, polygon};
/// use polyimport_core::{CategoryPair, pipeline::CentroidSet};
/// use polyimport_core::test_support::{ScriptedArea, ScriptedTopology};
/// use polyimport_core::TopologyEngine;
///
/// let mut topology = ScriptedTopology::with_areas(vec![ScriptedArea {
///     interior: Some(Coord { x: 0.5, y: 0.5 }),
///     size: 1.0,
/// }]);
/// topology.build_areas();
/// let mut centroids = CentroidSet::from_areas(&topology);
/// let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
/// assert_eq!(centroids.assign(&square, CategoryPair::new(1, 4), 0.0), 1);
/// ```
#[derive(Debug, Clone)]
pub struct CentroidSet {
    centroids: Vec<Centroid>,
    index: RTree<IndexedCentroid>,
}

impl CentroidSet {
    /// Allocate one centroid per area built by `topology`.
    pub fn from_areas<T: TopologyEngine + ?Sized>(topology: &T) -> Self {
        let n_areas = topology.area_count();
        let mut centroids = Vec::with_capacity(n_areas);
        let mut items = Vec::with_capacity(n_areas);
        for area in 0..n_areas {
            let location = topology.point_in_area(area);
            match location {
                Some(point) => items.push(IndexedCentroid {
                    area,
                    location: [point.x, point.y],
                }),
                None => warn!("Unable to calculate area centroid"),
            }
            centroids.push(Centroid {
                location,
                cats: Vec::new(),
            });
        }
        Self {
            centroids,
            index: RTree::bulk_load(items),
        }
    }

    /// Centroids indexed by area id.
    #[must_use]
    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    /// Add `pair` to every centroid inside `polygon`.
    ///
    /// Centroids on the outer ring count as inside; centroids in or on a hole
    /// do not. Polygons whose outer ring is smaller than `min_area` are
    /// ignored, as are holes below it. Returns the number of centroids hit.
    pub fn assign(&mut self, polygon: &Polygon<f64>, pair: CategoryPair, min_area: f64) -> usize {
        let outer = polygon.exterior();
        if ring_area(outer) < min_area {
            return 0;
        }
        let Some(bbox) = outer.bounding_rect() else {
            return 0;
        };
        let envelope = AABB::from_corners([bbox.min().x, bbox.min().y], [bbox.max().x, bbox.max().y]);
        let shell = Polygon::new(outer.clone(), Vec::new());
        let holes: Vec<Polygon<f64>> = polygon
            .interiors()
            .iter()
            .filter(|ring| ring_area(ring) >= min_area)
            .map(|ring| Polygon::new(ring.clone(), Vec::new()))
            .collect();

        let mut hits = 0;
        for candidate in self.index.locate_in_envelope_intersecting(&envelope) {
            let point = Point::new(candidate.location[0], candidate.location[1]);
            if !shell.intersects(&point) || holes.iter().any(|hole| hole.intersects(&point)) {
                continue;
            }
            if let Some(centroid) = self.centroids.get_mut(candidate.area) {
                if !centroid.cats.contains(&pair) {
                    centroid.cats.push(pair);
                }
                hits += 1;
            }
        }
        hits
    }

    /// Assign `pair` for every polygon part of `geometry`.
    pub fn assign_geometry(
        &mut self,
        geometry: &Geometry<f64>,
        pair: CategoryPair,
        min_area: f64,
    ) -> usize {
        match geometry {
            Geometry::Polygon(polygon) => self.assign(polygon, pair, min_area),
            Geometry::MultiPolygon(multi) => multi
                .0
                .iter()
                .map(|polygon| self.assign(polygon, pair, min_area))
                .sum(),
            Geometry::Rect(rect) => self.assign(&rect.to_polygon(), pair, min_area),
            Geometry::Triangle(triangle) => self.assign(&triangle.to_polygon(), pair, min_area),
            Geometry::GeometryCollection(collection) => collection
                .0
                .iter()
                .map(|member| self.assign_geometry(member, pair, min_area))
                .sum(),
            Geometry::Point(_)
            | Geometry::MultiPoint(_)
            | Geometry::Line(_)
            | Geometry::LineString(_)
            | Geometry::MultiLineString(_) => 0,
        }
    }

    /// Write one centroid primitive per categorised area and tally areas.
    ///
    /// Overlapping areas carry an extra pair `(overlap_field, n_pairs)`.
    /// Uncategorised areas and areas without interior point are not written.
    pub fn write<T: TopologyEngine + ?Sized>(
        self,
        topology: &mut T,
        overlap_field: u32,
        as_points: bool,
    ) -> AreaTally {
        let kind = if as_points {
            PrimitiveKind::Point
        } else {
            PrimitiveKind::Centroid
        };
        let mut tally = AreaTally {
            n_areas: self.centroids.len(),
            ..AreaTally::default()
        };
        for (area, centroid) in self.centroids.into_iter().enumerate() {
            let size = topology.area_size(area);
            tally.total_area += size;
            let Some(location) = centroid.location else {
                continue;
            };
            let mut cats = centroid.cats;
            if cats.is_empty() {
                tally.nocat_area += size;
                tally.n_nocat += 1;
                continue;
            }
            if cats.len() > 1 {
                let count = i64::try_from(cats.len()).unwrap_or(i64::MAX);
                cats.push(CategoryPair::new(overlap_field, count));
                tally.overlap_area += size;
                tally.n_overlaps += 1;
            }
            topology.write_primitive(kind, LineString::new(vec![location]), cats);
        }
        tally
    }
}

pub(crate) fn run<S, T>(
    traversal: &Traversal<'_>,
    stream: &mut FeatureStream<S>,
    topology: &mut T,
) -> Result<AreaTally, ImportError>
where
    S: FeatureSource,
    T: TopologyEngine + ?Sized,
{
    let options = traversal.options;
    let mut centroids = CentroidSet::from_areas(topology);
    stream.reset();
    for plan in traversal.plans {
        info!("Finding centroids for layer <{}>...", plan.name);
        let mut ordinal = 0_i64;
        while let Some(feature) = traversal.next(stream, plan)? {
            ordinal += 1;
            let cat = plan.category(&feature, ordinal)?;
            let pair = CategoryPair::new(plan.field, cat);
            for geometry in plan.geometries(&feature).flatten() {
                centroids.assign_geometry(&geometry.geometry, pair, options.min_area);
            }
        }
    }

    info!("Writing centroids...");
    let overlap_field = u32::try_from(traversal.plans.len() + 1).unwrap_or(u32::MAX);
    let tally = centroids.write(topology, overlap_field, options.types.centroids_as_points);
    if tally.n_overlaps > 0 {
        warn!(
            "{} areas represent more (overlapping) features, because polygons overlap in input \
             layer(s). Such areas are linked to more than 1 row in attribute table. The number \
             of features for those areas is stored as category in layer {overlap_field}",
            tally.n_overlaps
        );
    }
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedArea, ScriptedTopology};
    use geo::polygon;
    use rstest::{fixture, rstest};

    fn area(x: f64, y: f64, size: f64) -> ScriptedArea {
        ScriptedArea {
            interior: Some(Coord { x, y }),
            size,
        }
    }

    fn built(areas: Vec<ScriptedArea>) -> ScriptedTopology {
        let mut topology = ScriptedTopology::with_areas(areas);
        topology.build_areas();
        topology
    }

    #[fixture]
    fn unit_square() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)]
    }

    #[rstest]
    fn overlapping_squares_share_one_centroid(unit_square: Polygon<f64>) {
        let mut topology = built(vec![area(0.5, 0.5, 1.0)]);
        let mut set = CentroidSet::from_areas(&topology);
        set.assign(&unit_square, CategoryPair::new(1, 1), 0.0001);
        set.assign(&unit_square, CategoryPair::new(1, 2), 0.0001);
        let tally = set.write(&mut topology, 2, false);
        assert_eq!(tally.n_overlaps, 1);
        assert!((tally.overlap_area - 1.0).abs() < 1e-9);
        let written = topology.primitives();
        let centroid = written.last().expect("centroid written");
        assert_eq!(centroid.kind, PrimitiveKind::Centroid);
        assert_eq!(
            centroid.cats,
            vec![
                CategoryPair::new(1, 1),
                CategoryPair::new(1, 2),
                CategoryPair::new(2, 2)
            ]
        );
    }

    #[rstest]
    fn single_cover_writes_single_category(unit_square: Polygon<f64>) {
        let mut topology = built(vec![area(0.5, 0.5, 1.0), area(5.0, 5.0, 3.0)]);
        let mut set = CentroidSet::from_areas(&topology);
        assert_eq!(set.assign(&unit_square, CategoryPair::new(1, 9), 0.0001), 1);
        let tally = set.write(&mut topology, 2, true);
        assert_eq!(tally.n_nocat, 1);
        assert!((tally.nocat_area - 3.0).abs() < 1e-9);
        assert!((tally.total_area - 4.0).abs() < 1e-9);
        assert_eq!(topology.primitive_count(PrimitiveKind::Point), 1);
    }

    #[rstest]
    fn holes_exclude_centroids() {
        let mut topology = built(vec![area(5.0, 5.0, 4.0), area(1.0, 1.0, 96.0)]);
        let framed = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
            interiors: [[(x: 4.0, y: 4.0), (x: 6.0, y: 4.0), (x: 6.0, y: 6.0), (x: 4.0, y: 6.0)]],
        );
        let mut set = CentroidSet::from_areas(&topology);
        assert_eq!(set.assign(&framed, CategoryPair::new(1, 1), 0.0001), 1);
        assert!(set.centroids()[0].cats.is_empty());
        let tally = set.write(&mut topology, 2, false);
        assert_eq!(tally.n_nocat, 1);
    }

    #[rstest]
    fn centroid_on_outer_ring_counts(unit_square: Polygon<f64>) {
        let topology = built(vec![area(1.0, 0.5, 1.0)]);
        let mut set = CentroidSet::from_areas(&topology);
        assert_eq!(set.assign(&unit_square, CategoryPair::new(1, 1), 0.0), 1);
    }

    #[rstest]
    fn tiny_polygons_are_ignored(unit_square: Polygon<f64>) {
        let topology = built(vec![area(0.5, 0.5, 1.0)]);
        let mut set = CentroidSet::from_areas(&topology);
        assert_eq!(set.assign(&unit_square, CategoryPair::new(1, 1), 2.0), 0);
    }

    #[rstest]
    fn missing_interior_point_counts_area_only(unit_square: Polygon<f64>) {
        let mut topology = built(vec![ScriptedArea {
            interior: None,
            size: 2.5,
        }]);
        let mut set = CentroidSet::from_areas(&topology);
        assert_eq!(set.assign(&unit_square, CategoryPair::new(1, 1), 0.0), 0);
        let tally = set.write(&mut topology, 2, false);
        assert!((tally.total_area - 2.5).abs() < 1e-9);
        assert_eq!(tally.n_nocat, 0);
        assert!(topology.primitives().is_empty());
    }

    #[rstest]
    fn repeated_parts_do_not_duplicate_pairs(unit_square: Polygon<f64>) {
        let topology = built(vec![area(0.5, 0.5, 1.0)]);
        let mut set = CentroidSet::from_areas(&topology);
        let multi = Geometry::MultiPolygon(geo::MultiPolygon(vec![unit_square.clone(), unit_square]));
        set.assign_geometry(&multi, CategoryPair::new(1, 3), 0.0);
        assert_eq!(set.centroids()[0].cats, vec![CategoryPair::new(1, 3)]);
    }
}
