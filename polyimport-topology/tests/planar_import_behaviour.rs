//! Behavioural tests running the full import against the planar topology.

use std::cell::RefCell;

use geo::{Polygon, polygon};
use polyimport_core::test_support::{MemoryAttributeStore, MemorySource};
use polyimport_core::{
    CategoryPair, CleanReport, ImportOptions, ImportOutcome, PrimitiveKind, TopologyEngine,
    run_import,
};
use polyimport_topology::PlanarTopology;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

#[derive(Default)]
struct PlanarWorld {
    polygons: RefCell<Vec<Polygon<f64>>>,
    topology: RefCell<PlanarTopology>,
    cleaning: RefCell<Option<CleanReport>>,
}

#[fixture]
fn world() -> PlanarWorld {
    PlanarWorld::default()
}

fn square(x: f64, y: f64, side: f64) -> Polygon<f64> {
    polygon![
        (x: x, y: y), (x: x + side, y: y), (x: x + side, y: y + side), (x: x, y: y + side)
    ]
}

#[given("two identical unit squares in one layer")]
fn given_identical(world: &PlanarWorld) {
    world.polygons.replace(vec![square(0.0, 0.0, 1.0), square(0.0, 0.0, 1.0)]);
}

#[given("two squares overlapping in one corner")]
fn given_corner_overlap(world: &PlanarWorld) {
    world.polygons.replace(vec![square(0.0, 0.0, 2.0), square(1.0, 1.0, 2.0)]);
}

#[given("a square with a square hole and a square filling the hole")]
fn given_hole(world: &PlanarWorld) {
    let framed = polygon!(
        exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
        interiors: [[(x: 4.0, y: 4.0), (x: 6.0, y: 4.0), (x: 6.0, y: 6.0), (x: 4.0, y: 6.0)]],
    );
    world.polygons.replace(vec![framed, square(4.0, 4.0, 2.0)]);
}

#[when("the layer is imported into a planar topology")]
fn when_imported(world: &PlanarWorld) {
    let mut builder = MemorySource::builder().layer("parcels");
    for (fid, polygon) in world.polygons.borrow().iter().enumerate() {
        let fid = i64::try_from(fid).expect("small fid") + 1;
        builder = builder.geometry(fid, polygon.clone());
    }
    let mut store = MemoryAttributeStore::default();
    let mut topology = world.topology.borrow_mut();
    let outcome = run_import(
        builder.build(),
        &mut *topology,
        &mut store,
        &ImportOptions::new("parcels"),
    )
    .expect("import succeeds");
    let ImportOutcome::Imported(report) = outcome else {
        panic!("expected a full import");
    };
    world.cleaning.replace(report.cleaning);
}

fn cleaning(world: &PlanarWorld) -> CleanReport {
    world.cleaning.borrow().expect("cleaning ran")
}

#[then("1 area is built")]
fn then_one_area(world: &PlanarWorld) {
    assert_eq!(world.topology.borrow().area_count(), 1);
}

#[then("3 areas are built")]
fn then_three_areas(world: &PlanarWorld) {
    assert_eq!(world.topology.borrow().area_count(), 3);
}

#[then("2 areas are built")]
fn then_two_areas(world: &PlanarWorld) {
    assert_eq!(world.topology.borrow().area_count(), 2);
}

#[then("the area centroid lists categories 1 and 2 with overlap count 2")]
fn then_overlap_categories(world: &PlanarWorld) {
    let centroids: Vec<_> = world
        .topology
        .borrow()
        .primitives()
        .into_iter()
        .filter(|primitive| primitive.kind == PrimitiveKind::Centroid)
        .collect();
    assert_eq!(centroids.len(), 1);
    assert_eq!(
        centroids[0].cats,
        vec![
            CategoryPair::new(1, 1),
            CategoryPair::new(1, 2),
            CategoryPair::new(2, 2),
        ]
    );
    assert!((cleaning(world).overlap_area - 1.0).abs() < 1e-9);
}

#[then("one area is an overlap of size 1")]
fn then_corner_overlap(world: &PlanarWorld) {
    let report = cleaning(world);
    assert_eq!(report.n_overlaps, 1);
    assert!((report.overlap_area - 1.0).abs() < 1e-9);
    assert!((report.total_area - 7.0).abs() < 1e-9);
}

#[then("no area is uncategorised")]
fn then_no_gaps(world: &PlanarWorld) {
    let report = cleaning(world);
    assert_eq!(report.n_nocat, 0);
    assert_eq!(report.n_overlaps, 0);
    assert!((report.total_area - 100.0).abs() < 1e-9);
}

#[scenario(path = "tests/features/planar_import.feature", index = 0)]
fn identical_squares(world: PlanarWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/planar_import.feature", index = 1)]
fn corner_overlap(world: PlanarWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/planar_import.feature", index = 2)]
fn filled_hole(world: PlanarWorld) {
    let _ = world;
}
