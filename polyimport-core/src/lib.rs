//! Streaming import of layered vector features into planar topology.
//!
//! The pipeline reads a [`FeatureSource`] through a [`FeatureStream`] in
//! four forward passes. The survey pass counts polygon structure. The schema
//! pass creates attribute tables in an [`AttributeStore`]. The ingestion
//! pass writes primitives into a [`TopologyEngine`] and one attribute row per
//! feature. The final pass cleans the boundaries and links every rebuilt
//! area back to the input polygons that cover it.
//!
//! Collaborators are traits so the pipeline can run against in-memory
//! implementations; see [`test_support`] behind the `test-support` feature.
//!
//! # Examples
//!
//! ```
//! use geo::polygon;
//! use polyimport_core::{
//!     ImportOptions, ImportOutcome, run_import,
//!     test_support::{MemoryAttributeStore, MemorySource, ScriptedArea, ScriptedTopology},
//! };
//!
//! # fn main() -> Result<(), polyimport_core::ImportError> {
//! let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
//! let source = MemorySource::builder().layer("parcels").geometry(1, square).build();
//! let mut topology = ScriptedTopology::with_areas(vec![ScriptedArea {
//!     interior: Some(geo::Coord { x: 0.5, y: 0.5 }),
//!     size: 1.0,
//! }]);
//! let mut store = MemoryAttributeStore::default();
//!
//! let outcome = run_import(source, &mut topology, &mut store, &ImportOptions::new("parcels"))?;
//! let ImportOutcome::Imported(report) = outcome else { unreachable!() };
//! assert_eq!(report.n_polygons, 1);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod crs;
mod extent;
mod feature;
mod filter;
pub mod geometry;
mod options;
pub mod pipeline;
mod source;
mod store;
mod stream;
#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
pub mod test_support;
mod topology;

pub use crs::{
    LayerCrs, ProjectionError, ProjectionInfo, ProjectionVerdict, check_layer_projections,
    check_target_projection,
};
pub use extent::Extent;
pub use feature::{Feature, FieldDefn, FieldType, FieldValue, LayerInfo, SourceGeometry};
pub use filter::{FilterError, LayerExtent, SpatialFilters, build_spatial_filters};
pub use options::{DEFAULT_MIN_AREA, ImportOptions, TypeOverrides, is_legal_name};
pub use pipeline::{
    CleanReport, ConfigError, ImportError, ImportOutcome, ImportReport, LayerReport, SnapAdvice,
    run_import,
};
pub use source::{AccessMode, FeatureSource, SourceError, SourceRecord};
pub use store::{
    AttributeStore, AttributeValue, ColumnDefn, ColumnType, StoreError, TableSchema,
};
pub use stream::{FeatureStream, StreamItem};
pub use topology::{CategoryPair, Primitive, PrimitiveKind, TopologyEngine};
