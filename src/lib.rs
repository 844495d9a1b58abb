//! Facade crate for the polyimport vector import pipeline.
//!
//! This crate re-exports the core pipeline types and exposes the planar
//! topology engine and the JSON/SQLite collaborators behind feature flags.

#![forbid(unsafe_code)]

pub use polyimport_core::{
    AccessMode, AttributeStore, CategoryPair, Extent, Feature, FeatureSource, FieldDefn,
    FieldType, FieldValue, ImportError, ImportOptions, ImportOutcome, ImportReport, LayerCrs,
    LayerInfo, Primitive, PrimitiveKind, ProjectionInfo, SourceGeometry, TopologyEngine,
    TypeOverrides, run_import,
};

#[cfg(feature = "topology")]
pub use polyimport_topology::PlanarTopology;

#[cfg(feature = "store-sqlite")]
pub use polyimport_data::{JsonDataset, SqliteAttributeStore, SqliteStoreError, WhereClause};
