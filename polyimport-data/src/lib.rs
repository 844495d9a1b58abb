//! Concrete collaborators for the polyimport pipeline.
//!
//! Responsibilities:
//! - Read layered vector datasets from JSON documents with GeoJSON
//!   geometries ([`JsonDataset`]).
//! - Persist attribute tables and final primitives to SQLite
//!   ([`SqliteAttributeStore`]).
//!
//! Boundaries:
//! - No import rules live here; the pipeline in `polyimport-core` decides
//!   what gets read and written.

mod dataset;
mod sqlite;

pub use dataset::{DatasetError, GeometryError, JsonDataset, WhereClause, WhereError};
pub use sqlite::{SqliteAttributeStore, SqliteStoreError};
