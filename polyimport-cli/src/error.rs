//! Error types emitted by the polyimport CLI.

use std::sync::Arc;

use camino::Utf8PathBuf;
use polyimport_core::ImportError;
use polyimport_data::{DatasetError, SqliteStoreError};
use thiserror::Error;

/// Errors emitted by the polyimport CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectPath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The output database exists and overwriting was not requested.
    #[error("output database {path:?} exists (pass --overwrite to replace it)")]
    OutputExists { path: Utf8PathBuf },
    /// Removing an existing output database failed.
    #[error("failed to remove existing output {path:?}: {source}")]
    RemoveOutput {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An extent option is not four comma-separated numbers.
    #[error("{field} must be xmin,ymin,xmax,ymax, got {value:?}")]
    InvalidExtent { field: &'static str, value: String },
    /// Loading the input dataset failed.
    #[error("failed to load dataset {path:?}: {source}")]
    OpenDataset {
        path: Utf8PathBuf,
        #[source]
        source: DatasetError,
    },
    /// Reading the target projection file failed.
    #[error("failed to read target projection {path:?}: {source}")]
    ReadProjection {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The target projection file is not a projection definition.
    #[error("failed to parse target projection {path:?}: {source}")]
    ParseProjection {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Opening the output database failed.
    #[error("failed to open output database {path:?}: {source}")]
    OpenStore {
        path: Utf8PathBuf,
        #[source]
        source: SqliteStoreError,
    },
    /// The import pipeline failed.
    #[error("import failed: {0}")]
    Import(#[from] ImportError),
    /// Writing the final primitives failed.
    #[error("failed to persist primitives into {path:?}: {source}")]
    PersistPrimitives {
        path: Utf8PathBuf,
        #[source]
        source: SqliteStoreError,
    },
    /// Serializing the import report failed.
    #[error("failed to serialize import report: {0}")]
    SerializeReport(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
