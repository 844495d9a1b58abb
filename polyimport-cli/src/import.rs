//! Import command implementation for the polyimport CLI.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use polyimport_core::{
    Extent, ImportOptions, ImportOutcome, ProjectionInfo, ProjectionVerdict, TopologyEngine,
    TypeOverrides, run_import,
};
use polyimport_data::{JsonDataset, SqliteAttributeStore};
use polyimport_topology::PlanarTopology;
use serde::{Deserialize, Serialize};

use crate::{
    ARG_DATABASE, ARG_INPUT, ARG_REGION, ARG_SPATIAL, ARG_TARGET_PROJECTION, CliError,
    ENV_IMPORT_DATABASE, ENV_IMPORT_INPUT,
};

/// CLI arguments for the `import` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "import",
    long_about = "Import the layers of a JSON dataset. Polygons are broken into \
                 boundaries, cleaned into a planar topology and re-linked to \
                 their attribute rows through one centroid per area. Attribute \
                 tables and the final primitives are written to an SQLite \
                 database. Options can come from CLI flags, configuration \
                 files, or environment variables.",
    about = "Import a dataset into an SQLite attribute database"
)]
#[ortho_config(prefix = "POLYIMPORT")]
pub(crate) struct ImportArgs {
    /// Path to the JSON dataset document.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) input: Option<Utf8PathBuf>,
    /// SQLite database receiving attribute tables and primitives.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Output name; defaults to the input file stem.
    #[arg(long, value_name = "name")]
    #[serde(default)]
    pub(crate) output: Option<String>,
    /// Layer to import; repeat for several. Every layer when omitted.
    #[arg(long = "layer", value_name = "name")]
    #[serde(default)]
    pub(crate) layers: Option<Vec<String>>,
    /// Import only features intersecting this rectangle.
    #[arg(long = ARG_SPATIAL, value_name = "xmin,ymin,xmax,ymax")]
    #[serde(default)]
    pub(crate) spatial: Option<String>,
    /// Current region, used with `--limit-to-region`.
    #[arg(long = ARG_REGION, value_name = "xmin,ymin,xmax,ymax")]
    #[serde(default)]
    pub(crate) region: Option<String>,
    /// Import only features intersecting the current region.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) limit_to_region: bool,
    /// Attribute filter, e.g. `zone = 'R1' AND area > 10`.
    #[arg(long = "where", value_name = "expression")]
    #[serde(default)]
    pub(crate) where_clause: Option<String>,
    /// Rings smaller than this area are dropped.
    #[arg(long, value_name = "area")]
    #[serde(default)]
    pub(crate) min_area: Option<f64>,
    /// Snap boundary vertices closer than this distance.
    #[arg(long, value_name = "threshold")]
    #[serde(default)]
    pub(crate) snap: Option<f64>,
    /// Integer or feature id column providing categories.
    #[arg(long, value_name = "column")]
    #[serde(default)]
    pub(crate) key: Option<String>,
    /// Replacement column names; the first renames the key column.
    #[arg(long, value_name = "names", value_delimiter = ',')]
    #[serde(default)]
    pub(crate) columns: Option<Vec<String>>,
    /// Lower-case every column name.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) lowercase: bool,
    /// Use only this geometry field.
    #[arg(long, value_name = "name")]
    #[serde(default)]
    pub(crate) geometry_column: Option<String>,
    /// Skip topology cleaning.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) no_clean: bool,
    /// Drop the third dimension.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) force_2d: bool,
    /// Write no attribute tables.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) no_table: bool,
    /// Downgrade projection problems to warnings.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) override_projection: bool,
    /// Stop after checking the projection.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) check_projection: bool,
    /// Replace an existing output database.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) overwrite: bool,
    /// Write area centroids as points.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) centroids_as_points: bool,
    /// Write polygon rings as lines.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) boundaries_as_lines: bool,
    /// Write input lines as boundaries.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) lines_as_boundaries: bool,
    /// Write input points as centroids.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) points_as_centroids: bool,
    /// JSON projection definition of the target.
    #[arg(long = ARG_TARGET_PROJECTION, value_name = "path")]
    #[serde(default)]
    pub(crate) target_projection: Option<Utf8PathBuf>,
    /// Stop the boundary cleaning loop after this many rounds.
    #[arg(long, value_name = "rounds")]
    #[serde(default)]
    pub(crate) max_clean_iterations: Option<usize>,
}

impl ImportArgs {
    pub(crate) fn into_config(self) -> Result<ImportConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ImportConfig::try_from(merged)
    }
}

/// Resolved `import` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ImportConfig {
    /// Path to the dataset document.
    pub(crate) input: Utf8PathBuf,
    /// Path to the output SQLite database.
    pub(crate) database: Utf8PathBuf,
    /// Optional path to the target projection definition.
    pub(crate) target_projection: Option<Utf8PathBuf>,
    /// Whether an existing database may be replaced.
    pub(crate) overwrite: bool,
    /// Pipeline options; `target_projection` is filled in when loaded.
    pub(crate) options: ImportOptions,
}

impl ImportConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.input, ARG_INPUT)?;
        if let Some(path) = &self.target_projection {
            require_existing(path, ARG_TARGET_PROJECTION)?;
        }
        if self.options.check_projection_only {
            return Ok(());
        }
        match polyimport_fs::file_is_file(&self.database) {
            Ok(true) if !self.overwrite => Err(CliError::OutputExists {
                path: self.database.clone(),
            }),
            Ok(false) => Err(CliError::SourcePathNotFile {
                field: ARG_DATABASE,
                path: self.database.clone(),
            }),
            Ok(true) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CliError::InspectPath {
                field: ARG_DATABASE,
                path: self.database.clone(),
                source,
            }),
        }
    }
}

pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match polyimport_fs::file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            })
        }
        Err(source) => Err(CliError::InspectPath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse `xmin,ymin,xmax,ymax`.
pub(crate) fn parse_extent(field: &'static str, value: &str) -> Result<Extent, CliError> {
    let invalid = || CliError::InvalidExtent {
        field,
        value: value.to_owned(),
    };
    let numbers = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    let [xmin, ymin, xmax, ymax] = numbers.as_slice() else {
        return Err(invalid());
    };
    Ok(Extent::new(*xmin, *ymin, *xmax, *ymax))
}

impl TryFrom<ImportArgs> for ImportConfig {
    type Error = CliError;

    fn try_from(args: ImportArgs) -> Result<Self, Self::Error> {
        let input = args.input.ok_or(CliError::MissingArgument {
            field: ARG_INPUT,
            env: ENV_IMPORT_INPUT,
        })?;
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_IMPORT_DATABASE,
        })?;
        let output = args
            .output
            .or_else(|| input.file_stem().map(str::to_owned))
            .unwrap_or_default();

        let mut options = ImportOptions::new(output);
        options.layers = args.layers.unwrap_or_default();
        options.spatial = args
            .spatial
            .as_deref()
            .map(|value| parse_extent(ARG_SPATIAL, value))
            .transpose()?;
        options.viewport = args
            .region
            .as_deref()
            .map(|value| parse_extent(ARG_REGION, value))
            .transpose()?;
        options.use_viewport = args.limit_to_region;
        options.attribute_filter = args.where_clause;
        if let Some(min_area) = args.min_area {
            options.min_area = min_area;
        }
        options.snap = args.snap;
        options.types = TypeOverrides {
            centroids_as_points: args.centroids_as_points,
            boundaries_as_lines: args.boundaries_as_lines,
            lines_as_boundaries: args.lines_as_boundaries,
            points_as_centroids: args.points_as_centroids,
        };
        options.key_column = args.key;
        options.column_names = args.columns.unwrap_or_default();
        options.lowercase_columns = args.lowercase;
        options.geometry_column = args.geometry_column;
        options.no_clean = args.no_clean;
        options.force_2d = args.force_2d;
        options.no_table = args.no_table;
        options.override_projection = args.override_projection;
        options.check_projection_only = args.check_projection;
        options.max_clean_iterations = args.max_clean_iterations;

        Ok(Self {
            input,
            database,
            target_projection: args.target_projection,
            overwrite: args.overwrite,
            options,
        })
    }
}

/// Loads a JSON-encoded [`ProjectionInfo`] from disk.
pub(crate) fn load_projection(path: &Utf8Path) -> Result<ProjectionInfo, CliError> {
    let text = polyimport_fs::read_text(path).map_err(|source| CliError::ReadProjection {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::ParseProjection {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn run_import_command(args: ImportArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    execute_import(config, writer)
}

pub(crate) fn execute_import(
    mut config: ImportConfig,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    config.validate_sources()?;
    if let Some(path) = &config.target_projection {
        config.options.target_projection = Some(load_projection(path)?);
    }
    let dataset = JsonDataset::open(&config.input).map_err(|source| CliError::OpenDataset {
        path: config.input.clone(),
        source,
    })?;

    if config.options.check_projection_only {
        let mut store = SqliteAttributeStore::in_memory().map_err(|source| {
            CliError::OpenStore {
                path: Utf8PathBuf::from(":memory:"),
                source,
            }
        })?;
        let outcome = run_import(
            dataset,
            &mut PlanarTopology::default(),
            &mut store,
            &config.options,
        )?;
        return write_outcome(writer, &outcome);
    }

    if config.overwrite
        && polyimport_fs::remove_file_if_present(&config.database).map_err(|source| {
            CliError::RemoveOutput {
                path: config.database.clone(),
                source,
            }
        })?
    {
        info!("Removed existing output database {}", config.database);
    }
    let mut store =
        SqliteAttributeStore::open(&config.database).map_err(|source| CliError::OpenStore {
            path: config.database.clone(),
            source,
        })?;
    let mut topology = PlanarTopology::default();
    let outcome = run_import(dataset, &mut topology, &mut store, &config.options)?;
    let table = format!("{}_primitives", config.options.output);
    let written = store
        .persist_primitives(&table, &topology.primitives())
        .map_err(|source| CliError::PersistPrimitives {
            path: config.database.clone(),
            source,
        })?;
    info!("Wrote {written} primitives to table <{table}>");
    write_outcome(writer, &outcome)
}

fn write_outcome(writer: &mut dyn Write, outcome: &ImportOutcome) -> Result<(), CliError> {
    match outcome {
        ImportOutcome::ProjectionChecked(verdict) => {
            let message = match verdict {
                ProjectionVerdict::Matches => "projection matches the target",
                ProjectionVerdict::Overridden => "projection differences overridden",
            };
            writeln!(writer, "{message}").map_err(CliError::WriteOutput)
        }
        ImportOutcome::Imported(report) => {
            let payload =
                serde_json::to_string_pretty(report).map_err(CliError::SerializeReport)?;
            writer
                .write_all(payload.as_bytes())
                .map_err(CliError::WriteOutput)?;
            writer.write_all(b"\n").map_err(CliError::WriteOutput)
        }
    }
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ImportConfig, CliError> {
    let merged = ImportArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ImportConfig::try_from(merged)
}
