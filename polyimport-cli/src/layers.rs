//! `layers` command: list the layers of a dataset.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use polyimport_core::FeatureSource;
use polyimport_data::JsonDataset;
use serde::{Deserialize, Serialize};

use crate::import::require_existing;
use crate::{ARG_INPUT, CliError, ENV_LAYERS_INPUT};

/// CLI arguments for the `layers` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(name = "layers", about = "List the layers of a dataset")]
#[ortho_config(prefix = "POLYIMPORT")]
pub(crate) struct LayersArgs {
    /// Path to the JSON dataset document.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) input: Option<Utf8PathBuf>,
}

pub(crate) fn run_layers_command(args: LayersArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let input = merged.input.ok_or(CliError::MissingArgument {
        field: ARG_INPUT,
        env: ENV_LAYERS_INPUT,
    })?;
    list_layers(&input, writer)
}

/// Write one line per layer: its name and feature count.
pub(crate) fn list_layers(input: &Utf8Path, writer: &mut dyn Write) -> Result<(), CliError> {
    require_existing(input, ARG_INPUT)?;
    let dataset = JsonDataset::open(input).map_err(|source| CliError::OpenDataset {
        path: input.to_path_buf(),
        source,
    })?;
    for index in 0..dataset.layer_count() {
        let Some(layer) = dataset.layer(index) else {
            continue;
        };
        let count = dataset.feature_count(index).unwrap_or_default();
        writeln!(writer, "{}\t{count}", layer.name).map_err(CliError::WriteOutput)?;
    }
    Ok(())
}
