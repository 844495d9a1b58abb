//! Command-line interface for importing layered vector datasets.
#![forbid(unsafe_code)]

use std::io::Write;

use clap::{Parser, Subcommand};

mod error;
mod import;
mod layers;

pub use error::CliError;
use import::{ImportArgs, run_import_command};
use layers::{LayersArgs, run_layers_command};

pub(crate) const ARG_INPUT: &str = "input";
pub(crate) const ARG_DATABASE: &str = "database";
pub(crate) const ARG_SPATIAL: &str = "spatial";
pub(crate) const ARG_REGION: &str = "region";
pub(crate) const ARG_TARGET_PROJECTION: &str = "target-projection";
pub(crate) const ENV_IMPORT_INPUT: &str = "POLYIMPORT_CMDS_IMPORT_INPUT";
pub(crate) const ENV_IMPORT_DATABASE: &str = "POLYIMPORT_CMDS_IMPORT_DATABASE";
pub(crate) const ENV_LAYERS_INPUT: &str = "POLYIMPORT_CMDS_LAYERS_INPUT";

/// Run the polyimport CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns a [`CliError`] describing the first failure.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    run_with(cli, &mut stdout)
}

fn run_with(cli: Cli, writer: &mut dyn Write) -> Result<(), CliError> {
    match cli.command {
        Command::Import(args) => run_import_command(args, writer),
        Command::Layers(args) => run_layers_command(args, writer),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "polyimport",
    about = "Import layered vector data into a cleaned planar topology",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import a dataset into an SQLite attribute database.
    Import(ImportArgs),
    /// List the layers of a dataset.
    Layers(LayersArgs),
}

#[cfg(test)]
mod tests;
