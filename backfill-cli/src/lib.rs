//! Command-line interface for the Backfill ingestion engine.
#![forbid(unsafe_code)]

use std::io::Write;

use camino::Utf8Path;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::runtime::Runtime;

mod error;
mod logging;
mod retry;
mod seed;
mod show;

pub use error::CliError;

use retry::{RetryArgs, run_retry};
use seed::{SeedArgs, run_seed};
use show::{ShowArgs, run_show};

pub(crate) const ARG_DATASET: &str = "dataset";
pub(crate) const ARG_DATABASE: &str = "database";
pub(crate) const ARG_QUARANTINE: &str = "quarantine";
pub(crate) const ARG_BATCH_SIZE: &str = "batch-size";
pub(crate) const ARG_CONCURRENCY: &str = "concurrency";
pub(crate) const ARG_ITEM_TIMEOUT_SECS: &str = "item-timeout-secs";
pub(crate) const ARG_SKIP_DUPLICATES: &str = "skip-duplicates";
pub(crate) const ARG_RECORD_ID: &str = "id";
pub(crate) const ENV_SEED_DATASET: &str = "BACKFILL_CMDS_SEED_DATASET";
pub(crate) const ENV_SEED_DATABASE: &str = "BACKFILL_CMDS_SEED_DATABASE";
pub(crate) const ENV_RETRY_DATABASE: &str = "BACKFILL_CMDS_RETRY_DATABASE";
pub(crate) const ENV_SHOW_DATABASE: &str = "BACKFILL_CMDS_SHOW_DATABASE";
pub(crate) const ENV_SHOW_ID: &str = "BACKFILL_CMDS_SHOW_ID";

/// Run the Backfill CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    logging::init_tracing();
    match cli.command {
        Command::Seed(args) => run_seed(args),
        Command::Retry(args) => run_retry(args),
        Command::Show(args) => run_show(args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "backfill",
    about = "Bulk-load JSON datasets into a record store with quarantine and replay",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a dataset, insert new records and replay failures.
    Seed(SeedArgs),
    /// Replay the quarantine file against the store.
    Retry(RetryArgs),
    /// Print a stored record as JSON.
    Show(ShowArgs),
}

/// Build the runtime that drives async store calls for one command.
pub(crate) fn runtime() -> Result<Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

/// Fail unless `path` names an existing regular file.
pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match backfill_fs::file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write `value` as pretty-printed JSON followed by a newline.
pub(crate) fn write_json<T: Serialize + ?Sized>(
    writer: &mut dyn Write,
    value: &T,
) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(value).map_err(CliError::SerialiseOutput)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
mod tests;
