//! Error types emitted by the Backfill CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use backfill_core::{ExecutorConfigError, RecordId};
use backfill_data::{SeedError, StoreError};
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors emitted by the Backfill CLI.
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
    /// A referenced input path does not exist on disk or is not a file.
    #[error("{field} path {path:?} does not exist or is not a file")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Batch size or concurrency was zero.
    #[error("invalid executor settings: {0}")]
    InvalidExecutorConfig(#[from] ExecutorConfigError),
    /// The async runtime could not start.
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Opening or querying the record store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The seed run aborted.
    #[error("seed run aborted: {0}")]
    Seed(#[from] SeedError),
    /// No record with the requested identity is stored.
    #[error("no record with id {id}")]
    RecordNotFound { id: RecordId },
    /// Serialising command output failed.
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
