//! Retry command: replay the quarantine file against the record store.

use std::{io::Write, num::NonZeroUsize, time::Duration};

use backfill_core::{
    DEFAULT_CONCURRENCY, DuplicatePolicy, ExecutorConfig, ExecutorConfigError, LogObserver,
    Record,
};
use backfill_data::{
    DEFAULT_QUARANTINE_PATH, QuarantineStore, RetryOrchestrator, RetryOutcome, SqliteRecordStore,
};
use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_CONCURRENCY, ARG_DATABASE, ARG_ITEM_TIMEOUT_SECS, ARG_QUARANTINE, ARG_SKIP_DUPLICATES,
    CliError, ENV_RETRY_DATABASE, runtime, write_json,
};

/// CLI arguments for the `retry` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Load the quarantine file, attempt every item once under \
                 the concurrency ceiling, then remove the file when all \
                 items succeed or rewrite it with the survivors.",
    about = "Replay quarantined records"
)]
#[ortho_config(prefix = "BACKFILL")]
pub(crate) struct RetryArgs {
    /// Path to the SQLite record store.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Path to the quarantine file (default `faildata/failed_records.json`).
    #[arg(long = ARG_QUARANTINE, value_name = "path")]
    #[serde(default)]
    pub(crate) quarantine: Option<Utf8PathBuf>,
    /// Maximum simultaneous inserts (default 10).
    #[arg(long = ARG_CONCURRENCY, value_name = "count")]
    #[serde(default)]
    pub(crate) concurrency: Option<usize>,
    /// Fail any insert that takes longer than this many seconds.
    ///
    /// An abandoned insert may still commit; pair with `--skip-duplicates`.
    #[arg(long = ARG_ITEM_TIMEOUT_SECS, value_name = "seconds")]
    #[serde(default)]
    pub(crate) item_timeout_secs: Option<u64>,
    /// Drop records the store reports as duplicates instead of keeping them quarantined.
    #[arg(
        long = ARG_SKIP_DUPLICATES,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "bool"
    )]
    #[serde(default)]
    pub(crate) skip_duplicates: Option<bool>,
}

impl RetryArgs {
    pub(crate) fn into_config(self) -> Result<RetryConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        RetryConfig::try_from(merged)
    }
}

/// Resolved `retry` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RetryConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) quarantine: Utf8PathBuf,
    pub(crate) executor: ExecutorConfig,
    pub(crate) duplicate_policy: DuplicatePolicy,
}

impl RetryConfig {
    const fn orchestrator(&self) -> RetryOrchestrator {
        RetryOrchestrator::from_config(self.executor).with_duplicate_policy(self.duplicate_policy)
    }
}

impl TryFrom<RetryArgs> for RetryConfig {
    type Error = CliError;

    fn try_from(args: RetryArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_RETRY_DATABASE,
        })?;
        let quarantine = args
            .quarantine
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_QUARANTINE_PATH));
        let concurrency = NonZeroUsize::new(args.concurrency.unwrap_or(DEFAULT_CONCURRENCY))
            .ok_or(ExecutorConfigError::ZeroConcurrency)?;
        let mut executor = ExecutorConfig::unbatched(concurrency);
        if let Some(seconds) = args.item_timeout_secs {
            executor = executor.with_item_timeout(Duration::from_secs(seconds));
        }
        let duplicate_policy = if args.skip_duplicates.unwrap_or(false) {
            DuplicatePolicy::Skip
        } else {
            DuplicatePolicy::Quarantine
        };
        Ok(Self {
            database,
            quarantine,
            executor,
            duplicate_policy,
        })
    }
}

/// JSON view of a [`RetryOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RetrySummary {
    pub(crate) status: String,
    pub(crate) recovered: usize,
    pub(crate) remaining: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl From<&RetryOutcome> for RetrySummary {
    fn from(outcome: &RetryOutcome) -> Self {
        let (status, error) = match outcome {
            RetryOutcome::NothingPending => ("nothing-pending", None),
            RetryOutcome::Discarded => ("discarded", None),
            RetryOutcome::Drained { .. } => ("drained", None),
            RetryOutcome::Pending { .. } => ("pending", None),
            RetryOutcome::Unreadable(err) => ("unreadable", Some(err.to_string())),
            RetryOutcome::Failed(err) => ("failed", Some(err.to_string())),
        };
        Self {
            status: status.to_owned(),
            recovered: outcome.recovered(),
            remaining: outcome.remaining(),
            error,
        }
    }
}

pub(super) fn run_retry(args: RetryArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_retry_with(args, &mut stdout)
}

pub(super) fn run_retry_with(args: RetryArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let store = SqliteRecordStore::open(&config.database)?;
    let quarantine = QuarantineStore::<Record>::new(config.quarantine.clone());
    let observer = LogObserver::new("retry");
    let outcome = runtime()?.block_on(config.orchestrator().run(&quarantine, &store, &observer));
    if !outcome.is_clear() {
        log::warn!("quarantine at {} still needs attention", config.quarantine);
    }
    write_json(writer, &RetrySummary::from(&outcome))
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<RetryConfig, CliError> {
    let merged = RetryArgs::merge_from_layers(layers).map_err(CliError::from)?;
    RetryConfig::try_from(merged)
}
