//! Seed command implementation for the Backfill CLI.

use std::{io::Write, time::Duration};

use backfill_core::{
    DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DuplicatePolicy, ExecutorConfig, Record,
};
use backfill_data::{
    DEFAULT_QUARANTINE_PATH, QuarantineStore, SeedOptions, SeedReport, SeedRun, SqliteRecordStore,
};
use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::retry::RetrySummary;
use crate::{
    ARG_BATCH_SIZE, ARG_CONCURRENCY, ARG_DATABASE, ARG_DATASET, ARG_ITEM_TIMEOUT_SECS,
    ARG_QUARANTINE, ARG_SKIP_DUPLICATES, CliError, ENV_SEED_DATABASE, ENV_SEED_DATASET,
    require_existing, runtime, write_json,
};

/// CLI arguments for the `seed` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Read a JSON array of records, skip identities already in \
                 the store, insert the rest in bounded batches, quarantine \
                 failures and replay the quarantine once. Values can come \
                 from CLI flags, configuration files, or environment \
                 variables.",
    about = "Seed the record store from a dataset"
)]
#[ortho_config(prefix = "BACKFILL")]
pub(crate) struct SeedArgs {
    /// Path to the JSON dataset.
    #[arg(long = ARG_DATASET, value_name = "path")]
    #[serde(default)]
    pub(crate) dataset: Option<Utf8PathBuf>,
    /// Path to the SQLite record store.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Path to the quarantine file (default `faildata/failed_records.json`).
    #[arg(long = ARG_QUARANTINE, value_name = "path")]
    #[serde(default)]
    pub(crate) quarantine: Option<Utf8PathBuf>,
    /// Number of records per batch (default 100).
    #[arg(long = ARG_BATCH_SIZE, value_name = "count")]
    #[serde(default)]
    pub(crate) batch_size: Option<usize>,
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
    /// Drop records the store reports as duplicates instead of quarantining them.
    #[arg(
        long = ARG_SKIP_DUPLICATES,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "bool"
    )]
    #[serde(default)]
    pub(crate) skip_duplicates: Option<bool>,
}

impl SeedArgs {
    pub(crate) fn into_config(self) -> Result<SeedConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        SeedConfig::try_from(merged)
    }
}

/// Resolved `seed` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeedConfig {
    pub(crate) dataset: Utf8PathBuf,
    pub(crate) database: Utf8PathBuf,
    pub(crate) quarantine: Utf8PathBuf,
    pub(crate) options: SeedOptions,
}

impl SeedConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.dataset, ARG_DATASET)
    }
}

impl TryFrom<SeedArgs> for SeedConfig {
    type Error = CliError;

    fn try_from(args: SeedArgs) -> Result<Self, Self::Error> {
        let dataset = args.dataset.ok_or(CliError::MissingArgument {
            field: ARG_DATASET,
            env: ENV_SEED_DATASET,
        })?;
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_SEED_DATABASE,
        })?;
        let quarantine = args
            .quarantine
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_QUARANTINE_PATH));

        let mut executor = ExecutorConfig::new(
            args.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            args.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
        )?;
        if let Some(seconds) = args.item_timeout_secs {
            executor = executor.with_item_timeout(Duration::from_secs(seconds));
        }
        let duplicate_policy = if args.skip_duplicates.unwrap_or(false) {
            DuplicatePolicy::Skip
        } else {
            DuplicatePolicy::Quarantine
        };

        Ok(Self {
            dataset,
            database,
            quarantine,
            options: SeedOptions::default()
                .with_executor(executor)
                .with_duplicate_policy(duplicate_policy),
        })
    }
}

/// JSON summary printed once a seed run finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SeedSummary {
    pub(crate) read: usize,
    pub(crate) skipped_existing: usize,
    pub(crate) attempted: usize,
    pub(crate) inserted: usize,
    pub(crate) failed: usize,
    pub(crate) duplicates_skipped: usize,
    pub(crate) quarantined: usize,
    pub(crate) retry: RetrySummary,
}

impl From<&SeedReport> for SeedSummary {
    fn from(report: &SeedReport) -> Self {
        Self {
            read: report.read,
            skipped_existing: report.skipped_existing,
            attempted: report.attempted,
            inserted: report.inserted,
            failed: report.failed,
            duplicates_skipped: report.duplicates_skipped,
            quarantined: report.quarantined,
            retry: RetrySummary::from(&report.retry),
        }
    }
}

pub(super) fn run_seed(args: SeedArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_seed_with(args, &mut stdout)
}

pub(super) fn run_seed_with(args: SeedArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = resolve_seed_config(args)?;
    let report = execute_seed(&config)?;
    write_json(writer, &SeedSummary::from(&report))
}

fn resolve_seed_config(args: SeedArgs) -> Result<SeedConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

fn execute_seed(config: &SeedConfig) -> Result<SeedReport, CliError> {
    if config.options.executor.item_timeout().is_some()
        && config.options.duplicate_policy == DuplicatePolicy::Quarantine
    {
        log::warn!(
            "item timeout set without --{ARG_SKIP_DUPLICATES}; \
             timed-out inserts that committed will stay quarantined as duplicates"
        );
    }
    let store = SqliteRecordStore::open(&config.database)?;
    let run = SeedRun::<Record>::new(QuarantineStore::new(config.quarantine.clone()))
        .with_options(config.options);
    let report = runtime()?.block_on(run.execute(&config.dataset, &store))?;
    let still_failing = report
        .still_failing()
        .map_or_else(|| "unknown".to_owned(), |count| count.to_string());
    log::info!(
        "seed finished: {} read, {} inserted, {} failed, {} recovered, {still_failing} still failing",
        report.read,
        report.inserted,
        report.failed,
        report.recovered()
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<SeedConfig, CliError> {
    let merged = SeedArgs::merge_from_layers(layers).map_err(CliError::from)?;
    SeedConfig::try_from(merged)
}
