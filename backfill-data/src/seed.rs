//! The end-to-end seed run.
//!
//! A run reads the dataset once, drops identities the store already holds,
//! creates the remainder in bounded batches, quarantines what failed and
//! finally replays the quarantine against the same sink.

use backfill_core::{
    BatchExecutor, DuplicatePolicy, ExecutorConfig, Identified, IdentityQueryError,
    IdentitySource, LogObserver, ProgressObserver, RecordSink, dedup,
};
use camino::Utf8Path;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    dataset::{DatasetError, load_dataset},
    quarantine::{QuarantineError, QuarantineStore},
    retry::{RetryOrchestrator, RetryOutcome},
};

/// Errors that abort a seed run before any item is created.
#[derive(Debug, Error)]
pub enum SeedError {
    /// The dataset could not be read.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    /// The existing-identity snapshot could not be taken.
    #[error(transparent)]
    ExistingIds(#[from] IdentityQueryError),
}

/// Tuning for a [`SeedRun`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedOptions {
    /// Batch size, concurrency ceiling and per-item timeout.
    pub executor: ExecutorConfig,
    /// Treatment of items the store reports as duplicates.
    pub duplicate_policy: DuplicatePolicy,
}

impl SeedOptions {
    /// Replace the executor configuration.
    #[must_use]
    pub const fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the duplicate policy.
    #[must_use]
    pub const fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }
}

/// Summary of a completed seed run.
#[derive(Debug)]
pub struct SeedReport {
    /// Items read from the dataset.
    pub read: usize,
    /// Items dropped because their identity was already stored or repeated.
    pub skipped_existing: usize,
    /// Create calls issued by the main pass.
    pub attempted: usize,
    /// Items created by the main pass.
    pub inserted: usize,
    /// Items that failed during the main pass.
    pub failed: usize,
    /// Failed items dropped as duplicates under [`DuplicatePolicy::Skip`].
    pub duplicates_skipped: usize,
    /// Items written to the quarantine after the main pass.
    pub quarantined: usize,
    /// Outcome of the retry pass that closes every run.
    pub retry: RetryOutcome,
}

impl SeedReport {
    /// Items created by the retry pass.
    #[must_use]
    pub const fn recovered(&self) -> usize {
        self.retry.recovered()
    }

    /// Items left in the quarantine, or `None` when it could not be read.
    #[must_use]
    pub const fn still_failing(&self) -> Option<usize> {
        self.retry.remaining()
    }
}

#[derive(Debug, Default)]
struct MainPass {
    skipped_existing: usize,
    attempted: usize,
    inserted: usize,
    failed: usize,
    duplicates_skipped: usize,
    quarantined: usize,
    save_error: Option<QuarantineError>,
}

/// Seeds a store from a dataset file.
///
/// # Examples
/// ```no_run
/// use backfill_core::Record;
/// use backfill_data::{QuarantineStore, SeedRun, SqliteRecordStore};
/// use camino::Utf8Path;
///
/// # async fn seed() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SqliteRecordStore::open(Utf8Path::new("records.db"))?;
/// let run = SeedRun::<Record>::new(QuarantineStore::default());
/// let report = run.execute(Utf8Path::new("data/estimates.json"), &store).await?;
/// println!("inserted {} record(s)", report.inserted);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SeedRun<T> {
    options: SeedOptions,
    quarantine: QuarantineStore<T>,
}

impl<T> SeedRun<T>
where
    T: Identified + Clone + Serialize + DeserializeOwned,
{
    /// Create a run with default options that quarantines into `quarantine`.
    pub fn new(quarantine: QuarantineStore<T>) -> Self {
        Self {
            options: SeedOptions::default(),
            quarantine,
        }
    }

    /// Replace the run options.
    #[must_use]
    pub fn with_options(mut self, options: SeedOptions) -> Self {
        self.options = options;
        self
    }

    /// Options in use.
    pub const fn options(&self) -> &SeedOptions {
        &self.options
    }

    /// Quarantine the run writes to.
    pub const fn quarantine(&self) -> &QuarantineStore<T> {
        &self.quarantine
    }

    /// Seed `sink` from the dataset at `dataset`, logging progress.
    pub async fn execute<S>(&self, dataset: &Utf8Path, sink: &S) -> Result<SeedReport, SeedError>
    where
        S: RecordSink<T> + IdentitySource<T> + ?Sized,
    {
        self.execute_with(dataset, sink, &LogObserver::new("seed"))
            .await
    }

    /// Seed `sink` from the dataset at `dataset`, reporting to `observer`.
    ///
    /// Dataset and identity-query errors abort the run before anything is
    /// created. Per-item failures never escape: they are quarantined and
    /// replayed by the closing retry pass, which always runs otherwise.
    /// When the quarantine cannot be written the retry pass is skipped and
    /// the report carries [`RetryOutcome::Failed`].
    pub async fn execute_with<S, O>(
        &self,
        dataset: &Utf8Path,
        sink: &S,
        observer: &O,
    ) -> Result<SeedReport, SeedError>
    where
        S: RecordSink<T> + IdentitySource<T> + ?Sized,
        O: ProgressObserver<T> + ?Sized,
    {
        log::info!("seeding from {dataset}");
        let candidates: Vec<T> = load_dataset(dataset)?;
        let read = candidates.len();

        let pass = if candidates.is_empty() {
            log::warn!("dataset {dataset} holds no items");
            MainPass::default()
        } else {
            log::info!("read {read} item(s) from {dataset}");
            self.main_pass(&candidates, sink, observer).await?
        };

        // Failures that never reached the quarantine are never reported as clear.
        let retry = match pass.save_error {
            Some(err) => {
                log::error!("skipping retry pass; failed items were not quarantined");
                RetryOutcome::Failed(err)
            }
            None => {
                RetryOrchestrator::from_config(self.options.executor)
                    .with_duplicate_policy(self.options.duplicate_policy)
                    .run(&self.quarantine, sink, observer)
                    .await
            }
        };
        match retry.remaining() {
            Some(0) => log::info!("quarantine is clear"),
            Some(remaining) => log::warn!(
                "{remaining} failed item(s) still pending in {}",
                self.quarantine.path()
            ),
            None => log::warn!(
                "still-failing count unknown; inspect {}",
                self.quarantine.path()
            ),
        }

        log::info!(
            "seed run finished: {read} read, {} inserted, {} failed, {} recovered, {} still failing",
            pass.inserted,
            pass.failed,
            retry.recovered(),
            retry
                .remaining()
                .map_or_else(|| "unknown".to_owned(), |count| count.to_string())
        );
        Ok(SeedReport {
            read,
            skipped_existing: pass.skipped_existing,
            attempted: pass.attempted,
            inserted: pass.inserted,
            failed: pass.failed,
            duplicates_skipped: pass.duplicates_skipped,
            quarantined: pass.quarantined,
            retry,
        })
    }

    async fn main_pass<S, O>(
        &self,
        candidates: &[T],
        sink: &S,
        observer: &O,
    ) -> Result<MainPass, SeedError>
    where
        S: RecordSink<T> + IdentitySource<T> + ?Sized,
        O: ProgressObserver<T> + ?Sized,
    {
        let existing = sink.existing_ids().await?;
        let fresh = dedup(candidates, &existing);
        let mut pass = MainPass {
            skipped_existing: candidates.len() - fresh.len(),
            ..MainPass::default()
        };
        log::info!(
            "{} item(s) to insert, {} skipped as already present",
            fresh.len(),
            pass.skipped_existing
        );
        if fresh.is_empty() {
            log::info!("no new items to insert");
            return Ok(pass);
        }

        let report = BatchExecutor::new(self.options.executor)
            .run(&fresh, sink, observer)
            .await;
        pass.attempted = report.attempted;
        pass.inserted = report.succeeded;
        pass.failed = report.failed();

        let (retained, dropped) = report.into_quarantine(self.options.duplicate_policy);
        pass.duplicates_skipped = dropped;
        if dropped > 0 {
            log::info!("skipped {dropped} item(s) already present in the store");
        }
        if retained.is_empty() {
            log::info!("every item was inserted; nothing to quarantine");
            return Ok(pass);
        }

        log::warn!(
            "saving {} failed item(s) to {}",
            retained.len(),
            self.quarantine.path()
        );
        match self.quarantine.save(&retained) {
            Ok(()) => pass.quarantined = retained.len(),
            Err(err) => {
                log::error!("failed to quarantine {} failed item(s): {err}", retained.len());
                pass.save_error = Some(err);
            }
        }
        Ok(pass)
    }
}
