//! Bounded batch execution of per-item create calls.
//!
//! Items are split into consecutive batches. Batches run one after another;
//! inside a batch at most `concurrency` create calls are unresolved at any
//! instant. The executor waits for every call in a batch to settle before it
//! dispatches the next batch, so a crash can only lose the in-flight batch.

use std::{num::NonZeroUsize, pin::pin, time::Duration};

use futures_util::stream::{self, StreamExt};
use thiserror::Error;

use crate::{
    Identified,
    progress::{ProgressEvent, ProgressObserver},
    sink::{CreateError, RecordSink},
};

/// Default number of items per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default ceiling on simultaneous create calls.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Errors returned by [`ExecutorConfig::new`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutorConfigError {
    /// Batches must hold at least one item.
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
    /// At least one create call must be allowed in flight.
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Tuning for a [`BatchExecutor`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use backfill_core::ExecutorConfig;
///
/// # fn main() -> Result<(), backfill_core::ExecutorConfigError> {
/// let config = ExecutorConfig::new(50, 4)?.with_item_timeout(Duration::from_secs(5));
/// assert_eq!(config.batch_size().get(), 50);
/// assert_eq!(config.concurrency().get(), 4);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    batch_size: Option<NonZeroUsize>,
    concurrency: NonZeroUsize,
    item_timeout: Option<Duration>,
}

impl ExecutorConfig {
    /// Validate and construct a batched configuration.
    pub fn new(batch_size: usize, concurrency: usize) -> Result<Self, ExecutorConfigError> {
        let batch_size = NonZeroUsize::new(batch_size).ok_or(ExecutorConfigError::ZeroBatchSize)?;
        let concurrency =
            NonZeroUsize::new(concurrency).ok_or(ExecutorConfigError::ZeroConcurrency)?;
        Ok(Self {
            batch_size: Some(batch_size),
            concurrency,
            item_timeout: None,
        })
    }

    /// Configuration that treats the whole input as a single batch.
    ///
    /// Used for replaying quarantined items, where the set is expected to be
    /// small and only the concurrency ceiling matters.
    #[must_use]
    pub const fn unbatched(concurrency: NonZeroUsize) -> Self {
        Self {
            batch_size: None,
            concurrency,
            item_timeout: None,
        }
    }

    /// Convert any create call that outlives `timeout` into a failure.
    ///
    /// The timeout abandons the call but cannot undo work the store has
    /// already committed. Such an item is reported as
    /// [`CreateError::TimedOut`] yet exists in the store, so replaying it
    /// yields [`CreateError::Duplicate`]. Pair a timeout with
    /// [`DuplicatePolicy::Skip`] to let the replay drop it.
    #[must_use]
    pub const fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = Some(timeout);
        self
    }

    /// Number of items per batch, or the whole input for unbatched runs.
    #[must_use]
    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size.unwrap_or(NonZeroUsize::MAX)
    }

    /// Maximum number of unresolved create calls.
    #[must_use]
    pub const fn concurrency(&self) -> NonZeroUsize {
        self.concurrency
    }

    /// Per-item timeout, if any.
    #[must_use]
    pub const fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout
    }

    /// The same ceiling and timeout without batching.
    #[must_use]
    pub const fn to_unbatched(self) -> Self {
        Self {
            batch_size: None,
            ..self
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(DEFAULT_BATCH_SIZE),
            concurrency: NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN),
            item_timeout: None,
        }
    }
}

/// What to do with items the store rejected as duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Keep duplicates with the other failures so they are replayed.
    #[default]
    Quarantine,
    /// Drop duplicates; the identity is already stored.
    Skip,
}

impl DuplicatePolicy {
    /// Whether a failure with `error` belongs in the quarantine.
    #[must_use]
    pub const fn retains(self, error: &CreateError) -> bool {
        match self {
            Self::Quarantine => true,
            Self::Skip => !error.is_duplicate(),
        }
    }
}

/// An item whose create call failed, with the reason.
#[derive(Debug)]
pub struct Failure<T> {
    /// The item as it was handed to the sink.
    pub item: T,
    /// Why the sink did not persist it.
    pub error: CreateError,
}

/// Outcome of one executor pass.
#[derive(Debug)]
pub struct ExecutionReport<T> {
    /// Number of create calls issued.
    pub attempted: usize,
    /// Number of create calls that succeeded.
    pub succeeded: usize,
    /// Every failed item, in completion order.
    pub failures: Vec<Failure<T>>,
}

impl<T> Default for ExecutionReport<T> {
    fn default() -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
        }
    }
}

impl<T> ExecutionReport<T> {
    /// Number of failed create calls.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Split the failures into quarantine-bound items and a count of items
    /// dropped by `policy`.
    #[must_use]
    pub fn into_quarantine(self, policy: DuplicatePolicy) -> (Vec<T>, usize) {
        let mut retained = Vec::with_capacity(self.failures.len());
        let mut dropped = 0;
        for failure in self.failures {
            if policy.retains(&failure.error) {
                retained.push(failure.item);
            } else {
                dropped += 1;
            }
        }
        (retained, dropped)
    }
}

/// Runs a [`RecordSink`] over a sequence of items in bounded batches.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use backfill_core::{
///     BatchExecutor, CreateError, ExecutorConfig, Record, RecordSink, SilentObserver,
/// };
///
/// struct RejectOdd;
///
/// #[async_trait]
/// impl RecordSink<Record> for RejectOdd {
///     async fn create(&self, item: &Record) -> Result<(), CreateError> {
///         match item.id.to_string().parse::<i64>() {
///             Ok(value) if value % 2 == 1 => Err(CreateError::store("odd")),
///             _ => Ok(()),
///         }
///     }
/// }
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let items: Vec<Record> = (1..=5).map(Record::with_empty_payload).collect();
/// let executor = BatchExecutor::new(ExecutorConfig::new(2, 2)?);
/// let report = tokio::runtime::Builder::new_current_thread()
///     .enable_all()
///     .build()?
///     .block_on(executor.run(&items, &RejectOdd, &SilentObserver));
/// assert_eq!(report.attempted, 5);
/// assert_eq!(report.succeeded, 2);
/// assert_eq!(report.failed(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchExecutor {
    config: ExecutorConfig,
}

impl BatchExecutor {
    /// Construct an executor from explicit configuration.
    #[must_use]
    pub const fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Invoke `sink.create` exactly once per item and collect the failures.
    ///
    /// A failing item never cancels or delays its siblings; failures are only
    /// accumulated. Progress is reported to `observer` as batches start and
    /// finish and as each item settles.
    pub async fn run<T, S, O>(&self, items: &[T], sink: &S, observer: &O) -> ExecutionReport<T>
    where
        T: Identified + Clone,
        S: RecordSink<T> + ?Sized,
        O: ProgressObserver<T> + ?Sized,
    {
        let mut report = ExecutionReport::default();
        if items.is_empty() {
            return report;
        }

        let batch_size = self.config.batch_size().get();
        let total = items.len();
        let total_batches = total.div_ceil(batch_size);
        let mut offset = 0;

        for (index, batch) in items.chunks(batch_size).enumerate() {
            let batch_number = index + 1;
            observer.on_event(&ProgressEvent::BatchStarted {
                batch: batch_number,
                total_batches,
                size: batch.len(),
            });

            let failures_before = report.failures.len();
            self.run_batch(batch, offset, total, sink, observer, &mut report)
                .await;
            offset += batch.len();

            observer.on_event(&ProgressEvent::BatchCompleted {
                batch: batch_number,
                total_batches,
                failures: report.failures.len() - failures_before,
            });
        }

        report
    }

    async fn run_batch<T, S, O>(
        &self,
        batch: &[T],
        offset: usize,
        total: usize,
        sink: &S,
        observer: &O,
        report: &mut ExecutionReport<T>,
    ) where
        T: Identified + Clone,
        S: RecordSink<T> + ?Sized,
        O: ProgressObserver<T> + ?Sized,
    {
        let timeout = self.config.item_timeout();
        let mut settled = pin!(
            stream::iter(batch.iter().enumerate())
                .map(|(index, item)| async move {
                    let outcome = create_within(sink, item, timeout).await;
                    (offset + index + 1, item, outcome)
                })
                .buffer_unordered(self.config.concurrency().get())
        );

        while let Some((position, item, outcome)) = settled.next().await {
            report.attempted += 1;
            match outcome {
                Ok(()) => {
                    report.succeeded += 1;
                    observer.on_event(&ProgressEvent::ItemSucceeded {
                        position,
                        total,
                        item,
                    });
                }
                Err(error) => {
                    observer.on_event(&ProgressEvent::ItemFailed {
                        position,
                        total,
                        item,
                        error: &error,
                    });
                    report.failures.push(Failure {
                        item: item.clone(),
                        error,
                    });
                }
            }
        }
    }
}

async fn create_within<T, S>(
    sink: &S,
    item: &T,
    timeout: Option<Duration>,
) -> Result<(), CreateError>
where
    T: Identified,
    S: RecordSink<T> + ?Sized,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, sink.create(item))
            .await
            .unwrap_or_else(|_| Err(CreateError::TimedOut { timeout: limit })),
        None => sink.create(item).await,
    }
}

#[cfg(test)]
mod tests;
