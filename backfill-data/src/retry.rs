//! Replaying quarantined items until the quarantine drains or stabilises.

use std::num::NonZeroUsize;

use backfill_core::{
    BatchExecutor, DuplicatePolicy, ExecutorConfig, Identified, LogObserver, ProgressObserver,
    RecordSink,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::quarantine::{QuarantineError, QuarantineStore};

/// Result of one retry pass.
#[derive(Debug)]
pub enum RetryOutcome {
    /// No quarantine file was present.
    NothingPending,
    /// The file held an empty array or a non-array value and was removed.
    Discarded,
    /// Every quarantined item was created; the file was removed.
    Drained {
        /// Items created by this pass.
        recovered: usize,
    },
    /// Some items still fail; the file now holds exactly those items.
    Pending {
        /// Items created by this pass.
        recovered: usize,
        /// Items left in the quarantine.
        remaining: usize,
    },
    /// The file is malformed and was left untouched for inspection.
    Unreadable(QuarantineError),
    /// Reading, writing or removing the file failed.
    Failed(QuarantineError),
}

impl RetryOutcome {
    /// Whether nothing is left pending after the pass.
    #[must_use]
    pub const fn is_clear(&self) -> bool {
        matches!(
            self,
            Self::NothingPending | Self::Discarded | Self::Drained { .. }
        )
    }

    /// Items created by the pass.
    #[must_use]
    pub const fn recovered(&self) -> usize {
        match self {
            Self::Drained { recovered } | Self::Pending { recovered, .. } => *recovered,
            _ => 0,
        }
    }

    /// Items still quarantined, or `None` when the quarantine state is unknown.
    #[must_use]
    pub const fn remaining(&self) -> Option<usize> {
        match self {
            Self::NothingPending | Self::Discarded | Self::Drained { .. } => Some(0),
            Self::Pending { remaining, .. } => Some(*remaining),
            Self::Unreadable(_) | Self::Failed(_) => None,
        }
    }
}

/// Replays a quarantine file against a sink.
///
/// The whole quarantine is treated as one batch under the configured
/// concurrency ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RetryOrchestrator {
    executor: BatchExecutor,
    duplicate_policy: DuplicatePolicy,
}

impl Default for RetryOrchestrator {
    fn default() -> Self {
        Self::from_config(ExecutorConfig::default())
    }
}

impl RetryOrchestrator {
    /// Orchestrator with the given concurrency ceiling.
    #[must_use]
    pub const fn new(concurrency: NonZeroUsize) -> Self {
        Self::from_config(ExecutorConfig::unbatched(concurrency))
    }

    /// Orchestrator reusing the ceiling and timeout of `config`, unbatched.
    #[must_use]
    pub const fn from_config(config: ExecutorConfig) -> Self {
        Self {
            executor: BatchExecutor::new(config.to_unbatched()),
            duplicate_policy: DuplicatePolicy::Quarantine,
        }
    }

    /// Choose what happens to items the store reports as duplicates.
    #[must_use]
    pub const fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Replay the quarantine and report whether nothing is left pending.
    ///
    /// Progress is logged through [`LogObserver`].
    pub async fn retry<T, S>(&self, store: &QuarantineStore<T>, sink: &S) -> bool
    where
        T: Identified + Clone + Serialize + DeserializeOwned,
        S: RecordSink<T> + ?Sized,
    {
        self.run(store, sink, &LogObserver::new("retry"))
            .await
            .is_clear()
    }

    /// Replay the quarantine and describe what happened.
    ///
    /// Never panics and never returns an error: every problem is folded into
    /// the outcome and logged.
    pub async fn run<T, S, O>(
        &self,
        store: &QuarantineStore<T>,
        sink: &S,
        observer: &O,
    ) -> RetryOutcome
    where
        T: Identified + Clone + Serialize + DeserializeOwned,
        S: RecordSink<T> + ?Sized,
        O: ProgressObserver<T> + ?Sized,
    {
        let path = store.path();
        match store.exists() {
            Ok(true) => {}
            Ok(false) => {
                log::info!("no quarantine file at {path}; nothing to retry");
                return RetryOutcome::NothingPending;
            }
            Err(err) => {
                log::error!("cannot inspect quarantine file {path}: {err}");
                return RetryOutcome::Failed(err);
            }
        }

        let items = match store.load() {
            Ok(items) if items.is_empty() => return discard(store),
            Ok(items) => items,
            Err(QuarantineError::NotAnArray { .. }) => return discard(store),
            Err(err) if err.is_malformed() => {
                log::warn!("quarantine file {path} is malformed and was left untouched: {err}");
                return RetryOutcome::Unreadable(err);
            }
            Err(err) => {
                log::error!("failed to read quarantine file {path}: {err}");
                return RetryOutcome::Failed(err);
            }
        };

        log::info!("retrying {} quarantined item(s) from {path}", items.len());
        let report = self.executor.run(&items, sink, observer).await;
        let recovered = report.succeeded;
        let (remaining, dropped) = report.into_quarantine(self.duplicate_policy);
        if dropped > 0 {
            log::info!("dropped {dropped} duplicate item(s) from the quarantine");
        }

        if remaining.is_empty() {
            if let Err(err) = store.clear() {
                log::error!("retry drained the quarantine but {path} could not be removed: {err}");
                return RetryOutcome::Failed(err);
            }
            log::info!("all quarantined items recovered; removed {path}");
            return RetryOutcome::Drained { recovered };
        }

        if let Err(err) = store.save(&remaining) {
            log::error!("failed to rewrite quarantine file {path}: {err}");
            return RetryOutcome::Failed(err);
        }
        log::warn!(
            "{} item(s) still failing; quarantine {path} rewritten",
            remaining.len()
        );
        RetryOutcome::Pending {
            recovered,
            remaining: remaining.len(),
        }
    }
}

fn discard<T>(store: &QuarantineStore<T>) -> RetryOutcome {
    let path = store.path();
    match store.clear() {
        Ok(()) => {
            log::info!("quarantine file {path} held no items; removed it");
            RetryOutcome::Discarded
        }
        Err(err) => {
            log::error!("failed to remove empty quarantine file {path}: {err}");
            RetryOutcome::Failed(err)
        }
    }
}
