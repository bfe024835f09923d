//! Progress reporting for executor passes.
//!
//! The executor emits [`ProgressEvent`]s from the single task that drives a
//! batch, so observers never see concurrent calls from the same run.

use crate::{Identified, sink::CreateError};

/// Something that happened during an executor pass.
#[derive(Debug)]
#[non_exhaustive]
pub enum ProgressEvent<'a, T> {
    /// A batch is about to be dispatched.
    BatchStarted {
        /// One-based batch number.
        batch: usize,
        /// Number of batches in the pass.
        total_batches: usize,
        /// Number of items in this batch.
        size: usize,
    },
    /// An item was created.
    ItemSucceeded {
        /// One-based position of the item within the pass.
        position: usize,
        /// Number of items in the pass.
        total: usize,
        /// The created item.
        item: &'a T,
    },
    /// An item's create call failed.
    ItemFailed {
        /// One-based position of the item within the pass.
        position: usize,
        /// Number of items in the pass.
        total: usize,
        /// The failed item.
        item: &'a T,
        /// Why the call failed.
        error: &'a CreateError,
    },
    /// Every call in a batch has settled.
    BatchCompleted {
        /// One-based batch number.
        batch: usize,
        /// Number of batches in the pass.
        total_batches: usize,
        /// Failures recorded in this batch.
        failures: usize,
    },
}

/// Receives [`ProgressEvent`]s from a [`crate::BatchExecutor`].
pub trait ProgressObserver<T>: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &ProgressEvent<'_, T>);
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl<T> ProgressObserver<T> for SilentObserver {
    fn on_event(&self, _event: &ProgressEvent<'_, T>) {}
}

/// Observer that writes events to the `log` facade.
///
/// Successes are logged at `debug`, failures at `warn`, and batch boundaries
/// at `info`.
#[derive(Debug, Clone, Copy)]
pub struct LogObserver {
    label: &'static str,
}

impl LogObserver {
    /// Create an observer whose messages are prefixed with `label`.
    #[must_use]
    pub const fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new("ingest")
    }
}

impl<T: Identified> ProgressObserver<T> for LogObserver {
    fn on_event(&self, event: &ProgressEvent<'_, T>) {
        let label = self.label;
        match event {
            ProgressEvent::BatchStarted {
                batch,
                total_batches,
                size,
            } => log::info!("{label}: batch {batch}/{total_batches} started ({size} items)"),
            ProgressEvent::ItemSucceeded {
                position,
                total,
                item,
            } => log::debug!("{label}: [{position}/{total}] created {}", item.id()),
            ProgressEvent::ItemFailed {
                position,
                total,
                item,
                error,
            } => log::warn!("{label}: [{position}/{total}] failed {}: {error}", item.id()),
            ProgressEvent::BatchCompleted {
                batch,
                total_batches,
                failures,
            } => log::info!(
                "{label}: batch {batch}/{total_batches} completed with {failures} failure(s)"
            ),
        }
    }
}
