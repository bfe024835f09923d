//! Test-only, in-memory sink and observer used by unit and behaviour tests.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    Identified,
    progress::{ProgressEvent, ProgressObserver},
    sink::{CreateError, IdentityQueryError, IdentitySource, RecordSink},
};

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Start or end of a create call, as seen by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallMark<Id> {
    /// `create` was entered for this identity.
    Started(Id),
    /// `create` returned for this identity.
    Finished(Id),
}

/// Instrumented in-memory store.
///
/// Items are kept in creation order. The sink records every call, tracks how
/// many calls are in flight, and can be told to fail or stall selected
/// identities. Without a configured delay each call yields once so sibling
/// calls get a chance to overlap.
#[derive(Debug)]
pub struct MemorySink<T: Identified> {
    stored: Mutex<Vec<T>>,
    failing: Mutex<HashSet<T::Id>>,
    stalled: Mutex<HashSet<T::Id>>,
    calls: Mutex<Vec<T::Id>>,
    journal: Mutex<Vec<CallMark<T::Id>>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    delay: Option<Duration>,
    identity_query_fails: AtomicBool,
}

impl<T: Identified> Default for MemorySink<T> {
    fn default() -> Self {
        Self {
            stored: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            stalled: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            journal: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            delay: None,
            identity_query_fails: AtomicBool::new(false),
        }
    }
}

impl<T: Identified + Clone> MemorySink<T> {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that already holds `items`.
    pub fn with_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let sink = Self::default();
        lock(&sink.stored).extend(items);
        sink
    }

    /// Hold every create call for `delay` before it settles.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make subsequent creates of `ids` fail with a store error.
    pub fn fail_on<I>(&self, ids: I)
    where
        I: IntoIterator<Item = T::Id>,
    {
        lock(&self.failing).extend(ids);
    }

    /// Stop failing every identity.
    pub fn heal(&self) {
        lock(&self.failing).clear();
    }

    /// Make subsequent creates of `ids` never settle.
    pub fn stall_on<I>(&self, ids: I)
    where
        I: IntoIterator<Item = T::Id>,
    {
        lock(&self.stalled).extend(ids);
    }

    /// Make [`IdentitySource::existing_ids`] fail.
    pub fn fail_identity_query(&self) {
        self.identity_query_fails.store(true, Ordering::SeqCst);
    }

    /// Items held by the sink, in creation order.
    pub fn stored(&self) -> Vec<T> {
        lock(&self.stored).clone()
    }

    /// Identities held by the sink, in creation order.
    pub fn stored_ids(&self) -> Vec<T::Id> {
        lock(&self.stored)
            .iter()
            .map(|item| item.id().clone())
            .collect()
    }

    /// Identities passed to `create`, in call order.
    pub fn calls(&self) -> Vec<T::Id> {
        lock(&self.calls).clone()
    }

    /// Start and finish marks of every call, in the order they happened.
    pub fn journal(&self) -> Vec<CallMark<T::Id>> {
        lock(&self.journal).clone()
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, id: &T::Id) {
        lock(&self.calls).push(id.clone());
        lock(&self.journal).push(CallMark::Started(id.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self, id: &T::Id) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        lock(&self.journal).push(CallMark::Finished(id.clone()));
    }

    fn settle(&self, item: &T) -> Result<(), CreateError> {
        let id = item.id();
        if lock(&self.failing).contains(id) {
            return Err(CreateError::store(format!("injected failure for {id}")));
        }
        let mut stored = lock(&self.stored);
        if stored.iter().any(|existing| existing.id() == id) {
            return Err(CreateError::Duplicate { id: id.to_string() });
        }
        stored.push(item.clone());
        Ok(())
    }
}

#[async_trait]
impl<T: Identified + Clone> RecordSink<T> for MemorySink<T> {
    async fn create(&self, item: &T) -> Result<(), CreateError> {
        let id = item.id();
        self.enter(id);
        if lock(&self.stalled).contains(id) {
            std::future::pending::<()>().await;
        }
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        let outcome = self.settle(item);
        self.leave(id);
        outcome
    }
}

#[async_trait]
impl<T: Identified + Clone> IdentitySource<T> for MemorySink<T> {
    async fn existing_ids(&self) -> Result<HashSet<T::Id>, IdentityQueryError> {
        if self.identity_query_fails.load(Ordering::SeqCst) {
            return Err(IdentityQueryError::new("identity query unavailable"));
        }
        Ok(self.stored_ids().into_iter().collect())
    }
}

/// Flattened copy of a [`ProgressEvent`] kept by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent<Id> {
    /// See [`ProgressEvent::BatchStarted`].
    BatchStarted {
        /// One-based batch number.
        batch: usize,
        /// Items in the batch.
        size: usize,
    },
    /// See [`ProgressEvent::ItemSucceeded`].
    Succeeded(Id),
    /// See [`ProgressEvent::ItemFailed`].
    Failed(Id),
    /// See [`ProgressEvent::BatchCompleted`].
    BatchCompleted {
        /// One-based batch number.
        batch: usize,
        /// Failures in the batch.
        failures: usize,
    },
}

/// Observer that keeps every event it receives.
#[derive(Debug)]
pub struct RecordingObserver<Id> {
    events: Mutex<Vec<RecordedEvent<Id>>>,
}

impl<Id> Default for RecordingObserver<Id> {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }
}

impl<Id: Clone> RecordingObserver<Id> {
    /// Events received so far.
    pub fn events(&self) -> Vec<RecordedEvent<Id>> {
        lock(&self.events).clone()
    }
}

impl<T: Identified> ProgressObserver<T> for RecordingObserver<T::Id> {
    fn on_event(&self, event: &ProgressEvent<'_, T>) {
        let recorded = match event {
            ProgressEvent::BatchStarted { batch, size, .. } => RecordedEvent::BatchStarted {
                batch: *batch,
                size: *size,
            },
            ProgressEvent::ItemSucceeded { item, .. } => {
                RecordedEvent::Succeeded(item.id().clone())
            }
            ProgressEvent::ItemFailed { item, .. } => RecordedEvent::Failed(item.id().clone()),
            ProgressEvent::BatchCompleted {
                batch, failures, ..
            } => RecordedEvent::BatchCompleted {
                batch: *batch,
                failures: *failures,
            },
        };
        lock(&self.events).push(recorded);
    }
}

/// Drive `future` to completion on a fresh current-thread runtime.
///
/// Behaviour-test steps are synchronous; this lets them call async APIs.
#[expect(
    clippy::expect_used,
    reason = "test helper; a runtime that cannot start is a broken test environment"
)]
pub fn block_on_for_tests<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime should start")
        .block_on(future)
}
