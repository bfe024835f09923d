//! Storage, quarantine and orchestration for the Backfill ingestion engine.
//!
//! Responsibilities:
//! - Read source datasets from disk.
//! - Persist and replay the quarantine file.
//! - Drive the end-to-end seed run.
//! - Provide a SQLite backing store.
//!
//! Boundaries:
//! - Batching, deduplication and the sink traits live in `backfill-core`.
//! - Keep blocking SQLite calls off async executors.
//!
//! Invariants:
//! - Per-item failures never escape a run; they end up in the quarantine.
//! - No global mutable state.

pub mod dataset;
pub mod quarantine;
pub mod retry;
pub mod seed;
pub mod store;

pub use dataset::{DatasetError, load_dataset};
pub use quarantine::{DEFAULT_QUARANTINE_PATH, QuarantineError, QuarantineStore};
pub use retry::{RetryOrchestrator, RetryOutcome};
pub use seed::{SeedError, SeedOptions, SeedReport, SeedRun};
pub use store::{SqliteRecordStore, StoreError};
