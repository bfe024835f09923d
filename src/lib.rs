//! Facade crate for the Backfill ingestion engine.
//!
//! This crate re-exports the core ingestion types and exposes the SQLite
//! store, quarantine file and seed run behind the `store-sqlite` feature.

#![forbid(unsafe_code)]

pub use backfill_core::{
    BatchExecutor, CreateError, DuplicatePolicy, ExecutionReport, ExecutorConfig,
    ExecutorConfigError, Failure, Identified, IdentityQueryError, IdentitySource, LogObserver,
    ProgressEvent, ProgressObserver, Record, RecordId, RecordSink, SilentObserver, dedup,
};

#[cfg(feature = "store-sqlite")]
pub use backfill_data::{
    DEFAULT_QUARANTINE_PATH, DatasetError, QuarantineError, QuarantineStore, RetryOrchestrator,
    RetryOutcome, SeedError, SeedOptions, SeedReport, SeedRun, SqliteRecordStore, StoreError,
    load_dataset,
};
