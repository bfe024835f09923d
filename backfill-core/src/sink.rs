//! Seams between the engine and the backing store.
//!
//! [`RecordSink`] is the creation interface the executor drives once per
//! item. [`IdentitySource`] answers the single "which identities already
//! exist?" question asked before a run.

use std::{collections::HashSet, error::Error as StdError, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::Identified;

/// Boxed error returned by backing store implementations.
pub type BoxedStoreError = Box<dyn StdError + Send + Sync>;

/// Reasons a single create call did not persist its item.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CreateError {
    /// The store already holds an item with this identity.
    #[error("record {id} already exists")]
    Duplicate {
        /// Identity that collided.
        id: String,
    },
    /// The store refused the item's shape or contents.
    #[error("record {id} was rejected: {reason}")]
    Rejected {
        /// Identity of the rejected item.
        id: String,
        /// Short explanation supplied by the store.
        reason: String,
    },
    /// The store failed for reasons unrelated to the item.
    #[error("backing store failed: {source}")]
    Store {
        /// Underlying store error.
        #[source]
        source: BoxedStoreError,
    },
    /// The call did not settle before the configured per-item timeout.
    #[error("create did not complete within {timeout:?}")]
    TimedOut {
        /// Timeout that elapsed.
        timeout: Duration,
    },
}

impl CreateError {
    /// Wrap an arbitrary store error.
    pub fn store(source: impl Into<BoxedStoreError>) -> Self {
        Self::Store {
            source: source.into(),
        }
    }

    /// Whether the failure was an identity collision.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Error raised when the existing-identity snapshot cannot be taken.
#[derive(Debug, Error)]
#[error("failed to query existing identities: {source}")]
pub struct IdentityQueryError {
    /// Underlying store error.
    #[source]
    pub source: BoxedStoreError,
}

impl IdentityQueryError {
    /// Wrap an arbitrary store error.
    pub fn new(source: impl Into<BoxedStoreError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Creation interface of the backing store.
///
/// Implementations persist one item per call. Creation only: an existing
/// identity must be reported as [`CreateError::Duplicate`], never updated.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use backfill_core::{CreateError, Record, RecordSink};
///
/// struct Discard;
///
/// #[async_trait]
/// impl RecordSink<Record> for Discard {
///     async fn create(&self, _item: &Record) -> Result<(), CreateError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait RecordSink<T: Identified>: Send + Sync {
    /// Persist `item`, or explain why it was not persisted.
    async fn create(&self, item: &T) -> Result<(), CreateError>;
}

/// Point-in-time view of the identities already held by the backing store.
#[async_trait]
pub trait IdentitySource<T: Identified>: Send + Sync {
    /// Return every identity currently stored.
    async fn existing_ids(&self) -> Result<HashSet<T::Id>, IdentityQueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn duplicate_is_classified() {
        let duplicate = CreateError::Duplicate { id: "1".into() };
        let rejected = CreateError::Rejected {
            id: "1".into(),
            reason: "bad shape".into(),
        };
        assert!(duplicate.is_duplicate());
        assert!(!rejected.is_duplicate());
        assert!(!CreateError::store("offline").is_duplicate());
    }

    #[rstest]
    fn store_errors_keep_their_message() {
        let err = CreateError::store("connection reset");
        assert_eq!(err.to_string(), "backing store failed: connection reset");
    }
}
