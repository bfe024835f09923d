//! Core types for the Backfill ingestion engine.
//!
//! The engine loads a dataset of identified records, drops the ones already
//! present in a backing store, and creates the rest in fixed-size batches
//! under a concurrency ceiling. Failed items are handed back to the caller so
//! they can be quarantined and replayed later.
//!
//! Storage and filesystem concerns live in `backfill-data`; this crate only
//! knows about records, sinks and the batch executor.

#![forbid(unsafe_code)]

use std::{fmt, hash::Hash, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod dedup;
pub mod executor;
pub mod progress;
pub mod sink;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use dedup::dedup;
pub use executor::{
    BatchExecutor, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DuplicatePolicy, ExecutionReport,
    ExecutorConfig, ExecutorConfigError, Failure,
};
pub use progress::{LogObserver, ProgressEvent, ProgressObserver, SilentObserver};
pub use sink::{CreateError, IdentityQueryError, IdentitySource, RecordSink};

/// An item carrying a stable identity assigned by its source dataset.
///
/// The engine never looks past [`Identified::id`]; everything else about the
/// item is opaque payload.
pub trait Identified: Send + Sync {
    /// Identity type used for deduplication and reporting.
    type Id: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync;

    /// Borrow the item's identity.
    fn id(&self) -> &Self::Id;
}

/// Identity of a [`Record`], decoded from either a JSON number or string.
///
/// # Examples
///
/// ```
/// use backfill_core::RecordId;
///
/// let numeric: RecordId = "42".parse().unwrap_or_else(|never| match never {});
/// assert_eq!(numeric, RecordId::Number(42));
/// let text: RecordId = "est-7".parse().unwrap_or_else(|never| match never {});
/// assert_eq!(text, RecordId::Text("est-7".into()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Integer identity, the common case for relational sources.
    Number(i64),
    /// Free-form textual identity.
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for RecordId {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl FromStr for RecordId {
    type Err = std::convert::Infallible;

    /// Integers become [`RecordId::Number`]; anything else is kept as text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<i64>()
            .map_or_else(|_| Self::Text(s.to_owned()), Self::Number))
    }
}

/// A loosely typed record read from a JSON dataset.
///
/// The `id` field is required; every other field is kept verbatim in
/// `payload` and written back unchanged.
///
/// # Examples
///
/// ```
/// use backfill_core::{Identified, Record, RecordId};
///
/// # fn main() -> Result<(), serde_json::Error> {
/// let record: Record = serde_json::from_str(r#"{"id": 7, "price": 120000}"#)?;
/// assert_eq!(record.id(), &RecordId::Number(7));
/// assert_eq!(record.payload["price"], 120000);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identity assigned by the dataset.
    pub id: RecordId,
    /// Remaining fields of the record.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Record {
    /// Construct a record from an identity and payload.
    #[must_use]
    pub const fn new(id: RecordId, payload: Map<String, Value>) -> Self {
        Self { id, payload }
    }

    /// Construct a record without payload fields.
    #[must_use]
    pub fn with_empty_payload(id: impl Into<RecordId>) -> Self {
        Self::new(id.into(), Map::new())
    }
}

impl Identified for Record {
    type Id = RecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!({"id": 3, "name": "move"}), RecordId::Number(3))]
    #[case(json!({"id": "abc", "name": "move"}), RecordId::Text("abc".into()))]
    fn decodes_identity_variants(#[case] value: Value, #[case] expected: RecordId) {
        let record: Record = serde_json::from_value(value).expect("record should decode");
        assert_eq!(record.id, expected);
        assert_eq!(record.payload.get("name"), Some(&json!("move")));
        assert!(!record.payload.contains_key("id"), "id must not leak into payload");
    }

    #[rstest]
    fn rejects_records_without_identity() {
        let outcome = serde_json::from_value::<Record>(json!({"name": "orphan"}));
        assert!(outcome.is_err(), "records without an id must be rejected");
    }

    #[rstest]
    fn serialises_payload_alongside_identity() {
        let mut payload = Map::new();
        payload.insert("estimateRequestId".into(), json!(11));
        let record = Record::new(RecordId::Number(5), payload);
        let value = serde_json::to_value(&record).expect("record should encode");
        assert_eq!(value, json!({"id": 5, "estimateRequestId": 11}));
    }

    #[rstest]
    #[case("17", RecordId::Number(17))]
    #[case("-4", RecordId::Number(-4))]
    #[case("x-17", RecordId::Text("x-17".into()))]
    fn parses_identity_from_text(#[case] input: &str, #[case] expected: RecordId) {
        let parsed: RecordId = input.parse().unwrap_or_else(|never| match never {});
        assert_eq!(parsed, expected);
    }

    #[rstest]
    fn displays_identity_without_quotes() {
        assert_eq!(RecordId::Text("abc".into()).to_string(), "abc");
        assert_eq!(RecordId::Number(9).to_string(), "9");
    }
}
