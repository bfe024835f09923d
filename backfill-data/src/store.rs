//! SQLite backing store for [`Record`]s.
//!
//! Records live in a single `records` table keyed by the JSON encoding of
//! their identity, so numeric `1` and textual `"1"` stay distinct. Inserts are
//! plain `INSERT`s: an existing identity is reported as a duplicate and never
//! overwritten.
#![forbid(unsafe_code)]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use backfill_core::{
    CreateError, IdentityQueryError, IdentitySource, Record, RecordId, RecordSink,
};
use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, Error as SqliteError, ErrorCode, OptionalExtension};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised by [`SqliteRecordStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to create the parent directory for the database file.
    #[error("failed to create parent directory for {path}")]
    CreateDirectory {
        /// Database path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}")]
    Open {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Creating the `records` table failed.
    #[error("failed to create records table")]
    Schema {
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A statement failed.
    #[error("failed to {operation}")]
    Query {
        /// What the statement was doing.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A stored row did not hold a valid record.
    #[error("stored row for {id} is not a valid record")]
    DecodeRow {
        /// Raw identity column.
        id: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// Encoding a record for storage failed.
    #[error("failed to encode record {id}")]
    Encode {
        /// Identity of the record.
        id: RecordId,
        /// Encoder error.
        #[source]
        source: serde_json::Error,
    },
    /// Another thread panicked while holding the connection.
    #[error("SQLite connection lock is poisoned")]
    Lock,
    /// The blocking task running the statement did not complete.
    #[error("blocking SQLite task failed")]
    Join {
        /// Runtime error.
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Shared handle to a SQLite database holding [`Record`]s.
///
/// Clones share one connection. Statements run on the blocking thread pool
/// so async callers never stall the executor.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// # Examples
    /// ```no_run
    /// use backfill_data::SqliteRecordStore;
    /// use camino::Utf8Path;
    ///
    /// # fn main() -> Result<(), backfill_data::StoreError> {
    /// let store = SqliteRecordStore::open(Utf8Path::new("artefacts/records.db"))?;
    /// # let _ = store;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: &Utf8Path) -> Result<Self, StoreError> {
        backfill_fs::ensure_parent_dir(path).map_err(|source| StoreError::CreateDirectory {
            path: path.to_path_buf(),
            source,
        })?;
        let connection =
            Connection::open(path.as_std_path()).map_err(|source| StoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_connection(connection)
    }

    /// Create a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: Utf8PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS records (
                    id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL
                )",
                [],
            )
            .map_err(|source| StoreError::Schema { source })?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Look up a record by identity.
    pub async fn find_by_id(&self, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let key = encode_id(id)?;
        self.with_connection(move |connection| {
            let row = connection
                .query_row(
                    "SELECT id, payload FROM records WHERE id = ?1",
                    [&key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()
                .map_err(|source| StoreError::Query {
                    operation: "look up record",
                    source,
                })?;
            row.map(|(raw_id, payload)| decode_row(&raw_id, &payload))
                .transpose()
        })
        .await
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize, StoreError> {
        self.with_connection(|connection| {
            connection
                .query_row("SELECT COUNT(*) FROM records", [], |row| {
                    row.get::<_, usize>(0)
                })
                .map_err(|source| StoreError::Query {
                    operation: "count records",
                    source,
                })
        })
        .await
    }

    async fn insert(&self, record: &Record) -> Result<(), CreateError> {
        let key = encode_id(&record.id).map_err(CreateError::store)?;
        let payload = serde_json::to_string(&record.payload).map_err(|source| {
            CreateError::store(StoreError::Encode {
                id: record.id.clone(),
                source,
            })
        })?;
        let id = record.id.to_string();
        self.with_connection(move |connection| {
            Ok(connection.execute(
                "INSERT INTO records (id, payload) VALUES (?1, ?2)",
                (&key, &payload),
            ))
        })
        .await
        .map_err(CreateError::store)?
        .map(|_| ())
        .map_err(|source| classify_insert_error(id, source))
    }

    async fn all_ids(&self) -> Result<HashSet<RecordId>, StoreError> {
        self.with_connection(|connection| {
            let query_error = |source| StoreError::Query {
                operation: "list record identities",
                source,
            };
            let mut statement = connection
                .prepare("SELECT id FROM records")
                .map_err(query_error)?;
            let raw_ids = statement
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(query_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(query_error)?;
            raw_ids.iter().map(String::as_str).map(decode_id).collect()
        })
        .await
    }

    async fn with_connection<R, F>(&self, task: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&Connection) -> Result<R, StoreError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard: MutexGuard<'_, Connection> =
                connection.lock().map_err(|_| StoreError::Lock)?;
            task(&guard)
        })
        .await
        .map_err(|source| StoreError::Join { source })?
    }
}

fn encode_id(id: &RecordId) -> Result<String, StoreError> {
    serde_json::to_string(id).map_err(|source| StoreError::Encode {
        id: id.clone(),
        source,
    })
}

fn decode_id(raw: &str) -> Result<RecordId, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::DecodeRow {
        id: raw.to_owned(),
        source,
    })
}

fn decode_row(raw_id: &str, payload: &str) -> Result<Record, StoreError> {
    let id = decode_id(raw_id)?;
    let payload: Map<String, Value> =
        serde_json::from_str(payload).map_err(|source| StoreError::DecodeRow {
            id: raw_id.to_owned(),
            source,
        })?;
    Ok(Record::new(id, payload))
}

fn classify_insert_error(id: String, source: SqliteError) -> CreateError {
    match source.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => CreateError::Duplicate { id },
        _ => CreateError::store(StoreError::Query {
            operation: "insert record",
            source,
        }),
    }
}

#[async_trait]
impl RecordSink<Record> for SqliteRecordStore {
    async fn create(&self, item: &Record) -> Result<(), CreateError> {
        self.insert(item).await
    }
}

#[async_trait]
impl IdentitySource<Record> for SqliteRecordStore {
    async fn existing_ids(&self) -> Result<HashSet<RecordId>, IdentityQueryError> {
        self.all_ids().await.map_err(IdentityQueryError::new)
    }
}
