//! Durable storage for items whose create call failed.
//!
//! The quarantine is a single pretty-printed JSON array. It exists only while
//! failures are pending; an absent or whitespace-only file means nothing is
//! waiting to be replayed.

use std::{io, marker::PhantomData};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

/// Default location of the quarantine file, relative to the working directory.
pub const DEFAULT_QUARANTINE_PATH: &str = "faildata/failed_records.json";

/// Errors raised by [`QuarantineStore`].
#[derive(Debug, Error)]
pub enum QuarantineError {
    /// The parent directory could not be created.
    #[error("failed to create quarantine directory for {path}")]
    CreateDirectory {
        /// Quarantine file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file exists but could not be read.
    #[error("failed to read quarantine file {path}")]
    Read {
        /// Quarantine file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Writing or replacing the file failed.
    #[error("failed to write quarantine file {path}")]
    Write {
        /// Quarantine file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Deleting the file failed.
    #[error("failed to remove quarantine file {path}")]
    Remove {
        /// Quarantine file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The failure set could not be encoded.
    #[error("failed to serialise quarantined items")]
    Serialize {
        /// Encoder error.
        #[source]
        source: serde_json::Error,
    },
    /// The file is not valid JSON, or an element does not decode.
    #[error("quarantine file {path} is malformed")]
    Parse {
        /// Quarantine file path.
        path: Utf8PathBuf,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// The file holds valid JSON that is not an array.
    #[error("quarantine file {path} does not hold a JSON array")]
    NotAnArray {
        /// Quarantine file path.
        path: Utf8PathBuf,
    },
}

impl QuarantineError {
    /// Whether the error describes unusable file contents rather than IO.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

/// Quarantine file bound to a single path.
///
/// # Examples
/// ```no_run
/// use backfill_core::Record;
/// use backfill_data::QuarantineStore;
///
/// # fn main() -> Result<(), backfill_data::QuarantineError> {
/// let store = QuarantineStore::<Record>::new("faildata/failed_records.json");
/// store.save(&[Record::with_empty_payload(7)])?;
/// assert_eq!(store.load()?.len(), 1);
/// store.clear()?;
/// assert!(!store.exists()?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct QuarantineStore<T> {
    path: Utf8PathBuf,
    items: PhantomData<fn() -> T>,
}

impl<T> Clone for QuarantineStore<T> {
    fn clone(&self) -> Self {
        Self::new(self.path.clone())
    }
}

impl<T> Default for QuarantineStore<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUARANTINE_PATH)
    }
}

impl<T> QuarantineStore<T> {
    /// Bind a store to `path`. Nothing is touched until the first operation.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            items: PhantomData,
        }
    }

    /// Path of the quarantine file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Whether the quarantine file is present.
    pub fn exists(&self) -> Result<bool, QuarantineError> {
        backfill_fs::file_is_file(&self.path).map_err(|source| QuarantineError::Read {
            path: self.path.clone(),
            source,
        })
    }

    /// Delete the quarantine file. A missing file is not an error.
    pub fn clear(&self) -> Result<(), QuarantineError> {
        let removed = backfill_fs::remove_file_if_exists(&self.path).map_err(|source| {
            QuarantineError::Remove {
                path: self.path.clone(),
                source,
            }
        })?;
        if removed {
            log::debug!("removed quarantine file {}", self.path);
        }
        Ok(())
    }
}

impl<T: Serialize> QuarantineStore<T> {
    /// Replace the file contents with `items`.
    ///
    /// The parent directory is created when missing and the new contents are
    /// swapped in atomically. An empty slice writes `[]`.
    pub fn save(&self, items: &[T]) -> Result<(), QuarantineError> {
        let mut encoded = serde_json::to_vec_pretty(items)
            .map_err(|source| QuarantineError::Serialize { source })?;
        encoded.push(b'\n');

        backfill_fs::ensure_parent_dir(&self.path).map_err(|source| {
            QuarantineError::CreateDirectory {
                path: self.path.clone(),
                source,
            }
        })?;
        backfill_fs::write_atomic(&self.path, &encoded).map_err(|source| {
            QuarantineError::Write {
                path: self.path.clone(),
                source,
            }
        })?;
        log::debug!("wrote {} item(s) to {}", items.len(), self.path);
        Ok(())
    }
}

impl<T: DeserializeOwned> QuarantineStore<T> {
    /// Read every quarantined item.
    ///
    /// Returns an empty list when the file is absent or holds only
    /// whitespace.
    pub fn load(&self) -> Result<Vec<T>, QuarantineError> {
        let contents = backfill_fs::read_to_string_if_exists(&self.path).map_err(|source| {
            QuarantineError::Read {
                path: self.path.clone(),
                source,
            }
        })?;
        let Some(contents) = contents.filter(|text| !text.trim().is_empty()) else {
            return Ok(Vec::new());
        };

        let parse_error = |source| QuarantineError::Parse {
            path: self.path.clone(),
            source,
        };
        let value: Value = serde_json::from_str(&contents).map_err(parse_error)?;
        if !value.is_array() {
            return Err(QuarantineError::NotAnArray {
                path: self.path.clone(),
            });
        }
        serde_json::from_value(value).map_err(parse_error)
    }
}
