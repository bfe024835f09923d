//! Reading the source dataset.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while reading a dataset file. All of them abort a seed run.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The file could not be read.
    #[error("failed to read dataset at {path}")]
    Read {
        /// Dataset path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file is not valid JSON, or an element does not decode.
    #[error("failed to parse dataset at {path}")]
    Parse {
        /// Dataset path.
        path: Utf8PathBuf,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// The file holds valid JSON that is not an array.
    #[error("dataset at {path} is not a JSON array")]
    NotAnArray {
        /// Dataset path.
        path: Utf8PathBuf,
    },
}

/// Read a JSON array of items from `path`.
///
/// The file is read once and never written.
///
/// # Examples
/// ```no_run
/// use backfill_core::Record;
/// use backfill_data::load_dataset;
/// use camino::Utf8Path;
///
/// # fn main() -> Result<(), backfill_data::DatasetError> {
/// let records: Vec<Record> = load_dataset(Utf8Path::new("data/estimates.json"))?;
/// println!("read {} records", records.len());
/// # Ok(())
/// # }
/// ```
pub fn load_dataset<T: DeserializeOwned>(path: &Utf8Path) -> Result<Vec<T>, DatasetError> {
    let contents = backfill_fs::read_to_string_if_exists(path)
        .and_then(|contents| {
            contents.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file does not exist"))
        })
        .map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let parse_error = |source| DatasetError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let value: Value = serde_json::from_str(&contents).map_err(parse_error)?;
    if !value.is_array() {
        return Err(DatasetError::NotAnArray {
            path: path.to_path_buf(),
        });
    }
    serde_json::from_value(value).map_err(parse_error)
}
