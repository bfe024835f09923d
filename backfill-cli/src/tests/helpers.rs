//! Test helpers for laying out datasets, stores and quarantine files.

use backfill_core::{Record, RecordSink, test_support::block_on_for_tests};
use backfill_data::SqliteRecordStore;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, json};
use tempfile::TempDir;

/// Temporary directory holding every file a command touches.
#[derive(Debug)]
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub(super) fn dataset(&self) -> Utf8PathBuf {
        self.root.join("dataset.json")
    }

    pub(super) fn database(&self) -> Utf8PathBuf {
        self.root.join("store/records.db")
    }

    pub(super) fn quarantine(&self) -> Utf8PathBuf {
        self.root.join("faildata/failed_records.json")
    }
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent directory");
    }
    std::fs::write(path, contents).expect("write file");
}

/// Records with the given ids, each carrying a `title` field.
pub(super) fn numbered_records(ids: impl IntoIterator<Item = i64>) -> Vec<Record> {
    ids.into_iter()
        .map(|id| {
            let mut payload = Map::new();
            payload.insert("title".to_owned(), json!(format!("listing {id}")));
            Record::new(id.into(), payload)
        })
        .collect()
}

pub(super) fn write_records(path: &Utf8Path, records: &[Record]) {
    let encoded = serde_json::to_vec_pretty(records).expect("encode records");
    write_utf8(path, &encoded);
}

/// Insert `records` directly into the SQLite store at `database`.
pub(super) fn preload_store(database: &Utf8Path, records: &[Record]) {
    let store = SqliteRecordStore::open(database).expect("open store");
    block_on_for_tests(async {
        for record in records {
            store.create(record).await.expect("preload record");
        }
    });
}

pub(super) fn stored_count(database: &Utf8Path) -> usize {
    let store = SqliteRecordStore::open(database).expect("open store");
    block_on_for_tests(store.count()).expect("count records")
}
