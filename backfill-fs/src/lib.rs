//! Shared filesystem helpers built on `cap-std` and `camino`.
//!
//! Paths arriving from configuration may be relative or absolute; every
//! helper resolves them to an ambient directory handle plus a file name and
//! performs the actual IO through that handle.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io;
use std::path::Component;

/// Resolve an ambient directory for the given path and return the directory with the file name.
pub fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("target should include a file name"))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Ensure the parent directory for `path` exists, handling absolute paths safely for cap-std.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }

    let (base_dir, relative) = base_dir_and_relative(parent)?;
    if relative.as_os_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)
}

/// Read a whole file as UTF-8, returning `None` when it or its directory is absent.
pub fn read_to_string_if_exists(path: &Utf8Path) -> io::Result<Option<String>> {
    let (dir, name) = match open_dir_and_file(path) {
        Ok(pair) => pair,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    match dir.read_to_string(name.as_str()) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Replace the contents of `path` with `contents`.
///
/// The bytes are written to a sibling temporary file which is then renamed
/// over the target, so readers observe either the old or the new contents.
/// Missing parent directories are created first.
pub fn write_atomic(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    ensure_parent_dir(path)?;
    let (dir, name) = open_dir_and_file(path)?;
    let staging = format!(".{name}.tmp");
    dir.write(staging.as_str(), contents)?;
    if let Err(err) = dir.rename(staging.as_str(), &dir, name.as_str()) {
        let _cleanup = dir.remove_file(staging.as_str());
        return Err(err);
    }
    Ok(())
}

/// Delete `path`, returning whether a file was removed.
///
/// A missing file or directory is not an error.
pub fn remove_file_if_exists(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = match open_dir_and_file(path) {
        Ok(pair) => pair,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    match dir.remove_file(name.as_str()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Return whether a path exists and is a regular file using capability-based IO.
pub fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = match open_dir_and_file(path) {
        Ok(pair) => pair,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    match dir.metadata(name.as_str()) {
        Ok(meta) => Ok(meta.is_file()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Split an absolute or relative parent path into an ambient base directory and a relative suffix.
pub fn base_dir_and_relative(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();

    let (base, relative) = match std_parent.components().next() {
        // Windows drive or UNC prefix.
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;

            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_parent.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from parent path"))?
                .to_path_buf();
            (base, relative)
        }
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        _ => (Utf8PathBuf::from("."), std_parent.to_path_buf()),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| io::Error::other("non-UTF-8 parent path"))?;

    Ok((dir, relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn temp_dir() -> TempDir {
        TempDir::new().expect("temporary directory")
    }

    fn utf8(dir: &TempDir, relative: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(relative)).expect("utf-8 temp path")
    }

    #[rstest]
    fn write_atomic_creates_missing_parents(temp_dir: TempDir) {
        let target = utf8(&temp_dir, "nested/deeper/out.json");
        write_atomic(&target, b"[]").expect("write should succeed");
        let contents = read_to_string_if_exists(&target).expect("read should succeed");
        assert_eq!(contents.as_deref(), Some("[]"));
        assert!(
            !utf8(&temp_dir, "nested/deeper/.out.json.tmp").exists(),
            "staging file should be renamed away"
        );
    }

    #[rstest]
    fn write_atomic_replaces_existing_contents(temp_dir: TempDir) {
        let target = utf8(&temp_dir, "out.json");
        write_atomic(&target, b"first").expect("first write");
        write_atomic(&target, b"second").expect("second write");
        let contents = read_to_string_if_exists(&target).expect("read should succeed");
        assert_eq!(contents.as_deref(), Some("second"));
    }

    #[rstest]
    #[case("absent.json")]
    #[case("missing-dir/absent.json")]
    fn reading_absent_files_yields_none(temp_dir: TempDir, #[case] relative: &str) {
        let target = utf8(&temp_dir, relative);
        assert_eq!(read_to_string_if_exists(&target).expect("read"), None);
        assert!(!file_is_file(&target).expect("metadata"));
    }

    #[rstest]
    fn remove_is_idempotent(temp_dir: TempDir) {
        let target = utf8(&temp_dir, "out.json");
        write_atomic(&target, b"[]").expect("write should succeed");
        assert!(file_is_file(&target).expect("metadata"));
        assert!(remove_file_if_exists(&target).expect("first removal"));
        assert!(!remove_file_if_exists(&target).expect("second removal"));
        assert!(!file_is_file(&target).expect("metadata"));
    }

    #[rstest]
    fn ensure_parent_dir_accepts_bare_file_names() {
        ensure_parent_dir(Utf8Path::new("out.json")).expect("no parent to create");
    }
}
