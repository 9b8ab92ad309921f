use crate::error::CacheError;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static SIBLING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Replace `path` with `bytes` so readers see either the old or the new content.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    atomic_write_with(path, |out| {
        out.write_all(bytes)?;
        Ok(())
    })
}

/// Stream into a hidden temp file next to `path`, sync it, then rename it over `path`.
///
/// Nothing is left behind when `write` fails.
pub(crate) fn atomic_write_with(
    path: &Path,
    write: impl FnOnce(&mut fs::File) -> Result<(), CacheError>,
) -> Result<(), CacheError> {
    let parent = parent_or_cwd(path)?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name.to_string_lossy()))
        .suffix(".tmp")
        .tempfile_in(parent)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| CacheError::from(err.error))?;

    sync_dir_best_effort(parent, "atomic_write");
    Ok(())
}

pub(crate) fn parent_or_cwd(path: &Path) -> Result<&Path, CacheError> {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Ok(Path::new(".")),
        Some(parent) => Ok(parent),
        None => Err(io::Error::other("path has no parent").into()),
    }
}

pub(crate) fn remove_dir_best_effort(path: &Path, reason: &'static str) {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(
            target: "ccm.cache",
            path = %path.display(),
            reason,
            error = %err,
            "failed to remove directory"
        ),
    }
}

/// A path next to `path` named `.<file_name>.<tag>.<pid>.<n>` that does not exist yet.
pub(crate) fn unique_sibling(path: &Path, tag: &str) -> Result<PathBuf, CacheError> {
    let parent = parent_or_cwd(path)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("path has no file name"))?;
    let pid = std::process::id();

    loop {
        let n = SIBLING_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = OsString::from(".");
        name.push(file_name);
        name.push(format!(".{tag}.{pid}.{n}"));
        let candidate = parent.join(name);
        match fs::symlink_metadata(&candidate) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(candidate),
            Err(err) => return Err(err.into()),
            Ok(_) => continue,
        }
    }
}

/// fsync a directory so renames inside it survive a crash. Unix only.
pub(crate) fn sync_dir_best_effort(dir: &Path, reason: &'static str) {
    #[cfg(unix)]
    {
        if let Err(err) = fs::File::open(dir).and_then(|dir| dir.sync_all()) {
            tracing::debug!(
                target: "ccm.cache",
                dir = %dir.display(),
                reason,
                error = %err,
                "failed to sync directory"
            );
        }
    }

    #[cfg(not(unix))]
    let _ = (dir, reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_existing_file_and_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("source.txt");
        std::fs::write(&path, b"old").unwrap();

        atomic_write(&path, b"new").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["source.txt".to_string()]);
    }

    #[test]
    fn atomic_write_creates_missing_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("release").join("5.4.1").join("source.txt");

        atomic_write(&path, b"hash=abc\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hash=abc\n");
    }

    #[test]
    fn failed_streaming_write_keeps_old_content_and_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pkg.tar.gz");
        std::fs::write(&path, b"old").unwrap();

        let err = atomic_write_with(&path, |out| {
            out.write_all(b"partial")?;
            Err(CacheError::Fetch {
                url: "https://example.com/pkg.tar.gz".into(),
                message: "connection reset".into(),
            })
        })
        .unwrap_err();

        assert!(matches!(err, CacheError::Fetch { .. }), "{err:?}");
        assert_eq!(std::fs::read(&path).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn unique_sibling_is_hidden_and_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let slot = tmp.path().join("scylla-core-package");

        let first = unique_sibling(&slot, "old").unwrap();
        std::fs::create_dir(&first).unwrap();
        let second = unique_sibling(&slot, "old").unwrap();

        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".scylla-core-package.old."), "{name}");
    }
}
