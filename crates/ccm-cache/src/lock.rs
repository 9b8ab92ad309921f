use crate::error::CacheError;
use crate::util::parent_or_cwd;
use fs2::FileExt;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock};

/// Exclusive hold on one package slot, across processes and across threads of this process.
///
/// Released on drop.
#[derive(Debug)]
pub struct SlotLock {
    file: File,
    path: PathBuf,
}

/// Lock files held by this process.
///
/// `flock`-style locks only exclude other processes, so threads queue here first.
struct HeldLocks {
    paths: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

fn held_locks() -> &'static HeldLocks {
    static HELD: OnceLock<HeldLocks> = OnceLock::new();
    HELD.get_or_init(|| HeldLocks {
        paths: Mutex::new(HashSet::new()),
        released: Condvar::new(),
    })
}

impl HeldLocks {
    fn paths(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn claim(&self, path: &Path) {
        let mut paths = self.paths();
        while paths.contains(path) {
            paths = self
                .released
                .wait(paths)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        paths.insert(path.to_path_buf());
    }

    fn release(&self, path: &Path) {
        self.paths().remove(path);
        self.released.notify_all();
    }
}

impl SlotLock {
    /// Lock the slot at `slot_dir` through `.<slot_name>.lock` in its parent.
    ///
    /// The lock file is outside the slot so replacing the slot directory leaves it in place.
    pub fn for_slot(slot_dir: &Path) -> Result<Self, CacheError> {
        Self::lock_exclusive(&lock_path_for_slot(slot_dir)?)
    }

    /// Block until `path` is exclusively locked, creating it if needed.
    pub fn lock_exclusive(path: &Path) -> Result<Self, CacheError> {
        let held = held_locks();
        held.claim(path);

        let file = open_lock_file(path).and_then(|file| {
            FileExt::lock_exclusive(&file)?;
            Ok(file)
        });
        match file {
            Ok(file) => Ok(Self {
                file,
                path: path.to_path_buf(),
            }),
            Err(err) => {
                held.release(path);
                Err(err.into())
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SlotLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        held_locks().release(&self.path);
    }
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
}

fn lock_path_for_slot(slot_dir: &Path) -> Result<PathBuf, CacheError> {
    let parent = parent_or_cwd(slot_dir)?;
    let name = slot_dir
        .file_name()
        .ok_or_else(|| std::io::Error::other("slot path has no file name"))?;
    let mut lock_name = OsString::from(".");
    lock_name.push(name);
    lock_name.push(".lock");
    Ok(parent.join(lock_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn lockfile_sits_next_to_the_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let slot = tmp.path().join("release").join("5.4.1").join("scylla-core-package");

        let lock = SlotLock::for_slot(&slot).unwrap();

        assert_eq!(
            lock.path(),
            tmp.path()
                .join("release")
                .join("5.4.1")
                .join(".scylla-core-package.lock")
        );
        assert!(lock.path().is_file());
        assert!(!slot.exists(), "locking must not create the slot itself");
    }

    #[test]
    fn second_locker_waits_for_the_first() {
        let tmp = tempfile::tempdir().unwrap();
        let slot = tmp.path().join("scylla-jmx");

        let held = SlotLock::for_slot(&slot).unwrap();
        let acquired = Arc::new(AtomicBool::new(false));

        let handle = {
            let slot = slot.clone();
            let acquired = acquired.clone();
            std::thread::spawn(move || {
                let _lock = SlotLock::for_slot(&slot).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(held);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
