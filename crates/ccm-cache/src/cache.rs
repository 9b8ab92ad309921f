use crate::error::{CacheError, Result};
use crate::extract::unpack_archive;
use crate::fingerprint::Fingerprint;
use crate::lock::SlotLock;
use crate::record;
use crate::source::PackageSource;
use crate::store::StoreSet;
use crate::util::{parent_or_cwd, remove_dir_best_effort, sync_dir_best_effort, unique_sibling};
use crate::validate;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// The slot already held content matching the source.
    Reused,
    /// The slot was (re)populated from the source.
    Installed { fingerprint: Fingerprint },
}

/// Fingerprinting and materialization of package slots for one invocation.
///
/// Payloads downloaded to compute a fallback fingerprint are kept until the same source is
/// materialized, so a source is never downloaded twice by one `PackageCache`.
#[derive(Debug)]
pub struct PackageCache {
    stores: StoreSet,
    scratch_dir: Option<PathBuf>,
    downloads: HashMap<PackageSource, TempPath>,
}

impl PackageCache {
    pub fn new(stores: StoreSet) -> Self {
        Self {
            stores,
            scratch_dir: None,
            downloads: HashMap::new(),
        }
    }

    /// Download remote payloads below `dir` instead of the system temp directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    /// Fingerprint the current content behind `source`.
    ///
    /// Local files are hashed in place. Remote sources use the store's metadata token when it
    /// has one; otherwise the payload is downloaded and hashed.
    pub fn resolve_hash(&mut self, source: &PackageSource) -> Result<Fingerprint> {
        if let PackageSource::LocalFile(path) = source {
            return Fingerprint::from_file(path);
        }

        match self.stores.store_for(source).content_token(source) {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => {
                tracing::debug!(
                    target: "ccm.cache",
                    source = %source.redacted(),
                    "store returned no content token; hashing payload"
                );
            }
            Err(err) => {
                tracing::debug!(
                    target: "ccm.cache",
                    source = %source.redacted(),
                    error = %err,
                    "metadata lookup failed; hashing payload"
                );
            }
        }

        let payload = self
            .download(source)
            .map_err(|err| CacheError::HashComputation {
                location: source.redacted(),
                message: err.to_string(),
            })?;
        Fingerprint::from_file(payload)
    }

    /// Whether `slot_dir` already holds content matching `source`.
    ///
    /// Fingerprinting failures read as "not valid".
    pub fn is_cache_valid(&mut self, slot_dir: &Path, source: &PackageSource) -> bool {
        if record::load(slot_dir).is_none() {
            return false;
        }
        match self.resolve_hash(source) {
            Ok(current) => validate::slot_matches(slot_dir, &current),
            Err(err) => {
                tracing::debug!(
                    target: "ccm.cache",
                    slot = %slot_dir.display(),
                    error = %err,
                    "could not fingerprint source; treating slot as stale"
                );
                false
            }
        }
    }

    /// Make `slot_dir` hold the extracted content of `source`, recorded under `version`.
    ///
    /// Content is extracted next to the slot and swapped in with `rename`, so a failure at any
    /// point leaves the previous slot as it was.
    pub fn materialize(
        &mut self,
        slot_dir: &Path,
        source: &PackageSource,
        version: &str,
    ) -> Result<MaterializeOutcome> {
        self.materialize_locked(slot_dir, source, version)
            .map_err(|err| CacheError::Materialize {
                slot: slot_name(slot_dir),
                origin: source.redacted(),
                source: Box::new(err),
            })
    }

    fn materialize_locked(
        &mut self,
        slot_dir: &Path,
        source: &PackageSource,
        version: &str,
    ) -> Result<MaterializeOutcome> {
        let _lock = SlotLock::for_slot(slot_dir)?;

        let fingerprint = match self.resolve_hash(source) {
            Ok(fingerprint) => Some(fingerprint),
            Err(err) => {
                tracing::warn!(
                    target: "ccm.cache",
                    slot = %slot_dir.display(),
                    source = %source.redacted(),
                    error = %err,
                    "failed to fingerprint package; forcing re-extraction"
                );
                None
            }
        };

        if let Some(fingerprint) = &fingerprint {
            if validate::slot_matches(slot_dir, fingerprint) {
                tracing::info!(
                    target: "ccm.cache",
                    slot = %slot_dir.display(),
                    hash = %fingerprint,
                    "package already cached"
                );
                return Ok(MaterializeOutcome::Reused);
            }
        }

        let archive = self.acquire(source)?;
        let fingerprint = match fingerprint {
            Some(fingerprint) => fingerprint,
            None => Fingerprint::from_file(&archive).map_err(|err| CacheError::Fetch {
                url: source.redacted(),
                message: err.to_string(),
            })?,
        };

        install(slot_dir, &archive, &source.to_string(), version, &fingerprint)?;
        self.downloads.remove(source);

        tracing::info!(
            target: "ccm.cache",
            slot = %slot_dir.display(),
            source = %source.redacted(),
            hash = %fingerprint,
            "installed package"
        );
        Ok(MaterializeOutcome::Installed { fingerprint })
    }

    /// Path of a local copy of the archive behind `source`.
    fn acquire(&mut self, source: &PackageSource) -> Result<PathBuf> {
        match source {
            PackageSource::LocalFile(path) => {
                let readable = fs::metadata(path).and_then(|metadata| {
                    if metadata.is_file() {
                        fs::File::open(path).map(drop)
                    } else {
                        Err(io::Error::other("not a regular file"))
                    }
                });
                match readable {
                    Ok(()) => Ok(path.clone()),
                    Err(err) => Err(CacheError::Fetch {
                        url: path.display().to_string(),
                        message: err.to_string(),
                    }),
                }
            }
            _ => self.download(source),
        }
    }

    fn download(&mut self, source: &PackageSource) -> Result<PathBuf> {
        let path = match self.downloads.entry(source.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let dir = self
                    .scratch_dir
                    .clone()
                    .unwrap_or_else(std::env::temp_dir);
                fs::create_dir_all(&dir)?;
                let tmp = tempfile::Builder::new()
                    .prefix(".ccm-download-")
                    .suffix(".tar.gz")
                    .tempfile_in(&dir)?
                    .into_temp_path();

                tracing::debug!(
                    target: "ccm.cache",
                    source = %source.redacted(),
                    dest = %tmp.display(),
                    "downloading package"
                );
                self.stores.store_for(source).fetch(source, &tmp)?;
                entry.insert(tmp)
            }
        };
        Ok(path.to_path_buf())
    }
}

fn install(
    slot_dir: &Path,
    archive: &Path,
    origin: &str,
    version: &str,
    fingerprint: &Fingerprint,
) -> Result<()> {
    let parent = parent_or_cwd(slot_dir)?;
    fs::create_dir_all(parent)?;

    let work = tempfile::Builder::new()
        .prefix(&format!(".{}.extract-", slot_name(slot_dir)))
        .tempdir_in(parent)?;
    let staged = work.path().join("staged");
    fs::create_dir(&staged)?;

    unpack_archive(archive, &staged)?;
    validate::check_extracted_layout(&staged, archive)?;
    record::save(&staged, version, origin, fingerprint)?;

    swap_into_place(&staged, slot_dir)
}

/// Replace `slot_dir` with `staged`.
///
/// The slot ends up either fully replaced, restored to its previous content, or absent.
fn swap_into_place(staged: &Path, slot_dir: &Path) -> Result<()> {
    let backup = match fs::symlink_metadata(slot_dir) {
        Ok(_) => {
            let backup = unique_sibling(slot_dir, "old")?;
            fs::rename(slot_dir, &backup)?;
            Some(backup)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => return Err(err.into()),
    };

    if let Err(err) = fs::rename(staged, slot_dir) {
        if let Some(backup) = &backup {
            if let Err(restore_err) = fs::rename(backup, slot_dir) {
                tracing::warn!(
                    target: "ccm.cache",
                    slot = %slot_dir.display(),
                    error = %restore_err,
                    "failed to restore previous slot; leaving it absent"
                );
                remove_dir_best_effort(backup, "cache.swap.restore_failed");
            }
        }
        return Err(err.into());
    }

    if let Some(backup) = backup {
        remove_dir_best_effort(&backup, "cache.swap.remove_previous");
    }
    if let Ok(parent) = parent_or_cwd(slot_dir) {
        sync_dir_best_effort(parent, "cache.swap.sync_parent");
    }
    Ok(())
}

fn slot_name(slot_dir: &Path) -> String {
    slot_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| slot_dir.display().to_string())
}
