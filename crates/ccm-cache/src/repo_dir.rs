use crate::error::CacheError;
use crate::record::{self, SourceRecord, SOURCE_FILE_NAME};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory name of the package repository below the ccm configuration directory.
pub const REPOSITORY_DIR_NAME: &str = "scylla-repository";

/// Deepest slot below the root: `unstable/<branch>/<build>/<slot>/source.txt`.
const MAX_RECORD_DEPTH: usize = 6;

/// The on-disk package repository: `<root>/<version_name>/<slot>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryDir {
    root: PathBuf,
}

/// A slot with a loadable source record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstalledSlot {
    pub slot_dir: PathBuf,
    pub record: SourceRecord,
}

impl RepositoryDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$CCM_CONFIG_DIR/scylla-repository`, falling back to `~/.ccm/scylla-repository`.
    pub fn from_env() -> Result<Self, CacheError> {
        let config_dir = match std::env::var_os("CCM_CONFIG_DIR") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_config_dir()?,
        };
        Ok(Self::new(config_dir.join(REPOSITORY_DIR_NAME)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every slot of `version_name`.
    ///
    /// `:` is not portable in file names and is replaced by `_`.
    pub fn version_dir(&self, version_name: &str) -> PathBuf {
        self.root.join(version_name.replace(':', "_"))
    }

    pub fn slot_dir(&self, version_name: &str, slot_name: &str) -> PathBuf {
        self.version_dir(version_name).join(slot_name)
    }

    /// Every slot under the root that carries a loadable record, sorted by path.
    pub fn installed_slots(&self) -> Result<Vec<InstalledSlot>, CacheError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut slots = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(MAX_RECORD_DEPTH)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() || entry.file_name() != SOURCE_FILE_NAME {
                continue;
            }
            let Some(slot_dir) = entry.path().parent() else {
                continue;
            };
            if let Some(record) = record::load(slot_dir) {
                slots.push(InstalledSlot {
                    slot_dir: slot_dir.to_path_buf(),
                    record,
                });
            }
        }
        Ok(slots)
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}

fn default_config_dir() -> Result<PathBuf, CacheError> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or(CacheError::MissingHomeDir)?;

    Ok(home.join(".ccm"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Fingerprint;

    #[test]
    fn version_names_map_to_portable_directories() {
        let repo = RepositoryDir::new("/repo");
        assert_eq!(
            repo.version_dir("unstable/master:2024-01-02T03:04:05Z"),
            Path::new("/repo/unstable/master_2024-01-02T03_04_05Z")
        );
        assert_eq!(
            repo.slot_dir("release/5.4.1", "scylla-jmx"),
            Path::new("/repo/release/5.4.1/scylla-jmx")
        );
    }

    #[test]
    fn installed_slots_skip_unrecorded_and_hidden_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepositoryDir::new(tmp.path());
        let hash = Fingerprint::from_recorded("h");

        let core = repo.slot_dir("release/5.4.1", "scylla-core-package");
        std::fs::create_dir_all(&core).unwrap();
        record::save(&core, "release/5.4.1", "s3://b/core.tar.gz", &hash).unwrap();

        let unrecorded = repo.slot_dir("release/5.4.1", "scylla-jmx");
        std::fs::create_dir_all(&unrecorded).unwrap();

        let staging = tmp.path().join("release").join("5.4.1").join(".scylla-jmx.extract-x");
        std::fs::create_dir_all(&staging).unwrap();
        record::save(&staging, "release/5.4.1", "s3://b/jmx.tar.gz", &hash).unwrap();

        let slots = repo.installed_slots().unwrap();
        assert_eq!(slots.len(), 1, "{slots:?}");
        assert_eq!(slots[0].slot_dir, core);
        assert_eq!(slots[0].record.origin, "s3://b/core.tar.gz");
    }

    #[test]
    fn missing_root_has_no_slots() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepositoryDir::new(tmp.path().join("absent"));
        assert!(repo.installed_slots().unwrap().is_empty());
    }
}
