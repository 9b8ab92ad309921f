use crate::error::{CacheError, Result};
use crate::fingerprint::Fingerprint;
use crate::record::{self, SOURCE_FILE_NAME};
use std::path::Path;

/// Marker file some relocatable packages carry next to their top-level directory.
pub const PACKAGE_VERSION_MARKER: &str = ".relocatable_package_version";

/// Newest relocatable package format this crate knows how to lay out.
const MAX_PACKAGE_FORMAT: (u32, u32) = (2, 1);

/// Whether `slot_dir` holds intact content recorded with `current`.
pub fn slot_matches(slot_dir: &Path, current: &Fingerprint) -> bool {
    let Some(record) = record::load(slot_dir) else {
        return false;
    };
    if &record.hash != current {
        tracing::debug!(
            target: "ccm.cache",
            slot = %slot_dir.display(),
            recorded = %record.hash,
            current = %current,
            "slot fingerprint changed"
        );
        return false;
    }
    if !slot_is_intact(slot_dir) {
        tracing::warn!(
            target: "ccm.cache",
            slot = %slot_dir.display(),
            "slot record matches but content is damaged; re-extracting"
        );
        return false;
    }
    true
}

/// A slot is intact when it holds exactly one non-empty top-level directory, ignoring the
/// source record and the package format marker.
pub fn slot_is_intact(slot_dir: &Path) -> bool {
    match top_level_entries(slot_dir) {
        Ok(entries) => match entries.as_slice() {
            [(name, true)] => dir_is_non_empty(&slot_dir.join(name)),
            _ => false,
        },
        Err(_) => false,
    }
}

/// Check the layout of a freshly extracted package rooted at `root`.
///
/// Returns the name of the single top-level directory.
pub(crate) fn check_extracted_layout(root: &Path, archive: &Path) -> Result<String> {
    let entries = top_level_entries(root)?;
    let (dirs, others): (Vec<_>, Vec<_>) = entries.into_iter().partition(|(_, is_dir)| *is_dir);

    if dirs.len() != 1 || !others.is_empty() {
        let mut found: Vec<String> = dirs
            .into_iter()
            .chain(others)
            .map(|(name, _)| name)
            .collect();
        found.sort();
        return Err(CacheError::UnexpectedArchiveLayout {
            archive: archive.to_path_buf(),
            found,
        });
    }

    let marker = root.join(PACKAGE_VERSION_MARKER);
    if marker.is_file() {
        let raw = std::fs::read_to_string(&marker)?;
        check_package_format(raw.trim())?;
    }

    Ok(dirs.into_iter().map(|(name, _)| name).next().unwrap_or_default())
}

fn check_package_format(raw: &str) -> Result<()> {
    let unsupported = || CacheError::UnsupportedPackageFormat {
        found: raw.to_string(),
    };
    let (major, minor) = match raw.split_once('.') {
        Some((major, minor)) => (major, minor),
        None => (raw, "0"),
    };
    let major: u32 = major.trim().parse().map_err(|_| unsupported())?;
    let minor: u32 = minor.trim().parse().map_err(|_| unsupported())?;
    if (major, minor) > MAX_PACKAGE_FORMAT {
        return Err(unsupported());
    }
    Ok(())
}

/// Top-level entries of `dir` as `(name, is_dir)`, skipping the record and the marker.
fn top_level_entries(dir: &Path) -> Result<Vec<(String, bool)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == SOURCE_FILE_NAME || name == PACKAGE_VERSION_MARKER {
            continue;
        }
        entries.push((name, entry.file_type()?.is_dir()));
    }
    Ok(entries)
}

fn dir_is_non_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
