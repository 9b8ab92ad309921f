use crate::error::{CacheError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Component, Path};
use tar::EntryType;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Unpack a `.tar.gz` (or plain `.tar`) package into `dest`.
///
/// Only regular files, directories, symlinks and hard links are accepted, and every entry must
/// stay below `dest`.
pub(crate) fn unpack_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|err| CacheError::extraction(archive, err))?;
    let mut reader = BufReader::new(file);
    let gzipped = reader
        .fill_buf()
        .map_err(|err| CacheError::extraction(archive, err))?
        .starts_with(&GZIP_MAGIC);

    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    let mut tar = tar::Archive::new(reader);
    tar.set_preserve_permissions(true);
    tar.set_preserve_mtime(true);

    let mut entries_seen = 0usize;
    for entry in tar
        .entries()
        .map_err(|err| CacheError::extraction(archive, err))?
    {
        let mut entry = entry.map_err(|err| CacheError::extraction(archive, err))?;
        let entry_path = entry
            .path()
            .map_err(|err| CacheError::extraction(archive, err))?
            .into_owned();

        match entry.header().entry_type() {
            EntryType::Regular
            | EntryType::Continuous
            | EntryType::Directory
            | EntryType::Symlink => {}
            EntryType::Link => {
                if let Some(target) = entry
                    .link_name()
                    .map_err(|err| CacheError::extraction(archive, err))?
                {
                    validate_archive_relative_path(&target)?;
                }
            }
            EntryType::XGlobalHeader => continue,
            _ => {
                return Err(CacheError::UnsupportedArchiveEntryType { path: entry_path });
            }
        }

        validate_archive_relative_path(&entry_path)?;
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|err| CacheError::extraction(archive, err))?;
        if !unpacked {
            return Err(CacheError::InvalidArchivePath { path: entry_path });
        }
        entries_seen += 1;
    }

    tracing::debug!(
        target: "ccm.cache",
        archive = %archive.display(),
        dest = %dest.display(),
        gzipped,
        entries = entries_seen,
        "unpacked package archive"
    );
    Ok(())
}

fn validate_archive_relative_path(path: &Path) -> Result<()> {
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(CacheError::InvalidArchivePath {
                    path: path.to_path_buf(),
                })
            }
        }
    }
    Ok(())
}
