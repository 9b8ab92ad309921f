use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced while fingerprinting, fetching, extracting and recording packages.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to determine home directory for default repository path")]
    MissingHomeDir,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("failed to compute hash for {location}: {message}")]
    HashComputation { location: String, message: String },

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("failed to extract {archive:?}: {message}")]
    Extraction { archive: PathBuf, message: String },

    #[error("invalid archive path: {path:?}")]
    InvalidArchivePath { path: PathBuf },

    #[error("unsupported archive entry type for {path:?}")]
    UnsupportedArchiveEntryType { path: PathBuf },

    #[error("archive {archive:?} must contain a single top-level directory, found {found:?}")]
    UnexpectedArchiveLayout {
        archive: PathBuf,
        found: Vec<String>,
    },

    #[error("unsupported relocatable package format version {found}")]
    UnsupportedPackageFormat { found: String },

    #[error("unsupported fetch URL {url}")]
    UnsupportedFetchUrl { url: String },

    #[error("slot {slot} ({origin}): {source}")]
    Materialize {
        slot: String,
        origin: String,
        #[source]
        source: Box<CacheError>,
    },

    #[cfg(feature = "s3")]
    #[error("s3 request failed: {message}")]
    S3 { message: String },
}

impl CacheError {
    /// Strip [`CacheError::Materialize`] context and return the underlying failure.
    pub fn root(&self) -> &CacheError {
        match self {
            CacheError::Materialize { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self.root(), CacheError::Fetch { .. })
    }

    /// Whether the archive itself was unusable (corrupt stream, unsafe paths, unexpected layout).
    pub fn is_extraction(&self) -> bool {
        matches!(
            self.root(),
            CacheError::Extraction { .. }
                | CacheError::InvalidArchivePath { .. }
                | CacheError::UnsupportedArchiveEntryType { .. }
                | CacheError::UnexpectedArchiveLayout { .. }
                | CacheError::UnsupportedPackageFormat { .. }
        )
    }

    pub(crate) fn extraction(archive: &std::path::Path, err: impl std::fmt::Display) -> Self {
        CacheError::Extraction {
            archive: archive.to_path_buf(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_context_is_transparent_to_classification() {
        let err = CacheError::Materialize {
            slot: "scylla-core-package".to_string(),
            origin: "https://example.invalid/pkg.tar.gz".to_string(),
            source: Box::new(CacheError::Fetch {
                url: "https://example.invalid/pkg.tar.gz".to_string(),
                message: "server returned status 404".to_string(),
            }),
        };

        assert!(err.is_fetch());
        assert!(!err.is_extraction());
        let message = err.to_string();
        assert!(message.contains("scylla-core-package"), "{message}");
        assert!(message.contains("404"), "{message}");
    }

    #[test]
    fn layout_errors_count_as_extraction_failures() {
        let err = CacheError::UnexpectedArchiveLayout {
            archive: PathBuf::from("pkg.tar.gz"),
            found: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.is_extraction());
        assert!(!err.is_fetch());
    }
}
