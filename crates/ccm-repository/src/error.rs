use ccm_cache::CacheError;

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("unrecognized version specifier {spec:?}: {reason}")]
    VersionFormat { spec: String, reason: String },

    #[error("version {spec} not found: {reason}")]
    VersionNotFound { spec: String, reason: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl RepositoryError {
    pub(crate) fn format(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        RepositoryError::VersionFormat {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        RepositoryError::VersionNotFound {
            spec: spec.into(),
            reason: reason.into(),
        }
    }
}
