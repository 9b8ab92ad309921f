use crate::error::{CacheError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a package archive comes from.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PackageSource {
    LocalFile(PathBuf),
    S3 { bucket: String, key: String },
    Http(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    LocalFile,
    S3,
    Http,
}

impl PackageSource {
    /// Parse a user-supplied location.
    ///
    /// - `s3://bucket/key` is an S3 object
    /// - `http://...` / `https://...` is an HTTP resource
    /// - `file://path` and anything else is a local file (`~/` expands to `$HOME`)
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("s3://") {
            let (bucket, key) =
                rest.split_once('/')
                    .ok_or_else(|| CacheError::UnsupportedFetchUrl {
                        url: crate::store::sanitize_fetch_url(raw),
                    })?;
            if bucket.is_empty() || key.is_empty() {
                return Err(CacheError::UnsupportedFetchUrl {
                    url: crate::store::sanitize_fetch_url(raw),
                });
            }
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(Self::Http(raw.to_string()));
        }

        if raw.is_empty() {
            return Err(CacheError::UnsupportedFetchUrl {
                url: raw.to_string(),
            });
        }

        let path = raw.strip_prefix("file://").unwrap_or(raw);
        Ok(Self::LocalFile(expand_home(path)))
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::LocalFile(path.into())
    }

    pub fn s3(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::S3 {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::LocalFile(_) => SourceKind::LocalFile,
            Self::S3 { .. } => SourceKind::S3,
            Self::Http(_) => SourceKind::Http,
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::LocalFile(_))
    }

    /// The last path segment of the location, e.g. `scylla-package.tar.gz`.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::LocalFile(path) => path.file_name().and_then(|name| name.to_str()),
            Self::S3 { key, .. } => key.rsplit('/').next().filter(|name| !name.is_empty()),
            Self::Http(url) => {
                let without_query = url.split(['?', '#']).next().unwrap_or(url);
                let after_scheme = without_query
                    .split_once("://")
                    .map_or(without_query, |(_, rest)| rest);
                // Only the part after the authority is a path.
                let (_, path) = after_scheme.split_once('/')?;
                path.rsplit('/').next().filter(|name| !name.is_empty())
            }
        }
    }

    /// Origin string used in logs and error context, with credentials redacted.
    pub fn redacted(&self) -> String {
        crate::store::sanitize_fetch_url(&self.to_string())
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalFile(path) => path.display().fmt(f),
            Self::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Self::Http(url) => url.fmt(f),
        }
    }
}

impl std::str::FromStr for PackageSource {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

pub(crate) fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(path)
}
