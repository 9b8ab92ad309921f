//! Content-addressed caching of relocatable database packages.
//!
//! A package *slot* is one extracted package (core, tools, jmx or unified) of one version:
//! `<repository_root>/<version_name>/<slot_name>/`. Each slot carries a `source.txt` record
//! with the origin it came from and the fingerprint of the archive it was extracted from.
//! [`PackageCache::materialize`] compares that record against the current fingerprint of the
//! source and only downloads and extracts when they differ.
//!
//! ## On-disk layout
//!
//! - `<slot>/<top-level-dir>/...`: extracted package content
//! - `<slot>/.relocatable_package_version`: optional package format marker
//! - `<slot>/source.txt`: [`SourceRecord`] (`version=`, `url=`, `hash=`)
//! - `<version_dir>/.<slot>.lock`: advisory lock held while a slot is materialized
//! - `<version_dir>/.<slot>.extract-*`: staging directories (removed on exit)
//!
//! ## Fingerprints
//!
//! Local archives are fingerprinted by the MD5 of their content. Remote archives use the
//! store's ETag when one is available, and the MD5 of the downloaded payload otherwise.

mod cache;
mod error;
mod extract;
mod fingerprint;
mod lock;
pub mod record;
mod repo_dir;
mod source;
mod store;
mod util;
pub mod validate;

pub use cache::{MaterializeOutcome, PackageCache};
pub use error::{CacheError, Result};
pub use fingerprint::Fingerprint;
pub use lock::SlotLock;
pub use record::{SourceRecord, SOURCE_FILE_NAME};
pub use repo_dir::{InstalledSlot, RepositoryDir, REPOSITORY_DIR_NAME};
pub use source::{PackageSource, SourceKind};
#[cfg(feature = "s3")]
pub use store::SdkS3Store;
pub use store::{
    sanitize_fetch_url, HttpStore, LocalStore, PackageStore, S3Store, StoreSet,
    DEFAULT_S3_ENDPOINT,
};
pub use util::atomic_write;
pub use validate::PACKAGE_VERSION_MARKER;
