//! Version resolution and setup of the local relocatable package repository.
//!
//! A version specifier (`release:5.4`, `unstable/master:380`, or a local archive path) is
//! resolved against the download bucket into per-component [`ccm_cache::PackageSource`]s,
//! optionally replaced component by component through [`ComponentOverrides`], and then
//! materialized into `<root>/<version_name>/<slot>` by [`Repository::setup`].

mod component;
mod error;
pub mod listing;
pub mod mode;
mod resolve;
mod setup;
mod spec;

pub use component::{Component, ComponentOverrides};
pub use error::{RepositoryError, Result};
pub use listing::{Artifact, ArtifactListing};
pub use mode::BuildMode;
pub use resolve::{
    host_arch, select_release, ResolutionCache, ResolvedVersion, VersionResolver, DEFAULT_BUCKET,
    DEFAULT_PRODUCT,
};
pub use setup::{InstallLayout, InstalledPackage, Repository};
pub use spec::{ReleaseTag, ReleaseVersion, VersionSpec};
