use crate::component::{Component, ComponentOverrides};
use crate::error::{RepositoryError, Result};
use crate::listing::{release_prefix, unstable_prefix, Artifact, ArtifactListing};
use crate::spec::{ReleaseTag, ReleaseVersion, VersionSpec};
use ccm_cache::PackageSource;
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_PRODUCT: &str = "scylla";
pub const DEFAULT_BUCKET: &str = "downloads.scylladb.com";

/// Architecture of the running host in package naming (`x86_64`, `aarch64`).
pub fn host_arch() -> &'static str {
    std::env::consts::ARCH
}

/// What a version specifier resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Directory-safe-ish name, e.g. `release/5.4.1` or `unstable/master/380_debug`.
    pub version_name: String,
    pub packages: BTreeMap<Component, PackageSource>,
}

impl ResolvedVersion {
    pub fn is_unified(&self) -> bool {
        self.packages.contains_key(&Component::Unified)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ResolutionKey {
    spec: VersionSpec,
    product: String,
    arch: String,
    bucket: String,
    overrides: ComponentOverrides,
}

/// Caller-owned memo of earlier resolutions.
///
/// Keys hold only inputs that change the result: the specifier, product, architecture,
/// bucket and overrides.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: HashMap<ResolutionKey, ResolvedVersion>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Turns version specifiers into per-component package sources.
pub struct VersionResolver<L> {
    listing: L,
    product: String,
    arch: String,
    bucket: String,
}

impl<L: ArtifactListing> VersionResolver<L> {
    pub fn new(listing: L) -> Self {
        Self {
            listing,
            product: DEFAULT_PRODUCT.to_string(),
            arch: host_arch().to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
        }
    }

    pub fn product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }

    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn resolve(
        &self,
        spec: &VersionSpec,
        overrides: &ComponentOverrides,
        cache: &mut ResolutionCache,
    ) -> Result<ResolvedVersion> {
        let key = ResolutionKey {
            spec: spec.clone(),
            product: self.product.clone(),
            arch: self.arch.clone(),
            bucket: self.bucket.clone(),
            overrides: overrides.clone(),
        };
        if let Some(hit) = cache.entries.get(&key) {
            tracing::debug!(target: "ccm.repository", %spec, "resolution cache hit");
            return Ok(hit.clone());
        }

        let resolved = self.resolve_uncached(spec, overrides)?;
        tracing::info!(
            target: "ccm.repository",
            %spec,
            version = %resolved.version_name,
            components = ?resolved.packages.keys().collect::<Vec<_>>(),
            "resolved version"
        );
        cache.entries.insert(key, resolved.clone());
        Ok(resolved)
    }

    fn resolve_uncached(
        &self,
        spec: &VersionSpec,
        overrides: &ComponentOverrides,
    ) -> Result<ResolvedVersion> {
        let defaults = match self.resolve_defaults(spec) {
            Ok(defaults) => defaults,
            Err(RepositoryError::VersionNotFound { reason, .. }) if overrides.covers_required() => {
                tracing::warn!(
                    target: "ccm.repository",
                    %spec,
                    reason = %reason,
                    "no published packages; using overrides only"
                );
                ResolvedVersion {
                    version_name: requested_name(spec),
                    packages: BTreeMap::new(),
                }
            }
            Err(err) => return Err(err),
        };

        let packages = overrides
            .apply(&defaults.packages)
            .filter(|packages| {
                packages.contains_key(&Component::Unified)
                    || packages.contains_key(&Component::Core)
            })
            .ok_or_else(|| {
                RepositoryError::not_found(
                    spec.to_string(),
                    "no core package for the split layout",
                )
            })?;
        Ok(ResolvedVersion {
            version_name: defaults.version_name,
            packages,
        })
    }

    fn resolve_defaults(&self, spec: &VersionSpec) -> Result<ResolvedVersion> {
        match spec {
            VersionSpec::Release { tag, debug } => self.resolve_release(spec, tag, *debug),
            VersionSpec::Unstable {
                branch,
                build,
                debug,
            } => {
                let prefix = unstable_prefix(&self.product, branch, build);
                let artifacts = self.list_artifacts(spec, &prefix, *debug)?;
                let packages = self.pick_layout(spec, &artifacts)?;
                Ok(ResolvedVersion {
                    version_name: with_debug(format!("unstable/{branch}/{build}"), *debug),
                    packages,
                })
            }
            VersionSpec::Local { path } => {
                let meta = std::fs::metadata(path).map_err(|err| {
                    RepositoryError::not_found(path.display().to_string(), err.to_string())
                })?;
                if !meta.is_file() {
                    return Err(RepositoryError::format(
                        path.display().to_string(),
                        "local package must be an archive file",
                    ));
                }
                let key = path.to_string_lossy();
                let component = Artifact::classify(&self.product, &key)
                    .map(|artifact| artifact.component)
                    .unwrap_or(Component::Unified);
                Ok(ResolvedVersion {
                    version_name: requested_name(spec),
                    packages: BTreeMap::from([(component, PackageSource::local(path.clone()))]),
                })
            }
        }
    }

    fn resolve_release(
        &self,
        spec: &VersionSpec,
        tag: &ReleaseTag,
        debug: bool,
    ) -> Result<ResolvedVersion> {
        let prefix = release_prefix(&self.product, &tag.series());
        let artifacts = self.list_artifacts(spec, &prefix, debug)?;

        let selected = select_release(tag, artifacts.iter().filter_map(|a| a.version))
            .ok_or_else(|| {
                RepositoryError::not_found(
                    spec.to_string(),
                    format!("no release matching {tag} under s3://{}/{prefix}", self.bucket),
                )
            })?;
        tracing::debug!(target: "ccm.repository", %tag, %selected, "selected release");

        let matching: Vec<Artifact> = artifacts
            .into_iter()
            .filter(|artifact| artifact.version == Some(selected))
            .collect();
        let packages = self.pick_layout(spec, &matching)?;
        Ok(ResolvedVersion {
            version_name: with_debug(format!("release/{selected}"), debug),
            packages,
        })
    }

    /// Classified artifacts under `prefix` matching the requested flavour and architecture.
    fn list_artifacts(
        &self,
        spec: &VersionSpec,
        prefix: &str,
        debug: bool,
    ) -> Result<Vec<Artifact>> {
        let keys = self.listing.list(&self.bucket, prefix)?;
        if keys.is_empty() {
            return Err(RepositoryError::not_found(
                spec.to_string(),
                format!("nothing published under s3://{}/{prefix}", self.bucket),
            ));
        }

        let mut artifacts: Vec<Artifact> = keys
            .iter()
            .filter_map(|key| Artifact::classify(&self.product, key))
            .filter(|artifact| artifact.matches_arch(&self.arch))
            .filter(|artifact| match artifact.component {
                Component::Core | Component::Unified => artifact.debug == debug,
                Component::Tools | Component::Jmx => true,
            })
            .collect();
        artifacts.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(artifacts)
    }

    /// Unified when a unified bundle exists, otherwise split with a mandatory core package.
    fn pick_layout(
        &self,
        spec: &VersionSpec,
        artifacts: &[Artifact],
    ) -> Result<BTreeMap<Component, PackageSource>> {
        let latest = |component: Component| {
            artifacts
                .iter()
                .rev()
                .find(|artifact| artifact.component == component)
                .map(|artifact| PackageSource::s3(self.bucket.clone(), artifact.key.clone()))
        };

        if let Some(unified) = latest(Component::Unified) {
            return Ok(BTreeMap::from([(Component::Unified, unified)]));
        }

        let core = latest(Component::Core).ok_or_else(|| {
            RepositoryError::not_found(spec.to_string(), "no core or unified package published")
        })?;
        let mut packages = BTreeMap::from([(Component::Core, core)]);
        for component in [Component::Tools, Component::Jmx] {
            if let Some(source) = latest(component) {
                packages.insert(component, source);
            }
        }
        Ok(packages)
    }
}

/// Pick the published version a release tag refers to.
///
/// `X.Y` picks the newest final of the series, `X.Y.Z` that exact final, and both fall back to
/// the newest matching release candidate. An explicit rc tag picks exactly that candidate.
pub fn select_release(
    tag: &ReleaseTag,
    published: impl IntoIterator<Item = ReleaseVersion>,
) -> Option<ReleaseVersion> {
    let admitted: Vec<ReleaseVersion> = published
        .into_iter()
        .filter(|version| tag.admits(version))
        .collect();

    if tag.rc.is_some() {
        return admitted.into_iter().max();
    }

    let newest_final = admitted.iter().copied().filter(ReleaseVersion::is_final).max();
    newest_final.or_else(|| admitted.into_iter().max())
}

fn with_debug(name: String, debug: bool) -> String {
    if debug {
        format!("{name}_debug")
    } else {
        name
    }
}

/// Version name derived from the specifier alone.
fn requested_name(spec: &VersionSpec) -> String {
    match spec {
        VersionSpec::Release { tag, debug } => with_debug(format!("release/{tag}"), *debug),
        VersionSpec::Unstable {
            branch,
            build,
            debug,
        } => with_debug(format!("unstable/{branch}/{build}"), *debug),
        VersionSpec::Local { path } => {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "package".to_string());
            let stem = file_name
                .strip_suffix(".tar.gz")
                .or_else(|| file_name.strip_suffix(".tgz"))
                .or_else(|| file_name.strip_suffix(".tar"))
                .unwrap_or(&file_name);
            format!("local/{stem}")
        }
    }
}
