use crate::component::{Component, ComponentOverrides};
use crate::error::Result;
use crate::listing::ArtifactListing;
use crate::mode::{install_dir_mode, BuildMode};
use crate::resolve::{ResolutionCache, ResolvedVersion, VersionResolver};
use crate::spec::VersionSpec;
use ccm_cache::{
    CacheError, MaterializeOutcome, PackageCache, RepositoryDir, SlotLock, SourceRecord, StoreSet,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a version ended up on disk after [`Repository::setup`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstallLayout {
    pub version_name: String,
    pub version_dir: PathBuf,
    pub mode: BuildMode,
    pub slots: BTreeMap<Component, PathBuf>,
    /// Components that were fetched and extracted by this call (the rest were reused).
    pub installed: Vec<Component>,
}

/// A slot found on disk with a loadable source record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstalledPackage {
    pub component: Option<Component>,
    pub slot_dir: PathBuf,
    pub record: SourceRecord,
}

/// The local package repository: resolution plus slot materialization.
pub struct Repository<L> {
    dir: RepositoryDir,
    resolver: VersionResolver<L>,
    cache: PackageCache,
    resolutions: ResolutionCache,
}

impl<L: ArtifactListing> Repository<L> {
    pub fn new(dir: RepositoryDir, resolver: VersionResolver<L>, stores: StoreSet) -> Self {
        let cache = PackageCache::new(stores).with_scratch_dir(dir.root());
        Self {
            dir,
            resolver,
            cache,
            resolutions: ResolutionCache::new(),
        }
    }

    pub fn dir(&self) -> &RepositoryDir {
        &self.dir
    }

    pub fn resolutions(&self) -> &ResolutionCache {
        &self.resolutions
    }

    pub fn resolve(
        &mut self,
        spec: &VersionSpec,
        overrides: &ComponentOverrides,
    ) -> Result<ResolvedVersion> {
        self.resolver.resolve(spec, overrides, &mut self.resolutions)
    }

    /// Resolve `spec` and make every component slot of the result current.
    pub fn setup(
        &mut self,
        spec: &VersionSpec,
        overrides: &ComponentOverrides,
    ) -> Result<InstallLayout> {
        let resolved = self.resolve(spec, overrides)?;
        let version_dir = self.dir.version_dir(&resolved.version_name);

        self.prune_other_layout(&version_dir, &resolved)?;

        let mut slots = BTreeMap::new();
        let mut installed = Vec::new();
        for (component, source) in &resolved.packages {
            let slot_dir = version_dir.join(component.slot_dir_name());
            let outcome = self
                .cache
                .materialize(&slot_dir, source, &resolved.version_name)?;
            if matches!(outcome, MaterializeOutcome::Installed { .. }) {
                installed.push(*component);
            }
            slots.insert(*component, slot_dir);
        }

        let mode = install_dir_mode(&version_dir);
        tracing::info!(
            target: "ccm.repository",
            version = %resolved.version_name,
            dir = %version_dir.display(),
            %mode,
            installed = installed.len(),
            "version ready"
        );
        Ok(InstallLayout {
            version_name: resolved.version_name,
            version_dir,
            mode,
            slots,
            installed,
        })
    }

    /// Every recorded slot in the repository.
    pub fn installed(&self) -> Result<Vec<InstalledPackage>> {
        Ok(self
            .dir
            .installed_slots()?
            .into_iter()
            .map(|slot| InstalledPackage {
                component: component_for_slot(&slot.slot_dir),
                slot_dir: slot.slot_dir,
                record: slot.record,
            })
            .collect())
    }

    /// Remove slots of the layout `resolved` does not use (split vs unified).
    fn prune_other_layout(&self, version_dir: &Path, resolved: &ResolvedVersion) -> Result<()> {
        let unified = resolved.is_unified();
        for component in Component::ALL {
            if component.is_split() != unified {
                continue;
            }
            let slot_dir = version_dir.join(component.slot_dir_name());
            if !slot_dir.exists() {
                continue;
            }

            let _lock = SlotLock::for_slot(&slot_dir)?;
            std::fs::remove_dir_all(&slot_dir).map_err(CacheError::from)?;
            tracing::info!(
                target: "ccm.repository",
                slot = %slot_dir.display(),
                "removed slot of the other package layout"
            );
        }
        Ok(())
    }
}

fn component_for_slot(slot_dir: &Path) -> Option<Component> {
    let name = slot_dir.file_name()?.to_str()?;
    Component::ALL
        .into_iter()
        .find(|component| component.slot_dir_name() == name)
}
