use ccm_cache::PackageSource;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One installable piece of a relocatable database build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    Core,
    Tools,
    Jmx,
    Unified,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Core,
        Component::Tools,
        Component::Jmx,
        Component::Unified,
    ];

    /// Directory name of this component's slot inside a version directory.
    pub fn slot_dir_name(self) -> &'static str {
        match self {
            Component::Core => "scylla-core-package",
            Component::Tools => "scylla-tools-java",
            Component::Jmx => "scylla-jmx",
            Component::Unified => "scylla-unified-package",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Component::Core => "core",
            Component::Tools => "tools",
            Component::Jmx => "jmx",
            Component::Unified => "unified",
        }
    }

    pub fn is_split(self) -> bool {
        !matches!(self, Component::Unified)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Component::ALL
            .into_iter()
            .find(|component| component.as_str() == s)
            .ok_or_else(|| format!("unknown component {s:?}"))
    }
}

/// Per-component package sources that replace what the resolver would pick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ComponentOverrides {
    sources: BTreeMap<Component, PackageSource>,
}

impl ComponentOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, component: Component, source: PackageSource) -> &mut Self {
        self.sources.insert(component, source);
        self
    }

    pub fn with(mut self, component: Component, source: PackageSource) -> Self {
        self.set(component, source);
        self
    }

    pub fn get(&self, component: Component) -> Option<&PackageSource> {
        self.sources.get(&component)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Component, &PackageSource)> {
        self.sources.iter().map(|(component, source)| (*component, source))
    }

    /// Whether the overrides alone provide everything a layout needs.
    pub(crate) fn covers_required(&self) -> bool {
        self.sources.contains_key(&Component::Unified)
            || self.sources.contains_key(&Component::Core)
    }

    /// Combine resolved `defaults` with these overrides.
    ///
    /// A unified override wins outright. Any split override forces the split layout, dropping a
    /// default unified bundle. Returns `None` when the split layout has no core package.
    pub(crate) fn apply(
        &self,
        defaults: &BTreeMap<Component, PackageSource>,
    ) -> Option<BTreeMap<Component, PackageSource>> {
        if let Some(unified) = self.get(Component::Unified) {
            return Some(BTreeMap::from([(Component::Unified, unified.clone())]));
        }

        if !self.sources.keys().any(|component| component.is_split()) {
            return Some(defaults.clone());
        }

        let packages: BTreeMap<_, _> = [Component::Core, Component::Tools, Component::Jmx]
            .into_iter()
            .filter_map(|component| {
                self.get(component)
                    .or_else(|| defaults.get(&component))
                    .map(|source| (component, source.clone()))
            })
            .collect();
        packages.contains_key(&Component::Core).then_some(packages)
    }
}
