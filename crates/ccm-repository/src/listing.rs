use crate::component::Component;
use crate::spec::ReleaseVersion;
use ccm_cache::{CacheError, S3Store};

/// Lists object keys below a bucket prefix.
pub trait ArtifactListing {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, CacheError>;
}

impl ArtifactListing for S3Store {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, CacheError> {
        self.list_objects(bucket, prefix)
    }
}

impl<T: ArtifactListing + ?Sized> ArtifactListing for &T {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, CacheError> {
        (**self).list(bucket, prefix)
    }
}

/// Listing prefix of a release series (`X.Y`).
pub fn release_prefix(product: &str, series: &str) -> String {
    format!("downloads/{product}/relocatable/scylladb-{series}/")
}

/// Listing prefix of one unstable build.
pub fn unstable_prefix(product: &str, branch: &str, build: &str) -> String {
    format!("unstable/{product}/{branch}/relocatable/{build}/")
}

const KNOWN_ARCHES: [&str; 2] = ["x86_64", "aarch64"];

/// What a package file name says about its content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub key: String,
    pub component: Component,
    pub debug: bool,
    /// `None` for `noarch` and untagged artifacts.
    pub arch: Option<String>,
    pub version: Option<ReleaseVersion>,
}

impl Artifact {
    /// Classify the object at `key` for `product`.
    ///
    /// Recognized shapes are `<product>[-debug]-unified…`, `<product>[-debug]-package…`,
    /// `<product>-tools…` and `<product>-jmx…`, all ending in `.tar.gz`.
    pub fn classify(product: &str, key: &str) -> Option<Self> {
        let file_name = key.rsplit('/').next()?;
        let stem = file_name.strip_suffix(".tar.gz")?;
        let rest = stem.strip_prefix(product)?.strip_prefix('-')?;
        let (rest, debug) = match rest.strip_prefix("debug-") {
            Some(rest) => (rest, true),
            None => (rest, false),
        };

        let (component, rest) = [
            ("unified", Component::Unified),
            ("package", Component::Core),
            ("tools", Component::Tools),
            ("jmx", Component::Jmx),
        ]
        .into_iter()
        .find_map(|(word, component)| {
            let tail = rest.strip_prefix(word)?;
            (tail.is_empty() || tail.starts_with('-') || tail.starts_with('.'))
                .then_some((component, tail))
        })?;

        if debug && matches!(component, Component::Tools | Component::Jmx) {
            return None;
        }

        let rest = rest.strip_prefix("-package").unwrap_or(rest);
        let version = rest
            .strip_prefix('-')
            .and_then(ReleaseVersion::parse_prefix);
        let arch = KNOWN_ARCHES
            .into_iter()
            .find(|arch| stem.contains(arch))
            .map(str::to_string);

        Some(Self {
            key: key.to_string(),
            component,
            debug,
            arch,
            version,
        })
    }

    pub fn matches_arch(&self, arch: &str) -> bool {
        self.arch.as_deref().map_or(true, |tagged| tagged == arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_release_artifacts() {
        let unified = Artifact::classify(
            "scylla",
            "downloads/scylla/relocatable/scylladb-5.4/scylla-unified-5.4.1-0.20240101.9a1b2c3d.x86_64.tar.gz",
        )
        .unwrap();
        assert_eq!(unified.component, Component::Unified);
        assert!(!unified.debug);
        assert_eq!(unified.arch.as_deref(), Some("x86_64"));
        assert_eq!(unified.version.unwrap().to_string(), "5.4.1");

        let core =
            Artifact::classify("scylla", "scylla-debug-package-5.4.0~rc1-0.2023.aarch64.tar.gz")
                .unwrap();
        assert_eq!(core.component, Component::Core);
        assert!(core.debug);
        assert!(!core.matches_arch("x86_64"));
        assert_eq!(core.version.unwrap().to_string(), "5.4.0~rc1");

        let tools =
            Artifact::classify("scylla", "scylla-tools-package-4.3.rc1-0.2021.noarch.tar.gz")
                .unwrap();
        assert_eq!(tools.component, Component::Tools);
        assert!(tools.arch.is_none());
        assert!(tools.matches_arch("aarch64"));
        assert_eq!(tools.version.unwrap().to_string(), "4.3.0~rc1");
    }

    #[test]
    fn classifies_unversioned_unstable_artifacts() {
        let jmx = Artifact::classify(
            "scylla",
            "unstable/scylla/master/relocatable/380/scylla-jmx-package.tar.gz",
        )
        .unwrap();
        assert_eq!(jmx.component, Component::Jmx);
        assert_eq!(jmx.version, None);

        let enterprise = Artifact::classify(
            "scylla-enterprise",
            "scylla-enterprise-unified-package.tar.gz",
        )
        .unwrap();
        assert_eq!(enterprise.component, Component::Unified);
    }

    #[test]
    fn ignores_foreign_files() {
        for key in [
            "scylla-python3-package.tar.gz",
            "scylla-enterprise-package.tar.gz",
            "scylla-debug-unstripped-5.4.0.x86_64.tar.gz",
            "scylla-package.tar.gz.sha256",
            "scylla-debug-jmx-package.tar.gz",
            "scylla-packages.tar.gz",
            "index.html",
        ] {
            assert_eq!(Artifact::classify("scylla", key), None, "{key}");
        }
    }

    #[test]
    fn prefixes_follow_bucket_layout() {
        assert_eq!(
            release_prefix("scylla", "5.4"),
            "downloads/scylla/relocatable/scylladb-5.4/"
        );
        assert_eq!(
            unstable_prefix("scylla-enterprise", "enterprise", "2024-01-01T00:00:00Z"),
            "unstable/scylla-enterprise/enterprise/relocatable/2024-01-01T00:00:00Z/"
        );
    }
}
