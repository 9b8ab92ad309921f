use crate::error::{RepositoryError, Result};
use ccm_cache::PackageSource;
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

/// A parsed version specifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VersionSpec {
    /// `release:<tag>[:debug]`
    Release { tag: ReleaseTag, debug: bool },
    /// `unstable/<branch>:<build>[:debug]`
    Unstable {
        branch: String,
        build: String,
        debug: bool,
    },
    /// A local package archive.
    Local { path: PathBuf },
}

impl VersionSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();

        if let Some(rest) = raw.strip_prefix("release:") {
            let (tag, debug) = split_debug(rest);
            if tag.contains(':') {
                return Err(RepositoryError::format(raw, "unexpected suffix after release tag"));
            }
            let tag = ReleaseTag::parse(tag).ok_or_else(|| {
                RepositoryError::format(raw, "release tag must look like X.Y, X.Y.Z or X.Y.Z~rcN")
            })?;
            return Ok(VersionSpec::Release { tag, debug });
        }

        if let Some(rest) = raw.strip_prefix("unstable/") {
            let (rest, debug) = split_debug(rest);
            let Some((branch, build)) = rest.split_once(':') else {
                return Err(RepositoryError::format(raw, "expected unstable/<branch>:<build>"));
            };
            if branch.is_empty() || build.is_empty() {
                return Err(RepositoryError::format(raw, "branch and build must be non-empty"));
            }
            return Ok(VersionSpec::Unstable {
                branch: branch.to_string(),
                build: build.to_string(),
                debug,
            });
        }

        if is_local_path(raw) {
            return match PackageSource::parse(raw) {
                Ok(PackageSource::LocalFile(path)) => Ok(VersionSpec::Local { path }),
                _ => Err(RepositoryError::format(raw, "not a local path")),
            };
        }

        Err(RepositoryError::format(
            raw,
            "expected release:<tag>, unstable/<branch>:<build> or a local path",
        ))
    }

    pub fn is_debug(&self) -> bool {
        match self {
            VersionSpec::Release { debug, .. } | VersionSpec::Unstable { debug, .. } => *debug,
            VersionSpec::Local { .. } => false,
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let debug_suffix = |debug: bool| if debug { ":debug" } else { "" };
        match self {
            VersionSpec::Release { tag, debug } => {
                write!(f, "release:{tag}{}", debug_suffix(*debug))
            }
            VersionSpec::Unstable {
                branch,
                build,
                debug,
            } => write!(f, "unstable/{branch}:{build}{}", debug_suffix(*debug)),
            VersionSpec::Local { path } => path.display().fmt(f),
        }
    }
}

impl std::str::FromStr for VersionSpec {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn split_debug(raw: &str) -> (&str, bool) {
    match raw.strip_suffix(":debug") {
        Some(rest) => (rest, true),
        None => (raw, false),
    }
}

fn is_local_path(raw: &str) -> bool {
    ["/", "./", "../", "~/", "file://"]
        .iter()
        .any(|prefix| raw.starts_with(prefix))
}

/// A release tag as written by the user: `X.Y`, `X.Y.Z`, or a release candidate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReleaseTag {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
    pub rc: Option<u32>,
}

impl ReleaseTag {
    /// Accepts `X.Y`, `X.Y.Z`, `X.Y.Z~rcN`, `X.Y.Z.rcN` and `X.Y.rcN`.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = version_regex().captures(raw)?;
        if caps.get(0)?.as_str().len() != raw.len() {
            return None;
        }
        Some(Self {
            major: caps.get(1)?.as_str().parse().ok()?,
            minor: caps.get(2)?.as_str().parse().ok()?,
            patch: caps.get(3).and_then(|m| m.as_str().parse().ok()),
            rc: caps.get(4).and_then(|m| m.as_str().parse().ok()),
        })
    }

    /// The `X.Y` series directory the release lives under.
    pub fn series(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// Whether a published `version` satisfies this tag on its own terms (ignoring the
    /// "prefer finals" rule applied by the resolver).
    pub(crate) fn admits(&self, version: &ReleaseVersion) -> bool {
        if (version.major, version.minor) != (self.major, self.minor) {
            return false;
        }
        if let Some(patch) = self.patch {
            if version.patch != patch {
                return false;
            }
        }
        match self.rc {
            Some(rc) => version.rc == Some(rc),
            None => true,
        }
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(patch) = self.patch {
            write!(f, ".{patch}")?;
        }
        if let Some(rc) = self.rc {
            if self.patch.is_some() {
                write!(f, "~rc{rc}")?;
            } else {
                write!(f, ".rc{rc}")?;
            }
        }
        Ok(())
    }
}

/// A concrete published release version.
///
/// Release candidates sort before the final release of the same `X.Y.Z`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReleaseVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub rc: Option<u32>,
}

impl ReleaseVersion {
    /// Parse the version at the start of `raw` (trailing text such as `-0.2024...` is ignored).
    pub fn parse_prefix(raw: &str) -> Option<Self> {
        let caps = version_regex().captures(raw)?;
        if caps.get(0)?.start() != 0 {
            return None;
        }
        Some(Self {
            major: caps.get(1)?.as_str().parse().ok()?,
            minor: caps.get(2)?.as_str().parse().ok()?,
            patch: caps
                .get(3)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0),
            rc: caps.get(4).and_then(|m| m.as_str().parse().ok()),
        })
    }

    pub fn is_final(&self) -> bool {
        self.rc.is_none()
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.rc, other.rc) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(&b),
            })
    }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(rc) = self.rc {
            write!(f, "~rc{rc}")?;
        }
        Ok(())
    }
}

fn version_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?(?:[~.]rc(\d+))?").expect("valid regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_specs() {
        assert_eq!(
            VersionSpec::parse("release:2024.2").unwrap(),
            VersionSpec::Release {
                tag: ReleaseTag {
                    major: 2024,
                    minor: 2,
                    patch: None,
                    rc: None
                },
                debug: false
            }
        );

        let spec = VersionSpec::parse("release:5.4.0~rc2:debug").unwrap();
        let VersionSpec::Release { tag, debug } = spec else {
            panic!("expected release");
        };
        assert!(debug);
        assert_eq!((tag.patch, tag.rc), (Some(0), Some(2)));

        let VersionSpec::Release { tag, .. } = VersionSpec::parse("release:4.3.rc1").unwrap() else {
            panic!("expected release");
        };
        assert_eq!((tag.patch, tag.rc), (None, Some(1)));
        assert_eq!(tag.to_string(), "4.3.rc1");
    }

    #[test]
    fn parses_unstable_specs_with_timestamps() {
        assert_eq!(
            VersionSpec::parse("unstable/master:380").unwrap(),
            VersionSpec::Unstable {
                branch: "master".to_string(),
                build: "380".to_string(),
                debug: false
            }
        );
        assert_eq!(
            VersionSpec::parse("unstable/branch-5.4:2020-12-20T00:11:59Z:debug").unwrap(),
            VersionSpec::Unstable {
                branch: "branch-5.4".to_string(),
                build: "2020-12-20T00:11:59Z".to_string(),
                debug: true
            }
        );
    }

    #[test]
    fn parses_local_paths() {
        assert_eq!(
            VersionSpec::parse("/opt/scylla-package.tar.gz").unwrap(),
            VersionSpec::Local {
                path: PathBuf::from("/opt/scylla-package.tar.gz")
            }
        );
        assert!(matches!(
            VersionSpec::parse("./build/scylla-unified.tar.gz").unwrap(),
            VersionSpec::Local { .. }
        ));
    }

    #[test]
    fn rejects_unknown_shapes() {
        for raw in [
            "banana:xyz",
            "release:",
            "release:five",
            "release:5.4:nightly",
            "unstable/master",
            "unstable/:380",
            "unstable/master:",
            "scylla-package.tar.gz",
        ] {
            let err = VersionSpec::parse(raw).unwrap_err();
            assert!(
                matches!(err, RepositoryError::VersionFormat { .. }),
                "{raw}: {err:?}"
            );
        }
    }

    #[test]
    fn release_candidates_sort_before_finals() {
        let rc1 = ReleaseVersion::parse_prefix("5.4.0~rc1-0.2023").unwrap();
        let rc2 = ReleaseVersion::parse_prefix("5.4.0.rc2-0.2023").unwrap();
        let final_ = ReleaseVersion::parse_prefix("5.4.0-0.2024").unwrap();
        let next = ReleaseVersion::parse_prefix("5.4.1-0.2024").unwrap();

        let mut versions = vec![next, final_, rc2, rc1];
        versions.sort();
        assert_eq!(versions, vec![rc1, rc2, final_, next]);
        assert_eq!(rc1.to_string(), "5.4.0~rc1");
        assert!(ReleaseVersion::parse_prefix("x5.4.0").is_none());
    }
}
