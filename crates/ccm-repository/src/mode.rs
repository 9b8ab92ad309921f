use crate::component::Component;
use ccm_cache::record;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Build flavour of an installed database package.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Debug,
    Dev,
    #[default]
    Release,
}

impl BuildMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildMode::Debug => "debug",
            BuildMode::Dev => "dev",
            BuildMode::Release => "release",
        }
    }

    /// How long to wait for a node to log that it is up.
    pub fn notice_timeout(self) -> Duration {
        match self {
            BuildMode::Debug => Duration::from_secs(600),
            _ => Duration::from_secs(120),
        }
    }

    /// How long to wait for the CQL binary protocol to start listening.
    pub fn binary_proto_timeout(self) -> Duration {
        match self {
            BuildMode::Debug => Duration::from_secs(900),
            _ => Duration::from_secs(420),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(BuildMode::Debug),
            "dev" => Ok(BuildMode::Dev),
            "release" => Ok(BuildMode::Release),
            other => Err(format!("unknown build mode {other:?}")),
        }
    }
}

/// Infer the build mode from a build tree path or a package location.
///
/// `…/build/<mode>/…` names the mode directly. Otherwise a package file name
/// `scylla[-enterprise][-debug|-dev|-release]-….tar.gz` yields `debug`, `dev`, or `release`.
pub fn extract_mode(path_or_url: &str) -> Option<BuildMode> {
    static BUILD_DIR: OnceLock<regex::Regex> = OnceLock::new();
    static PACKAGE: OnceLock<regex::Regex> = OnceLock::new();

    let build_dir = BUILD_DIR
        .get_or_init(|| regex::Regex::new(r"(^|/)build/(\w+)(/|$)").expect("valid regex"));
    if let Some(caps) = build_dir.captures(path_or_url) {
        return caps[2].parse().ok();
    }

    let package = PACKAGE.get_or_init(|| {
        regex::Regex::new(r"^scylla(?:-enterprise)?(?:-(debug|dev|release))?-[^/]*\.tar\.gz")
            .expect("valid regex")
    });
    let name = path_or_url.rsplit('/').next().unwrap_or(path_or_url);
    let caps = package.captures(name)?;
    Some(match caps.get(1).map(|m| m.as_str()) {
        Some("debug") => BuildMode::Debug,
        Some("dev") => BuildMode::Dev,
        _ => BuildMode::Release,
    })
}

/// Build mode of an installed version directory.
///
/// Reads the recorded origin of the core (or unified) slot and defaults to `release`.
pub fn install_dir_mode(install_dir: &Path) -> BuildMode {
    if let Some(mode) = install_dir.to_str().and_then(extract_mode) {
        return mode;
    }

    [Component::Core, Component::Unified]
        .into_iter()
        .filter_map(|component| record::read_origin(&install_dir.join(component.slot_dir_name())))
        .find_map(|origin| extract_mode(&origin))
        .unwrap_or_default()
}
