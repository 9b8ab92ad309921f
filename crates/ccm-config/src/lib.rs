//! `ccm.toml` configuration, environment overrides and `tracing` setup for the ccm tooling.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML file, the environment
//! (see [`CcmConfig::apply_env`]). Command-line flags are layered on top by the binary.

mod diagnostics;
mod logging;

use ccm_cache::{PackageSource, RepositoryDir, DEFAULT_S3_ENDPOINT, REPOSITORY_DIR_NAME};
use ccm_repository::{Component, ComponentOverrides, DEFAULT_BUCKET, DEFAULT_PRODUCT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

pub use diagnostics::{ConfigDiagnostics, ConfigWarning};
pub use logging::init_tracing;

/// Explicit config file path; wins over discovery.
pub const CONFIG_PATH_ENV_VAR: &str = "CCM_CONFIG_PATH";
/// ccm configuration directory (`~/.ccm` by default).
pub const CONFIG_DIR_ENV_VAR: &str = "CCM_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "ccm.toml";

/// Top-level `ccm.toml` document.
///
/// ```toml
/// [logging]
/// level = "info"
/// json = false
///
/// [repository]
/// product = "scylla"
/// bucket = "downloads.scylladb.com"
///
/// [repository.overrides]
/// core = "~/src/scylla/build/release/dist/tar/scylla-package.tar.gz"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CcmConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file. Logging to the other sinks continues if it cannot be opened.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter: the configured level, with `RUST_LOG` merged in when set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        self.env_filter_with(std::env::var("RUST_LOG").ok().as_deref())
    }

    pub fn env_filter_with(&self, rust_log: Option<&str>) -> tracing_subscriber::EnvFilter {
        let env_directives = rust_log.map(str::trim).filter(|value| !value.is_empty());
        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

/// Where packages are looked up and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository root. Defaults to `$CCM_CONFIG_DIR/scylla-repository`.
    #[serde(default)]
    pub root: Option<PathBuf>,

    #[serde(default = "RepositoryConfig::default_product")]
    pub product: String,

    /// Target architecture. Defaults to the host's.
    #[serde(default)]
    pub arch: Option<String>,

    #[serde(default = "RepositoryConfig::default_bucket")]
    pub bucket: String,

    #[serde(default = "RepositoryConfig::default_s3_endpoint")]
    pub s3_endpoint: String,

    #[serde(default)]
    pub overrides: OverridesConfig,
}

impl RepositoryConfig {
    fn default_product() -> String {
        DEFAULT_PRODUCT.to_owned()
    }

    fn default_bucket() -> String {
        DEFAULT_BUCKET.to_owned()
    }

    fn default_s3_endpoint() -> String {
        DEFAULT_S3_ENDPOINT.to_owned()
    }

    /// The configured root, or the `CCM_CONFIG_DIR` / `~/.ccm` default.
    pub fn repository_dir(&self) -> Result<RepositoryDir, ccm_cache::CacheError> {
        match &self.root {
            Some(root) => Ok(RepositoryDir::new(root)),
            None => RepositoryDir::from_env(),
        }
    }

    /// Parse the configured per-component package overrides.
    pub fn component_overrides(&self) -> Result<ComponentOverrides, ConfigError> {
        let mut overrides = ComponentOverrides::new();
        for (component, raw) in self.overrides.entries() {
            let source = PackageSource::parse(raw).map_err(|err| ConfigError::InvalidValue {
                toml_path: format!("repository.overrides.{component}"),
                message: err.to_string(),
            })?;
            overrides.set(component, source);
        }
        Ok(overrides)
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: None,
            product: Self::default_product(),
            arch: None,
            bucket: Self::default_bucket(),
            s3_endpoint: Self::default_s3_endpoint(),
            overrides: OverridesConfig::default(),
        }
    }
}

/// Package locations (`s3://`, `http(s)://` or a local path) replacing resolved components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverridesConfig {
    #[serde(default)]
    pub core: Option<String>,
    #[serde(default)]
    pub tools: Option<String>,
    #[serde(default)]
    pub jmx: Option<String>,
    #[serde(default)]
    pub unified: Option<String>,
}

impl OverridesConfig {
    pub fn get(&self, component: Component) -> Option<&str> {
        let value = match component {
            Component::Core => &self.core,
            Component::Tools => &self.tools,
            Component::Jmx => &self.jmx,
            Component::Unified => &self.unified,
        };
        value.as_deref()
    }

    pub fn set(&mut self, component: Component, value: impl Into<String>) {
        let slot = match component {
            Component::Core => &mut self.core,
            Component::Tools => &mut self.tools,
            Component::Jmx => &mut self.jmx,
            Component::Unified => &mut self.unified,
        };
        *slot = Some(value.into());
    }

    /// Non-empty overrides in component order.
    pub fn entries(&self) -> impl Iterator<Item = (Component, &str)> {
        Component::ALL.into_iter().filter_map(|component| {
            self.get(component)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| (component, value))
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid value for {toml_path}: {message}")]
    InvalidValue { toml_path: String, message: String },
}

fn sanitize_toml_error_message(message: &str) -> String {
    // Values echoed back by serde may be credentials (`s3_endpoint`, override URLs).
    static QUOTED_STRING_RE: OnceLock<regex::Regex> = OnceLock::new();
    static SINGLE_QUOTED_STRING_RE: OnceLock<regex::Regex> = OnceLock::new();

    let re = QUOTED_STRING_RE
        .get_or_init(|| regex::Regex::new(r#""(?:\\.|[^"\\])*""#).expect("valid regex"));
    let out = re.replace_all(message, r#""<redacted>""#);
    let re_single = SINGLE_QUOTED_STRING_RE
        .get_or_init(|| regex::Regex::new(r"'(?:\\.|[^'\\])*'").expect("valid regex"));
    let mut out = re_single.replace_all(&out, "'<redacted>'").into_owned();

    // `unknown variant `x``, `invalid type: string `x``: the backticked value is user input.
    // `missing field `x`` names a schema field and is kept.
    if out.contains("invalid type:") || out.contains("invalid value:") {
        let boundary = out.find(", expected").unwrap_or(out.len());
        if let Some(start) = out[..boundary].find('`') {
            if let Some(end_rel) = out[start + 1..boundary].rfind('`') {
                out.replace_range(start + 1..start + 1 + end_rel, "<redacted>");
            }
        }
    }

    out
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // `Display` would include a snippet of the raw input.
        ConfigError::Toml(sanitize_toml_error_message(err.message()))
    }
}

impl CcmConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = read_config(path.as_ref())?;
        Ok(toml::from_str(&text)?)
    }

    /// Load a config file and report unknown keys and suspicious values.
    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_from_str_with_diagnostics(&text)
    }

    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<CcmConfig>(text)?;
        let diagnostics = ConfigDiagnostics {
            unknown_keys,
            warnings: config.validate(),
        };
        Ok((config, diagnostics))
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Empty values are ignored. `SCYLLA_JAVA_TOOLS_PACKAGE` is accepted as a legacy spelling of
    /// `SCYLLA_TOOLS_JAVA_PACKAGE`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let repository = &mut self.repository;

        if let Some(dir) = get(CONFIG_DIR_ENV_VAR) {
            repository.root = Some(PathBuf::from(dir).join(REPOSITORY_DIR_NAME));
        }
        if let Some(product) = get("SCYLLA_PRODUCT") {
            repository.product = product;
        }
        if let Some(arch) = get("SCYLLA_ARCH") {
            repository.arch = Some(arch);
        }
        if let Some(endpoint) = get("CCM_S3_ENDPOINT") {
            repository.s3_endpoint = endpoint;
        }

        let overrides = [
            (Component::Unified, get("SCYLLA_UNIFIED_PACKAGE")),
            (Component::Core, get("SCYLLA_CORE_PACKAGE")),
            (
                Component::Tools,
                get("SCYLLA_TOOLS_JAVA_PACKAGE").or_else(|| get("SCYLLA_JAVA_TOOLS_PACKAGE")),
            ),
            (Component::Jmx, get("SCYLLA_JMX_PACKAGE")),
        ];
        for (component, value) in overrides {
            if let Some(value) = value {
                tracing::debug!(
                    target: "ccm.config",
                    %component,
                    "package override taken from the environment"
                );
                repository.overrides.set(component, value);
            }
        }
    }

    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let normalized = LoggingConfig::normalize_level_directives(&self.logging.level);
        if tracing_subscriber::EnvFilter::try_new(&normalized).is_err() {
            warnings.push(ConfigWarning::LoggingLevelInvalid {
                value: self.logging.level.clone(),
                normalized,
            });
        }

        let repository = &self.repository;
        if repository.product.trim().is_empty() {
            warnings.push(ConfigWarning::InvalidValue {
                toml_path: "repository.product".to_owned(),
                message: "must not be empty".to_owned(),
            });
        }
        if let Some(arch) = &repository.arch {
            if !matches!(arch.as_str(), "x86_64" | "aarch64") {
                warnings.push(ConfigWarning::InvalidValue {
                    toml_path: "repository.arch".to_owned(),
                    message: "expected `x86_64` or `aarch64`".to_owned(),
                });
            }
        }
        let endpoint = repository.s3_endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            warnings.push(ConfigWarning::InvalidValue {
                toml_path: "repository.s3_endpoint".to_owned(),
                message: "expected an http:// or https:// URL".to_owned(),
            });
        }
        for (component, raw) in repository.overrides.entries() {
            if let Err(err) = PackageSource::parse(raw) {
                warnings.push(ConfigWarning::InvalidValue {
                    toml_path: format!("repository.overrides.{component}"),
                    message: err.to_string(),
                });
            }
        }

        warnings
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Locate the config file.
///
/// Search order:
/// 1) `CCM_CONFIG_PATH`
/// 2) `ccm.toml` in `CCM_CONFIG_DIR`
/// 3) `~/.ccm/ccm.toml`
///
/// An explicit `CCM_CONFIG_PATH` is returned even when the file does not exist, so that loading
/// reports it instead of silently using defaults.
pub fn discover_config_path(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    if let Some(path) = get(CONFIG_PATH_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    let config_dir = match get(CONFIG_DIR_ENV_VAR) {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(get("HOME").or_else(|| get("USERPROFILE"))?).join(".ccm"),
    };
    Some(config_dir.join(CONFIG_FILE_NAME)).filter(|path| path.is_file())
}

/// Discover, load and apply the environment on top.
///
/// Without a config file this is [`CcmConfig::default`] plus the environment.
pub fn load_with_env(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(CcmConfig, Option<PathBuf>, ConfigDiagnostics), ConfigError> {
    let path = discover_config_path(&lookup);
    let (mut config, diagnostics) = match &path {
        Some(path) => CcmConfig::load_from_path_with_diagnostics(path)?,
        None => (CcmConfig::default(), ConfigDiagnostics::default()),
    };
    config.apply_env(&lookup);
    Ok((config, path, diagnostics))
}
