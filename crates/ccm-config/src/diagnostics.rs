use serde::de::DeserializeOwned;

/// Non-fatal findings from loading a `ccm.toml`.
///
/// Callers always get a config when deserialization succeeds; these describe what in it was
/// ignored or looks wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiagnostics {
    /// Keys not recognized by the schema, as dotted paths (`repository.overides.core`).
    pub unknown_keys: Vec<String>,
    pub warnings: Vec<ConfigWarning>,
}

impl ConfigDiagnostics {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unknown_keys.is_empty() && self.warnings.is_empty()
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    InvalidValue { toml_path: String, message: String },
    LoggingLevelInvalid { value: String, normalized: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::InvalidValue { toml_path, message } => {
                write!(f, "{toml_path}: {message}")
            }
            ConfigWarning::LoggingLevelInvalid { normalized, .. } => {
                write!(f, "logging.level: invalid filter `{normalized}`, using `info`")
            }
        }
    }
}

pub(crate) fn deserialize_toml_with_unknown_keys<T: DeserializeOwned>(
    text: &str,
) -> Result<(T, Vec<String>), toml::de::Error> {
    let mut unknown = Vec::<String>::new();
    let deserializer = toml::de::Deserializer::new(text);
    let value = serde_ignored::deserialize(deserializer, |path| {
        unknown.push(path.to_string().trim_start_matches('.').to_owned());
    })?;
    unknown.sort();
    unknown.dedup();
    Ok((value, unknown))
}
