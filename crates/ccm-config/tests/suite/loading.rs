use ccm_config::{CcmConfig, ConfigError, ConfigWarning};
use std::path::Path;

#[test]
fn empty_document_yields_defaults() {
    let (config, diagnostics) = CcmConfig::load_from_str_with_diagnostics("").unwrap();
    assert_eq!(config, CcmConfig::default());
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(config.repository.product, "scylla");
    assert_eq!(config.repository.bucket, "downloads.scylladb.com");
    assert_eq!(config.repository.s3_endpoint, "https://s3.amazonaws.com");
    assert!(config.logging.stderr);
}

#[test]
fn full_document_is_parsed() {
    let text = r#"
[logging]
level = "debug"
json = true
stderr = false
file = "/var/log/ccm.log"

[repository]
root = "/data/repo"
product = "scylla-enterprise"
arch = "aarch64"
bucket = "mirror"
s3_endpoint = "http://127.0.0.1:9000"

[repository.overrides]
core = "s3://mirror/core.tar.gz"
tools = "https://example.com/tools.tar.gz"
"#;

    let (config, diagnostics) = CcmConfig::load_from_str_with_diagnostics(text).unwrap();
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
    assert_eq!(config.logging.file.as_deref(), Some(Path::new("/var/log/ccm.log")));
    assert_eq!(
        config.repository.repository_dir().unwrap().root(),
        Path::new("/data/repo")
    );
    assert_eq!(config.repository.bucket, "mirror");

    let overrides = config.repository.component_overrides().unwrap();
    assert_eq!(overrides.iter().count(), 2);
}

#[test]
fn unknown_keys_are_diagnostics_not_errors() {
    let text = r#"
verbose = true

[repository]
prodcut = "scylla"

[repository.overrides]
coer = "/tmp/core.tar.gz"
"#;

    let (config, diagnostics) = CcmConfig::load_from_str_with_diagnostics(text).unwrap();
    assert_eq!(config.repository.product, "scylla");
    assert_eq!(
        diagnostics.unknown_keys,
        vec![
            "repository.overrides.coer",
            "repository.prodcut",
            "verbose"
        ]
    );
}

#[test]
fn suspicious_values_are_reported_as_warnings() {
    let text = r#"
[logging]
level = "ccm.cache=loud"

[repository]
arch = "sparc"
s3_endpoint = "s3.amazonaws.com"

[repository.overrides]
jmx = "s3://bucket-without-key"
"#;

    let (_config, diagnostics) = CcmConfig::load_from_str_with_diagnostics(text).unwrap();
    let paths: Vec<String> = diagnostics
        .warnings
        .iter()
        .map(|warning| match warning {
            ConfigWarning::InvalidValue { toml_path, .. } => toml_path.clone(),
            ConfigWarning::LoggingLevelInvalid { .. } => "logging.level".to_owned(),
            other => panic!("unexpected warning: {other:?}"),
        })
        .collect();
    assert_eq!(
        paths,
        vec![
            "logging.level",
            "repository.arch",
            "repository.s3_endpoint",
            "repository.overrides.jmx"
        ]
    );
}

#[test]
fn type_errors_are_sanitized() {
    let text = "[repository]\nbucket = 42\nproduct = \"s3cr3t\"\n";
    let err = CcmConfig::load_from_str_with_diagnostics(text).unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)), "{err:?}");

    let text = "[logging]\nstderr = \"s3cr3t\"\n";
    let message = CcmConfig::load_from_str_with_diagnostics(text)
        .unwrap_err()
        .to_string();
    assert!(!message.contains("s3cr3t"), "{message}");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = CcmConfig::load_from_path(dir.path().join("ccm.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "{err:?}");
}
