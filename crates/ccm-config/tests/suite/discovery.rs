use ccm_config::{discover_config_path, load_with_env, ConfigError};
use std::collections::HashMap;

fn env(pairs: Vec<(&'static str, String)>) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<&'static str, String> = pairs.into_iter().collect();
    move |key| map.get(key).cloned()
}

#[test]
fn discovers_ccm_toml_in_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = env(vec![("CCM_CONFIG_DIR", dir.path().display().to_string())]);
    assert_eq!(discover_config_path(&lookup), None);

    let path = dir.path().join("ccm.toml");
    std::fs::write(&path, "[repository]\nproduct = \"scylla-enterprise\"\n").unwrap();
    assert_eq!(discover_config_path(&lookup), Some(path.clone()));

    let (config, found, diagnostics) = load_with_env(&lookup).unwrap();
    assert_eq!(found, Some(path));
    assert!(diagnostics.is_empty());
    assert_eq!(config.repository.product, "scylla-enterprise");
    assert_eq!(
        config.repository.root.as_deref(),
        Some(dir.path().join("scylla-repository").as_path())
    );
}

#[test]
fn falls_back_to_dot_ccm_under_home() {
    let home = tempfile::tempdir().unwrap();
    std::fs::create_dir(home.path().join(".ccm")).unwrap();
    let path = home.path().join(".ccm").join("ccm.toml");
    std::fs::write(&path, "").unwrap();

    let lookup = env(vec![("HOME", home.path().display().to_string())]);
    assert_eq!(discover_config_path(lookup), Some(path));
}

#[test]
fn explicit_path_wins_and_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ccm.toml"), "").unwrap();
    let explicit = dir.path().join("custom.toml");

    let lookup = env(vec![
        ("CCM_CONFIG_DIR", dir.path().display().to_string()),
        ("CCM_CONFIG_PATH", explicit.display().to_string()),
    ]);
    assert_eq!(discover_config_path(&lookup), Some(explicit.clone()));

    let err = load_with_env(&lookup).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "{err:?}");

    std::fs::write(&explicit, "[repository]\narch = \"x86_64\"\n").unwrap();
    let (config, found, _) = load_with_env(&lookup).unwrap();
    assert_eq!(found.as_deref(), Some(explicit.as_path()));
    assert_eq!(config.repository.arch.as_deref(), Some("x86_64"));
}

#[test]
fn environment_applies_without_a_config_file() {
    let lookup = env(vec![
        ("HOME", "/nonexistent-home".to_owned()),
        ("SCYLLA_UNIFIED_PACKAGE", "/builds/unified.tar.gz".to_owned()),
        ("CCM_S3_ENDPOINT", "http://127.0.0.1:9000".to_owned()),
    ]);
    let (config, found, _) = load_with_env(lookup).unwrap();
    assert_eq!(found, None);
    assert_eq!(config.repository.s3_endpoint, "http://127.0.0.1:9000");
    assert_eq!(
        config.repository.overrides.unified.as_deref(),
        Some("/builds/unified.tar.gz")
    );
}
