use rwsconfig::Config;
use serde_yaml::Value;
use std::fs;
use tempfile::TempDir;

/// Loads a configuration from a fresh temporary directory
fn create_test_config() -> (TempDir, Config) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();
    (temp_dir, config)
}

#[test]
fn test_load_writes_merged_config() {
    let (temp_dir, config) = create_test_config();

    assert!(temp_dir.path().join("config.yaml").exists());
    assert_eq!(config.directory(), temp_dir.path().to_str().unwrap());
    assert_eq!(config.get_log_min_level().unwrap(), "INFO");
    assert_eq!(config.get_import_basename().unwrap(), "relatics_webservice");
    assert!(!config.get_keep_zip_file().unwrap());
    assert_eq!(config.get_user_agent().unwrap(), None);
}

#[test]
fn test_user_file_overrides_defaults() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join("config.yaml"),
        "Relatics:\n  Company_Name: Acme\nimport:\n  keep_zip_file: true\n",
    )
    .unwrap();

    let config = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();

    assert_eq!(
        config.get_value(&["relatics", "company_name"]).unwrap(),
        Value::String("Acme".to_string())
    );
    assert!(config.get_keep_zip_file().unwrap());
    // Defaults not present in the user file survive the merge
    assert_eq!(config.get_import_basename().unwrap(), "relatics_webservice");
    assert_eq!(
        config.get_value(&["relatics", "workspace_id"]).unwrap(),
        Value::String(String::new())
    );
}

#[test]
fn test_set_value_is_persisted() {
    let (temp_dir, config) = create_test_config();

    config.set_user_agent("my-agent/1.0").unwrap();
    config.set_keep_zip_file(true).unwrap();

    let reloaded = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();
    assert_eq!(
        reloaded.get_user_agent().unwrap(),
        Some("my-agent/1.0".to_string())
    );
    assert!(reloaded.get_keep_zip_file().unwrap());
}

#[test]
fn test_get_missing_path_fails() {
    let (_temp_dir, config) = create_test_config();
    assert!(config.get_value(&["relatics", "does_not_exist"]).is_err());
}

#[test]
fn test_env_override() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::env::set_var("RELATICS_CONFIG__HOST__ENV_VALUE", "42");

    let config = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();
    std::env::remove_var("RELATICS_CONFIG__HOST__ENV_VALUE");

    assert_eq!(
        config.get_value(&["host", "env_value"]).unwrap().as_u64(),
        Some(42)
    );
    assert_eq!(
        config.get_scalar_string(&["host", "env_value"]).as_deref(),
        Some("42")
    );
}

#[test]
fn test_scalar_string_renders_numbers_and_booleans() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join("config.yaml"),
        "relatics:\n  workspace_id: 12345\n  user_agent: 7\nimport:\n  basename: 2024\nhost:\n  flag: true\n  empty: \"\"\n  list: [1, 2]\n",
    )
    .unwrap();
    let config = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();

    assert_eq!(
        config.get_scalar_string(&["relatics", "workspace_id"]).as_deref(),
        Some("12345")
    );
    assert_eq!(config.get_scalar_string(&["host", "flag"]).as_deref(), Some("true"));
    assert_eq!(config.get_scalar_string(&["host", "empty"]), None);
    assert_eq!(config.get_scalar_string(&["host", "list"]), None);
    assert_eq!(config.get_scalar_string(&["host", "missing"]), None);

    assert_eq!(config.get_import_basename().unwrap(), "2024");
    assert_eq!(config.get_user_agent().unwrap().as_deref(), Some("7"));
}

#[test]
fn test_managed_dir_is_created_relative_to_config_dir() {
    let (temp_dir, config) = create_test_config();

    let dir = config
        .get_managed_dir(&["host", "documents", "directory"], "documents")
        .unwrap();

    assert_eq!(dir, temp_dir.path().join("documents").to_string_lossy());
    assert!(temp_dir.path().join("documents").is_dir());
}
