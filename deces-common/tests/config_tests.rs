//! Tests for root folder resolution and TOML parsing
//!
//! Tests that touch DECES_ROOT_FOLDER are marked #[serial] so they never race.

use deces_common::config::{
    read_toml_config, CompiledDefaults, RootFolderInitializer, RootFolderResolver, TomlConfig,
    ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();
    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
}

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/deces-from-env");

    let resolver = RootFolderResolver::new("ingest")
        .with_cli_arg(Some(PathBuf::from("/tmp/deces-from-cli")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/deces-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_environment_variable_over_default() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/deces-from-env");

    let resolver = RootFolderResolver::new("ingest");
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/deces-from-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_blank_environment_variable_is_ignored() {
    env::set_var(ROOT_FOLDER_ENV, "   ");

    let resolved = RootFolderResolver::new("ingest").resolve();
    assert_ne!(resolved, PathBuf::from("   "));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
fn test_initializer_creates_layout() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("deces-root");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert!(initializer.work_dir().is_dir());
    assert_eq!(initializer.database_path(), root.join("deces.db"));
}

#[test]
fn test_toml_with_ingest_section() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/deces"

[logging]
level = "debug"

[ingest]
batch_size = 2000
error_ceiling = 50
completion_ratio = 0.95
"#,
    )
    .unwrap();

    let config = read_toml_config(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/deces")));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.ingest.batch_size, Some(2000));
    assert_eq!(config.ingest.error_ceiling, Some(50));
    assert_eq!(config.ingest.completion_ratio, Some(0.95));
    assert_eq!(config.ingest.progress_interval, None);
}

#[test]
fn test_empty_toml_uses_defaults() {
    let config: TomlConfig = toml::from_str("").unwrap();
    assert!(config.root_folder.is_none());
    assert_eq!(config.logging.level, "info");
    assert!(config.ingest.batch_size.is_none());
}

#[test]
fn test_invalid_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "root_folder = [unterminated").unwrap();

    let err = read_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Parse TOML failed"));
}
