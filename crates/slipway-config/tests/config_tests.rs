//! Configuration loading, validation and precedence tests

use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use slipway_config::{ConfigError, ConfigLoader, ProjectConfig, PROJECT_CONFIG_FILE};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join(PROJECT_CONFIG_FILE);
    fs::write(&config_path, content).unwrap();
    config_path
}

/// Loader that never reads the real ~/.slipway/config.toml
fn isolated_loader(dir: &Path) -> ConfigLoader {
    ConfigLoader::new().with_global_config_path(dir.join("no-global.toml"))
}

const FULL_PROJECT: &str = r#"
[package]
product_name = "Rooftops"
identifier = "com.example.rooftops"
version_name = "1.2"
version_code = 12

[build]
output = "out"
configuration = "release"
scripting_backend = "il2cpp"
il2cpp_configuration = "master"
sources = ["Assets/Scripts", "Assets/Plugins"]
player_package = "/opt/player/android"

[android]
architectures = ["armv7", "arm64"]
min_api = 21
target_api = 29
orientation = "landscape"
permissions = ["android.permission.VIBRATE"]
target_type = "app-bundle"
export_project = false
sdk = "/opt/android/sdk"
ndk = "/opt/android/ndk"
jdk = "/opt/jdk"

[executor]
path = "/opt/executor/bee"
idle_timeout_secs = 60
poll_interval_ms = 50
max_passes = 4
"#;

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
#[serial]
fn test_load_full_project_config() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), FULL_PROJECT);

    let config = isolated_loader(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(config.is_project());
    assert_eq!(config.product_name(), Some("Rooftops"));
    assert_eq!(config.configuration(), "release");

    let build = config.project.build.as_ref().unwrap();
    assert_eq!(build.sources.len(), 2);
    assert_eq!(build.il2cpp_configuration.as_deref(), Some("master"));

    let android = config.project.android.as_ref().unwrap();
    assert_eq!(android.architectures, vec!["armv7", "arm64"]);
    assert_eq!(android.min_api, Some(21));
    assert_eq!(android.target_type.as_deref(), Some("app-bundle"));

    let executor = config.project.executor.as_ref().unwrap();
    assert_eq!(executor.max_passes, Some(4));
    assert_eq!(executor.idle_timeout_secs, Some(60));
}

#[test]
#[serial]
fn test_load_when_no_config_exists() {
    let temp_dir = TempDir::new().unwrap();

    let config = isolated_loader(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(!config.is_project());
    assert_eq!(config.product_name(), None);
    assert_eq!(config.configuration(), "debug");
}

#[test]
#[serial]
fn test_load_from_subdirectory_finds_parent() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        "[package]\nproduct_name = \"Parent\"\nidentifier = \"com.example.parent\"\n",
    );
    let nested = temp_dir.path().join("Assets").join("Scripts");
    fs::create_dir_all(&nested).unwrap();

    let config = isolated_loader(temp_dir.path())
        .load_from_directory(&nested)
        .unwrap();

    assert_eq!(config.project_root(), Some(temp_dir.path()));
    assert_eq!(config.product_name(), Some("Parent"));
}

#[test]
fn test_package_version_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(
        temp_dir.path(),
        "[package]\nproduct_name = \"Tiny\"\nidentifier = \"com.example.tiny\"\n",
    );

    let config = ProjectConfig::load_from_file(&path).unwrap();
    let package = config.package.unwrap();

    assert_eq!(package.version_name, "1.0");
    assert_eq!(package.version_code, 1);
}

// ============================================================================
// Validation Tests
// ============================================================================

#[rstest]
#[case::unknown_field("[build]\nbackend = \"mono\"\n")]
#[case::bad_toml("[package\nproduct_name = 1")]
fn test_malformed_file_reports_location(#[case] content: &str) {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), content);

    let err = ProjectConfig::load_from_file(&path).unwrap_err();

    match err {
        ConfigError::TomlParseError { file, .. } => assert_eq!(file, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
#[case::configuration("[build]\nconfiguration = \"fastest\"\n", "build.configuration")]
#[case::backend("[build]\nscripting_backend = \"dotnet\"\n", "build.scripting_backend")]
#[case::arch("[android]\narchitectures = [\"x86\"]\n", "android.architectures")]
#[case::target_type("[android]\ntarget_type = \"ipa\"\n", "android.target_type")]
#[case::api_order("[android]\nmin_api = 30\ntarget_api = 29\n", "android.min_api")]
#[case::passes("[executor]\nmax_passes = 0\n", "executor.max_passes")]
#[case::idle_timeout("[executor]\nidle_timeout_secs = 0\n", "executor.idle_timeout_secs")]
#[case::identifier(
    "[package]\nproduct_name = \"X\"\nidentifier = \"not an id\"\n",
    "package.identifier"
)]
fn test_invalid_values_name_the_field(#[case] content: &str, #[case] expected: &str) {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), content);

    let err = ProjectConfig::load_from_file(&path).unwrap_err();

    match err {
        ConfigError::InvalidValue { field, .. } => assert_eq!(field, expected),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_file_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(PROJECT_CONFIG_FILE);

    let err = ProjectConfig::load_from_file(&path).unwrap_err();

    assert!(matches!(err, ConfigError::NotFound(p) if p == path));
}

// ============================================================================
// Precedence Tests
// ============================================================================

#[test]
#[serial]
fn test_project_tools_override_global_tools() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[android]\nsdk = \"/project/sdk\"\n");
    let global = temp_dir.path().join("global.toml");
    fs::write(
        &global,
        "[tools]\nsdk = \"/global/sdk\"\nndk = \"/global/ndk\"\nexecutor = \"/global/bee\"\n",
    )
    .unwrap();

    let config = ConfigLoader::new()
        .with_global_config_path(&global)
        .load_from_directory(temp_dir.path())
        .unwrap();
    let tools = config.tool_paths();

    assert_eq!(tools.sdk, Some(PathBuf::from("/project/sdk")));
    assert_eq!(tools.ndk, Some(PathBuf::from("/global/ndk")));
    assert_eq!(tools.jdk, None);
    assert_eq!(tools.executor, Some(PathBuf::from("/global/bee")));
}

#[test]
#[serial]
fn test_env_overrides_project_values() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), FULL_PROJECT);

    env::set_var("SLIPWAY_EXECUTOR", "/env/bee");
    env::set_var("SLIPWAY_JDK_ROOT", "/env/jdk");
    env::set_var("SLIPWAY_CONFIGURATION", "Develop");
    let result = isolated_loader(temp_dir.path()).load_from_directory(temp_dir.path());
    env::remove_var("SLIPWAY_EXECUTOR");
    env::remove_var("SLIPWAY_JDK_ROOT");
    env::remove_var("SLIPWAY_CONFIGURATION");

    let config = result.unwrap();
    let tools = config.tool_paths();
    assert_eq!(tools.executor, Some(PathBuf::from("/env/bee")));
    assert_eq!(tools.jdk, Some(PathBuf::from("/env/jdk")));
    assert_eq!(tools.sdk, Some(PathBuf::from("/opt/android/sdk")));
    assert_eq!(config.configuration(), "develop");
}

#[test]
#[serial]
fn test_invalid_env_override_rejected() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), FULL_PROJECT);

    env::set_var("SLIPWAY_CONFIGURATION", "Fastest");
    let result = isolated_loader(temp_dir.path()).load_from_directory(temp_dir.path());
    env::remove_var("SLIPWAY_CONFIGURATION");

    assert!(matches!(
        result,
        Err(ConfigError::InvalidValue { ref field, .. }) if field == "build.configuration"
    ));
}
