//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{AndroidConfig, BuildConfig, ExecutorConfig, ProjectConfig};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// File name of the project configuration
pub const PROJECT_CONFIG_FILE: &str = "slipway.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.slipway/config.toml) - lowest priority
/// 2. Project config (./slipway.toml) - overrides global
/// 3. Environment variables (SLIPWAY_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
#[derive(Debug)]
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Project root directory (where slipway.toml was found)
    pub project_root: Option<PathBuf>,
}

/// Resolved locations of the external tools a build shells out to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolPaths {
    pub sdk: Option<PathBuf>,
    pub ndk: Option<PathBuf>,
    pub jdk: Option<PathBuf>,
    pub executor: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use an explicit global config file instead of ~/.slipway/config.toml
    pub fn with_global_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find slipway.toml, then loads and merges
    /// global config if it exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;

        let global_config = self.load_global_config().unwrap_or_default();

        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = self.load_global_config().unwrap_or_default();
        let project_config = self.apply_env_overrides(project_config)?;

        let project_root = config_path.parent().map(|p| p.to_path_buf());

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, project_config) or error if not found
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.slipway/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = GlobalConfig::global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        // Global config is optional - if it doesn't exist, return default
        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides to project config
    ///
    /// Recognised variables: SLIPWAY_ANDROID_SDK_ROOT, SLIPWAY_ANDROID_NDK_ROOT,
    /// SLIPWAY_JDK_ROOT, SLIPWAY_EXECUTOR, SLIPWAY_CONFIGURATION
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(sdk) = env::var("SLIPWAY_ANDROID_SDK_ROOT") {
            config.android.get_or_insert_with(AndroidConfig::default).sdk = Some(sdk.into());
        }

        if let Ok(ndk) = env::var("SLIPWAY_ANDROID_NDK_ROOT") {
            config.android.get_or_insert_with(AndroidConfig::default).ndk = Some(ndk.into());
        }

        if let Ok(jdk) = env::var("SLIPWAY_JDK_ROOT") {
            config.android.get_or_insert_with(AndroidConfig::default).jdk = Some(jdk.into());
        }

        if let Ok(executor) = env::var("SLIPWAY_EXECUTOR") {
            config
                .executor
                .get_or_insert_with(ExecutorConfig::default)
                .path = Some(PathBuf::from(executor));
        }

        if let Ok(configuration) = env::var("SLIPWAY_CONFIGURATION") {
            config
                .build
                .get_or_insert_with(BuildConfig::default)
                .configuration = Some(configuration.to_lowercase());
        }

        // Overrides go through the same validation as file contents
        config.validate()?;
        Ok(config)
    }

    /// Get the global configuration directory (~/.slipway)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".slipway"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Get the product name
    pub fn product_name(&self) -> Option<&str> {
        self.project.product_name()
    }

    /// Check if this is a project (has slipway.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Effective build configuration name (project > default "debug")
    pub fn configuration(&self) -> &str {
        self.project
            .build
            .as_ref()
            .and_then(|b| b.configuration.as_deref())
            .unwrap_or("debug")
    }

    /// Tool locations with project settings taking precedence over global ones
    pub fn tool_paths(&self) -> ToolPaths {
        let global = self.global.tools();
        let android = self.project.android.clone().unwrap_or_default();
        let executor = self
            .project
            .executor
            .as_ref()
            .and_then(|e| e.path.clone());

        ToolPaths {
            sdk: android.sdk.or(global.sdk),
            ndk: android.ndk.or(global.ndk),
            jdk: android.jdk.or(global.jdk),
            executor: executor.or(global.executor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(PROJECT_CONFIG_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new().with_global_config_path(dir.join("no-global.toml"))
    }

    #[test]
    #[serial]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[package]
product_name = "Rooftops"
identifier = "com.example.rooftops"
"#,
        );

        let mut loader = isolated_loader(temp_dir.path());
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.product_name(), Some("Rooftops"));
        assert!(config.is_project());
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "");

        let sub_dir = temp_dir.path().join("Assets").join("Scripts");
        fs::create_dir_all(&sub_dir).unwrap();

        let mut loader = isolated_loader(temp_dir.path());
        let config = loader.load_from_directory(&sub_dir).unwrap();

        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    #[serial]
    fn test_no_project_config() {
        let temp_dir = TempDir::new().unwrap();

        let mut loader = isolated_loader(temp_dir.path());
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.product_name(), None);
        assert!(!config.is_project());
        assert_eq!(config.configuration(), "debug");
    }

    #[test]
    #[serial]
    fn test_env_override_ndk() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[android]
ndk = "/from/project"
"#,
        );

        env::set_var("SLIPWAY_ANDROID_NDK_ROOT", "/from/env");

        let mut loader = isolated_loader(temp_dir.path());
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.tool_paths().ndk, Some(PathBuf::from("/from/env")));

        env::remove_var("SLIPWAY_ANDROID_NDK_ROOT");
    }

    #[test]
    #[serial]
    fn test_env_override_configuration_is_validated() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "");

        env::set_var("SLIPWAY_CONFIGURATION", "Fastest");

        let mut loader = isolated_loader(temp_dir.path());
        let result = loader.load_from_directory(temp_dir.path());
        assert!(result.is_err());

        env::remove_var("SLIPWAY_CONFIGURATION");
    }

    #[test]
    #[serial]
    fn test_project_tools_override_global() {
        let temp_dir = TempDir::new().unwrap();
        let global_path = temp_dir.path().join("global.toml");
        fs::write(
            &global_path,
            r#"
[tools]
sdk = "/global/sdk"
jdk = "/global/jdk"
"#,
        )
        .unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[android]
sdk = "/project/sdk"
"#,
        );

        let mut loader = ConfigLoader::new().with_global_config_path(&global_path);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();
        let tools = config.tool_paths();

        assert_eq!(tools.sdk, Some(PathBuf::from("/project/sdk")));
        assert_eq!(tools.jdk, Some(PathBuf::from("/global/jdk")));
        assert_eq!(tools.ndk, None);
    }
}
