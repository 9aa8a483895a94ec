//! Global Configuration (~/.slipway/config.toml)
//!
//! Handles user-level configuration stored in `~/.slipway/config.toml`.
//! Mostly tool locations shared by every project on the machine.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.slipway/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default tool locations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsConfig>,
}

/// Tool locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Android SDK root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk: Option<PathBuf>,

    /// Android NDK root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ndk: Option<PathBuf>,

    /// JDK root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jdk: Option<PathBuf>,

    /// Incremental executor binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(tools) = &self.tools {
            for (field, path) in [
                ("tools.sdk", &tools.sdk),
                ("tools.ndk", &tools.ndk),
                ("tools.jdk", &tools.jdk),
                ("tools.executor", &tools.executor),
            ] {
                if let Some(path) = path {
                    if path.as_os_str().is_empty() {
                        return Err(ConfigError::InvalidValue {
                            field: field.to_string(),
                            reason: "path cannot be empty".to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Get the global config file path (~/.slipway/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".slipway").join("config.toml"))
    }

    /// Tool defaults, empty when the section is absent
    pub fn tools(&self) -> ToolsConfig {
        self.tools.clone().unwrap_or_default()
    }

    /// Merge another global config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &GlobalConfig) {
        if other.tools.is_some() {
            self.tools = other.tools.clone();
        }
    }
}
