//! Slipway Configuration System
//!
//! Provides configuration management for Slipway player builds:
//! - Project configuration (slipway.toml)
//! - Global user configuration (~/.slipway/config.toml)
//! - Environment overrides for tool locations
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.slipway/config.toml)
//! 2. Project config (./slipway.toml)
//! 3. Environment variables (SLIPWAY_*)
//! 4. CLI flags
//!
//! # Example
//!
//! ```no_run
//! use slipway_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! ```

pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

pub use global::{GlobalConfig, ToolsConfig};
pub use loader::{Config, ConfigLoader, ToolPaths, PROJECT_CONFIG_FILE};
pub use project::{AndroidConfig, BuildConfig, ExecutorConfig, PackageConfig, ProjectConfig};
