//! Project Configuration (slipway.toml)
//!
//! Handles project-level configuration stored in `slipway.toml` at the project root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project configuration from slipway.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Package metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageConfig>,

    /// Build configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,

    /// Android platform settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android: Option<AndroidConfig>,

    /// External executor settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorConfig>,
}

/// Package metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    /// Human readable product name, used for the final package file name
    pub product_name: String,

    /// Application identifier (e.g. "com.example.game")
    pub identifier: String,

    /// Version shown to users
    #[serde(default = "default_version_name")]
    pub version_name: String,

    /// Monotonic store version code
    #[serde(default = "default_version_code")]
    pub version_code: u32,
}

fn default_version_name() -> String {
    "1.0".to_string()
}

fn default_version_code() -> u32 {
    1
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Output directory (default: "build")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Build configuration: debug, develop or release
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,

    /// Scripting backend: mono or il2cpp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scripting_backend: Option<String>,

    /// IL2CPP compiler configuration: debug, release or master
    #[serde(skip_serializing_if = "Option::is_none")]
    pub il2cpp_configuration: Option<String>,

    /// Managed source directories, one assembly per directory
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<PathBuf>,

    /// Player package directory (variations, libs, resources)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_package: Option<PathBuf>,
}

/// Android platform configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct AndroidConfig {
    /// Target CPU architectures ("armv7", "arm64")
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,

    /// Minimum API level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_api: Option<u32>,

    /// Target API level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_api: Option<u32>,

    /// Screen orientation written into the manifest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,

    /// Extra permissions requested by the application
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,

    /// Package kind: apk or app-bundle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,

    /// Export the gradle project instead of building a package
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_project: Option<bool>,

    /// Android SDK root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk: Option<PathBuf>,

    /// Android NDK root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ndk: Option<PathBuf>,

    /// JDK root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jdk: Option<PathBuf>,

    /// Directory holding manifest and gradle templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates: Option<PathBuf>,
}

/// External incremental executor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Path to the executor binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Seconds without output before the executor is considered wedged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,

    /// Poll interval while waiting on the executor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    /// Maximum number of incremental passes before giving up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_passes: Option<u32>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(pkg) = &self.package {
            if pkg.product_name.trim().is_empty() {
                return Err(invalid("package.product_name", "name cannot be empty"));
            }
            if !is_valid_identifier(&pkg.identifier) {
                return Err(invalid(
                    "package.identifier",
                    format!(
                        "'{}' must be a dotted identifier such as com.example.game",
                        pkg.identifier
                    ),
                ));
            }
        }

        if let Some(build) = &self.build {
            if let Some(configuration) = &build.configuration {
                one_of("build.configuration", configuration, &["debug", "develop", "release"])?;
            }
            if let Some(backend) = &build.scripting_backend {
                one_of("build.scripting_backend", backend, &["mono", "il2cpp"])?;
            }
            if let Some(il2cpp) = &build.il2cpp_configuration {
                one_of(
                    "build.il2cpp_configuration",
                    il2cpp,
                    &["debug", "release", "master"],
                )?;
            }
        }

        if let Some(android) = &self.android {
            for arch in &android.architectures {
                one_of("android.architectures", arch, &["armv7", "arm64"])?;
            }
            if let Some(target_type) = &android.target_type {
                one_of("android.target_type", target_type, &["apk", "app-bundle"])?;
            }
            if let Some(orientation) = &android.orientation {
                one_of(
                    "android.orientation",
                    orientation,
                    &["portrait", "landscape", "reverse-landscape", "auto"],
                )?;
            }
            if let (Some(min), Some(target)) = (android.min_api, android.target_api) {
                if min > target {
                    return Err(invalid(
                        "android.min_api",
                        format!("min_api {} is above target_api {}", min, target),
                    ));
                }
            }
        }

        if let Some(executor) = &self.executor {
            if executor.max_passes == Some(0) {
                return Err(invalid("executor.max_passes", "must be at least 1"));
            }
            if executor.poll_interval_ms == Some(0) {
                return Err(invalid("executor.poll_interval_ms", "must be at least 1"));
            }
            if executor.idle_timeout_secs == Some(0) {
                return Err(invalid("executor.idle_timeout_secs", "must be at least 1"));
            }
        }

        Ok(())
    }

    /// Get the product name, if present
    pub fn product_name(&self) -> Option<&str> {
        self.package.as_ref().map(|p| p.product_name.as_str())
    }

    /// Get the application identifier, if present
    pub fn identifier(&self) -> Option<&str> {
        self.package.as_ref().map(|p| p.identifier.as_str())
    }

    /// Merge another project config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &ProjectConfig) {
        if other.package.is_some() {
            self.package = other.package.clone();
        }
        if other.build.is_some() {
            self.build = other.build.clone();
        }
        if other.android.is_some() {
            self.android = other.android.clone();
        }
        if other.executor.is_some() {
            self.executor = other.executor.clone();
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> ConfigResult<()> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(invalid(
        field,
        format!("must be one of {}, got '{}'", allowed.join(", "), value),
    ))
}

/// Dotted application identifier, at least two segments of [A-Za-z0-9_]
fn is_valid_identifier(identifier: &str) -> bool {
    let segments: Vec<&str> = identifier.split('.').collect();
    segments.len() >= 2
        && segments.iter().all(|s| {
            !s.is_empty()
                && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !s.starts_with(|c: char| c.is_ascii_digit())
        })
}
