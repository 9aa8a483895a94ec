//! Build settings resolved from project configuration

use crate::error::{BuildError, BuildResult};
use crate::profile::BuildProfile;
use serde::{Deserialize, Serialize};
use slipway_config::{Config, ToolPaths};
use std::fmt;
use std::path::{Path, PathBuf};

/// Managed code backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptingBackend {
    #[default]
    Mono,
    Il2Cpp,
}

impl ScriptingBackend {
    pub fn parse(s: &str) -> BuildResult<Self> {
        match s.to_lowercase().as_str() {
            "mono" => Ok(Self::Mono),
            "il2cpp" => Ok(Self::Il2Cpp),
            other => Err(BuildError::InvalidConfiguration(format!(
                "unknown scripting backend '{}'",
                other
            ))),
        }
    }

    /// Tag used in player package paths
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Mono => "mono",
            Self::Il2Cpp => "il2cpp",
        }
    }
}

impl fmt::Display for ScriptingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Native code generation level for IL2CPP output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Il2CppConfiguration {
    Debug,
    #[default]
    Release,
    Master,
}

impl Il2CppConfiguration {
    pub fn parse(s: &str) -> BuildResult<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            "master" => Ok(Self::Master),
            other => Err(BuildError::InvalidConfiguration(format!(
                "unknown il2cpp configuration '{}'",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
            Self::Master => "master",
        }
    }

    /// Compiler flags for this level
    pub fn compiler_flags(&self) -> &'static [&'static str] {
        match self {
            Self::Debug => &["-O0", "-g"],
            Self::Release => &["-O2", "-g"],
            Self::Master => &["-O3", "-flto"],
        }
    }
}

/// Product, profile and location settings shared by every step
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSettings {
    pub product_name: String,
    pub identifier: String,
    pub version_name: String,
    pub version_code: u32,
    pub profile: BuildProfile,
    pub scripting_backend: ScriptingBackend,
    pub il2cpp_configuration: Il2CppConfiguration,
    /// Project root (where slipway.toml lives)
    pub project_root: PathBuf,
    /// Absolute output directory for final packages
    pub output_dir: PathBuf,
    /// Absolute managed source directories, one assembly each
    pub sources: Vec<PathBuf>,
    /// Absolute player package directory
    pub player_package: PathBuf,
    pub tools: ToolPaths,
}

impl BuildSettings {
    /// Resolve settings from loaded configuration
    ///
    /// Relative paths are made absolute against the project root so that
    /// incremental builds do not depend on the current directory.
    pub fn from_config(config: &Config) -> BuildResult<Self> {
        let project_root = match config.project_root() {
            Some(root) => absolute(root)?,
            None => {
                return Err(BuildError::InvalidConfiguration(format!(
                    "no {} found; run from inside a project",
                    slipway_config::PROJECT_CONFIG_FILE
                )))
            }
        };

        let package = config.project.package.as_ref().ok_or_else(|| {
            BuildError::InvalidConfiguration("[package] section is required".to_string())
        })?;
        let build = config.project.build.clone().unwrap_or_default();

        let profile = BuildProfile::from_str(config.configuration())?;
        let scripting_backend = match &build.scripting_backend {
            Some(backend) => ScriptingBackend::parse(backend)?,
            None => ScriptingBackend::default(),
        };
        let il2cpp_configuration = match &build.il2cpp_configuration {
            Some(level) => Il2CppConfiguration::parse(level)?,
            None => Il2CppConfiguration::default(),
        };

        let resolve = |path: &Path| -> PathBuf {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                project_root.join(path)
            }
        };

        let output_dir = resolve(build.output.as_deref().unwrap_or(Path::new("build")));
        let sources = build.sources.iter().map(|s| resolve(s)).collect();
        let player_package = resolve(build.player_package.as_deref().unwrap_or(Path::new("player")));
        let tools = config.tool_paths();
        let tools = ToolPaths {
            sdk: tools.sdk.as_deref().map(resolve),
            ndk: tools.ndk.as_deref().map(resolve),
            jdk: tools.jdk.as_deref().map(resolve),
            executor: tools.executor.as_deref().map(resolve),
        };

        Ok(Self {
            product_name: package.product_name.clone(),
            identifier: package.identifier.clone(),
            version_name: package.version_name.clone(),
            version_code: package.version_code,
            profile,
            scripting_backend,
            il2cpp_configuration,
            project_root: project_root.clone(),
            output_dir,
            sources,
            player_package,
            tools,
        })
    }

    /// Per-configuration state directory holding graphs, logs and artifacts
    pub fn state_dir(&self) -> PathBuf {
        self.project_root
            .join(".slipway")
            .join(self.profile.name())
    }

    /// Root of intermediate build artifacts
    pub fn artifacts_dir(&self) -> PathBuf {
        self.state_dir().join("artifacts")
    }

    pub fn uses_il2cpp(&self) -> bool {
        self.scripting_backend == ScriptingBackend::Il2Cpp
    }

    /// Product name usable as a file name
    pub fn safe_product_name(&self) -> String {
        self.product_name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect()
    }
}

/// Make a path absolute against the current directory
pub fn absolute(path: &Path) -> BuildResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| BuildError::io(".", e))?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_config::{BuildConfig, PackageConfig, ProjectConfig};

    fn config(build: BuildConfig) -> Config {
        Config {
            project: ProjectConfig {
                package: Some(PackageConfig {
                    product_name: "Roof: Tops".to_string(),
                    identifier: "com.example.rooftops".to_string(),
                    version_name: "1.2".to_string(),
                    version_code: 12,
                }),
                build: Some(build),
                ..Default::default()
            },
            global: Default::default(),
            project_root: Some(PathBuf::from("/projects/rooftops")),
        }
    }

    #[test]
    fn test_paths_resolved_against_project_root() {
        let settings = BuildSettings::from_config(&config(BuildConfig {
            sources: vec![PathBuf::from("Assets/Scripts")],
            ..Default::default()
        }))
        .unwrap();

        assert_eq!(settings.output_dir, PathBuf::from("/projects/rooftops/build"));
        assert_eq!(
            settings.sources,
            vec![PathBuf::from("/projects/rooftops/Assets/Scripts")]
        );
        assert_eq!(
            settings.artifacts_dir(),
            PathBuf::from("/projects/rooftops/.slipway/debug/artifacts")
        );
    }

    #[test]
    fn test_relative_tool_paths_resolved() {
        let mut config = config(BuildConfig::default());
        config.project.android = Some(slipway_config::AndroidConfig {
            sdk: Some(PathBuf::from("tools/sdk")),
            ndk: Some(PathBuf::from("/opt/ndk")),
            ..Default::default()
        });

        let settings = BuildSettings::from_config(&config).unwrap();

        assert_eq!(settings.tools.sdk, Some(PathBuf::from("/projects/rooftops/tools/sdk")));
        assert_eq!(settings.tools.ndk, Some(PathBuf::from("/opt/ndk")));
        assert_eq!(settings.tools.jdk, None);
    }

    #[test]
    fn test_backend_and_profile_parsed() {
        let settings = BuildSettings::from_config(&config(BuildConfig {
            configuration: Some("release".to_string()),
            scripting_backend: Some("il2cpp".to_string()),
            il2cpp_configuration: Some("master".to_string()),
            ..Default::default()
        }))
        .unwrap();

        assert_eq!(settings.profile, BuildProfile::Release);
        assert!(settings.uses_il2cpp());
        assert_eq!(settings.il2cpp_configuration, Il2CppConfiguration::Master);
    }

    #[test]
    fn test_missing_package_rejected() {
        let mut cfg = config(BuildConfig::default());
        cfg.project.package = None;
        assert!(BuildSettings::from_config(&cfg).is_err());
    }

    #[test]
    fn test_safe_product_name() {
        let settings = BuildSettings::from_config(&config(BuildConfig::default())).unwrap();
        assert_eq!(settings.safe_product_name(), "Roof_ Tops");
    }
}
