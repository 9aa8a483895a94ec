pub mod build;
pub mod clean;
pub mod graph;

use anyhow::{bail, Context, Result};
use slipway_config::{BuildConfig, Config, ConfigLoader, PROJECT_CONFIG_FILE};
use std::path::PathBuf;

/// Which project and configuration a command works on
#[derive(Debug, Default, Clone)]
pub struct Target {
    /// Project directory (defaults to the current directory)
    pub project: Option<PathBuf>,
    /// Configuration override from the command line
    pub configuration: Option<String>,
    /// Shorthand for `configuration = "release"`; takes priority
    pub release: bool,
}

impl Target {
    /// Configuration name requested on the command line, if any
    pub fn configuration_override(&self) -> Option<String> {
        if self.release {
            Some("release".to_string())
        } else {
            self.configuration.as_ref().map(|c| c.to_lowercase())
        }
    }

    /// Load project configuration with command line overrides applied last
    pub fn load(&self) -> Result<Config> {
        let start = match &self.project {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };

        let mut config = ConfigLoader::new()
            .load_from_directory(&start)
            .with_context(|| format!("Failed to load configuration from {}", start.display()))?;
        if !config.is_project() {
            bail!(
                "no {} found in {} or any parent directory",
                PROJECT_CONFIG_FILE,
                start.display()
            );
        }

        if let Some(configuration) = self.configuration_override() {
            config
                .project
                .build
                .get_or_insert_with(BuildConfig::default)
                .configuration = Some(configuration);
            config
                .project
                .validate()
                .context("Invalid command line configuration")?;
        }
        Ok(config)
    }
}
