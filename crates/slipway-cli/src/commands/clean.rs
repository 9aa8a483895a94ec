//! Clean command - remove the artifacts of one configuration

use super::Target;
use anyhow::{Context, Result};
use slipway_build::Pipeline;

pub fn run(target: Target) -> Result<()> {
    let config = target.load()?;
    let pipeline = Pipeline::from_config(&config).context("Failed to set up build")?;
    let artifacts = pipeline.settings().artifacts_dir();

    if pipeline.clean().context("Failed to clean build artifacts")? {
        println!("Removed {}", artifacts.display());
    } else {
        println!("Nothing to clean");
    }
    Ok(())
}
