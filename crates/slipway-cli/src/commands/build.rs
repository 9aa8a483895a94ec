//! Build command - run both graphs through the executor and report the package

use super::Target;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use slipway_build::{BuildReport, Pipeline, ProgressUpdate};
use slipway_config::{Config, ExecutorConfig};
use std::time::Duration;

/// Progress bar resolution
const BAR_LENGTH: u64 = 1000;

/// Build command arguments
#[derive(Default)]
pub struct BuildArgs {
    pub target: Target,
    /// Maximum executor passes per graph
    pub max_passes: Option<u32>,
    /// Verbose output
    pub verbose: bool,
    /// Quiet output (errors only)
    pub quiet: bool,
    /// JSON output
    pub json: bool,
}

/// Run the build command
pub fn run(args: BuildArgs) -> Result<()> {
    let config = load_config(&args)?;
    let pipeline = Pipeline::from_config(&config).context("Failed to set up build")?;

    let bar = progress_bar(&args)?;
    let result = pipeline.build(&mut |update: &ProgressUpdate| {
        if let Some(fraction) = update.fraction {
            bar.set_position((fraction * BAR_LENGTH as f32) as u64);
        }
        bar.set_message(update.annotation.clone());
        false
    });

    let report = match result {
        Ok(report) => {
            bar.finish_and_clear();
            report
        }
        Err(e) => {
            bar.abandon();
            return Err(e).context("Build failed");
        }
    };

    let configuration = pipeline.settings().profile.name();
    if args.json {
        println!("{}", summary_json(configuration, &report));
    } else if !args.quiet {
        println!("\n{}", "=".repeat(60));
        println!(
            "Build succeeded in {:.2}s",
            report.stats.duration.as_secs_f64()
        );
        println!("{}", "=".repeat(60));
        println!("  Configuration: {}", configuration);
        println!("  Executor passes: {}", report.passes);
        println!("  Actions: {}", report.stats.actions);
        if args.verbose {
            for (kind, count) in &report.stats.kinds {
                println!("    {}: {}", kind, count);
            }
        }
        match &report.package {
            Some(package) if package.built => {
                println!("  Package: {}", package.path.display())
            }
            Some(package) => println!("  Exported project: {}", package.path.display()),
            None => {}
        }
        println!("{}", "=".repeat(60));
    }

    Ok(())
}

/// Project configuration with the command line applied
fn load_config(args: &BuildArgs) -> Result<Config> {
    let mut config = args.target.load()?;
    if let Some(passes) = args.max_passes {
        config
            .project
            .executor
            .get_or_insert_with(ExecutorConfig::default)
            .max_passes = Some(passes);
        config
            .project
            .validate()
            .context("Invalid --max-passes")?;
    }
    Ok(config)
}

fn progress_bar(args: &BuildArgs) -> Result<ProgressBar> {
    if args.quiet || args.json {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(BAR_LENGTH);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {wide_msg}",
        )
        .context("Invalid progress template")?
        .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    Ok(bar)
}

fn summary_json(configuration: &str, report: &BuildReport) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "configuration": configuration,
        "package": report.package.as_ref().map(|p| p.path.display().to_string()),
        "package_built": report.package.as_ref().map(|p| p.built).unwrap_or(false),
        "passes": report.passes,
        "actions": report.stats.actions,
        "action_kinds": report.stats.kinds,
        "total_time": report.stats.duration.as_secs_f64(),
    })
}
