//! Stderr logger for library diagnostics
//!
//! Warnings and errors are always shown; `--verbose` adds per-step and
//! per-action detail. Colors follow `colored`'s NO_COLOR handling.

use anyhow::Result;
use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "error".red().bold(),
            Level::Warn => "warning".yellow().bold(),
            Level::Info => "info".green(),
            Level::Debug => "debug".blue(),
            Level::Trace => "trace".dimmed(),
        };
        eprintln!("{}: {}", tag, record.args());
    }

    fn flush(&self) {}
}

/// Level for the given output flags
pub fn level(verbose: bool, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Install the logger for this process
pub fn init(level: LevelFilter) -> Result<()> {
    log::set_boxed_logger(Box::new(StderrLogger { level }))
        .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;
    log::set_max_level(level);
    Ok(())
}
