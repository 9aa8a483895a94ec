use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

mod commands;
mod logger;

/// Slipway player build orchestrator.
///
/// Slipway turns a game project into an installable Android package. Every
/// compile, code generation, copy and packaging task becomes an action in a
/// dependency graph that an external incremental executor runs.
///
/// EXAMPLES:
///     slipway build                    Build with the configured profile
///     slipway build --release          Build a release package
///     slipway graph                    Write the action graph without running it
///     slipway clean                    Remove build artifacts
///
/// ENVIRONMENT VARIABLES:
///     SLIPWAY_JSON              Set to '1' for JSON output by default
///     SLIPWAY_EXECUTOR          Incremental executor binary
///     SLIPWAY_ANDROID_SDK_ROOT  Android SDK location
///     SLIPWAY_ANDROID_NDK_ROOT  Android NDK location
///     SLIPWAY_JDK_ROOT          JDK location
///     SLIPWAY_CONFIGURATION     debug, develop or release
///     NO_COLOR                  Set to disable colored output
#[derive(Parser)]
#[command(name = "slipway")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the player package
    ///
    /// Generates the type database graph and the full player graph, running
    /// each through the executor. The executor may ask for a graph to be
    /// regenerated; that repeats until it succeeds or the pass limit is hit.
    ///
    /// EXAMPLES:
    ///     slipway build                         Build with slipway.toml settings
    ///     slipway build --release               Release configuration
    ///     slipway build --configuration=develop
    ///     slipway build --project ../game --json
    #[command(visible_alias = "b")]
    Build {
        /// Build configuration (debug, develop or release)
        #[arg(long, short = 'c')]
        configuration: Option<String>,
        /// Build the release configuration (shorthand for --configuration=release)
        #[arg(long)]
        release: bool,
        /// Project directory (defaults to the current directory)
        #[arg(long, short = 'p')]
        project: Option<PathBuf>,
        /// Maximum executor passes per graph
        #[arg(long)]
        max_passes: Option<u32>,
        /// Verbose output
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Quiet output (errors only)
        #[arg(long, short = 'q')]
        quiet: bool,
        /// JSON output
        #[arg(long, env = "SLIPWAY_JSON")]
        json: bool,
    },

    /// Generate an action graph without running it
    ///
    /// Writes the graph descriptor to the state directory and prints where
    /// it went and how many actions it holds.
    ///
    /// EXAMPLES:
    ///     slipway graph                 Full player graph
    ///     slipway graph --typedb        Type database graph only
    #[command(visible_alias = "g")]
    Graph {
        /// Generate the type database graph instead of the full graph
        #[arg(long)]
        typedb: bool,
        /// Build configuration (debug, develop or release)
        #[arg(long, short = 'c')]
        configuration: Option<String>,
        /// Project directory (defaults to the current directory)
        #[arg(long, short = 'p')]
        project: Option<PathBuf>,
        /// Verbose output
        #[arg(long, short = 'v')]
        verbose: bool,
        /// JSON output
        #[arg(long, env = "SLIPWAY_JSON")]
        json: bool,
    },

    /// Remove build artifacts for a configuration
    Clean {
        /// Build configuration (debug, develop or release)
        #[arg(long, short = 'c')]
        configuration: Option<String>,
        /// Project directory (defaults to the current directory)
        #[arg(long, short = 'p')]
        project: Option<PathBuf>,
    },

    /// Generate shell completions
    ///
    /// EXAMPLES:
    ///     slipway completions bash > /etc/bash_completion.d/slipway
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            configuration,
            release,
            project,
            max_passes,
            verbose,
            quiet,
            json,
        } => {
            logger::init(logger::level(verbose, quiet || json))?;
            let args = commands::build::BuildArgs {
                target: commands::Target {
                    project,
                    configuration,
                    release,
                },
                max_passes,
                verbose,
                quiet,
                json,
            };
            commands::build::run(args)?;
        }
        Commands::Graph {
            typedb,
            configuration,
            project,
            verbose,
            json,
        } => {
            logger::init(logger::level(verbose, json))?;
            let args = commands::graph::GraphArgs {
                target: commands::Target {
                    project,
                    configuration,
                    release: false,
                },
                typedb,
                json,
            };
            commands::graph::run(args)?;
        }
        Commands::Clean {
            configuration,
            project,
        } => {
            logger::init(logger::level(false, false))?;
            let target = commands::Target {
                project,
                configuration,
                release: false,
            };
            commands::clean::run(target)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }

    Ok(())
}
