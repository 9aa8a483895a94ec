//! Incremental execution driver
//!
//! Hands a written graph descriptor to the external executor and interprets
//! the result. Exit code 0 ends the build, [`RERUN_FRONTEND_EXIT_CODE`] asks
//! the frontend to regenerate the graph and go again, anything else is fatal.

use crate::action::quote_arg;
use crate::descriptor::backup_pass_file;
use crate::error::{BuildError, BuildResult};
use crate::process::{
    debugger_attached, LaunchRequest, Launcher, MonitorState, ProcessExit, ProcessMonitor,
    SystemLauncher,
};
use crate::progress::{truncate_output, ProgressParser, ProgressUpdate};
use log::info;
use slipway_config::ExecutorConfig;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exit code meaning "inputs changed, regenerate the graph and run again"
pub const RERUN_FRONTEND_EXIT_CODE: i32 = 4;

/// Executor log written beside the descriptor
pub const EXECUTOR_LOG_FILE: &str = "executor.log.json";

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_PASSES: u32 = 8;

/// Receives progress while the executor runs
pub trait ProgressSink {
    /// Called after every poll; return `true` to cancel the run
    fn update(&mut self, progress: &ProgressUpdate) -> bool;
}

impl<F: FnMut(&ProgressUpdate) -> bool> ProgressSink for F {
    fn update(&mut self, progress: &ProgressUpdate) -> bool {
        self(progress)
    }
}

/// Sink that ignores progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&mut self, _progress: &ProgressUpdate) -> bool {
        false
    }
}

/// Executor location and watchdog settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSettings {
    pub executor: PathBuf,
    /// Absolute working directory passed to the executor
    pub working_dir: PathBuf,
    pub idle_timeout: Duration,
    pub poll_interval: Duration,
    /// Executor invocations allowed per graph before giving up
    pub max_passes: u32,
    pub env: BTreeMap<String, String>,
}

impl DriverSettings {
    pub fn new(executor: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor: executor.into(),
            working_dir: working_dir.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_passes: DEFAULT_MAX_PASSES,
            env: BTreeMap::new(),
        }
    }

    /// Apply `[executor]` settings on top of the defaults
    pub fn with_config(mut self, config: &ExecutorConfig) -> Self {
        if let Some(secs) = config.idle_timeout_secs {
            self.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = config.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(passes) = config.max_passes {
            self.max_passes = passes;
        }
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_passes(mut self, passes: u32) -> Self {
        self.max_passes = passes;
        self
    }
}

/// Command line for one executor pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ExecutorInvocation {
    pub fn new(program: &Path, dag: &Path, pass: u32, working_dir: &Path) -> Self {
        let stem = file_stem(dag);
        let profile = dag_dir(dag).join(format!("profile_{}{}.json", stem, pass));
        Self {
            program: program.to_path_buf(),
            args: vec![
                "-R".to_string(),
                dag.display().to_string(),
                format!("--profile={}", profile.display()),
                format!("--working-dir={}", working_dir.display()),
            ],
        }
    }

    /// Shell command reproducing this invocation
    pub fn command_line(&self) -> String {
        let mut parts = vec![quote_arg(&self.program.display().to_string())];
        parts.extend(self.args.iter().map(|a| quote_arg(a)));
        parts.join(" ")
    }

    /// Write `run_<stem>.sh` beside the descriptor
    pub fn write_script(&self, dag: &Path) -> BuildResult<PathBuf> {
        let script = dag_dir(dag).join(format!("run_{}.sh", file_stem(dag)));
        fs::write(&script, format!("{}\n", self.command_line()))
            .map_err(|e| BuildError::io(&script, e))?;
        Ok(script)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn dag_dir(dag: &Path) -> &Path {
    dag.parent().unwrap_or_else(|| Path::new("."))
}

/// Result of driving one graph to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveReport {
    /// Executor invocations made
    pub invocations: u32,
    /// Pass number of the last invocation
    pub final_pass: u32,
}

/// Runs the executor until it succeeds, fails, or stops asking for reruns
pub struct IncrementalDriver {
    launcher: Box<dyn Launcher>,
    settings: DriverSettings,
    parser: ProgressParser,
    debugger_check: fn() -> bool,
}

impl IncrementalDriver {
    pub fn new(launcher: Box<dyn Launcher>, settings: DriverSettings) -> BuildResult<Self> {
        Ok(Self {
            launcher,
            settings,
            parser: ProgressParser::new()?,
            debugger_check: debugger_attached,
        })
    }

    /// Driver spawning real processes
    pub fn system(settings: DriverSettings) -> BuildResult<Self> {
        Self::new(Box::new(SystemLauncher), settings)
    }

    /// Replace the debugger check used by the idle watchdog
    pub fn with_debugger_check(mut self, check: fn() -> bool) -> Self {
        self.debugger_check = check;
        self
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Drive `dag` starting at `first_pass`
    ///
    /// On the rerun sentinel, `regenerate(next_pass)` must rewrite the
    /// descriptor at `dag` before the executor is started again.
    pub fn run(
        &self,
        dag: &Path,
        first_pass: u32,
        regenerate: &mut dyn FnMut(u32) -> BuildResult<()>,
        sink: &mut dyn ProgressSink,
    ) -> BuildResult<DriveReport> {
        let mut pass = first_pass;
        let mut invocations = 0;

        loop {
            invocations += 1;
            let (exit, output) = self.run_pass(dag, pass, sink)?;

            match exit.code {
                Some(0) => {
                    info!(
                        "{} finished after {} executor run(s)",
                        dag.display(),
                        invocations
                    );
                    return Ok(DriveReport {
                        invocations,
                        final_pass: pass,
                    });
                }
                Some(RERUN_FRONTEND_EXIT_CODE) => {
                    if invocations >= self.settings.max_passes {
                        return Err(BuildError::PassLimitExceeded {
                            passes: invocations,
                        });
                    }
                    info!("executor requested a graph rerun (pass {})", pass + 1);
                    regenerate(pass + 1)?;
                    pass += 1;
                }
                code => {
                    return Err(BuildError::ExecutorFailed {
                        code,
                        output: truncate_output(&output),
                    })
                }
            }
        }
    }

    fn run_pass(
        &self,
        dag: &Path,
        pass: u32,
        sink: &mut dyn ProgressSink,
    ) -> BuildResult<(ProcessExit, String)> {
        let invocation =
            ExecutorInvocation::new(&self.settings.executor, dag, pass, &self.settings.working_dir);
        invocation.write_script(dag)?;
        backup_pass_file(&dag_dir(dag).join(EXECUTOR_LOG_FILE), pass)?;

        let process = self.launcher.launch(&LaunchRequest {
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            working_dir: self.settings.working_dir.clone(),
            env: self.settings.env.clone(),
        })?;

        let mut monitor =
            ProcessMonitor::new(process, self.settings.idle_timeout, self.settings.poll_interval)
                .with_debugger_check(self.debugger_check);
        let mut progress = ProgressUpdate {
            fraction: None,
            annotation: String::new(),
        };

        loop {
            for line in monitor.poll()? {
                if let Some(update) = self.parser.parse_line(&line) {
                    if update.fraction.is_some() {
                        progress.fraction = update.fraction;
                    }
                    progress.annotation = update.annotation;
                }
            }

            match monitor.state() {
                MonitorState::Done(exit) => return Ok((exit, monitor.into_output())),
                MonitorState::Killed => {
                    return Err(BuildError::ExecutorIdle {
                        idle: self.settings.idle_timeout,
                    })
                }
                MonitorState::Cancelled => return Err(BuildError::ExecutorCancelled),
                MonitorState::Running | MonitorState::IdleWarning => {}
            }

            if sink.update(&progress) {
                monitor.cancel()?;
                return Err(BuildError::ExecutorCancelled);
            }
        }
    }
}
