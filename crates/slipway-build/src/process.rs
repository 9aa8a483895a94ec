//! Child process launching and liveness monitoring
//!
//! The executor runs as a child process. Its stdout and stderr are read on
//! dedicated threads and forwarded line by line over a channel; the build
//! thread drives a [`ProcessMonitor`] that waits on that channel with a
//! timeout, so progress callbacks keep running while the child is busy.

use crate::error::{BuildError, BuildResult};
use log::{debug, error, warn};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Handle on a running child
pub trait ChildHandle: Send {
    /// Non-blocking exit check
    fn try_wait(&mut self) -> BuildResult<Option<ProcessExit>>;

    /// Terminate the child
    fn kill(&mut self) -> BuildResult<()>;
}

/// What to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
}

/// A started child plus its merged output lines
pub struct LaunchedProcess {
    pub child: Box<dyn ChildHandle>,
    pub output: Receiver<String>,
}

/// Starts child processes
pub trait Launcher {
    fn launch(&self, request: &LaunchRequest) -> BuildResult<LaunchedProcess>;
}

/// Launcher backed by `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

struct SystemChild {
    child: Child,
}

impl ChildHandle for SystemChild {
    fn try_wait(&mut self) -> BuildResult<Option<ProcessExit>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| ProcessExit { code: status.code() }))
    }

    fn kill(&mut self) -> BuildResult<()> {
        match self.child.kill() {
            Ok(()) => {
                // Reap to avoid leaving a zombie behind
                let _ = self.child.wait();
                Ok(())
            }
            // Already exited
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn forward_lines(stream: impl Read + Send + 'static, tx: Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    // Tool output is not guaranteed to be UTF-8
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("stopped reading child output: {}", e);
                    break;
                }
            }
        }
    });
}

impl Launcher for SystemLauncher {
    fn launch(&self, request: &LaunchRequest) -> BuildResult<LaunchedProcess> {
        if !request.program.is_file() {
            return Err(BuildError::missing_tool(
                request.program.display().to_string(),
                "executable not found",
            ));
        }

        debug!(
            "starting {} {}",
            request.program.display(),
            request.args.join(" ")
        );

        let mut child = Command::new(&request.program)
            .args(&request.args)
            .current_dir(&request.working_dir)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuildError::io(&request.program, e))?;

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx);
        }

        Ok(LaunchedProcess {
            child: Box::new(SystemChild { child }),
            output: rx,
        })
    }
}

/// Monitor states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    /// Quiet for at least half the idle threshold
    IdleWarning,
    /// Killed after exceeding the idle threshold
    Killed,
    Done(ProcessExit),
    Cancelled,
}

impl MonitorState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Killed | Self::Done(_) | Self::Cancelled)
    }
}

/// Poll-driven waiter with an idle-output watchdog
pub struct ProcessMonitor {
    process: LaunchedProcess,
    idle_timeout: Duration,
    poll_interval: Duration,
    last_output: Instant,
    state: MonitorState,
    output: String,
    output_closed: bool,
    debugger_attached: fn() -> bool,
}

impl ProcessMonitor {
    pub fn new(process: LaunchedProcess, idle_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            process,
            idle_timeout,
            poll_interval,
            last_output: Instant::now(),
            state: MonitorState::Running,
            output: String::new(),
            output_closed: false,
            debugger_attached,
        }
    }

    /// Replace the debugger check
    pub fn with_debugger_check(mut self, check: fn() -> bool) -> Self {
        self.debugger_attached = check;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Everything the child printed so far
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn into_output(self) -> String {
        self.output
    }

    /// Wait up to one poll interval, then advance the state machine
    ///
    /// Returns the lines received during this poll.
    pub fn poll(&mut self) -> BuildResult<Vec<String>> {
        if self.state.is_finished() {
            return Ok(Vec::new());
        }

        let mut lines = self.receive(self.poll_interval);
        if !lines.is_empty() {
            self.last_output = Instant::now();
            if self.state == MonitorState::IdleWarning {
                self.state = MonitorState::Running;
            }
        }

        if let Some(exit) = self.process.child.try_wait()? {
            lines.extend(self.drain_after_exit());
            self.state = MonitorState::Done(exit);
            return Ok(lines);
        }

        let idle = self.last_output.elapsed();
        if idle >= self.idle_timeout / 2 && (self.debugger_attached)() {
            // Quiet time under a debugger does not count towards the timeout
            self.last_output = Instant::now();
            return Ok(lines);
        }
        if idle >= self.idle_timeout {
            error!(
                "executor produced no output for {}s, killing it",
                idle.as_secs()
            );
            self.process.child.kill()?;
            self.state = MonitorState::Killed;
        } else if idle >= self.idle_timeout / 2 && self.state == MonitorState::Running {
            warn!("executor has been quiet for {}s", idle.as_secs());
            self.state = MonitorState::IdleWarning;
        }

        Ok(lines)
    }

    /// Kill the child on behalf of the caller
    pub fn cancel(&mut self) -> BuildResult<()> {
        if self.state.is_finished() {
            return Ok(());
        }
        self.process.child.kill()?;
        self.state = MonitorState::Cancelled;
        Ok(())
    }

    fn record(&mut self, line: String, lines: &mut Vec<String>) {
        self.output.push_str(&line);
        self.output.push('\n');
        lines.push(line);
    }

    fn receive(&mut self, timeout: Duration) -> Vec<String> {
        let mut lines = Vec::new();
        if self.output_closed {
            thread::sleep(timeout);
            return lines;
        }

        match self.process.output.recv_timeout(timeout) {
            Ok(line) => self.record(line, &mut lines),
            Err(RecvTimeoutError::Timeout) => return lines,
            Err(RecvTimeoutError::Disconnected) => {
                self.output_closed = true;
                return lines;
            }
        }

        loop {
            match self.process.output.try_recv() {
                Ok(line) => self.record(line, &mut lines),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.output_closed = true;
                    break;
                }
            }
        }
        lines
    }

    /// Collect output still in flight once the child has exited
    fn drain_after_exit(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while !self.output_closed {
            match self.process.output.recv_timeout(self.poll_interval) {
                Ok(line) => self.record(line, &mut lines),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => self.output_closed = true,
            }
        }
        lines
    }
}

/// Whether a debugger is tracing this process
pub fn debugger_attached() -> bool {
    if !cfg!(target_os = "linux") {
        return false;
    }
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status
                .lines()
                .find_map(|line| line.strip_prefix("TracerPid:"))
                .map(|pid| pid.trim() != "0")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakeChild {
        exit: Option<ProcessExit>,
        killed: Arc<AtomicBool>,
    }

    impl ChildHandle for FakeChild {
        fn try_wait(&mut self) -> BuildResult<Option<ProcessExit>> {
            Ok(self.exit)
        }

        fn kill(&mut self) -> BuildResult<()> {
            self.killed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn no_debugger() -> bool {
        false
    }

    fn fake(exit: Option<ProcessExit>) -> (LaunchedProcess, Sender<String>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::channel();
        let killed = Arc::new(AtomicBool::new(false));
        let process = LaunchedProcess {
            child: Box::new(FakeChild {
                exit,
                killed: killed.clone(),
            }),
            output: rx,
        };
        (process, tx, killed)
    }

    #[test]
    fn test_exit_collects_pending_output() {
        let (process, tx, _) = fake(Some(ProcessExit::code(0)));
        tx.send("[1/1 0s] Done".to_string()).unwrap();
        drop(tx);

        let mut monitor =
            ProcessMonitor::new(process, Duration::from_secs(30), Duration::from_millis(5));
        let lines = monitor.poll().unwrap();

        assert_eq!(lines, vec!["[1/1 0s] Done".to_string()]);
        assert_eq!(monitor.state(), MonitorState::Done(ProcessExit::code(0)));
        assert_eq!(monitor.output(), "[1/1 0s] Done\n");
    }

    #[test]
    fn test_quiet_child_is_killed() {
        let (process, _tx, killed) = fake(None);
        let mut monitor =
            ProcessMonitor::new(process, Duration::from_millis(40), Duration::from_millis(5))
                .with_debugger_check(no_debugger);

        let mut saw_warning = false;
        for _ in 0..200 {
            monitor.poll().unwrap();
            if monitor.state() == MonitorState::IdleWarning {
                saw_warning = true;
            }
            if monitor.state().is_finished() {
                break;
            }
        }

        assert!(saw_warning);
        assert_eq!(monitor.state(), MonitorState::Killed);
        assert!(killed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_debugger_suppresses_kill() {
        let (process, _tx, killed) = fake(None);
        let mut monitor =
            ProcessMonitor::new(process, Duration::from_millis(10), Duration::from_millis(5))
                .with_debugger_check(|| true);

        for _ in 0..10 {
            monitor.poll().unwrap();
        }
        assert!(!monitor.state().is_finished());
        assert!(!killed.load(Ordering::SeqCst));
    }

    static DEBUGGER: AtomicBool = AtomicBool::new(true);

    fn toggled_debugger() -> bool {
        DEBUGGER.load(Ordering::SeqCst)
    }

    #[test]
    fn test_debugger_detach_restarts_idle_timer() {
        let (process, _tx, killed) = fake(None);
        let mut monitor =
            ProcessMonitor::new(process, Duration::from_millis(200), Duration::from_millis(5))
                .with_debugger_check(toggled_debugger);

        let attached = Instant::now();
        while attached.elapsed() < Duration::from_millis(400) {
            monitor.poll().unwrap();
        }
        DEBUGGER.store(false, Ordering::SeqCst);

        monitor.poll().unwrap();
        assert!(!monitor.state().is_finished());
        assert!(!killed.load(Ordering::SeqCst));

        for _ in 0..400 {
            monitor.poll().unwrap();
            if monitor.state().is_finished() {
                break;
            }
        }
        assert_eq!(monitor.state(), MonitorState::Killed);
    }

    #[test]
    fn test_cancel_kills_child() {
        let (process, _tx, killed) = fake(None);
        let mut monitor =
            ProcessMonitor::new(process, Duration::from_secs(30), Duration::from_millis(5));

        monitor.cancel().unwrap();
        assert_eq!(monitor.state(), MonitorState::Cancelled);
        assert!(killed.load(Ordering::SeqCst));
        assert!(monitor.poll().unwrap().is_empty());
    }

    #[test]
    fn test_missing_program_is_missing_tool() {
        let request = LaunchRequest {
            program: PathBuf::from("/definitely/not/here/executor"),
            args: vec![],
            working_dir: PathBuf::from("."),
            env: BTreeMap::new(),
        };
        assert!(matches!(
            SystemLauncher.launch(&request),
            Err(BuildError::MissingTool { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_launcher_streams_output() {
        let request = LaunchRequest {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), "echo one; echo two 1>&2; exit 3".into()],
            working_dir: std::env::temp_dir(),
            env: BTreeMap::new(),
        };
        let process = SystemLauncher.launch(&request).unwrap();
        let mut monitor =
            ProcessMonitor::new(process, Duration::from_secs(30), Duration::from_millis(10));

        while !monitor.state().is_finished() {
            monitor.poll().unwrap();
        }

        assert_eq!(monitor.state(), MonitorState::Done(ProcessExit::code(3)));
        assert!(monitor.output().contains("one"));
        assert!(monitor.output().contains("two"));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_launcher_survives_non_utf8_output() {
        let script = "printf 'caf\\351\\n'; \
                      i=1; while [ $i -le 500 ]; do echo \"[$i/500 0s] Compile\"; i=$((i+1)); done; \
                      exit 0";
        let request = LaunchRequest {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into()],
            working_dir: std::env::temp_dir(),
            env: BTreeMap::new(),
        };
        let process = SystemLauncher.launch(&request).unwrap();
        let mut monitor =
            ProcessMonitor::new(process, Duration::from_secs(30), Duration::from_millis(50));

        let mut lines = Vec::new();
        while !monitor.state().is_finished() {
            lines.extend(monitor.poll().unwrap());
        }

        assert_eq!(monitor.state(), MonitorState::Done(ProcessExit::code(0)));
        assert_eq!(lines.len(), 501);
        assert_eq!(lines[0], "caf\u{FFFD}");
        assert_eq!(lines[500], "[500/500 0s] Compile");
    }
}
