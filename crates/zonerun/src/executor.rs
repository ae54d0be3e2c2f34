//! Command runner for manifest tasks.
//!
//! Runs one resolved command line through a shell with all output discarded and
//! maps how it ended onto a [`Status`]:
//! - no command: `Pending`, nothing spawned
//! - exit 0: `OK`
//! - non-zero exit or killed by a signal: `Pending`
//! - still running at the deadline: `Timeout` (shell and its process group are killed)
//! - could not be started: `Error`

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, warn};
use zonerun_core::Status;

/// How a spawned command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Process exited. `None` when it was ended by a signal.
    Exited(Option<i32>),
    /// Deadline reached; the process was killed and reaped.
    TimedOut,
    /// Process could not be started or waited on.
    Failed(String),
}

impl ExecOutcome {
    pub fn status(&self) -> Status {
        match self {
            Self::Exited(Some(0)) => Status::Ok,
            Self::Exited(_) => Status::Pending,
            Self::TimedOut => Status::Timeout,
            Self::Failed(_) => Status::Error,
        }
    }
}

/// Narrow interface over process execution.
///
/// Takes a command line and a deadline, returns how the process ended. Tests swap
/// in a scripted implementation so no real shell is needed.
pub trait ProcessExecutor: Send + Sync {
    fn execute(&self, command: &str, timeout: Duration)
        -> impl Future<Output = ExecOutcome> + Send;
}

/// Executes commands as `<shell> -c <command>`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: PathBuf,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

impl ProcessExecutor for ShellExecutor {
    async fn execute(&self, command: &str, timeout: Duration) -> ExecOutcome {
        let mut process = Command::new(&self.shell);
        process
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // Own process group, so a timeout can take down everything the shell started.
        #[cfg(unix)]
        process.process_group(0);

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(shell = %self.shell.display(), error = %e, "failed to spawn command");
                return ExecOutcome::Failed(e.to_string());
            }
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => ExecOutcome::Exited(status.code()),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to wait for command");
                terminate(&mut child).await;
                ExecOutcome::Failed(e.to_string())
            }
            Err(_) => {
                terminate(&mut child).await;
                ExecOutcome::TimedOut
            }
        }
    }
}

/// Kill the child's process group and reap the child.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: kill(2) takes plain integers and touches no memory we own.
            let ret = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
            if ret != 0 {
                debug!(
                    pid,
                    error = %std::io::Error::last_os_error(),
                    "failed to signal process group"
                );
            }
        }
    }

    // Kill the shell itself and reap it to prevent a zombie.
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill timed-out process");
    }
}

/// Runs task commands under a uniform per-command deadline.
#[derive(Debug, Clone)]
pub struct CommandRunner<E> {
    executor: E,
    timeout: Duration,
}

impl<E: ProcessExecutor> CommandRunner<E> {
    pub fn new(executor: E, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run one command and classify the result.
    pub async fn run(&self, command: Option<&str>) -> Status {
        let Some(command) = command.filter(|cmd| !cmd.is_empty()) else {
            debug!("no command to run");
            return Status::Pending;
        };

        debug!(cmd = %command, timeout_ms = self.timeout.as_millis() as u64, "executing command");
        let start = Instant::now();
        let outcome = self.executor.execute(command, self.timeout).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            ExecOutcome::Exited(Some(0)) => {
                debug!(cmd = %command, duration_ms, "command succeeded");
            }
            ExecOutcome::Exited(code) => {
                debug!(cmd = %command, exit_code = ?code, duration_ms, "command failed");
            }
            ExecOutcome::TimedOut => {
                warn!(
                    cmd = %command,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "command timed out"
                );
            }
            ExecOutcome::Failed(reason) => {
                warn!(cmd = %command, error = %reason, "command could not be executed");
            }
        }

        outcome.status()
    }
}
