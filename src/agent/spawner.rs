//! Agent process launcher.
//!
//! Spawns the agent binary with piped stdin/stdout and wraps the child in
//! [`AgentProcess`], which owns the kill and reap primitives:
//! - `kill_on_drop(true)` so a dropped supervisor future never leaks the agent.
//! - [`AgentProcess::kill`] is idempotent and safe after the agent has exited.
//! - [`AgentProcess::reap`] caches the exit outcome, so repeated calls are free.

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::{AppError, Result};

// ── Exit outcome ─────────────────────────────────────────────────────────────

/// How an agent process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited with status 0.
    Clean,
    /// Exited with a non-zero status code.
    Code(i32),
    /// Terminated by a signal the supervisor did not send.
    Signal(i32),
    /// Terminated after the supervisor requested a kill.
    Killed,
    /// The exit status could not be collected.
    Unknown(String),
}

impl ExitOutcome {
    /// Whether the process exited cleanly on its own.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    fn from_status(status: ExitStatus, kill_requested: bool) -> Self {
        if status.success() {
            return Self::Clean;
        }
        if kill_requested {
            return Self::Killed;
        }
        if let Some(code) = status.code() {
            return Self::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }
        Self::Unknown(status.to_string())
    }
}

impl Display for ExitOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "exited cleanly"),
            Self::Code(code) => write!(f, "exited with code {code}"),
            Self::Signal(signal) => write!(f, "terminated by signal {}", signal_name(*signal)),
            Self::Killed => write!(f, "was killed"),
            Self::Unknown(detail) => write!(f, "exited with unknown status: {detail}"),
        }
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map_or_else(|_| signal.to_string(), |s| s.as_str().to_owned())
}

#[cfg(not(unix))]
fn signal_name(signal: i32) -> String {
    signal.to_string()
}

// ── Process handle ───────────────────────────────────────────────────────────

/// A live agent process, owned by exactly one supervised task.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    kill_requested: bool,
    outcome: Option<ExitOutcome>,
}

impl AgentProcess {
    /// OS process id, while the process has not been reaped.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Request immediate, forcible termination.
    ///
    /// Safe to call any number of times, including after the process exited.
    pub fn kill(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        self.kill_requested = true;
        if let Err(err) = self.child.start_kill() {
            debug!(%err, "agent kill request ignored");
        }
    }

    /// Wait for the process to exit and return how it ended.
    ///
    /// Cancel safe: dropping the future before it completes loses nothing,
    /// so it can sit in a `tokio::select!` branch.
    pub async fn wait(&mut self) -> ExitOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = match self.child.wait().await {
            Ok(status) => ExitOutcome::from_status(status, self.kill_requested),
            Err(err) => {
                warn!(%err, "error waiting for agent process");
                ExitOutcome::Unknown(format!("wait error: {err}"))
            }
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Wait for exit, giving up after `limit`.
    pub async fn wait_timeout(&mut self, limit: Duration) -> Option<ExitOutcome> {
        tokio::time::timeout(limit, self.wait()).await.ok()
    }

    /// Block until the process has fully exited and release its OS resources.
    pub async fn reap(&mut self) -> ExitOutcome {
        let outcome = self.wait().await;
        debug!(%outcome, "agent process reaped");
        outcome
    }

    /// Kill, then reap. Used on every path out of a supervised task.
    pub async fn terminate(&mut self) -> ExitOutcome {
        self.kill();
        self.reap().await
    }
}

/// Pipes and process handle for a freshly spawned agent.
///
/// The caller owns all three pieces: it is the only writer to `stdin`, hands
/// `stdout` to the reader task, and must reap `process` before returning.
#[derive(Debug)]
pub struct AgentConnection {
    /// Agent's stdin, for the handshake.
    pub stdin: ChildStdin,
    /// Agent's stdout, carrying protocol lines.
    pub stdout: ChildStdout,
    /// Process handle.
    pub process: AgentProcess,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn the agent binary in `working_dir`.
///
/// `args` are passed verbatim. Stderr goes to the null device.
///
/// # Errors
///
/// - `AppError::Launch("failed to spawn agent: …")` — binary missing, not
///   executable, or the working directory is invalid.
/// - `AppError::Launch("failed to capture agent …")` — a pipe could not be
///   set up; the half-started process is killed before returning.
pub fn spawn_agent(binary: &Path, args: &[String], working_dir: &Path) -> Result<AgentConnection> {
    let mut cmd = Command::new(binary);
    cmd.args(args)
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Launch(format!(
            "failed to spawn agent {}: {err}",
            binary.display()
        ))
    })?;

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        // Dropping the child kills it (kill_on_drop); the runtime reaps it.
        let _ = child.start_kill();
        return Err(AppError::Launch("failed to capture agent stdio".into()));
    };

    info!(
        binary = %binary.display(),
        working_dir = %working_dir.display(),
        pid = child.id(),
        "agent process spawned"
    );

    Ok(AgentConnection {
        stdin,
        stdout,
        process: AgentProcess {
            child,
            kill_requested: false,
            outcome: None,
        },
    })
}
