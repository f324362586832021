//! Single-task agent supervision.
//!
//! [`Supervisor::run`] owns one agent process from spawn to reap:
//!
//! 1. **Spawning** — launch the agent in the task's repo and start the
//!    stdout reader task.
//! 2. **Handshaking** — write `init` then `task` to the agent's stdin.
//! 3. **Running** — wait on three sources at once: the reader queue, the
//!    heartbeat watchdog, and process exit. The first one ready decides.
//! 4. **Completed / Failed** — kill, then reap, on every path out.
//!
//! | Event                         | Result                                 |
//! |-------------------------------|----------------------------------------|
//! | unparseable line              | [`AppError::Protocol`]                 |
//! | `heartbeat` over RSS budget   | [`AppError::ResourceExceeded`]         |
//! | `heartbeat` within budget     | watchdog reset                         |
//! | `blocked`                     | [`AppError::Blocked`]                  |
//! | `complete`                    | `Ok(CompleteMessage)`                  |
//! | other known message           | watchdog reset, ignored                |
//! | watchdog fires                | [`AppError::HeartbeatTimeout`]         |
//! | exit before `complete`        | [`AppError::Crashed`] / [`AppError::IncompleteExit`] |
//!
//! A `complete` line already written when the agent exits still wins: after
//! exit the reader queue is drained for [`EXIT_DRAIN_GRACE`] before the exit
//! is reported as a failure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::agent::handshake::{send_init, send_task};
use crate::agent::reader::{spawn_reader, InboundItem};
use crate::agent::spawner::{spawn_agent, AgentConnection, AgentProcess, ExitOutcome};
use crate::config::SupervisorConfig;
use crate::protocol::{CompleteMessage, InitMessage, Message, TaskMessage};
use crate::{AppError, Result};

/// How long stdout is drained after the agent exits, looking for `complete`.
pub const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// How long a failed handshake write waits to see whether the agent exited.
const SEND_FAILURE_PROBE: Duration = Duration::from_millis(200);

/// Stand-in deadline for timeouts too large to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// One unit of work for an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    /// Unique task identifier.
    pub id: String,
    /// What the agent should do.
    pub prompt: String,
    /// Repository the agent works in; also its working directory.
    pub repo: PathBuf,
    /// Optional path to a spec file.
    pub spec: Option<String>,
}

impl TaskRequest {
    /// Build a request without a spec file.
    #[must_use]
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, repo: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            repo: repo.into(),
            spec: None,
        }
    }

    /// Attach a spec file path.
    #[must_use]
    pub fn with_spec(mut self, spec: impl Into<String>) -> Self {
        self.spec = Some(spec.into());
        self
    }
}

/// Supervises one agent process per call. Holds no state between calls.
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: SupervisorConfig,
}

impl Supervisor {
    /// Create a supervisor with the given settings.
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// Settings this supervisor was built with.
    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Spawn an agent, hand it the task, and supervise it to completion.
    ///
    /// # Errors
    ///
    /// See [`Supervisor::run`].
    pub async fn run_task(
        &self,
        task_id: &str,
        prompt: &str,
        repo: impl AsRef<Path>,
    ) -> Result<CompleteMessage> {
        self.run(TaskRequest::new(task_id, prompt, repo.as_ref()))
            .await
    }

    /// Run `request` on a fresh agent process.
    ///
    /// Any `complete` message is a structurally successful run, whatever its
    /// `state`. The agent is killed and reaped before this returns.
    ///
    /// # Errors
    ///
    /// - `AppError::Launch` — the agent could not be started.
    /// - `AppError::Send` — the handshake could not be written.
    /// - `AppError::Protocol` — the agent wrote an invalid line.
    /// - `AppError::HeartbeatTimeout` — the agent went silent.
    /// - `AppError::ResourceExceeded` — a heartbeat reported RSS over budget.
    /// - `AppError::Blocked` — the agent asked a question.
    /// - `AppError::Crashed` / `AppError::IncompleteExit` — the agent exited
    ///   without sending `complete`.
    pub async fn run(&self, request: TaskRequest) -> Result<CompleteMessage> {
        let span = info_span!("run_task", task_id = %request.id);
        self.run_inner(request).instrument(span).await
    }

    async fn run_inner(&self, request: TaskRequest) -> Result<CompleteMessage> {
        let AgentConnection {
            mut stdin,
            stdout,
            mut process,
        } = spawn_agent(
            &self.config.agent_binary,
            &self.config.agent_args,
            &request.repo,
        )?;

        let cancel = CancellationToken::new();
        let (mut items, reader) = spawn_reader(stdout, cancel.clone());
        debug!(pid = ?process.id(), "agent reader started");

        let result = match self.handshake(&mut stdin, &request).await {
            Ok(()) => self.supervise(&mut items, &mut process).await,
            Err(err) => Err(classify_send_failure(&mut process, err).await),
        };

        // Guaranteed cleanup: kill (a no-op once exited), then reap.
        drop(stdin);
        let outcome = process.terminate().await;
        drop(items);
        cancel.cancel();
        if let Err(err) = reader.await {
            warn!(%err, "agent reader task did not shut down cleanly");
        }

        match &result {
            Ok(complete) => info!(
                state = %complete.state,
                tokens_in = complete.tokens_in,
                tokens_out = complete.tokens_out,
                elapsed_s = complete.elapsed_s,
                %outcome,
                "task completed"
            ),
            Err(err) => warn!(error = %err, %outcome, "task failed"),
        }

        result
    }

    async fn handshake<W>(&self, stdin: &mut W, request: &TaskRequest) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let init = InitMessage::new(
            self.config.heartbeat_interval_secs(),
            self.config.max_tokens,
        );
        send_init(stdin, &init).await?;

        let mut task = TaskMessage::new(
            request.id.as_str(),
            request.prompt.as_str(),
            request.repo.to_string_lossy(),
        );
        if let Some(spec) = &request.spec {
            task = task.with_spec(spec.as_str());
        }
        send_task(stdin, &task).await
    }

    async fn supervise(
        &self,
        items: &mut mpsc::Receiver<InboundItem>,
        process: &mut AgentProcess,
    ) -> Result<CompleteMessage> {
        let timeout = self.config.heartbeat_timeout;
        let watchdog = tokio::time::sleep(timeout);
        tokio::pin!(watchdog);

        let mut reader_open = true;
        let mut exited: Option<ExitOutcome> = None;

        debug!(?timeout, "agent running");

        loop {
            tokio::select! {
                biased;

                item = items.recv(), if reader_open => {
                    let Some(item) = item else {
                        debug!("agent stdout closed");
                        reader_open = false;
                        if let Some(outcome) = exited.take() {
                            return Err(exit_failure(outcome));
                        }
                        continue;
                    };

                    let msg = item.map_err(|err| AppError::Protocol(err.to_string()))?;

                    // Any valid message is proof of life. After exit the
                    // drain deadline stays put.
                    if exited.is_none() {
                        watchdog.as_mut().reset(deadline_after(timeout));
                    }

                    match msg {
                        Message::Heartbeat(hb) => {
                            if self.config.rss_exceeded(hb.rss_mb) {
                                return Err(AppError::ResourceExceeded {
                                    rss_mb: hb.rss_mb,
                                    budget_mb: self.config.max_rss_mb,
                                });
                            }
                            debug!(
                                state = %hb.state,
                                tool = %hb.tool,
                                rss_mb = hb.rss_mb,
                                tokens_in = hb.tokens_in,
                                tokens_out = hb.tokens_out,
                                "agent heartbeat"
                            );
                        }
                        Message::Blocked(blocked) => {
                            return Err(AppError::Blocked {
                                question: blocked.question,
                                options: blocked.options,
                            });
                        }
                        Message::Complete(complete) => {
                            self.await_exit_after_complete(process).await;
                            return Ok(complete);
                        }
                        other => {
                            warn!(kind = other.kind(), "unexpected message from agent, ignoring");
                        }
                    }
                }

                outcome = process.wait(), if exited.is_none() => {
                    if !reader_open {
                        return Err(exit_failure(outcome));
                    }
                    debug!(%outcome, "agent exited, draining stdout");
                    exited = Some(outcome);
                    watchdog.as_mut().reset(deadline_after(EXIT_DRAIN_GRACE));
                }

                () = &mut watchdog => {
                    if let Some(outcome) = exited.take() {
                        return Err(exit_failure(outcome));
                    }
                    return Err(AppError::HeartbeatTimeout(timeout));
                }
            }
        }
    }

    async fn await_exit_after_complete(&self, process: &mut AgentProcess) {
        let grace = self.config.exit_grace;
        match process.wait_timeout(grace).await {
            Some(outcome) => debug!(%outcome, "agent exited after complete"),
            None => warn!(?grace, "agent still running after complete, killing"),
        }
    }
}

/// `now + timeout`, saturating to a far-future deadline instead of overflowing.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Map a process exit seen before `complete` to its failure kind.
fn exit_failure(outcome: ExitOutcome) -> AppError {
    if outcome.is_clean() {
        AppError::IncompleteExit
    } else {
        AppError::Crashed(outcome)
    }
}

/// A handshake write usually fails because the agent already exited; report
/// that exit rather than the broken pipe it caused.
async fn classify_send_failure(process: &mut AgentProcess, err: AppError) -> AppError {
    match process.wait_timeout(SEND_FAILURE_PROBE).await {
        Some(outcome) => {
            debug!(%err, %outcome, "handshake failed because the agent exited");
            exit_failure(outcome)
        }
        None => err,
    }
}
