#![forbid(unsafe_code)]

//! `agent-overseer` — runs one task on a headless agent and reports the result.
//!
//! Loads settings from an optional TOML file plus command-line overrides,
//! supervises the agent, prints the agent's `complete` message as one JSON
//! line on stdout, and exits with a code from [`agent_overseer::exit_codes`].

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_overseer::config::{GlobalConfig, SupervisorConfig};
use agent_overseer::protocol::{self, Message};
use agent_overseer::{exit_codes, AppError, Result, Supervisor, TaskRequest};

/// Exit code used when the run is interrupted by a signal.
const INTERRUPTED: u8 = 130;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-overseer", about = "Supervise one agent task", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Agent binary; overrides `agent_binary` from the config file.
    #[arg(long)]
    agent: Option<PathBuf>,

    /// Heartbeat timeout in seconds; overrides the config file.
    #[arg(long)]
    heartbeat_timeout: Option<u64>,

    /// RSS ceiling in megabytes (0 = unlimited); overrides the config file.
    #[arg(long)]
    max_rss_mb: Option<u64>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Task identifier; a random UUID when omitted.
    #[arg(long)]
    task_id: Option<String>,

    /// What the agent should do.
    #[arg(long)]
    prompt: String,

    /// Repository the agent works in; defaults to the current directory.
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Optional path to a spec file handed to the agent.
    #[arg(long)]
    spec: Option<String>,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return to_exit_code(exit_codes::INVALID);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return to_exit_code(exit_codes::INVALID);
        }
    };

    runtime.block_on(run(args))
}

async fn run(args: Cli) -> ExitCode {
    let (config, request) = match resolve(args) {
        Ok(resolved) => resolved,
        Err(err) => {
            error!(%err, "invalid invocation");
            return to_exit_code(exit_codes::for_error(&err));
        }
    };

    let supervisor = Supervisor::new(config);
    info!(
        agent = %supervisor.config().agent_binary.display(),
        heartbeat_timeout = ?supervisor.config().heartbeat_timeout,
        task_id = %request.id,
        repo = %request.repo.display(),
        "starting task"
    );

    let result = tokio::select! {
        result = supervisor.run(request) => result,
        () = shutdown_signal() => {
            // Dropping the run future kills the agent (kill_on_drop).
            warn!("interrupted, agent killed");
            return ExitCode::from(INTERRUPTED);
        }
    };

    match result {
        Ok(complete) => {
            let code = exit_codes::for_complete(&complete);
            match protocol::encode(&Message::Complete(complete)) {
                Ok(line) => {
                    print!("{line}");
                    to_exit_code(code)
                }
                Err(err) => {
                    error!(%err, "failed to serialise complete message");
                    to_exit_code(exit_codes::INVALID)
                }
            }
        }
        Err(err) if err.is_agent_failure() => {
            error!(%err, "agent failed");
            to_exit_code(exit_codes::for_error(&err))
        }
        Err(err) => {
            error!(%err, "could not run agent");
            to_exit_code(exit_codes::for_error(&err))
        }
    }
}

/// Merge the config file and command-line overrides.
fn resolve(args: Cli) -> Result<(SupervisorConfig, TaskRequest)> {
    let mut config = match (&args.config, &args.agent) {
        (Some(path), _) => GlobalConfig::load_from_path(path)?.supervisor_config(),
        (None, Some(agent)) => SupervisorConfig::new(agent.clone(), Duration::from_secs(30), 0),
        (None, None) => {
            return Err(AppError::Config(
                "either --config or --agent is required".into(),
            ))
        }
    };

    if let Some(agent) = args.agent {
        config.agent_binary = agent;
    }
    if let Some(secs) = args.heartbeat_timeout {
        if secs == 0 {
            return Err(AppError::Config(
                "--heartbeat-timeout must be greater than zero".into(),
            ));
        }
        config.heartbeat_timeout = Duration::from_secs(secs);
    }
    if let Some(max_rss_mb) = args.max_rss_mb {
        config.max_rss_mb = max_rss_mb;
    }

    let repo = match args.repo {
        Some(repo) => repo,
        None => std::env::current_dir()
            .map_err(|err| AppError::Io(format!("cannot resolve current directory: {err}")))?,
    };
    let task_id = args
        .task_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut request = TaskRequest::new(task_id, args.prompt, repo);
    if let Some(spec) = args.spec {
        request = request.with_spec(spec);
    }

    Ok((config, request))
}

fn to_exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

/// Logs go to stderr; stdout carries only the result line.
fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
