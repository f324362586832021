//! End-to-end supervision against scripted fake agents.
//!
//! Every test spawns a real child process in a fresh temporary repo and
//! checks both the outcome and, where the agent would otherwise linger, that
//! the process was killed and reaped.

use std::time::{Duration, Instant};

use agent_overseer::agent::spawner::ExitOutcome;
use agent_overseer::protocol::{parse, Message};
use agent_overseer::{AppError, Supervisor, TaskRequest};

use super::test_helpers::{self as agents, fake_agent};

const TIMEOUT: Duration = Duration::from_secs(5);

fn repo() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

// ── Success ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_agent_completes() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::HAPPY, TIMEOUT, 0));

    let complete = supervisor
        .run_task("task-1", "fix the bug", dir.path())
        .await
        .expect("happy agent completes");

    assert_eq!(complete.state, "done");
    assert_eq!(complete.summary, "task completed");
    assert_eq!(complete.files_changed, vec!["main.rs".to_owned()]);
    assert_eq!(complete.tokens_in, 1000);
    assert_eq!(complete.tokens_out, 400);
}

#[tokio::test]
async fn agent_reported_failure_is_still_a_completed_run() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::COMPLETE_THEN_FAIL, TIMEOUT, 0));

    let complete = supervisor
        .run_task("task-1", "run the tests", dir.path())
        .await
        .expect("complete wins over the non-zero exit that follows it");

    assert_eq!(complete.state, "failed");
    assert_eq!(complete.error, "tests did not pass");
    assert!(complete.reports_error());
}

#[tokio::test]
async fn steady_heartbeats_keep_a_short_timeout_alive() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(
        agents::STEADY,
        Duration::from_millis(600),
        0,
    ));

    let complete = supervisor
        .run_task("task-1", "keep going", dir.path())
        .await
        .expect("heartbeats reset the watchdog");
    assert_eq!(complete.summary, "steady");
}

#[tokio::test]
async fn rss_equal_to_budget_is_allowed() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::AT_BUDGET, TIMEOUT, 5));

    let complete = supervisor
        .run_task("task-1", "stay lean", dir.path())
        .await
        .expect("rss at the budget is not over it");
    assert_eq!(complete.summary, "at budget");
}

#[tokio::test]
async fn known_message_from_the_wrong_direction_is_ignored() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::WRONG_DIRECTION, TIMEOUT, 0));

    let complete = supervisor
        .run_task("task-1", "p", dir.path())
        .await
        .expect("stray init is ignored");
    assert_eq!(complete.summary, "ignored init");
}

#[tokio::test]
async fn lingering_agent_is_killed_after_exit_grace() {
    let dir = repo();
    let mut config = fake_agent(agents::LINGER, TIMEOUT, 0);
    config.exit_grace = Duration::from_millis(300);
    let supervisor = Supervisor::new(config);

    let started = Instant::now();
    let complete = supervisor
        .run_task("task-1", "p", dir.path())
        .await
        .expect("complete is returned even if the agent lingers");

    assert_eq!(complete.summary, "finished but lingering");
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "lingering agent must not hold the supervisor"
    );
    #[cfg(unix)]
    agents::assert_agent_gone(dir.path());
}

// ── Handshake ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_sends_init_then_task_in_the_repo() {
    let dir = repo();
    let mut config = fake_agent(agents::RECORDER, Duration::from_secs(30), 0);
    config.max_tokens = 50_000;
    let supervisor = Supervisor::new(config);

    let request = TaskRequest::new("task-42", "add a readme", dir.path()).with_spec("docs/spec.md");
    supervisor.run(request).await.expect("recorder completes");

    let recorded =
        std::fs::read_to_string(dir.path().join("handshake.jsonl")).expect("handshake recorded");
    let lines: Vec<&str> = recorded.lines().collect();
    assert_eq!(lines.len(), 2, "exactly init and task: {recorded}");

    match parse(lines[0]).expect("init parses") {
        Message::Init(init) => {
            assert_eq!(init.heartbeat_interval_s, 15, "half the 30s timeout");
            assert_eq!(init.max_tokens, 50_000);
        }
        other => panic!("first line must be init, got {other:?}"),
    }

    match parse(lines[1]).expect("task parses") {
        Message::Task(task) => {
            assert_eq!(task.id, "task-42");
            assert_eq!(task.prompt, "add a readme");
            assert_eq!(task.repo, dir.path().to_string_lossy());
            assert_eq!(task.spec, "docs/spec.md");
        }
        other => panic!("second line must be task, got {other:?}"),
    }

    let cwd = std::fs::read_to_string(dir.path().join("cwd.txt")).expect("cwd recorded");
    let cwd = std::fs::canonicalize(cwd.trim()).expect("cwd exists");
    let expected = std::fs::canonicalize(dir.path()).expect("repo exists");
    assert_eq!(cwd, expected, "agent must run inside the task repo");
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn silent_agent_times_out() {
    let dir = repo();
    let timeout = Duration::from_millis(500);
    let supervisor = Supervisor::new(fake_agent(agents::HANG, timeout, 0));

    let started = Instant::now();
    let err = supervisor
        .run_task("task-1", "p", dir.path())
        .await
        .expect_err("hung agent must time out");

    assert!(
        matches!(err, AppError::HeartbeatTimeout(t) if t == timeout),
        "expected heartbeat timeout, got {err}"
    );
    assert!(started.elapsed() < Duration::from_secs(5));
    #[cfg(unix)]
    agents::assert_agent_gone(dir.path());
}

#[tokio::test]
async fn crashing_agent_reports_its_exit_code() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::CRASH, TIMEOUT, 0));

    let err = supervisor
        .run_task("task-1", "p", dir.path())
        .await
        .expect_err("crash must fail the run");

    assert!(
        matches!(err, AppError::Crashed(ExitOutcome::Code(3))),
        "expected crash with code 3, got {err}"
    );
}

#[tokio::test]
async fn leaking_agent_exceeds_rss_budget() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::LEAK, TIMEOUT, 5));

    let err = supervisor
        .run_task("task-1", "p", dir.path())
        .await
        .expect_err("leak must be stopped");

    match err {
        AppError::ResourceExceeded { rss_mb, budget_mb } => {
            assert!((rss_mb - 6.0).abs() < f64::EPSILON, "first reading over 5 MB");
            assert_eq!(budget_mb, 5);
        }
        other => panic!("expected resource exceeded, got {other}"),
    }
    #[cfg(unix)]
    agents::assert_agent_gone(dir.path());
}

#[tokio::test]
async fn garbage_output_is_a_protocol_error() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::GARBAGE, TIMEOUT, 0));

    let err = supervisor
        .run_task("task-1", "p", dir.path())
        .await
        .expect_err("garbage must fail the run");

    match err {
        AppError::Protocol(detail) => assert!(detail.starts_with("line 1"), "{detail}"),
        other => panic!("expected protocol error, got {other}"),
    }
    #[cfg(unix)]
    agents::assert_agent_gone(dir.path());
}

#[tokio::test]
async fn unknown_message_type_is_a_protocol_error() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::UNKNOWN_TYPE, TIMEOUT, 0));

    let err = supervisor
        .run_task("task-1", "p", dir.path())
        .await
        .expect_err("unknown type must fail the run");

    match err {
        AppError::Protocol(detail) => assert!(detail.contains("telemetry"), "{detail}"),
        other => panic!("expected protocol error, got {other}"),
    }
    #[cfg(unix)]
    agents::assert_agent_gone(dir.path());
}

#[tokio::test]
async fn blocked_agent_surfaces_its_question() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::BLOCKED, TIMEOUT, 0));

    let err = supervisor
        .run_task("task-1", "p", dir.path())
        .await
        .expect_err("blocked must fail the run");

    match err {
        AppError::Blocked { question, options } => {
            assert_eq!(question, "overwrite existing config?");
            assert_eq!(options, vec!["yes".to_owned(), "no".to_owned()]);
        }
        other => panic!("expected blocked, got {other}"),
    }
    #[cfg(unix)]
    agents::assert_agent_gone(dir.path());
}

#[tokio::test]
async fn clean_exit_without_complete_is_incomplete() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::SILENT_EXIT, TIMEOUT, 0));

    let err = supervisor
        .run_task("task-1", "p", dir.path())
        .await
        .expect_err("silent exit must fail the run");

    assert!(matches!(err, AppError::IncompleteExit), "got {err}");
}

#[tokio::test]
async fn huge_heartbeat_timeout_does_not_overflow() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(
        agents::HAPPY,
        Duration::from_secs(u64::MAX),
        0,
    ));

    let complete = supervisor
        .run_task("task-1", "p", dir.path())
        .await
        .expect("an effectively infinite timeout is still a valid timeout");
    assert_eq!(complete.state, "done");
}

// ── Handshake failures ───────────────────────────────────────────────────────

#[tokio::test]
async fn live_agent_that_closes_stdin_is_a_send_error() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::CLOSES_STDIN, TIMEOUT, 0));

    let err = supervisor
        .run_task("task-1", &agents::oversized_prompt(), dir.path())
        .await
        .expect_err("task cannot be delivered");

    match &err {
        AppError::Send(detail) => assert!(detail.contains("task-1"), "{detail}"),
        other => panic!("expected send error, got {other}"),
    }
    assert!(!err.is_agent_failure());
    #[cfg(unix)]
    agents::assert_agent_gone(dir.path());
}

#[tokio::test]
async fn agent_exiting_during_handshake_reports_its_exit() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent("exit 4", TIMEOUT, 0));

    let err = supervisor
        .run_task("task-1", &agents::oversized_prompt(), dir.path())
        .await
        .expect_err("agent is gone before the task is written");

    assert!(
        matches!(err, AppError::Crashed(ExitOutcome::Code(4))),
        "the exit, not the broken pipe, must be reported: {err}"
    );
}

#[tokio::test]
async fn clean_exit_during_handshake_is_incomplete() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent("exit 0", TIMEOUT, 0));

    let err = supervisor
        .run_task("task-1", &agents::oversized_prompt(), dir.path())
        .await
        .expect_err("agent is gone before the task is written");

    assert!(matches!(err, AppError::IncompleteExit), "got {err}");
}

// ── Launch failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_binary_is_a_launch_error() {
    let dir = repo();
    let supervisor = Supervisor::new(agent_overseer::SupervisorConfig::new(
        dir.path().join("no-such-agent"),
        TIMEOUT,
        0,
    ));

    let err = supervisor
        .run_task("task-1", "p", dir.path())
        .await
        .expect_err("missing binary must fail");

    assert!(matches!(err, AppError::Launch(_)), "got {err}");
    assert!(!err.is_agent_failure());
}

#[tokio::test]
async fn missing_repo_is_a_launch_error() {
    let dir = repo();
    let supervisor = Supervisor::new(fake_agent(agents::HAPPY, TIMEOUT, 0));

    let err = supervisor
        .run_task("task-1", "p", dir.path().join("absent"))
        .await
        .expect_err("missing working directory must fail");

    assert!(matches!(err, AppError::Launch(_)), "got {err}");
}

#[tokio::test]
async fn supervisor_is_reusable_across_tasks() {
    let supervisor = Supervisor::new(fake_agent(agents::HAPPY, TIMEOUT, 0));

    for id in ["task-a", "task-b"] {
        let dir = repo();
        let complete = supervisor
            .run_task(id, "p", dir.path())
            .await
            .expect("each run gets a fresh agent");
        assert_eq!(complete.state, "done");
    }
}
