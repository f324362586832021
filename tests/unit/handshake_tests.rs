//! Unit tests for the handshake writers.
//!
//! A `tokio::io::duplex` whose far end is dropped behaves like the stdin
//! of an agent that has gone away: every write fails with `BrokenPipe`.

use agent_overseer::agent::handshake::{send_init, send_task, write_message};
use agent_overseer::protocol::{InitMessage, TaskMessage};
use agent_overseer::AppError;

#[tokio::test]
async fn init_to_a_closed_pipe_is_a_send_error() {
    let (mut stdin, agent_side) = tokio::io::duplex(64);
    drop(agent_side);

    let err = send_init(&mut stdin, &InitMessage::new(15, 0))
        .await
        .expect_err("write to a closed pipe must fail");

    match err {
        AppError::Send(detail) => assert!(detail.contains("failed to send init"), "{detail}"),
        other => panic!("expected send error, got {other}"),
    }
}

#[tokio::test]
async fn task_to_a_closed_pipe_names_the_task() {
    let (mut stdin, agent_side) = tokio::io::duplex(64);
    drop(agent_side);

    let err = send_task(&mut stdin, &TaskMessage::new("task-9", "p", "/r"))
        .await
        .expect_err("write to a closed pipe must fail");

    assert!(
        matches!(&err, AppError::Send(detail) if detail.contains("task-9")),
        "got {err}"
    );
    assert!(!err.is_agent_failure());
}

#[tokio::test]
async fn write_failure_keeps_the_broken_pipe_kind() {
    let (mut stdin, agent_side) = tokio::io::duplex(64);
    drop(agent_side);

    let err = write_message(&mut stdin, &InitMessage::new(1, 0).into())
        .await
        .expect_err("write must fail");
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
}

