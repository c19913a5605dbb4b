// tests/error_handling.rs
mod common;
use crate::common::init_tracing;

use wavequeue::cli::LogLevel;
use wavequeue::errors::{CycleError, StoreError, WaveQueueError};
use wavequeue::logging::resolve_level;
use wavequeue::types::{Priority, RunStatus, TaskOutcome};

#[test]
fn only_store_failures_are_retriable() {
    init_tracing();

    let store = WaveQueueError::from(StoreError::UnknownRun("r".to_string()));
    assert!(store.is_retriable());

    let cycle = WaveQueueError::from(CycleError {
        tasks: vec!["a".to_string(), "b".to_string()],
    });
    assert!(!cycle.is_retriable());
    assert!(!WaveQueueError::PinConflict("x".to_string()).is_retriable());
    assert!(
        !WaveQueueError::RunTerminal {
            run_id: "r".to_string(),
            status: RunStatus::Completed,
        }
        .is_retriable()
    );
}

#[test]
fn cycle_error_names_the_tasks() {
    init_tracing();

    let err = WaveQueueError::from(CycleError {
        tasks: vec!["x".to_string(), "y".to_string()],
    });
    assert_eq!(
        err.to_string(),
        "cycle detected in dependency graph involving tasks [x, y]"
    );
}

#[test]
fn run_terminal_error_mentions_status() {
    init_tracing();

    let err = WaveQueueError::RunTerminal {
        run_id: "run-9".to_string(),
        status: RunStatus::Cancelled,
    };
    assert_eq!(err.to_string(), "Run run-9 is already cancelled");
}

#[test]
fn value_parsers_accept_common_spellings() {
    init_tracing();

    assert_eq!("P1".parse::<Priority>(), Ok(Priority(1)));
    assert_eq!("3".parse::<Priority>(), Ok(Priority(3)));
    assert!("high".parse::<Priority>().is_err());

    assert_eq!("ok".parse::<TaskOutcome>(), Ok(TaskOutcome::Success));
    assert_eq!("FAILED".parse::<TaskOutcome>(), Ok(TaskOutcome::Failure));
    assert_eq!("running".parse::<RunStatus>(), Ok(RunStatus::Running));
}

#[test]
fn log_level_prefers_flag_then_env_then_info() {
    assert_eq!(resolve_level(Some(LogLevel::Trace), Some("error")), tracing::Level::TRACE);
    assert_eq!(resolve_level(None, Some("warning")), tracing::Level::WARN);
    assert_eq!(resolve_level(None, Some("nonsense")), tracing::Level::INFO);
    assert_eq!(resolve_level(None, None), tracing::Level::INFO);
}
