// src/engine/mod.rs

//! Orchestration engine for wavequeue.
//!
//! This module ties together:
//! - the planning pipeline ([`planner`])
//! - the wave run controller that owns the store ([`controller`])
//! - the main runtime event loop that reacts to:
//!   - plan requests from the authoring side
//!   - terminal task outcomes from the execution side
//!   - cancel requests
//!   - shutdown signals
//!
//! The synchronous core lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. Events are handled strictly one at a time,
//! which is the mutual exclusion the controller relies on.

use std::fmt;
use std::str::FromStr;

use crate::types::{RunId, TaskId, TaskOutcome, TaskSetId};

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once a run finishes and no other run is
    /// active (used for `serve --once`).
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Plan (or replan) a task set and activate its first wave.
    PlanRequested { task_set: TaskSetId },
    /// The execution side reports a task as finished.
    TaskTerminal { task: TaskId, outcome: TaskOutcome },
    /// Cancel an active run.
    CancelRequested { run_id: RunId },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

impl fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerEvent::PlanRequested { task_set } => write!(f, "plan {task_set}"),
            ControllerEvent::TaskTerminal { task, outcome } => {
                write!(f, "done {task} {}", outcome.as_str())
            }
            ControllerEvent::CancelRequested { run_id } => write!(f, "cancel {run_id}"),
            ControllerEvent::ShutdownRequested => write!(f, "quit"),
        }
    }
}

/// Parses the `serve` line protocol:
///
/// ```text
/// plan <task_set>
/// done <task> <success|failure>
/// cancel <run_id>
/// quit
/// ```
impl FromStr for ControllerEvent {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["plan", task_set] => Ok(ControllerEvent::PlanRequested {
                task_set: task_set.to_string(),
            }),
            ["done", task, outcome] => Ok(ControllerEvent::TaskTerminal {
                task: task.to_string(),
                outcome: outcome.parse()?,
            }),
            ["cancel", run_id] => Ok(ControllerEvent::CancelRequested {
                run_id: run_id.to_string(),
            }),
            ["quit"] | ["exit"] => Ok(ControllerEvent::ShutdownRequested),
            [] => Err("empty command".to_string()),
            _ => Err(format!(
                "unrecognised command '{}' (expected: plan <set> | done <task> <success|failure> | cancel <run> | quit)",
                line.trim()
            )),
        }
    }
}

pub mod controller;
pub mod core;
pub mod event_handlers;
pub mod planner;
pub mod runtime;

pub use controller::{
    PlannedRun, RecoverySummary, RunStep, ScheduleView, TaskView, WaveActivation,
    WaveRunController,
};
pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use planner::{SchedulePlan, build_schedule};
pub use runtime::Runtime;
