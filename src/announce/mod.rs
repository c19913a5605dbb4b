// src/announce/mod.rs

//! Outbound notifications.
//!
//! The controller never calls into execution. Instead the runtime turns
//! each controller step into [`Notice`]s and hands them to an
//! [`ActivationBackend`], which the execution side subscribes to.
//!
//! - [`backend`] provides the trait plus the stdout and channel backends.

pub mod backend;

use serde::Serialize;

use crate::engine::controller::{RecoverySummary, RunStep, WaveActivation};
use crate::types::{RunId, RunStatus, TaskSetId};

pub use backend::{ActivationBackend, ChannelBackend, StdoutBackend};

/// One outbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// These tasks are now eligible to execute.
    WaveActivated(WaveActivation),
    RunFinished {
        run_id: RunId,
        task_set: TaskSetId,
        status: RunStatus,
    },
    /// Planning a task set failed; nothing was persisted.
    PlanRejected {
        task_set: TaskSetId,
        reason: String,
        retriable: bool,
    },
    /// Any other request the controller refused.
    EventRejected {
        event: String,
        reason: String,
        retriable: bool,
    },
}

impl Notice {
    pub fn from_step(step: &RunStep) -> Vec<Notice> {
        let mut notices: Vec<Notice> = step
            .activated
            .iter()
            .cloned()
            .map(Notice::WaveActivated)
            .collect();
        if let (Some(run), Some(status)) = (&step.run, step.finished) {
            notices.push(Notice::RunFinished {
                run_id: run.id.clone(),
                task_set: run.task_set.clone(),
                status,
            });
        }
        notices
    }

    pub fn from_recovery(summary: &RecoverySummary) -> Vec<Notice> {
        let mut notices: Vec<Notice> = summary
            .plan_failures
            .iter()
            .map(|(task_set, reason)| Notice::PlanRejected {
                task_set: task_set.clone(),
                reason: reason.clone(),
                retriable: false,
            })
            .collect();
        notices.extend(summary.activated.iter().cloned().map(Notice::WaveActivated));
        notices.extend(summary.finished.iter().map(|run| Notice::RunFinished {
            run_id: run.id.clone(),
            task_set: run.task_set.clone(),
            status: run.status,
        }));
        notices
    }
}
