// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::fmt;

use thiserror::Error;

use crate::types::{RunId, RunStatus, TaskId, TaskSetId};

/// The dependency graph restricted to a task set contains at least one cycle.
///
/// `tasks` lists every task that sits on a cycle, sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub tasks: Vec<TaskId>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle detected in dependency graph involving tasks [{}]",
            self.tasks.join(", ")
        )
    }
}

impl std::error::Error for CycleError {}

/// Failures of the persistence layer. All of them are safe to retry:
/// commits are transactional and idempotent.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("task '{0}' does not exist")]
    TaskNotFound(TaskId),

    #[error("task '{task}' is not part of task set '{task_set}'")]
    UnknownTask { task: TaskId, task_set: TaskSetId },

    #[error("run '{0}' does not exist")]
    UnknownRun(RunId),

    #[error("run '{run_id}' is {status}; its schedule can no longer be rewritten")]
    RunNotPlanning { run_id: RunId, status: RunStatus },

    #[error("task set '{task_set}' already has active run '{run_id}'")]
    ActiveRunExists { task_set: TaskSetId, run_id: RunId },

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug)]
pub enum WaveQueueError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("{0}")]
    DagCycle(#[from] CycleError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Run {run_id} is already {status}")]
    RunTerminal { run_id: RunId, status: RunStatus },

    #[error("Task set '{task_set}' already has running run {run_id}")]
    RunAlreadyActive { task_set: TaskSetId, run_id: RunId },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Task set '{0}' has no tasks")]
    EmptyTaskSet(TaskSetId),

    #[error("Pinned schedule conflict: {0}")]
    PinConflict(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WaveQueueError {
    /// Whether retrying the same operation can succeed.
    ///
    /// Cycle and pin conflicts reproduce deterministically from the same
    /// input, so only persistence failures qualify.
    pub fn is_retriable(&self) -> bool {
        matches!(self, WaveQueueError::Store(_))
    }
}

impl From<rusqlite::Error> for WaveQueueError {
    fn from(err: rusqlite::Error) -> Self {
        WaveQueueError::Store(StoreError::Sql(err))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WaveQueueError>;
