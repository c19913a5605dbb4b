// src/store/mod.rs

//! Durable queue ledger.
//!
//! Three tables carry the schedule: task attributes (with nullable wave,
//! lane and execution order), wave runs, and per-wave membership. All three
//! are written inside one SQLite transaction per planning batch, so a crash
//! leaves either the whole batch or none of it.
//!
//! - [`schema`] creates and migrates the tables.
//! - [`sqlite`] implements [`QueueStore`] on top of `rusqlite`.

pub mod schema;
pub mod sqlite;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dag::{Pins, TaskAttrs};
use crate::types::{LaneName, Priority, RunId, RunStatus, TaskId, TaskSetId, TaskStatus, WaveStatus};

pub use sqlite::QueueStore;

/// A task handed over by the authoring collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub id: TaskId,
    pub priority: Priority,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub depends_on: Vec<TaskId>,
    pub pins: Pins,
}

/// A task as stored, with its schedule (if any) and last reported status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub id: TaskId,
    pub task_set: TaskSetId,
    pub priority: Priority,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Direct dependency edges, sorted. May point outside the task set.
    pub depends_on: Vec<TaskId>,
    pub status: TaskStatus,
    pub pins: Pins,
    pub schedule: Option<ScheduleEntry>,
}

impl TaskRecord {
    pub fn attrs(&self) -> TaskAttrs {
        TaskAttrs {
            id: self.id.clone(),
            priority: self.priority,
            category: self.category.clone(),
            created_at: self.created_at,
        }
    }
}

/// Scheduling attributes for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub wave: u32,
    pub lane: LaneName,
    pub execution_order: u32,
}

/// Everything one planning pass commits: the run record, each task's
/// schedule, and the wave membership derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleBatch {
    pub run_id: RunId,
    pub task_set: TaskSetId,
    pub entries: BTreeMap<TaskId, ScheduleEntry>,
}

impl ScheduleBatch {
    /// Task IDs per wave, ordered by lane and then execution order.
    pub fn memberships(&self) -> BTreeMap<u32, Vec<TaskId>> {
        let mut grouped: BTreeMap<u32, Vec<(&str, u32, &str)>> = BTreeMap::new();
        for (id, entry) in &self.entries {
            grouped.entry(entry.wave).or_default().push((
                entry.lane.as_str(),
                entry.execution_order,
                id.as_str(),
            ));
        }

        grouped
            .into_iter()
            .map(|(wave, mut members)| {
                members.sort();
                let ids = members.into_iter().map(|(_, _, id)| id.to_string()).collect();
                (wave, ids)
            })
            .collect()
    }
}

/// One scheduling pass over a task set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaveRun {
    pub id: RunId,
    pub task_set: TaskSetId,
    pub status: RunStatus,
    /// `None` before wave 0 is activated (stored as -1).
    pub current_wave: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership of one wave within a run. The task list never changes once
/// the run has left `planning`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wave {
    pub run_id: RunId,
    pub wave_number: u32,
    pub task_ids: Vec<TaskId>,
    pub status: WaveStatus,
}

/// Counts reported by [`QueueStore::import_task_set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub tasks_inserted: usize,
    pub edges_inserted: usize,
    /// Planner-assigned schedules cleared because a new edge touched them.
    pub schedules_cleared: usize,
}
