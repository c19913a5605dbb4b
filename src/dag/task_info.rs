// src/dag/task_info.rs

//! Scheduling attributes of a task, as seen by the analyzer and orderer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LaneName, Priority, TaskId};

/// The attributes the execution orderer sorts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAttrs {
    pub id: TaskId,
    pub priority: Priority,
    /// Free-text tag used for lane mapping and clustering.
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Schedule values explicitly set by the caller.
///
/// Pinned values are never overwritten by planning; computed values fill in
/// around them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pins {
    pub wave: Option<u32>,
    pub lane: Option<LaneName>,
    pub execution_order: Option<u32>,
}

impl Pins {
    pub fn is_empty(&self) -> bool {
        self.wave.is_none() && self.lane.is_none() && self.execution_order.is_none()
    }
}
