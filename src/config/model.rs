// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::dag::lanes::{default_lane_table, DEFAULT_LANE};
use crate::dag::LaneAssigner;
use crate::store::NewTask;
use crate::types::{LaneName, TaskSetId};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [store]
/// path = ".wavequeue/queue.db"
///
/// [lanes]
/// default = "general"
///
/// [lanes.categories]
/// backend = "backend"
/// api = "backend"
/// frontend = "frontend"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub lanes: LaneSection,
}

/// Validated configuration. Only constructed through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub store: StoreSection,
    pub lanes: LaneSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(store: StoreSection, lanes: LaneSection) -> Self {
        Self { store, lanes }
    }

    /// Lane assigner built from `[lanes]`.
    pub fn lane_assigner(&self) -> LaneAssigner {
        LaneAssigner::new(self.lanes.default.clone(), self.lanes.categories.clone())
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(StoreSection::default(), LaneSection::default())
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// SQLite database file. Parent directories are created on open.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    ".wavequeue/queue.db".to_string()
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// `[lanes]` section.
///
/// `categories` replaces the built-in table entirely when present.
#[derive(Debug, Clone, Deserialize)]
pub struct LaneSection {
    /// Lane for unknown or missing categories.
    #[serde(default = "default_lane")]
    pub default: LaneName,

    /// Category → lane table. Lookup is case-insensitive.
    #[serde(default = "default_lane_table")]
    pub categories: BTreeMap<String, LaneName>,
}

fn default_lane() -> LaneName {
    DEFAULT_LANE.to_string()
}

impl Default for LaneSection {
    fn default() -> Self {
        Self {
            default: default_lane(),
            categories: default_lane_table(),
        }
    }
}

/// A task-set import file, before validation.
///
/// ```toml
/// task_set = "release-1"
///
/// [task.api]
/// priority = 1
/// category = "backend"
/// created_at = "2026-01-01T00:00:00Z"
/// depends_on = ["schema"]
///
/// [task.schema]
/// category = "database"
/// wave = 0            # optional pins, never overwritten by planning
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawTaskSetFile {
    pub task_set: TaskSetId,

    /// Keys are task IDs.
    #[serde(default)]
    pub task: BTreeMap<String, TaskSpec>,
}

/// `[task.<id>]` section of a task-set file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskSpec {
    /// Urgency ordinal, lower first. Defaults to 2.
    #[serde(default)]
    pub priority: Option<u8>,

    #[serde(default)]
    pub category: Option<String>,

    /// RFC 3339 timestamp string. Defaults to the import time.
    #[serde(default)]
    pub created_at: Option<String>,

    /// Tasks that must finish in an earlier wave. May name tasks outside
    /// this file; those are treated as already satisfied.
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub wave: Option<u32>,

    #[serde(default)]
    pub lane: Option<String>,

    #[serde(default)]
    pub execution_order: Option<u32>,
}

/// A validated task set ready for [`crate::store::QueueStore::import_task_set`].
#[derive(Debug, Clone)]
pub struct TaskSetFile {
    pub task_set: TaskSetId,
    pub tasks: Vec<NewTask>,
}
