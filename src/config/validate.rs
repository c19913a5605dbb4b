// src/config/validate.rs

use chrono::{DateTime, Utc};

use crate::config::model::{ConfigFile, RawConfigFile, RawTaskSetFile, TaskSetFile, TaskSpec};
use crate::dag::Pins;
use crate::errors::{Result, WaveQueueError};
use crate::store::NewTask;
use crate::types::Priority;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WaveQueueError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.store, raw.lanes))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_store_section(cfg)?;
    validate_lane_section(cfg)?;
    Ok(())
}

fn validate_store_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.store.path.trim().is_empty() {
        return Err(WaveQueueError::ConfigError(
            "[store].path must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_lane_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.lanes.default.trim().is_empty() {
        return Err(WaveQueueError::ConfigError(
            "[lanes].default must not be empty".to_string(),
        ));
    }
    for (category, lane) in cfg.lanes.categories.iter() {
        if category.trim().is_empty() {
            return Err(WaveQueueError::ConfigError(
                "[lanes.categories] contains an empty category name".to_string(),
            ));
        }
        if lane.trim().is_empty() {
            return Err(WaveQueueError::ConfigError(format!(
                "[lanes.categories] maps category '{}' to an empty lane",
                category
            )));
        }
    }
    Ok(())
}

impl TryFrom<RawTaskSetFile> for TaskSetFile {
    type Error = crate::errors::WaveQueueError;

    fn try_from(raw: RawTaskSetFile) -> std::result::Result<Self, Self::Error> {
        validate_task_set(&raw)?;

        let imported_at = Utc::now();
        let mut tasks = Vec::with_capacity(raw.task.len());
        for (id, spec) in raw.task {
            tasks.push(new_task_from_spec(id, spec, imported_at)?);
        }

        Ok(TaskSetFile {
            task_set: raw.task_set,
            tasks,
        })
    }
}

fn validate_task_set(raw: &RawTaskSetFile) -> Result<()> {
    if raw.task_set.trim().is_empty() {
        return Err(WaveQueueError::ConfigError(
            "task_set must not be empty".to_string(),
        ));
    }
    if raw.task.is_empty() {
        return Err(WaveQueueError::ConfigError(format!(
            "task set '{}' must contain at least one [task.<id>] section",
            raw.task_set
        )));
    }

    // Cycles and references outside the file are deliberately not checked
    // here: cycles are rejected when the set is planned, outside references
    // are external dependencies.
    for (id, spec) in raw.task.iter() {
        if id.trim().is_empty() {
            return Err(WaveQueueError::ConfigError(
                "task IDs must not be empty".to_string(),
            ));
        }
        if spec.depends_on.iter().any(|dep| dep.trim().is_empty()) {
            return Err(WaveQueueError::ConfigError(format!(
                "task '{}' has an empty entry in `depends_on`",
                id
            )));
        }
        if let Some(lane) = &spec.lane {
            if lane.trim().is_empty() {
                return Err(WaveQueueError::ConfigError(format!(
                    "task '{}' pins an empty lane",
                    id
                )));
            }
        }
    }
    Ok(())
}

fn new_task_from_spec(id: String, spec: TaskSpec, imported_at: DateTime<Utc>) -> Result<NewTask> {
    let created_at = match spec.created_at.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                WaveQueueError::ConfigError(format!(
                    "task '{}' has invalid created_at '{}': {}",
                    id, raw, e
                ))
            })?,
        None => imported_at,
    };

    Ok(NewTask {
        priority: spec.priority.map(Priority).unwrap_or_default(),
        category: spec.category,
        created_at,
        depends_on: spec.depends_on,
        pins: Pins {
            wave: spec.wave,
            lane: spec.lane,
            execution_order: spec.execution_order,
        },
        id,
    })
}
