#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use wavequeue::config::TaskSetFile;
use wavequeue::dag::{Pins, TaskAttrs};
use wavequeue::store::{NewTask, QueueStore};
use wavequeue::types::Priority;

/// Fixed base timestamp so tests are reproducible.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

/// `base_time()` plus `secs` seconds.
pub fn at(secs: i64) -> DateTime<Utc> {
    base_time() + chrono::Duration::seconds(secs)
}

/// Builder for `TaskSetFile` to simplify test setup.
pub struct TaskSetBuilder {
    task_set: String,
    tasks: Vec<NewTask>,
}

impl TaskSetBuilder {
    pub fn new(task_set: &str) -> Self {
        Self {
            task_set: task_set.to_string(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: NewTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Shorthand for a default task with the given dependencies.
    pub fn task(self, id: &str, depends_on: &[&str]) -> Self {
        let mut builder = TaskBuilder::new(id);
        for dep in depends_on {
            builder = builder.after(dep);
        }
        self.with_task(builder.build())
    }

    pub fn build(self) -> TaskSetFile {
        TaskSetFile {
            task_set: self.task_set,
            tasks: self.tasks,
        }
    }

    /// Import into `store` and return the file for further use.
    pub fn import_into(self, store: &mut QueueStore) -> TaskSetFile {
        let file = self.build();
        store
            .import_task_set(&file.task_set, &file.tasks)
            .expect("Failed to import task set from builder");
        file
    }
}

/// Builder for `NewTask`.
pub struct TaskBuilder {
    task: NewTask,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            task: NewTask {
                id: id.to_string(),
                priority: Priority::DEFAULT,
                category: None,
                created_at: base_time(),
                depends_on: vec![],
                pins: Pins::default(),
            },
        }
    }

    pub fn priority(mut self, p: u8) -> Self {
        self.task.priority = Priority(p);
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.task.category = Some(category.to_string());
        self
    }

    pub fn created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.task.created_at = ts;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.depends_on.push(dep.to_string());
        self
    }

    pub fn pin_wave(mut self, wave: u32) -> Self {
        self.task.pins.wave = Some(wave);
        self
    }

    pub fn pin_lane(mut self, lane: &str) -> Self {
        self.task.pins.lane = Some(lane.to_string());
        self
    }

    pub fn pin_order(mut self, order: u32) -> Self {
        self.task.pins.execution_order = Some(order);
        self
    }

    pub fn build(self) -> NewTask {
        self.task
    }

    pub fn attrs(self) -> TaskAttrs {
        TaskAttrs {
            id: self.task.id,
            priority: self.task.priority,
            category: self.task.category,
            created_at: self.task.created_at,
        }
    }
}
