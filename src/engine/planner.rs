// src/engine/planner.rs

//! The planning pipeline: waves, then lanes, then execution order.
//!
//! Pure with respect to the store. The controller loads the task set, calls
//! [`build_schedule`], and commits the result in a single batch.

use std::collections::{BTreeMap, BTreeSet};

use crate::dag::{
    DependencyGraph, ExternalDependency, LaneAssigner, TaskAttrs, compute_waves_with_pins,
    order_with_pins,
};
use crate::errors::Result;
use crate::store::{ScheduleBatch, ScheduleEntry, TaskRecord};
use crate::types::{LaneName, TaskId};

/// Result of one planning pass, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePlan {
    pub entries: BTreeMap<TaskId, ScheduleEntry>,
    /// Edges dropped because they point outside the task set.
    pub external: Vec<ExternalDependency>,
}

impl SchedulePlan {
    /// Number of distinct waves. Pinned waves can leave gaps in the numbering.
    pub fn wave_count(&self) -> usize {
        self.entries
            .values()
            .map(|e| e.wave)
            .collect::<BTreeSet<u32>>()
            .len()
    }

    pub fn into_batch(self, run_id: impl Into<String>, task_set: impl Into<String>) -> ScheduleBatch {
        ScheduleBatch {
            run_id: run_id.into(),
            task_set: task_set.into(),
            entries: self.entries,
        }
    }
}

/// Compute wave, lane and execution order for every task in `tasks`.
///
/// `tasks` must all belong to the same task set. Fails without a partial
/// result on a dependency cycle or a conflicting pin.
pub fn build_schedule(tasks: &[TaskRecord], lanes: &LaneAssigner) -> Result<SchedulePlan> {
    let ids: BTreeSet<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
    let by_id: BTreeMap<&str, &TaskRecord> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let graph = DependencyGraph::build(&ids, |id| {
        by_id
            .get(id)
            .map(|t| t.depends_on.clone())
            .unwrap_or_default()
    });

    let wave_pins: BTreeMap<TaskId, u32> = tasks
        .iter()
        .filter_map(|t| t.pins.wave.map(|w| (t.id.clone(), w)))
        .collect();
    let waves = compute_waves_with_pins(&graph, &wave_pins)?;

    // Group members per (wave, lane); each group is ordered independently.
    let mut groups: BTreeMap<(u32, LaneName), Vec<TaskAttrs>> = BTreeMap::new();
    for task in tasks {
        let Some(&wave) = waves.get(&task.id) else {
            continue;
        };
        let lane = match &task.pins.lane {
            Some(pinned) => pinned.clone(),
            None => lanes.assign_lane(task.category.as_deref()).to_string(),
        };
        groups.entry((wave, lane)).or_default().push(task.attrs());
    }

    let mut entries = BTreeMap::new();
    for ((wave, lane), members) in groups {
        let order_pins: BTreeMap<TaskId, u32> = members
            .iter()
            .filter_map(|attrs| {
                by_id
                    .get(attrs.id.as_str())
                    .and_then(|t| t.pins.execution_order)
                    .map(|slot| (attrs.id.clone(), slot))
            })
            .collect();

        for (id, execution_order) in order_with_pins(&members, &order_pins)? {
            entries.insert(
                id,
                ScheduleEntry {
                    wave,
                    lane: lane.clone(),
                    execution_order,
                },
            );
        }
    }

    Ok(SchedulePlan {
        entries,
        external: graph.external_dependencies().to_vec(),
    })
}
