// src/dag/order.rs

//! Deterministic serialization of the tasks sharing one (wave, lane) group.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::dag::task_info::TaskAttrs;
use crate::errors::{Result, WaveQueueError};
use crate::types::TaskId;

/// Sort key: priority (lower first), category, creation time, then task ID.
///
/// The trailing task ID makes this a total order even when every other key
/// ties. A missing category sorts before any named one.
pub fn compare(a: &TaskAttrs, b: &TaskAttrs) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| a.category.as_deref().cmp(&b.category.as_deref()))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Assign each task its zero-based position in sort order.
///
/// Values are unique and contiguous. Re-run whenever the group's membership
/// changes.
pub fn order(tasks: &[TaskAttrs]) -> BTreeMap<TaskId, u32> {
    let mut sorted: Vec<&TaskAttrs> = tasks.iter().collect();
    sorted.sort_by(|a, b| compare(a, b));

    sorted
        .into_iter()
        .zip(0u32..)
        .map(|(task, position)| (task.id.clone(), position))
        .collect()
}

/// Like [`order`], but tasks with a caller-pinned order keep it.
///
/// Unpinned tasks fill the remaining slots in sort order, so the result is
/// still a contiguous permutation of `0..tasks.len()`. Pins that fall outside
/// that range or collide with each other are rejected.
pub fn order_with_pins(
    tasks: &[TaskAttrs],
    pins: &BTreeMap<TaskId, u32>,
) -> Result<BTreeMap<TaskId, u32>> {
    let len = tasks.len() as u32;
    let mut taken: BTreeSet<u32> = BTreeSet::new();
    let mut result: BTreeMap<TaskId, u32> = BTreeMap::new();

    for task in tasks {
        let Some(&slot) = pins.get(&task.id) else {
            continue;
        };
        if slot >= len {
            return Err(WaveQueueError::PinConflict(format!(
                "task '{}' is pinned to execution order {slot} but its group only has {len} tasks",
                task.id
            )));
        }
        if !taken.insert(slot) {
            return Err(WaveQueueError::PinConflict(format!(
                "task '{}' is pinned to execution order {slot}, which another task already holds",
                task.id
            )));
        }
        result.insert(task.id.clone(), slot);
    }

    let mut unpinned: Vec<&TaskAttrs> = tasks
        .iter()
        .filter(|t| !result.contains_key(&t.id))
        .collect();
    unpinned.sort_by(|a, b| compare(a, b));

    let free_slots = (0..len).filter(|slot| !taken.contains(slot));
    for (task, slot) in unpinned.into_iter().zip(free_slots) {
        result.insert(task.id.clone(), slot);
    }

    Ok(result)
}
