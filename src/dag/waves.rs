// src/dag/waves.rs

//! Topological leveling of a task set into waves.
//!
//! A task with no in-set dependencies lands in wave 0; every other task lands
//! one wave after its latest dependency. Evaluation is a depth-first walk with
//! memoisation, so each node and edge is visited once. The walk keeps its own
//! stack instead of recursing, which keeps long dependency chains off the
//! call stack.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::graph::DependencyGraph;
use crate::errors::{CycleError, Result, WaveQueueError};
use crate::types::TaskId;

#[derive(Debug, Clone, Copy)]
enum Mark {
    InProgress,
    Done(u32),
}

/// Compute a wave number for every task in `graph`.
///
/// Either every task gets a wave or the call fails with a [`CycleError`];
/// no partial result is ever returned.
pub fn compute_waves(graph: &DependencyGraph) -> std::result::Result<BTreeMap<TaskId, u32>, CycleError> {
    level(graph, &BTreeMap::new()).map(|leveled| leveled.waves)
}

/// Like [`compute_waves`], but honours caller-pinned wave numbers.
///
/// A pinned wave may push a task later than its dependencies require (its
/// dependents then build on the pinned value) but never earlier: that would
/// let it start before something it depends on.
pub fn compute_waves_with_pins(
    graph: &DependencyGraph,
    pins: &BTreeMap<TaskId, u32>,
) -> Result<BTreeMap<TaskId, u32>> {
    let leveled = level(graph, pins)?;
    if !leveled.pin_conflicts.is_empty() {
        return Err(WaveQueueError::PinConflict(leveled.pin_conflicts.join("; ")));
    }
    Ok(leveled.waves)
}

struct Leveled {
    waves: BTreeMap<TaskId, u32>,
    pin_conflicts: Vec<String>,
}

fn level(
    graph: &DependencyGraph,
    pins: &BTreeMap<TaskId, u32>,
) -> std::result::Result<Leveled, CycleError> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(graph.len());
    let mut pin_conflicts = Vec::new();

    for root in graph.tasks() {
        if marks.contains_key(root) {
            continue;
        }

        // (task, index of the next dependency to visit)
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::InProgress);

        while let Some(&(node, next)) = stack.last() {
            let deps = graph.dependencies_of(node);

            if next < deps.len() {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let dep = deps[next].as_str();
                match marks.get(dep) {
                    Some(Mark::InProgress) => {
                        debug!(task = %node, dep = %dep, "re-entered in-progress task");
                        return Err(cycle_error(graph));
                    }
                    Some(Mark::Done(_)) => {}
                    None => {
                        marks.insert(dep, Mark::InProgress);
                        stack.push((dep, 0));
                    }
                }
                continue;
            }

            let mut required = 0u32;
            let mut past_last_wave = None;
            for dep in deps {
                if let Some(Mark::Done(w)) = marks.get(dep.as_str()) {
                    match w.checked_add(1) {
                        Some(next) => required = required.max(next),
                        None => past_last_wave = Some(dep),
                    }
                }
            }

            // Only a pinned dependency can sit in the last representable wave.
            let wave = if let Some(dep) = past_last_wave {
                pin_conflicts.push(format!(
                    "task '{node}' depends on '{dep}' in wave {}; no later wave exists",
                    u32::MAX
                ));
                u32::MAX
            } else {
                match pins.get(node) {
                    Some(&pinned) if pinned >= required => pinned,
                    Some(&pinned) => {
                        pin_conflicts.push(format!(
                            "task '{node}' is pinned to wave {pinned} but its dependencies require wave >= {required}"
                        ));
                        required
                    }
                    None => required,
                }
            };

            marks.insert(node, Mark::Done(wave));
            stack.pop();
        }
    }

    let waves = marks
        .into_iter()
        .filter_map(|(id, mark)| match mark {
            Mark::Done(w) => Some((id.to_string(), w)),
            Mark::InProgress => None,
        })
        .collect();

    Ok(Leveled {
        waves,
        pin_conflicts,
    })
}

/// Every task that lies on some cycle: members of non-trivial strongly
/// connected components, plus self-loops.
fn cycle_error(graph: &DependencyGraph) -> CycleError {
    let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
    for task in graph.tasks() {
        g.add_node(task);
    }
    for task in graph.tasks() {
        for dep in graph.dependencies_of(task) {
            g.add_edge(dep.as_str(), task, ());
        }
    }

    let mut members: BTreeSet<TaskId> = BTreeSet::new();
    for component in tarjan_scc(&g) {
        let on_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&n| g.contains_edge(n, n));
        if on_cycle {
            members.extend(component.into_iter().map(str::to_string));
        }
    }

    CycleError {
        tasks: members.into_iter().collect(),
    }
}

/// Group a wave map into ordered wave membership lists (wave 0 first).
pub fn waves_by_number(waves: &BTreeMap<TaskId, u32>) -> BTreeMap<u32, Vec<TaskId>> {
    let mut grouped: BTreeMap<u32, Vec<TaskId>> = BTreeMap::new();
    for (id, &wave) in waves {
        grouped.entry(wave).or_default().push(id.clone());
    }
    grouped
}
