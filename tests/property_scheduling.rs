// tests/property_scheduling.rs
mod common;
use crate::common::builders::{TaskBuilder, at};

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use wavequeue::dag::{DependencyGraph, LaneAssigner, TaskAttrs, compute_waves, order};
use wavequeue::engine::build_schedule;
use wavequeue::store::TaskRecord;
use wavequeue::types::{Priority, TaskStatus};

// Strategy for an acyclic edge list: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(move |raw_deps| {
            let mut edges = Vec::new();
            for (i, potential) in raw_deps.into_iter().enumerate() {
                if i == 0 {
                    continue;
                }
                let deps: BTreeSet<usize> = potential.into_iter().map(|d| d % i).collect();
                edges.extend(deps.into_iter().map(|d| (i, d)));
            }
            (num_tasks, edges)
        })
    })
}

fn name(i: usize) -> String {
    format!("task_{i:03}")
}

fn graph_from(num_tasks: usize, edges: &[(usize, usize)]) -> DependencyGraph {
    let ids: BTreeSet<String> = (0..num_tasks).map(name).collect();
    let named: Vec<(String, String)> = edges.iter().map(|&(t, d)| (name(t), name(d))).collect();
    DependencyGraph::from_edges(&ids, named.iter().map(|(t, d)| (t.as_str(), d.as_str())))
}

fn attrs_strategy() -> impl Strategy<Value = Vec<TaskAttrs>> {
    proptest::collection::vec((0u8..4, prop::option::of("[a-c]"), 0i64..5), 1..12).prop_map(
        |raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (p, cat, secs))| {
                    let mut b = TaskBuilder::new(&name(i)).priority(p).created_at(at(secs));
                    if let Some(cat) = cat {
                        b = b.category(&cat);
                    }
                    b.attrs()
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn every_task_lands_after_all_its_dependencies((n, edges) in dag_strategy(25)) {
        let graph = graph_from(n, &edges);
        let waves = compute_waves(&graph).expect("acyclic input");

        prop_assert_eq!(waves.len(), n);
        for &(task, dep) in &edges {
            prop_assert!(waves[&name(task)] > waves[&name(dep)]);
        }
    }

    #[test]
    fn waves_are_as_early_as_dependencies_allow((n, edges) in dag_strategy(25)) {
        let graph = graph_from(n, &edges);
        let waves = compute_waves(&graph).expect("acyclic input");

        for i in 0..n {
            let expected = graph
                .dependencies_of(&name(i))
                .iter()
                .map(|d| waves[d] + 1)
                .max()
                .unwrap_or(0);
            prop_assert_eq!(waves[&name(i)], expected);
        }
    }

    #[test]
    fn back_edge_always_produces_a_cycle((n, edges) in dag_strategy(15)) {
        prop_assume!(!edges.is_empty());
        let (task, dep) = edges[0];
        let mut with_back_edge = edges.clone();
        with_back_edge.push((dep, task));

        let graph = graph_from(n, &with_back_edge);
        let err = compute_waves(&graph).expect_err("back edge closes a cycle");
        prop_assert!(err.tasks.contains(&name(task)));
        prop_assert!(err.tasks.contains(&name(dep)));
    }

    #[test]
    fn order_is_a_contiguous_permutation(tasks in attrs_strategy()) {
        let ordered = order(&tasks);
        let slots: BTreeSet<u32> = ordered.values().copied().collect();
        let expected: BTreeSet<u32> = (0..tasks.len() as u32).collect();
        prop_assert_eq!(slots, expected);
    }

    #[test]
    fn order_ignores_input_order(tasks in attrs_strategy()) {
        let mut reversed = tasks.clone();
        reversed.reverse();
        prop_assert_eq!(order(&tasks), order(&reversed));
    }

    #[test]
    fn planned_groups_are_contiguous_per_wave_and_lane(
        (n, edges) in dag_strategy(20),
        categories in proptest::collection::vec(prop::option::of("backend|frontend|docs|other"), 20),
    ) {
        let mut deps: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for &(t, d) in &edges {
            deps.entry(name(t)).or_default().push(name(d));
        }
        let records: Vec<TaskRecord> = (0..n)
            .map(|i| TaskRecord {
                id: name(i),
                task_set: "set".to_string(),
                priority: Priority::DEFAULT,
                category: categories[i].clone(),
                created_at: at(0),
                depends_on: deps.remove(&name(i)).unwrap_or_default(),
                status: TaskStatus::Pending,
                pins: Default::default(),
                schedule: None,
            })
            .collect();

        let plan = build_schedule(&records, &LaneAssigner::default()).expect("acyclic input");
        prop_assert_eq!(plan.entries.len(), n);

        let mut groups: BTreeMap<(u32, String), BTreeSet<u32>> = BTreeMap::new();
        for entry in plan.entries.values() {
            prop_assert!(groups
                .entry((entry.wave, entry.lane.clone()))
                .or_default()
                .insert(entry.execution_order));
        }
        for slots in groups.values() {
            let expected: BTreeSet<u32> = (0..slots.len() as u32).collect();
            prop_assert_eq!(slots, &expected);
        }
    }
}
