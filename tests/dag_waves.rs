// tests/dag_waves.rs
mod common;
use crate::common::init_tracing;

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;

use wavequeue::dag::waves::waves_by_number;
use wavequeue::dag::{DependencyGraph, ExternalDependency, compute_waves, compute_waves_with_pins};
use wavequeue::errors::WaveQueueError;

type TestResult = Result<(), Box<dyn Error>>;

fn ids(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn chain_gets_one_wave_per_link() -> TestResult {
    init_tracing();

    let graph = DependencyGraph::from_edges(&ids(&["A", "B", "C"]), [("B", "A"), ("C", "B")]);
    let waves = compute_waves(&graph)?;

    assert_eq!(waves["A"], 0);
    assert_eq!(waves["B"], 1);
    assert_eq!(waves["C"], 2);
    Ok(())
}

#[test]
fn diamond_takes_longest_path() -> TestResult {
    init_tracing();

    // A -> {B, C} -> D, plus a shortcut A -> D that must not pull D earlier.
    let graph = DependencyGraph::from_edges(
        &ids(&["A", "B", "C", "D"]),
        [("B", "A"), ("C", "A"), ("D", "B"), ("D", "C"), ("D", "A")],
    );
    let waves = compute_waves(&graph)?;

    let grouped = waves_by_number(&waves);
    assert_eq!(grouped[&0], vec!["A"]);
    assert_eq!(grouped[&1], vec!["B", "C"]);
    assert_eq!(grouped[&2], vec!["D"]);
    Ok(())
}

#[test]
fn independent_tasks_share_wave_zero() -> TestResult {
    init_tracing();

    let graph = DependencyGraph::from_edges(&ids(&["X", "Y", "Z"]), std::iter::empty());
    let waves = compute_waves(&graph)?;

    assert!(waves.values().all(|&w| w == 0));
    assert_eq!(waves.len(), 3);
    Ok(())
}

#[test]
fn two_cycle_is_rejected_naming_both_tasks() {
    init_tracing();

    let graph = DependencyGraph::from_edges(&ids(&["A", "B", "C"]), [("A", "B"), ("B", "A"), ("C", "A")]);
    let err = compute_waves(&graph).unwrap_err();

    assert_eq!(err.tasks, vec!["A".to_string(), "B".to_string()]);
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn self_loop_is_a_cycle() {
    init_tracing();

    let graph = DependencyGraph::from_edges(&ids(&["A", "B"]), [("A", "A")]);
    let err = compute_waves(&graph).unwrap_err();

    assert_eq!(err.tasks, vec!["A".to_string()]);
}

#[test]
fn longer_cycle_reports_every_member_and_no_partial_result() {
    init_tracing();

    let graph = DependencyGraph::from_edges(
        &ids(&["root", "p", "q", "r"]),
        [("p", "root"), ("q", "p"), ("r", "q"), ("p", "r")],
    );
    let err = compute_waves(&graph).unwrap_err();

    assert_eq!(err.tasks, vec!["p".to_string(), "q".to_string(), "r".to_string()]);
}

#[test]
fn external_dependencies_are_dropped_and_reported() -> TestResult {
    init_tracing();

    let graph = DependencyGraph::from_edges(&ids(&["A", "B"]), [("B", "A"), ("A", "elsewhere")]);
    let waves = compute_waves(&graph)?;

    assert_eq!(waves["A"], 0);
    assert_eq!(waves["B"], 1);
    assert_eq!(
        graph.external_dependencies(),
        &[ExternalDependency {
            task: "A".to_string(),
            depends_on: "elsewhere".to_string(),
        }]
    );
    Ok(())
}

#[test]
fn pinned_wave_later_than_required_pushes_dependents() -> TestResult {
    init_tracing();

    let graph = DependencyGraph::from_edges(&ids(&["A", "B", "C"]), [("B", "A"), ("C", "B")]);
    let pins = BTreeMap::from([("B".to_string(), 3)]);
    let waves = compute_waves_with_pins(&graph, &pins)?;

    assert_eq!(waves["A"], 0);
    assert_eq!(waves["B"], 3);
    assert_eq!(waves["C"], 4);
    Ok(())
}

#[test]
fn dependency_pinned_to_the_last_wave_is_a_conflict() -> TestResult {
    init_tracing();

    let graph = DependencyGraph::from_edges(&ids(&["A", "B"]), [("B", "A")]);
    let pins = BTreeMap::from([("A".to_string(), u32::MAX)]);

    match compute_waves_with_pins(&graph, &pins) {
        Err(WaveQueueError::PinConflict(msg)) => {
            assert!(msg.contains("'B'"));
            assert!(msg.contains("'A'"));
        }
        other => panic!("expected PinConflict, got {other:?}"),
    }

    // A task without dependents may still take the last wave.
    let lone = DependencyGraph::from_edges(&ids(&["A", "B"]), std::iter::empty());
    let waves = compute_waves_with_pins(&lone, &pins)?;
    assert_eq!(waves["A"], u32::MAX);
    assert_eq!(waves["B"], 0);
    Ok(())
}

#[test]
fn pinned_wave_earlier_than_dependencies_is_a_conflict() {
    init_tracing();

    let graph = DependencyGraph::from_edges(&ids(&["A", "B"]), [("B", "A")]);
    let pins = BTreeMap::from([("B".to_string(), 0)]);

    match compute_waves_with_pins(&graph, &pins) {
        Err(WaveQueueError::PinConflict(msg)) => assert!(msg.contains("'B'")),
        other => panic!("expected PinConflict, got {other:?}"),
    }
}

#[test]
fn cycle_wins_over_pins() {
    init_tracing();

    let graph = DependencyGraph::from_edges(&ids(&["A", "B"]), [("A", "B"), ("B", "A")]);
    let pins = BTreeMap::from([("A".to_string(), 5)]);

    assert!(matches!(
        compute_waves_with_pins(&graph, &pins),
        Err(WaveQueueError::DagCycle(_))
    ));
}

#[test]
fn same_edges_give_same_waves_regardless_of_insertion_order() -> TestResult {
    init_tracing();

    let set = ids(&["a", "b", "c", "d", "e"]);
    let edges = [("b", "a"), ("c", "a"), ("d", "c"), ("e", "b"), ("e", "d")];
    let mut reversed = edges;
    reversed.reverse();

    let first = compute_waves(&DependencyGraph::from_edges(&set, edges))?;
    let second = compute_waves(&DependencyGraph::from_edges(&set, reversed))?;
    assert_eq!(first, second);
    Ok(())
}
