// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::types::TaskId;

/// Internal node structure: stores immediate in-set dependencies.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Tasks that must finish in an earlier wave, sorted.
    deps: Vec<TaskId>,
}

/// An edge whose target lies outside the scheduled task set.
///
/// Such edges are treated as already satisfied and dropped from wave
/// computation, but reported so callers can decide whether that is intended.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ExternalDependency {
    pub task: TaskId,
    pub depends_on: TaskId,
}

/// Dependency graph restricted to one task set, keyed by task ID.
///
/// Nodes are kept in a `BTreeMap` and adjacency lists are sorted, so every
/// traversal over the graph visits tasks in the same order for the same
/// input.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<TaskId, DagNode>,
    external: Vec<ExternalDependency>,
}

impl DependencyGraph {
    /// Build the graph for `task_ids`, asking `dependencies` for each task's
    /// direct dependency edges.
    ///
    /// Edges pointing outside `task_ids` are dropped and recorded in
    /// [`DependencyGraph::external_dependencies`].
    pub fn build<F, I>(task_ids: &BTreeSet<TaskId>, mut dependencies: F) -> Self
    where
        F: FnMut(&str) -> I,
        I: IntoIterator<Item = TaskId>,
    {
        let mut nodes: BTreeMap<TaskId, DagNode> = task_ids
            .iter()
            .map(|id| (id.clone(), DagNode::default()))
            .collect();
        let mut external = Vec::new();

        for id in task_ids {
            let deps: BTreeSet<TaskId> = dependencies(id).into_iter().collect();
            let mut in_set = Vec::with_capacity(deps.len());

            for dep in deps {
                if task_ids.contains(&dep) {
                    in_set.push(dep);
                } else {
                    external.push(ExternalDependency {
                        task: id.clone(),
                        depends_on: dep,
                    });
                }
            }

            if let Some(node) = nodes.get_mut(id) {
                node.deps = in_set;
            }
        }

        Self { nodes, external }
    }

    /// Convenience constructor from explicit `(task, depends_on)` pairs.
    pub fn from_edges<'a>(
        task_ids: &BTreeSet<TaskId>,
        edges: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut by_task: BTreeMap<&str, Vec<TaskId>> = BTreeMap::new();
        for (task, dep) in edges {
            by_task.entry(task).or_default().push(dep.to_string());
        }
        Self::build(task_ids, |id| by_task.get(id).cloned().unwrap_or_default())
    }

    /// All task IDs, in sorted order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate in-set dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Edges that were dropped because they leave the task set.
    pub fn external_dependencies(&self) -> &[ExternalDependency] {
        &self.external
    }
}
