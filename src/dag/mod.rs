// src/dag/mod.rs

//! Pure scheduling algorithms. Nothing in here touches the store.
//!
//! - [`graph`] holds the dependency graph restricted to one task set.
//! - [`waves`] levels that graph into waves and rejects cycles.
//! - [`lanes`] maps task categories to lanes.
//! - [`order`] serializes the tasks sharing a (wave, lane) group.
//! - [`task_info`] provides the task attributes these steps read.

pub mod graph;
pub mod lanes;
pub mod order;
pub mod task_info;
pub mod waves;

pub use graph::{DependencyGraph, ExternalDependency};
pub use lanes::{LaneAssigner, DEFAULT_LANE};
pub use order::{order, order_with_pins};
pub use task_info::{Pins, TaskAttrs};
pub use waves::{compute_waves, compute_waves_with_pins};
