// src/dag/lanes.rs

//! Category → lane mapping.
//!
//! Tasks in different lanes of the same wave are treated as conflict-free and
//! may run concurrently; tasks sharing a lane are serialized through their
//! execution order. The table is injected from configuration, so the mapping
//! is data rather than code.

use std::collections::BTreeMap;

use crate::types::LaneName;

/// Lane used for unknown or missing categories unless configured otherwise.
pub const DEFAULT_LANE: &str = "general";

/// Stateless lane lookup. Safe to call any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneAssigner {
    default_lane: LaneName,
    /// Keys are normalised (trimmed, lowercase) category names.
    table: BTreeMap<String, LaneName>,
}

impl LaneAssigner {
    pub fn new<I, K, V>(default_lane: impl Into<LaneName>, table: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<LaneName>,
    {
        Self {
            default_lane: default_lane.into(),
            table: table
                .into_iter()
                .map(|(category, lane)| (normalize(category.as_ref()), lane.into()))
                .collect(),
        }
    }

    /// The lane a task with this category belongs to.
    ///
    /// Total: `None`, blank and unmapped categories fall back to the default lane.
    pub fn assign_lane(&self, category: Option<&str>) -> &str {
        category
            .map(normalize)
            .and_then(|key| self.table.get(&key))
            .map(String::as_str)
            .unwrap_or(self.default_lane.as_str())
    }

    pub fn default_lane(&self) -> &str {
        &self.default_lane
    }

    /// Every distinct lane this assigner can produce, including the default.
    pub fn lanes(&self) -> Vec<&str> {
        let mut lanes: Vec<&str> = self.table.values().map(String::as_str).collect();
        lanes.push(&self.default_lane);
        lanes.sort_unstable();
        lanes.dedup();
        lanes
    }
}

impl Default for LaneAssigner {
    fn default() -> Self {
        LaneAssigner::new(DEFAULT_LANE, default_lane_table())
    }
}

/// Built-in category table used when configuration does not supply one.
pub fn default_lane_table() -> BTreeMap<String, LaneName> {
    [
        ("backend", "backend"),
        ("frontend", "frontend"),
        ("database", "data"),
        ("infra", "infra"),
        ("docs", "docs"),
        ("test", "qa"),
    ]
    .into_iter()
    .map(|(category, lane)| (category.to_string(), lane.to_string()))
    .collect()
}

fn normalize(category: &str) -> String {
    category.trim().to_lowercase()
}
