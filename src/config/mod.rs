// src/config/mod.rs

//! Configuration loading and validation for wavequeue.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`): the `[store]` and
//!   `[lanes]` sections, plus the task-set import file format.
//! - Load files from disk (`loader.rs`).
//! - Validate them (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    default_config_path, load_and_validate, load_from_path, load_or_default, load_task_set_file,
};
pub use model::{
    ConfigFile, LaneSection, RawConfigFile, RawTaskSetFile, StoreSection, TaskSetFile, TaskSpec,
};
