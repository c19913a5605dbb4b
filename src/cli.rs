// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::TaskOutcome;

/// Command-line arguments for `wavequeue`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "wavequeue",
    version,
    about = "Schedule dependent tasks into waves and lanes, durably.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `wavequeue.toml` in the current working directory. A missing
    /// default file means built-in defaults.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Override `[store].path` from the config.
    #[arg(long, value_name = "PATH", global = true)]
    pub store: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WAVEQUEUE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Import a task-set file and plan it.
    Import {
        /// Task-set file (TOML).
        file: PathBuf,
    },
    /// Plan (or replan) a task set and activate its first wave.
    Plan { task_set: String },
    /// Report a task's terminal outcome.
    Complete {
        task: String,
        #[arg(long, default_value = "success")]
        outcome: TaskOutcome,
    },
    /// Cancel an active run.
    Cancel { run_id: String },
    /// Run recovery only and print what it did.
    Recover,
    /// Print the current schedule of a task set.
    Status {
        task_set: String,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Read commands from stdin and print notices as JSON lines.
    ///
    /// Commands: `plan <set>`, `done <task> <success|failure>`,
    /// `cancel <run>`, `quit`.
    Serve {
        /// Exit once a run finishes and no other run is active.
        #[arg(long)]
        once: bool,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
