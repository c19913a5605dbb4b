// src/lib.rs

pub mod announce;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod store;
pub mod types;

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::announce::{Notice, StdoutBackend};
use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, default_config_path, load_and_validate, load_or_default};
use crate::engine::{
    ControllerEvent, CoreRuntime, RecoverySummary, Runtime, RuntimeOptions, ScheduleView,
    WaveRunController,
};
use crate::store::QueueStore;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the store, opened and recovered before anything else runs
/// - the requested subcommand (one-shot, or the `serve` event loop)
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(&args)?;
    let store_path = args
        .store
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.store.path));
    let store = QueueStore::open(&store_path)?;
    debug!(path = %store_path.display(), "store opened");

    let (mut controller, recovery) = WaveRunController::start(store, cfg.lane_assigner())?;
    if !recovery.is_noop() {
        info!(
            planned = recovery.planned.len(),
            activated = recovery.activated.len(),
            finished = recovery.finished.len(),
            "startup recovery changed state"
        );
    }

    match args.command {
        Command::Serve { once } => {
            let options = RuntimeOptions {
                exit_when_idle: once,
            };
            serve(CoreRuntime::new(controller, &recovery, options)).await
        }
        Command::Recover => {
            print_recovery(&recovery);
            Ok(())
        }
        Command::Import { file } => {
            let task_set = config::load_task_set_file(&file)?;
            let summary = controller.import_task_set(&task_set)?;
            println!(
                "imported task set '{}': {} new tasks, {} new edges",
                task_set.task_set, summary.tasks_inserted, summary.edges_inserted
            );

            let unchanged = summary.tasks_inserted == 0 && summary.edges_inserted == 0;
            if unchanged && controller.store().latest_run_for(&task_set.task_set)?.is_some() {
                println!("task set unchanged; not replanning");
                return Ok(());
            }
            let planned = controller.plan_run(&task_set.task_set)?;
            println!("run {}", planned.run_id);
            print_notices(&Notice::from_step(&planned.step))
        }
        Command::Plan { task_set } => {
            let planned = controller.plan_run(&task_set)?;
            println!("run {}", planned.run_id);
            print_notices(&Notice::from_step(&planned.step))
        }
        Command::Complete { task, outcome } => {
            let step = controller.on_task_terminal(&task, outcome)?;
            print_notices(&Notice::from_step(&step))
        }
        Command::Cancel { run_id } => {
            let step = controller.cancel_run(&run_id)?;
            match &step.run {
                Some(run) => println!("run {} is {}", run.id, run.status),
                None => println!("run {run_id} not found"),
            }
            Ok(())
        }
        Command::Status { task_set, json } => {
            let view = controller.schedule_view(&task_set)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_view(&view);
            }
            Ok(())
        }
    }
}

/// Explicit `--config` must exist; the default path may be missing.
fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    let cfg = match &args.config {
        Some(path) => load_and_validate(path)?,
        None => load_or_default(default_config_path())?,
    };
    Ok(cfg)
}

async fn serve(core: CoreRuntime) -> Result<()> {
    let (rt_tx, rt_rx) = mpsc::channel::<ControllerEvent>(64);

    spawn_stdin_reader(rt_tx.clone());

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(ControllerEvent::ShutdownRequested).await;
        });
    }
    drop(rt_tx);

    let runtime = Runtime::new(core, rt_rx, StdoutBackend::new());
    runtime.run().await?;
    Ok(())
}

/// Read the line protocol on a plain thread so a pending read never keeps
/// the process alive after the runtime exits. EOF requests shutdown.
fn spawn_stdin_reader(tx: mpsc::Sender<ControllerEvent>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("failed to read stdin: {e}");
                    break;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match trimmed.parse::<ControllerEvent>() {
                Ok(event) => {
                    if tx.blocking_send(event).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("ignoring input line: {e}"),
            }
        }
        let _ = tx.blocking_send(ControllerEvent::ShutdownRequested);
    });
}

fn print_notices(notices: &[Notice]) -> Result<()> {
    for notice in notices {
        println!("{}", serde_json::to_string(notice)?);
    }
    Ok(())
}

fn print_recovery(summary: &RecoverySummary) {
    println!("recovery");
    println!("  runs evaluated: {}", summary.runs_evaluated);
    for (task_set, run_id) in &summary.planned {
        println!("  planned: {task_set} (run {run_id})");
    }
    for (task_set, reason) in &summary.plan_failures {
        println!("  plan failed: {task_set}: {reason}");
    }
    for task_set in &summary.skipped {
        println!("  skipped: {task_set} (run in progress)");
    }
    for activation in &summary.activated {
        println!(
            "  activated: run {} wave {} {:?}",
            activation.run_id, activation.wave, activation.task_ids
        );
    }
    for run in &summary.finished {
        println!("  finished: run {} ({})", run.id, run.status);
    }
    if summary.is_noop() {
        println!("  nothing to do");
    }
}

fn print_view(view: &ScheduleView) {
    println!("task set: {}", view.task_set);
    match &view.run {
        Some(run) => {
            let wave = run
                .current_wave
                .map(|w| w.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("run:      {} ({}, current wave {wave})", run.id, run.status);
        }
        None => println!("run:      (never planned)"),
    }
    println!();
    println!("{:>5}  {:<12} {:>5}  {:<8} TASK", "WAVE", "LANE", "ORDER", "STATUS");
    for task in &view.tasks {
        println!(
            "{:>5}  {:<12} {:>5}  {:<8} {}",
            task.wave.map(|w| w.to_string()).unwrap_or_else(|| "-".to_string()),
            task.lane.as_deref().unwrap_or("-"),
            task.execution_order
                .map(|o| o.to_string())
                .unwrap_or_else(|| "-".to_string()),
            task.status.as_str(),
            task.id
        );
    }
}
