// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.
//!
//! Each handler calls one controller operation and turns its result into
//! commands for the IO shell. Controller errors never stop the loop: they
//! become rejection notices and are logged.

use tracing::{debug, warn};

use crate::announce::Notice;
use crate::engine::controller::WaveRunController;
use crate::engine::{ControllerEvent, RuntimeOptions};
use crate::errors::{Result, WaveQueueError};
use crate::types::TaskOutcome;

/// Command produced by the core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Hand these notices to the activation backend.
    Announce(Vec<Notice>),
    /// Request that the process exits (used for `--once` when idle).
    RequestExit,
}

/// Decision returned by the core after handling a single `ControllerEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn continue_with(notices: Vec<Notice>) -> Self {
        let mut commands = Vec::new();
        if !notices.is_empty() {
            commands.push(CoreCommand::Announce(notices));
        }
        CoreStep {
            commands,
            keep_running: true,
        }
    }
}

/// Handle a plan request.
///
/// Planning failures (cycles, pin conflicts, an already running run) are
/// reported to the authoring side as `PlanRejected`; nothing was persisted.
pub fn handle_plan_request(controller: &mut WaveRunController, task_set: String) -> CoreStep {
    match controller.plan_run(&task_set) {
        Ok(planned) => {
            debug!(task_set = %task_set, run_id = %planned.run_id, "plan request handled");
            CoreStep::continue_with(Notice::from_step(&planned.step))
        }
        Err(err) => {
            warn!(task_set = %task_set, "plan rejected: {err}");
            CoreStep::continue_with(vec![Notice::PlanRejected {
                task_set,
                reason: err.to_string(),
                retriable: err.is_retriable(),
            }])
        }
    }
}

/// Handle a terminal task outcome.
///
/// If this finished a run and `exit_when_idle` is set, the core requests
/// exit once no other run is active.
pub fn handle_task_terminal(
    controller: &mut WaveRunController,
    options: &RuntimeOptions,
    task: String,
    outcome: TaskOutcome,
) -> CoreStep {
    let result = controller.on_task_terminal(&task, outcome);
    let event = ControllerEvent::TaskTerminal { task, outcome };
    finish_step(controller, options, event, result.map(|step| Notice::from_step(&step)))
}

/// Handle a cancel request.
pub fn handle_cancel_request(
    controller: &mut WaveRunController,
    options: &RuntimeOptions,
    run_id: String,
) -> CoreStep {
    let result = controller.cancel_run(&run_id);
    let event = ControllerEvent::CancelRequested { run_id };
    finish_step(controller, options, event, result.map(|step| Notice::from_step(&step)))
}

fn finish_step(
    controller: &WaveRunController,
    options: &RuntimeOptions,
    event: ControllerEvent,
    result: Result<Vec<Notice>>,
) -> CoreStep {
    let notices = match result {
        Ok(notices) => notices,
        Err(err) => return reject(event, err),
    };

    let run_finished = notices
        .iter()
        .any(|n| matches!(n, Notice::RunFinished { .. }));
    let mut step = CoreStep::continue_with(notices);

    if options.exit_when_idle && run_finished {
        match controller.has_active_runs() {
            Ok(false) => {
                step.commands.push(CoreCommand::RequestExit);
                step.keep_running = false;
            }
            Ok(true) => {}
            Err(err) => warn!("could not check for active runs: {err}"),
        }
    }
    step
}

fn reject(event: ControllerEvent, err: WaveQueueError) -> CoreStep {
    warn!(%event, "request rejected: {err}");
    CoreStep::continue_with(vec![Notice::EventRejected {
        event: event.to_string(),
        reason: err.to_string(),
        retriable: err.is_retriable(),
    }])
}
