// src/engine/core.rs

//! Synchronous core runtime.
//!
//! This module contains a synchronous "core runtime" that consumes
//! [`ControllerEvent`]s and produces:
//! - updated state in the store (through the controller)
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending notices to the activation backend
//! - handling Ctrl+C / shutdown
//!
//! The core has no Tokio types, so it is unit tested against an in-memory
//! store without a runtime.

use crate::announce::Notice;
use crate::config::ConfigFile;
use crate::engine::controller::{RecoverySummary, WaveRunController};
use crate::engine::event_handlers::{
    CoreCommand, CoreStep, handle_cancel_request, handle_plan_request, handle_task_terminal,
};
use crate::engine::{ControllerEvent, RuntimeOptions};
use crate::errors::Result;
use crate::store::QueueStore;

/// Core runtime state.
///
/// This owns:
/// - the wave run controller (and through it, the store)
/// - notices produced by startup recovery, not yet announced
/// - runtime options (e.g. `exit_when_idle`)
#[derive(Debug)]
pub struct CoreRuntime {
    controller: WaveRunController,
    startup_notices: Vec<Notice>,
    options: RuntimeOptions,
}

impl CoreRuntime {
    /// Wrap an already recovered controller.
    pub fn new(
        controller: WaveRunController,
        recovery: &RecoverySummary,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            controller,
            startup_notices: Notice::from_recovery(recovery),
            options,
        }
    }

    /// Open the controller over `store` with lanes from `cfg`, running
    /// recovery first.
    pub fn start(store: QueueStore, cfg: &ConfigFile, options: RuntimeOptions) -> Result<Self> {
        let (controller, recovery) = WaveRunController::start(store, cfg.lane_assigner())?;
        Ok(Self::new(controller, &recovery, options))
    }

    pub fn controller(&self) -> &WaveRunController {
        &self.controller
    }

    pub fn into_controller(self) -> WaveRunController {
        self.controller
    }

    /// Commands to run before the first event: announce whatever recovery
    /// activated or finished. Yields nothing on the second call.
    pub fn startup(&mut self) -> CoreStep {
        let notices = std::mem::take(&mut self.startup_notices);
        let mut commands = Vec::new();
        if !notices.is_empty() {
            commands.push(CoreCommand::Announce(notices));
        }
        CoreStep {
            commands,
            keep_running: true,
        }
    }

    /// Handle a single event, updating the store and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: ControllerEvent) -> CoreStep {
        match event {
            ControllerEvent::PlanRequested { task_set } => {
                handle_plan_request(&mut self.controller, task_set)
            }
            ControllerEvent::TaskTerminal { task, outcome } => {
                handle_task_terminal(&mut self.controller, &self.options, task, outcome)
            }
            ControllerEvent::CancelRequested { run_id } => {
                handle_cancel_request(&mut self.controller, &self.options, run_id)
            }
            ControllerEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }
}
