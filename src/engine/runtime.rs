// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::announce::{ActivationBackend, Notice};
use crate::errors::Result;

use super::core::CoreRuntime;
use super::{ControllerEvent, CoreCommand};

/// Drives the wave run controller in response to `ControllerEvent`s,
/// and delegates notice delivery to an `ActivationBackend`.
///
/// This is an IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. Events are processed strictly one after another.
pub struct Runtime<B: ActivationBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<ControllerEvent>,
    backend: B,
}

impl<B: ActivationBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<B: ActivationBackend> Runtime<B> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<ControllerEvent>, backend: B) -> Self {
        Self {
            core,
            event_rx,
            backend,
        }
    }

    /// Main event loop.
    ///
    /// - Announces what startup recovery did.
    /// - Consumes `ControllerEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (announce, exit).
    ///
    /// Returns the core so callers can inspect the final state.
    pub async fn run(mut self) -> Result<CoreRuntime> {
        info!("wavequeue runtime started");

        let startup = self.core.startup();
        for command in startup.commands {
            self.execute_command(command).await?;
        }

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(self.core)
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Announce(notices) => self.announce(notices).await,
            CoreCommand::RequestExit => {
                info!("no active runs left; core issued RequestExit");
                Ok(())
            }
        }
    }

    async fn announce(&mut self, notices: Vec<Notice>) -> Result<()> {
        if notices.is_empty() {
            return Ok(());
        }
        debug!(count = notices.len(), "announcing notices");
        self.backend.announce(notices).await
    }
}
