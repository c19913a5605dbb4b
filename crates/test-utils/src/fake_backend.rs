use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use wavequeue::announce::{ActivationBackend, Notice};
use wavequeue::engine::ControllerEvent;
use wavequeue::errors::Result;
use wavequeue::types::TaskOutcome;

/// A fake execution side that:
/// - records every notice it is handed
/// - immediately reports a terminal outcome for each task of an activated
///   wave (success unless the task was listed in `failing`).
pub struct FakeExecutionBackend {
    runtime_tx: mpsc::Sender<ControllerEvent>,
    notices: Arc<Mutex<Vec<Notice>>>,
    failing: BTreeSet<String>,
}

impl FakeExecutionBackend {
    pub fn new(
        runtime_tx: mpsc::Sender<ControllerEvent>,
        notices: Arc<Mutex<Vec<Notice>>>,
    ) -> Self {
        Self {
            runtime_tx,
            notices,
            failing: BTreeSet::new(),
        }
    }

    /// Report `task` as failed instead of succeeded.
    pub fn failing(mut self, task: &str) -> Self {
        self.failing.insert(task.to_string());
        self
    }
}

impl ActivationBackend for FakeExecutionBackend {
    fn announce(
        &mut self,
        notices: Vec<Notice>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let recorded = Arc::clone(&self.notices);
        let failing = self.failing.clone();

        Box::pin(async move {
            for notice in notices {
                recorded.lock().unwrap().push(notice.clone());

                let Notice::WaveActivated(activation) = notice else {
                    continue;
                };
                for task in activation.task_ids {
                    let outcome = if failing.contains(&task) {
                        TaskOutcome::Failure
                    } else {
                        TaskOutcome::Success
                    };
                    tx.send(ControllerEvent::TaskTerminal { task, outcome })
                        .await
                        .map_err(anyhow::Error::from)?;
                }
            }
            Ok(())
        })
    }
}

/// Records notices without reacting to them.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    pub notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl ActivationBackend for RecordingBackend {
    fn announce(
        &mut self,
        notices: Vec<Notice>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let recorded = Arc::clone(&self.notices);
        Box::pin(async move {
            recorded.lock().unwrap().extend(notices);
            Ok(())
        })
    }
}
