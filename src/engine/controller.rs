// src/engine/controller.rs

//! Wave run controller.
//!
//! Owns the store and drives each run through
//! `planning → running → {completed, failed, cancelled}`. Every mutating
//! operation takes `&mut self`, so a single controller instance is the
//! single writer for all task sets it serves.
//!
//! Nothing is cached in memory: every decision re-reads the store, which
//! is what makes [`WaveRunController::recover`] a plain replay.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TaskSetFile;
use crate::dag::{ExternalDependency, LaneAssigner};
use crate::engine::planner::build_schedule;
use crate::errors::{Result, StoreError, WaveQueueError};
use crate::store::{ImportSummary, QueueStore, WaveRun};
use crate::types::{
    LaneName, RunId, RunStatus, TaskId, TaskOutcome, TaskSetId, TaskStatus,
};

/// A wave that just became active: its tasks may now execute.
///
/// `task_ids` leaves out members that already succeeded.
///
/// `lanes` lists the members per lane in execution order. Different lanes
/// may run concurrently; tasks inside one lane run one after another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaveActivation {
    pub run_id: RunId,
    pub task_set: TaskSetId,
    pub wave: u32,
    pub task_ids: Vec<TaskId>,
    pub lanes: BTreeMap<LaneName, Vec<TaskId>>,
}

/// What a single controller operation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStep {
    /// The run the operation touched, as stored after the operation.
    pub run: Option<WaveRun>,
    /// Waves activated by this operation, in activation order. One event can
    /// cascade through several waves whose tasks had already finished.
    pub activated: Vec<WaveActivation>,
    /// Set when this operation moved the run into a terminal status.
    pub finished: Option<RunStatus>,
}

impl RunStep {
    pub fn is_noop(&self) -> bool {
        self.activated.is_empty() && self.finished.is_none()
    }
}

/// Result of [`WaveRunController::plan_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRun {
    pub run_id: RunId,
    pub external_dependencies: Vec<ExternalDependency>,
    pub step: RunStep,
}

/// What [`WaveRunController::recover`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    /// Task sets (re)planned because some of their tasks had no wave.
    pub planned: Vec<(TaskSetId, RunId)>,
    /// Task sets whose planning failed. Their state is left untouched.
    pub plan_failures: Vec<(TaskSetId, String)>,
    /// Task sets with unscheduled tasks that could not be replanned because
    /// a run is already executing them.
    pub skipped: Vec<TaskSetId>,
    pub runs_evaluated: usize,
    pub activated: Vec<WaveActivation>,
    /// Runs recovery moved to a terminal status, as stored afterwards.
    pub finished: Vec<WaveRun>,
}

impl RecoverySummary {
    /// True when recovery wrote nothing.
    pub fn is_noop(&self) -> bool {
        self.planned.is_empty() && self.activated.is_empty() && self.finished.is_empty()
    }

    fn absorb(&mut self, step: &RunStep) {
        self.activated.extend(step.activated.iter().cloned());
        if let (Some(run), Some(_)) = (&step.run, step.finished) {
            self.finished.push(run.clone());
        }
    }
}

/// One task's row in a [`ScheduleView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub wave: Option<u32>,
    pub lane: Option<LaneName>,
    pub execution_order: Option<u32>,
    pub status: TaskStatus,
}

/// Read-only snapshot of a task set's schedule, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleView {
    pub task_set: TaskSetId,
    /// Latest run of the set, if it was ever planned.
    pub run: Option<WaveRun>,
    /// Sorted by wave, lane, then execution order. Unscheduled tasks last.
    pub tasks: Vec<TaskView>,
}

#[derive(Debug)]
pub struct WaveRunController {
    store: QueueStore,
    lanes: LaneAssigner,
}

impl WaveRunController {
    /// Wrap `store` and run [`recover`](Self::recover) before handing the
    /// controller out, so no new work can race reconstructed state.
    pub fn start(store: QueueStore, lanes: LaneAssigner) -> Result<(Self, RecoverySummary)> {
        let mut controller = Self { store, lanes };
        let summary = controller.recover()?;
        Ok((controller, summary))
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    /// Hand a task set over from the authoring side.
    ///
    /// Only stores it; planning happens on [`plan_run`](Self::plan_run) or at
    /// the next recovery.
    pub fn import_task_set(&mut self, file: &TaskSetFile) -> Result<ImportSummary> {
        let summary = self.store.import_task_set(&file.task_set, &file.tasks)?;
        Ok(summary)
    }

    pub fn has_active_runs(&self) -> Result<bool> {
        Ok(!self.store.active_runs()?.is_empty())
    }

    /// Plan `task_set` and activate its first wave.
    ///
    /// A run still in `planning` (left behind by a crash) is reused and its
    /// membership rewritten. A `running` run blocks replanning. On a cycle or
    /// pin conflict nothing is written.
    pub fn plan_run(&mut self, task_set: &str) -> Result<PlannedRun> {
        let run_id = match self.store.active_run_for(task_set)? {
            Some(run) if run.status == RunStatus::Running => {
                return Err(WaveQueueError::RunAlreadyActive {
                    task_set: task_set.to_string(),
                    run_id: run.id,
                });
            }
            Some(run) => {
                debug!(run_id = %run.id, task_set = %task_set, "reusing run left in planning");
                run.id
            }
            None => Uuid::new_v4().to_string(),
        };

        let tasks = self.store.load_task_set(task_set)?;
        if tasks.is_empty() {
            return Err(WaveQueueError::EmptyTaskSet(task_set.to_string()));
        }

        let plan = build_schedule(&tasks, &self.lanes)?;
        for ext in &plan.external {
            warn!(
                task_set = %task_set,
                task = %ext.task,
                depends_on = %ext.depends_on,
                "dependency outside the task set; treating as satisfied"
            );
        }

        let external_dependencies = plan.external.clone();
        let waves = plan.wave_count();
        let batch = plan.into_batch(run_id.clone(), task_set);
        self.store.commit_schedule(&batch)?;
        info!(run_id = %run_id, task_set = %task_set, waves, "planned run");

        let step = self.evaluate(&run_id)?;
        Ok(PlannedRun {
            run_id,
            external_dependencies,
            step,
        })
    }

    /// Record a task's terminal outcome and advance its run if that
    /// finished the active wave.
    ///
    /// Outcomes for tasks outside the active wave are stored and take effect
    /// once their wave activates. When the task set has no active run the
    /// call is a logged no-op.
    pub fn on_task_terminal(&mut self, task: &str, outcome: TaskOutcome) -> Result<RunStep> {
        let Some(record) = self.store.task(task)? else {
            return Err(WaveQueueError::TaskNotFound(task.to_string()));
        };
        self.store.record_task_status(task, outcome.into())?;
        debug!(task = %task, ?outcome, task_set = %record.task_set, "task reached terminal state");

        let Some(run) = self.store.active_run_for(&record.task_set)? else {
            if let Some(latest) = self.store.latest_run_for(&record.task_set)? {
                let err = WaveQueueError::RunTerminal {
                    run_id: latest.id.clone(),
                    status: latest.status,
                };
                info!(task = %task, "ignoring task outcome: {err}");
                return Ok(RunStep {
                    run: Some(latest),
                    ..RunStep::default()
                });
            }
            debug!(task = %task, task_set = %record.task_set, "task set was never planned");
            return Ok(RunStep::default());
        };

        self.evaluate(&run.id)
    }

    /// Cancel an active run. Cancelling a finished run is a logged no-op.
    pub fn cancel_run(&mut self, run_id: &str) -> Result<RunStep> {
        let Some(run) = self.store.run(run_id)? else {
            return Err(WaveQueueError::RunNotFound(run_id.to_string()));
        };
        if run.status.is_terminal() {
            let err = WaveQueueError::RunTerminal {
                run_id: run.id.clone(),
                status: run.status,
            };
            info!("ignoring cancel request: {err}");
            return Ok(RunStep {
                run: Some(run),
                ..RunStep::default()
            });
        }

        let finished = self.store.finish_run(run_id, RunStatus::Cancelled)?;
        info!(run_id = %run_id, task_set = %run.task_set, "run cancelled");
        Ok(RunStep {
            run: self.store.run(run_id)?,
            activated: Vec::new(),
            finished: finished.then_some(RunStatus::Cancelled),
        })
    }

    /// Rebuild scheduling progress from the store.
    ///
    /// First replans every task set with tasks lacking a wave, then replays
    /// wave evaluation for every active run. Running it again right away
    /// writes nothing.
    pub fn recover(&mut self) -> Result<RecoverySummary> {
        let mut summary = RecoverySummary::default();

        for task_set in self.store.unscheduled_task_sets()? {
            match self.plan_run(&task_set) {
                Ok(planned) => {
                    info!(task_set = %task_set, run_id = %planned.run_id, "recovery planned task set");
                    summary.absorb(&planned.step);
                    summary.planned.push((task_set, planned.run_id));
                }
                Err(WaveQueueError::RunAlreadyActive { run_id, .. }) => {
                    warn!(
                        task_set = %task_set,
                        run_id = %run_id,
                        "task set has unscheduled tasks but a run is executing it; skipping"
                    );
                    summary.skipped.push(task_set);
                }
                Err(err) if err.is_retriable() => return Err(err),
                Err(err) => {
                    warn!(task_set = %task_set, "recovery could not plan task set: {err}");
                    summary.plan_failures.push((task_set, err.to_string()));
                }
            }
        }

        for run in self.store.active_runs()? {
            let step = self.evaluate(&run.id)?;
            summary.runs_evaluated += 1;
            summary.absorb(&step);
        }

        info!(
            planned = summary.planned.len(),
            runs = summary.runs_evaluated,
            activated = summary.activated.len(),
            finished = summary.finished.len(),
            "recovery complete"
        );
        Ok(summary)
    }

    /// Current schedule of `task_set`, for display.
    pub fn schedule_view(&self, task_set: &str) -> Result<ScheduleView> {
        let tasks = self.store.load_task_set(task_set)?;
        if tasks.is_empty() {
            return Err(WaveQueueError::EmptyTaskSet(task_set.to_string()));
        }

        let mut rows: Vec<TaskView> = tasks
            .into_iter()
            .map(|t| TaskView {
                wave: t.schedule.as_ref().map(|s| s.wave),
                lane: t.schedule.as_ref().map(|s| s.lane.clone()),
                execution_order: t.schedule.as_ref().map(|s| s.execution_order),
                status: t.status,
                id: t.id,
            })
            .collect();
        rows.sort_by(|a, b| {
            (a.wave.is_none(), a.wave, &a.lane, a.execution_order, &a.id).cmp(&(
                b.wave.is_none(),
                b.wave,
                &b.lane,
                b.execution_order,
                &b.id,
            ))
        });

        Ok(ScheduleView {
            task_set: task_set.to_string(),
            run: self.store.latest_run_for(task_set)?,
            tasks: rows,
        })
    }

    /// Re-evaluate `run_id` against current task statuses, cascading
    /// through every wave whose members are already done.
    fn evaluate(&mut self, run_id: &str) -> Result<RunStep> {
        let mut step = RunStep::default();

        loop {
            let Some(run) = self.store.run(run_id)? else {
                return Err(WaveQueueError::RunNotFound(run_id.to_string()));
            };
            if run.status.is_terminal() {
                step.run = Some(run);
                return Ok(step);
            }

            let Some(current) = run.current_wave else {
                // Committed but never activated.
                let unscheduled = self.store.tasks_without_schedule(run_id)?;
                if !unscheduled.is_empty() {
                    warn!(
                        run_id = %run_id,
                        unscheduled = unscheduled.len(),
                        "run is still planning and has unscheduled tasks; not activating"
                    );
                    step.run = Some(run);
                    return Ok(step);
                }
                match self.next_wave(run_id, None)? {
                    Some(first) => self.activate(&run, first, &mut step)?,
                    None => self.finish(&run, RunStatus::Completed, &mut step)?,
                }
                continue;
            };

            let Some(wave) = self.store.wave(run_id, current)? else {
                return Err(StoreError::Corrupt(format!(
                    "run '{run_id}' points at missing wave {current}"
                ))
                .into());
            };
            let statuses = self.store.task_statuses(&wave.task_ids)?;

            let failed: Vec<&TaskId> = wave
                .task_ids
                .iter()
                .filter(|id| statuses.get(*id) == Some(&TaskStatus::Failure))
                .collect();
            if !failed.is_empty() {
                warn!(run_id = %run_id, wave = current, ?failed, "wave has failed tasks");
                self.finish(&run, RunStatus::Failed, &mut step)?;
                continue;
            }

            let done = wave
                .task_ids
                .iter()
                .all(|id| statuses.get(id) == Some(&TaskStatus::Success));
            if !done {
                step.run = Some(run);
                return Ok(step);
            }

            match self.next_wave(run_id, Some(current))? {
                Some(next) => self.activate(&run, next, &mut step)?,
                None => self.finish(&run, RunStatus::Completed, &mut step)?,
            }
        }
    }

    /// Lowest wave number after `after`. Pinned waves can leave gaps, so
    /// this is not always `after + 1`.
    fn next_wave(&self, run_id: &str, after: Option<u32>) -> Result<Option<u32>> {
        let next = self
            .store
            .waves(run_id)?
            .into_iter()
            .map(|w| w.wave_number)
            .find(|&n| after.is_none_or(|current| n > current));
        Ok(next)
    }

    fn activate(&mut self, run: &WaveRun, wave_number: u32, step: &mut RunStep) -> Result<()> {
        self.store.activate_wave(&run.id, wave_number)?;

        let Some(wave) = self.store.wave(&run.id, wave_number)? else {
            return Err(StoreError::Corrupt(format!(
                "run '{}' has no wave {wave_number}",
                run.id
            ))
            .into());
        };

        // Succeeded tasks (reported early, or done in an earlier run of the
        // set) need no execution. A wave with nothing left is not announced.
        let statuses = self.store.task_statuses(&wave.task_ids)?;
        let pending: Vec<TaskId> = wave
            .task_ids
            .into_iter()
            .filter(|id| statuses.get(id) != Some(&TaskStatus::Success))
            .collect();
        if pending.is_empty() {
            debug!(
                run_id = %run.id,
                wave = wave_number,
                "every task in the wave already succeeded; nothing to announce"
            );
            return Ok(());
        }

        let schedule: BTreeMap<TaskId, LaneName> = self
            .store
            .load_task_set(&run.task_set)?
            .into_iter()
            .filter_map(|t| t.schedule.map(|s| (t.id, s.lane)))
            .collect();
        let mut lanes: BTreeMap<LaneName, Vec<TaskId>> = BTreeMap::new();
        for id in &pending {
            let lane = schedule
                .get(id)
                .cloned()
                .unwrap_or_else(|| self.lanes.default_lane().to_string());
            lanes.entry(lane).or_default().push(id.clone());
        }

        info!(
            run_id = %run.id,
            task_set = %run.task_set,
            wave = wave_number,
            tasks = pending.len(),
            "wave activated"
        );
        step.activated.push(WaveActivation {
            run_id: run.id.clone(),
            task_set: run.task_set.clone(),
            wave: wave_number,
            task_ids: pending,
            lanes,
        });
        Ok(())
    }

    fn finish(&mut self, run: &WaveRun, status: RunStatus, step: &mut RunStep) -> Result<()> {
        if self.store.finish_run(&run.id, status)? {
            info!(run_id = %run.id, task_set = %run.task_set, %status, "run finished");
            step.finished = Some(status);
        }
        Ok(())
    }
}
