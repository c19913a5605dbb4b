// tests/controller_lifecycle.rs
mod common;
use crate::common::builders::{TaskBuilder, TaskSetBuilder, at};
use crate::common::{init_tracing, memory_controller};

use std::error::Error;

use wavequeue::engine::WaveRunController;
use wavequeue::errors::WaveQueueError;
use wavequeue::types::{RunStatus, TaskOutcome, TaskStatus, WaveStatus};

type TestResult = Result<(), Box<dyn Error>>;

fn import(controller: &mut WaveRunController, builder: TaskSetBuilder) {
    controller
        .import_task_set(&builder.build())
        .expect("import task set");
}

/// A depends on B depends on C.
fn linear_chain() -> TaskSetBuilder {
    TaskSetBuilder::new("chain")
        .task("A", &["B"])
        .task("B", &["C"])
        .task("C", &[])
}

/// A depends on B and C; B and C depend on D.
fn diamond() -> TaskSetBuilder {
    TaskSetBuilder::new("diamond")
        .with_task(TaskBuilder::new("A").after("B").after("C").build())
        .with_task(TaskBuilder::new("B").category("backend").after("D").build())
        .with_task(TaskBuilder::new("C").category("frontend").after("D").build())
        .with_task(TaskBuilder::new("D").category("database").build())
}

#[test]
fn linear_chain_advances_one_wave_per_completion() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(&mut controller, linear_chain());

    let planned = controller.plan_run("chain")?;
    assert_eq!(planned.step.activated.len(), 1);
    assert_eq!(planned.step.activated[0].wave, 0);
    assert_eq!(planned.step.activated[0].task_ids, vec!["C".to_string()]);
    let run = planned.step.run.clone().expect("run in step");
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.current_wave, Some(0));

    let view = controller.schedule_view("chain")?;
    let waves: Vec<(String, Option<u32>)> =
        view.tasks.iter().map(|t| (t.id.clone(), t.wave)).collect();
    assert_eq!(
        waves,
        vec![
            ("C".to_string(), Some(0)),
            ("B".to_string(), Some(1)),
            ("A".to_string(), Some(2)),
        ]
    );

    let step = controller.on_task_terminal("C", TaskOutcome::Success)?;
    assert_eq!(step.activated[0].task_ids, vec!["B".to_string()]);
    assert_eq!(step.finished, None);

    let step = controller.on_task_terminal("B", TaskOutcome::Success)?;
    assert_eq!(step.activated[0].task_ids, vec!["A".to_string()]);

    let step = controller.on_task_terminal("A", TaskOutcome::Success)?;
    assert!(step.activated.is_empty());
    assert_eq!(step.finished, Some(RunStatus::Completed));

    let waves = controller.store().waves(&planned.run_id)?;
    assert!(waves.iter().all(|w| w.status == WaveStatus::Complete));
    assert!(!controller.has_active_runs()?);
    Ok(())
}

#[test]
fn diamond_activates_both_middle_lanes_together() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(&mut controller, diamond());

    let planned = controller.plan_run("diamond")?;
    assert_eq!(planned.step.activated[0].task_ids, vec!["D".to_string()]);
    assert_eq!(
        planned.step.activated[0].lanes.keys().collect::<Vec<_>>(),
        vec!["data"]
    );

    let step = controller.on_task_terminal("D", TaskOutcome::Success)?;
    let wave1 = &step.activated[0];
    assert_eq!(wave1.wave, 1);
    assert_eq!(wave1.lanes["backend"], vec!["B".to_string()]);
    assert_eq!(wave1.lanes["frontend"], vec!["C".to_string()]);

    // B alone does not finish wave 1.
    let step = controller.on_task_terminal("B", TaskOutcome::Success)?;
    assert!(step.is_noop());

    let step = controller.on_task_terminal("C", TaskOutcome::Success)?;
    assert_eq!(step.activated[0].task_ids, vec!["A".to_string()]);
    assert_eq!(step.activated[0].lanes["general"], vec!["A".to_string()]);
    Ok(())
}

#[test]
fn earlier_created_task_runs_first_within_a_lane() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(
        &mut controller,
        TaskSetBuilder::new("ties")
            .with_task(TaskBuilder::new("newer").priority(1).category("backend").created_at(at(60)).build())
            .with_task(TaskBuilder::new("older").priority(1).category("backend").created_at(at(0)).build()),
    );

    let planned = controller.plan_run("ties")?;
    assert_eq!(
        planned.step.activated[0].lanes["backend"],
        vec!["older".to_string(), "newer".to_string()]
    );

    let older = controller.store().task("older")?.and_then(|t| t.schedule).expect("scheduled");
    let newer = controller.store().task("newer")?.and_then(|t| t.schedule).expect("scheduled");
    assert_eq!(older.execution_order, 0);
    assert_eq!(newer.execution_order, 1);
    Ok(())
}

#[test]
fn cycle_fails_planning_and_persists_nothing() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(
        &mut controller,
        TaskSetBuilder::new("loop").task("X", &["Y"]).task("Y", &["X"]),
    );

    match controller.plan_run("loop") {
        Err(WaveQueueError::DagCycle(cycle)) => {
            assert_eq!(cycle.tasks, vec!["X".to_string(), "Y".to_string()]);
        }
        other => panic!("expected DagCycle, got {other:?}"),
    }

    assert!(controller.store().latest_run_for("loop")?.is_none());
    assert!(controller
        .store()
        .load_task_set("loop")?
        .iter()
        .all(|t| t.schedule.is_none()));
    Ok(())
}

#[test]
fn cycle_in_one_task_set_leaves_others_alone() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(&mut controller, linear_chain());
    import(
        &mut controller,
        TaskSetBuilder::new("loop").task("X", &["Y"]).task("Y", &["X"]),
    );

    controller.plan_run("chain")?;
    assert!(controller.plan_run("loop").is_err());

    let view = controller.schedule_view("chain")?;
    assert_eq!(view.run.map(|r| r.status), Some(RunStatus::Running));
    assert!(view.tasks.iter().all(|t| t.wave.is_some()));
    Ok(())
}

#[test]
fn failed_task_fails_the_run_and_later_waves_never_activate() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(&mut controller, diamond());
    let planned = controller.plan_run("diamond")?;

    controller.on_task_terminal("D", TaskOutcome::Success)?;
    let step = controller.on_task_terminal("C", TaskOutcome::Failure)?;
    assert_eq!(step.finished, Some(RunStatus::Failed));
    assert!(step.activated.is_empty());

    // Late completions are stored but do not move the run.
    let step = controller.on_task_terminal("B", TaskOutcome::Success)?;
    assert!(step.is_noop());
    assert_eq!(step.run.map(|r| r.status), Some(RunStatus::Failed));

    let run = controller.store().run(&planned.run_id)?.expect("run");
    assert_eq!(run.current_wave, Some(1));
    assert_eq!(
        controller.store().task("B")?.map(|t| t.status),
        Some(TaskStatus::Success)
    );
    Ok(())
}

#[test]
fn completions_reported_early_cascade_through_waves() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(&mut controller, linear_chain());
    controller.plan_run("chain")?;

    // B and A finish before their waves are active.
    assert!(controller.on_task_terminal("B", TaskOutcome::Success)?.is_noop());
    assert!(controller.on_task_terminal("A", TaskOutcome::Success)?.is_noop());

    // Waves 1 and 2 only hold finished work, so nothing is announced for
    // them; the run goes straight to completed.
    let step = controller.on_task_terminal("C", TaskOutcome::Success)?;
    assert!(step.activated.is_empty());
    assert_eq!(step.finished, Some(RunStatus::Completed));
    Ok(())
}

#[test]
fn replanned_set_only_announces_unfinished_tasks() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(
        &mut controller,
        TaskSetBuilder::new("mixed")
            .task("base", &[])
            .task("done-early", &["base"])
            .task("still-open", &["base"]),
    );
    let first = controller.plan_run("mixed")?;
    controller.on_task_terminal("base", TaskOutcome::Success)?;
    controller.on_task_terminal("done-early", TaskOutcome::Success)?;
    controller.cancel_run(&first.run_id)?;

    let second = controller.plan_run("mixed")?;
    assert_eq!(second.step.activated.len(), 1);
    let activation = &second.step.activated[0];
    assert_eq!(activation.wave, 1);
    assert_eq!(activation.task_ids, vec!["still-open".to_string()]);
    assert_eq!(activation.lanes["general"], vec!["still-open".to_string()]);
    Ok(())
}

#[test]
fn cancelled_run_ignores_further_outcomes() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(&mut controller, linear_chain());
    let planned = controller.plan_run("chain")?;

    let step = controller.cancel_run(&planned.run_id)?;
    assert_eq!(step.finished, Some(RunStatus::Cancelled));

    let step = controller.on_task_terminal("C", TaskOutcome::Success)?;
    assert!(step.is_noop());
    assert_eq!(step.run.map(|r| r.status), Some(RunStatus::Cancelled));

    // Cancelling again is a no-op, not an error.
    let again = controller.cancel_run(&planned.run_id)?;
    assert!(again.is_noop());

    assert!(matches!(
        controller.cancel_run("no-such-run"),
        Err(WaveQueueError::RunNotFound(_))
    ));
    Ok(())
}

#[test]
fn running_run_blocks_replanning() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(&mut controller, linear_chain());
    let planned = controller.plan_run("chain")?;

    match controller.plan_run("chain") {
        Err(WaveQueueError::RunAlreadyActive { run_id, .. }) => assert_eq!(run_id, planned.run_id),
        other => panic!("expected RunAlreadyActive, got {other:?}"),
    }
    Ok(())
}

#[test]
fn finished_task_set_can_be_planned_again() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(&mut controller, TaskSetBuilder::new("one").task("solo", &[]));
    let first = controller.plan_run("one")?;
    controller.cancel_run(&first.run_id)?;

    let second = controller.plan_run("one")?;
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(
        controller.store().latest_run_for("one")?.map(|r| r.id),
        Some(second.run_id)
    );
    Ok(())
}

#[test]
fn unknown_or_empty_inputs_are_errors() {
    init_tracing();
    let mut controller = memory_controller();

    assert!(matches!(
        controller.plan_run("nothing-here"),
        Err(WaveQueueError::EmptyTaskSet(_))
    ));
    assert!(matches!(
        controller.on_task_terminal("ghost", TaskOutcome::Success),
        Err(WaveQueueError::TaskNotFound(_))
    ));
}

#[test]
fn external_dependencies_are_reported_and_treated_as_satisfied() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(
        &mut controller,
        TaskSetBuilder::new("ext").task("A", &["outside"]).task("B", &["A"]),
    );

    let planned = controller.plan_run("ext")?;
    assert_eq!(planned.external_dependencies.len(), 1);
    assert_eq!(planned.external_dependencies[0].depends_on, "outside");
    assert_eq!(planned.step.activated[0].task_ids, vec!["A".to_string()]);
    Ok(())
}

#[test]
fn pins_are_honoured_and_conflicts_persist_nothing() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(
        &mut controller,
        TaskSetBuilder::new("pinned")
            .with_task(TaskBuilder::new("A").build())
            .with_task(TaskBuilder::new("B").after("A").pin_wave(2).pin_lane("special").build()),
    );
    controller.plan_run("pinned")?;

    let b = controller.store().task("B")?.and_then(|t| t.schedule).expect("scheduled");
    assert_eq!((b.wave, b.lane.as_str(), b.execution_order), (2, "special", 0));

    // Wave 1 is empty; finishing A jumps straight to wave 2.
    let step = controller.on_task_terminal("A", TaskOutcome::Success)?;
    assert_eq!(step.activated[0].wave, 2);
    assert_eq!(step.finished, None);

    import(
        &mut controller,
        TaskSetBuilder::new("bad-pin")
            .with_task(TaskBuilder::new("first").build())
            .with_task(TaskBuilder::new("second").after("first").pin_wave(0).build()),
    );
    assert!(matches!(
        controller.plan_run("bad-pin"),
        Err(WaveQueueError::PinConflict(_))
    ));
    assert!(controller.store().latest_run_for("bad-pin")?.is_none());
    Ok(())
}

#[test]
fn dependency_pinned_to_the_last_wave_fails_planning_cleanly() -> TestResult {
    init_tracing();
    let mut controller = memory_controller();
    import(
        &mut controller,
        TaskSetBuilder::new("edge")
            .with_task(TaskBuilder::new("late").pin_wave(u32::MAX).build())
            .with_task(TaskBuilder::new("after-late").after("late").build()),
    );

    assert!(matches!(
        controller.plan_run("edge"),
        Err(WaveQueueError::PinConflict(_))
    ));
    assert!(controller.store().latest_run_for("edge")?.is_none());
    assert!(controller.store().task("after-late")?.and_then(|t| t.schedule).is_none());
    Ok(())
}
