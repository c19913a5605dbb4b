// src/store/sqlite.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, info, warn};

use crate::dag::Pins;
use crate::errors::StoreError;
use crate::store::schema;
use crate::store::{
    ImportSummary, NewTask, ScheduleBatch, ScheduleEntry, TaskRecord, Wave, WaveRun,
};
use crate::types::{Priority, RunStatus, TaskId, TaskSetId, TaskStatus, WaveStatus};

type StoreResult<T> = std::result::Result<T, StoreError>;

const TASK_COLUMNS: &str = "id, task_set, priority, category, created_at_ms, status, \
     pinned_wave, pinned_lane, pinned_order, wave_number, lane, execution_order";

const RUN_COLUMNS: &str = "id, task_set, status, current_wave, created_at_ms, updated_at_ms";

/// SQLite-backed queue persistence store.
///
/// Writes take `&mut self` and run inside a single transaction each; reads
/// take `&self`.
#[derive(Debug)]
pub struct QueueStore {
    path: Option<PathBuf>,
    conn: Connection,
}

impl QueueStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        schema::migrate(&conn)?;
        info!(path = %path.display(), "opened queue store");
        Ok(Self {
            path: Some(path),
            conn,
        })
    }

    /// A private in-memory store; everything is lost on drop.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self { path: None, conn })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ---------------------------------------------------------------------
    // Task authoring surface
    // ---------------------------------------------------------------------

    /// Insert tasks and their dependency edges for `task_set`.
    ///
    /// Idempotent: existing tasks and edges are left alone. A new in-set edge
    /// clears the computed schedule (pinned values stay) of the task that
    /// depends on it, so the next planning pass recomputes its set.
    pub fn import_task_set(
        &mut self,
        task_set: &str,
        tasks: &[NewTask],
    ) -> StoreResult<ImportSummary> {
        let tx = self.conn.transaction()?;
        let mut summary = ImportSummary::default();

        for task in tasks {
            let inserted = tx.execute(
                "INSERT INTO tasks (
                    id, task_set, priority, category, created_at_ms, status,
                    pinned_wave, pinned_lane, pinned_order
                 ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    task.id,
                    task_set,
                    i64::from(task.priority.0),
                    task.category,
                    task.created_at.timestamp_millis(),
                    task.pins.wave.map(i64::from),
                    task.pins.lane,
                    task.pins.execution_order.map(i64::from),
                ],
            )?;

            if inserted == 0 {
                let owner: Option<String> = tx
                    .query_row(
                        "SELECT task_set FROM tasks WHERE id = ?1",
                        [&task.id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if owner.as_deref() != Some(task_set) {
                    warn!(
                        task = %task.id,
                        task_set = %task_set,
                        owner = ?owner,
                        "task already exists in another task set; keeping original"
                    );
                }
            }
            if inserted > 0 {
                summary.schedules_cleared += clear_in_set_dependents_tx(&tx, &task.id)?;
            }
            summary.tasks_inserted += inserted;
        }

        let edges: Vec<(&str, &str)> = tasks
            .iter()
            .flat_map(|t| t.depends_on.iter().map(move |dep| (t.id.as_str(), dep.as_str())))
            .collect();
        let (edges_inserted, cleared) = insert_edges_tx(&tx, &edges)?;
        summary.edges_inserted = edges_inserted;
        summary.schedules_cleared += cleared;

        tx.commit()?;

        debug!(
            task_set = %task_set,
            tasks = summary.tasks_inserted,
            edges = summary.edges_inserted,
            cleared = summary.schedules_cleared,
            "imported task set"
        );
        Ok(summary)
    }

    /// Record the execution collaborator's latest status for a task.
    ///
    /// Returns `false` when the task already had this status.
    pub fn record_task_status(&mut self, task: &str, status: TaskStatus) -> StoreResult<bool> {
        let current: Option<String> = self
            .conn
            .query_row("SELECT status FROM tasks WHERE id = ?1", [task], |row| row.get(0))
            .optional()?;

        let Some(current) = current else {
            return Err(StoreError::TaskNotFound(task.to_string()));
        };
        if parse_task_status(&current)? == status {
            return Ok(false);
        }

        self.conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2",
            params![status.as_str(), task],
        )?;
        Ok(true)
    }

    // ---------------------------------------------------------------------
    // Schedule commit
    // ---------------------------------------------------------------------

    /// Atomically write a planning batch: the run record (created in
    /// `planning` if absent), every task's wave/lane/order, and the wave
    /// membership lists.
    ///
    /// Committing the same batch again leaves the store unchanged. A batch
    /// for a run that has already left `planning` is accepted only if it
    /// matches what is stored.
    pub fn commit_schedule(&mut self, batch: &ScheduleBatch) -> StoreResult<()> {
        let now = Utc::now().timestamp_millis();
        let tx = self.conn.transaction()?;

        match run_tx(&tx, &batch.run_id)? {
            Some(run) if run.task_set != batch.task_set => {
                return Err(StoreError::Corrupt(format!(
                    "run '{}' belongs to task set '{}', not '{}'",
                    run.id, run.task_set, batch.task_set
                )));
            }
            Some(run) if run.status != RunStatus::Planning => {
                if batch_matches_tx(&tx, batch)? {
                    debug!(run_id = %run.id, "schedule batch already committed; nothing to do");
                    return Ok(());
                }
                return Err(StoreError::RunNotPlanning {
                    run_id: run.id,
                    status: run.status,
                });
            }
            Some(run) => {
                // Membership is still provisional while planning.
                tx.execute("DELETE FROM waves WHERE run_id = ?1", [&run.id])?;
            }
            None => {
                if let Some(active) = active_run_for_tx(&tx, &batch.task_set)? {
                    return Err(StoreError::ActiveRunExists {
                        task_set: batch.task_set.clone(),
                        run_id: active.id,
                    });
                }
                tx.execute(
                    "INSERT INTO wave_runs (id, task_set, status, current_wave, created_at_ms, updated_at_ms)
                     VALUES (?1, ?2, ?3, -1, ?4, ?4)",
                    params![batch.run_id, batch.task_set, RunStatus::Planning.as_str(), now],
                )?;
            }
        }

        for (task_id, entry) in &batch.entries {
            let changed = tx.execute(
                "UPDATE tasks SET wave_number = ?1, lane = ?2, execution_order = ?3
                 WHERE id = ?4 AND task_set = ?5",
                params![
                    i64::from(entry.wave),
                    entry.lane,
                    i64::from(entry.execution_order),
                    task_id,
                    batch.task_set,
                ],
            )?;
            if changed == 0 {
                // Dropping `tx` rolls back everything written so far.
                return Err(StoreError::UnknownTask {
                    task: task_id.clone(),
                    task_set: batch.task_set.clone(),
                });
            }
        }

        for (wave, members) in batch.memberships() {
            let task_ids = serde_json::to_string(&members)?;
            tx.execute(
                "INSERT INTO waves (run_id, wave_number, task_ids, status) VALUES (?1, ?2, ?3, ?4)",
                params![
                    batch.run_id,
                    i64::from(wave),
                    task_ids,
                    WaveStatus::Pending.as_str()
                ],
            )?;
        }

        tx.commit()?;

        info!(
            run_id = %batch.run_id,
            task_set = %batch.task_set,
            tasks = batch.entries.len(),
            "committed schedule batch"
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Run transitions
    // ---------------------------------------------------------------------

    /// Make `wave` the run's current wave: the run becomes `running`, earlier
    /// waves are marked complete and `wave` active.
    pub fn activate_wave(&mut self, run_id: &str, wave: u32) -> StoreResult<()> {
        let now = Utc::now().timestamp_millis();
        let tx = self.conn.transaction()?;

        let Some(run) = run_tx(&tx, run_id)? else {
            return Err(StoreError::UnknownRun(run_id.to_string()));
        };
        if !run.status.is_active() {
            return Err(StoreError::Corrupt(format!(
                "cannot activate wave {wave} of {} run '{run_id}'",
                run.status
            )));
        }

        tx.execute(
            "UPDATE wave_runs SET status = ?1, current_wave = ?2, updated_at_ms = ?3 WHERE id = ?4",
            params![RunStatus::Running.as_str(), i64::from(wave), now, run_id],
        )?;
        tx.execute(
            "UPDATE waves SET status = ?1 WHERE run_id = ?2 AND wave_number < ?3",
            params![WaveStatus::Complete.as_str(), run_id, i64::from(wave)],
        )?;
        let activated = tx.execute(
            "UPDATE waves SET status = ?1 WHERE run_id = ?2 AND wave_number = ?3",
            params![WaveStatus::Active.as_str(), run_id, i64::from(wave)],
        )?;
        if activated == 0 {
            return Err(StoreError::Corrupt(format!(
                "run '{run_id}' has no wave {wave}"
            )));
        }

        tx.commit()?;
        Ok(())
    }

    /// Move an active run to a terminal status.
    ///
    /// Returns `false` (and writes nothing) if the run was already terminal.
    pub fn finish_run(&mut self, run_id: &str, status: RunStatus) -> StoreResult<bool> {
        debug_assert!(status.is_terminal());
        let now = Utc::now().timestamp_millis();
        let tx = self.conn.transaction()?;

        let changed = tx.execute(
            "UPDATE wave_runs SET status = ?1, updated_at_ms = ?2
             WHERE id = ?3 AND status IN ('planning', 'running')",
            params![status.as_str(), now, run_id],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        if status == RunStatus::Completed {
            tx.execute(
                "UPDATE waves SET status = ?1 WHERE run_id = ?2",
                params![WaveStatus::Complete.as_str(), run_id],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn task(&self, id: &str) -> StoreResult<Option<TaskRecord>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        let Some(mut record) = self.conn.query_row(&sql, [id], task_from_row).optional()? else {
            return Ok(None);
        };
        record.depends_on = self.dependencies_of(id)?;
        Ok(Some(record))
    }

    /// All tasks of a task set with their edges, sorted by task ID.
    pub fn load_task_set(&self, task_set: &str) -> StoreResult<Vec<TaskRecord>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_set = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut records: Vec<TaskRecord> = stmt
            .query_map([task_set], task_from_row)?
            .collect::<Result<_, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT d.task_id, d.depends_on FROM dependencies d
             JOIN tasks t ON t.id = d.task_id
             WHERE t.task_set = ?1
             ORDER BY d.task_id, d.depends_on",
        )?;
        let mut edges: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
        for edge in stmt.query_map([task_set], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })? {
            let (task, dep) = edge?;
            edges.entry(task).or_default().push(dep);
        }

        for record in &mut records {
            record.depends_on = edges.remove(&record.id).unwrap_or_default();
        }
        Ok(records)
    }

    fn dependencies_of(&self, id: &str) -> StoreResult<Vec<TaskId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT depends_on FROM dependencies WHERE task_id = ?1 ORDER BY depends_on")?;
        let deps = stmt
            .query_map([id], |row| row.get::<_, String>(0))?
            .collect::<Result<_, _>>()?;
        Ok(deps)
    }

    /// Tasks of the run's task set that still lack a wave number.
    pub fn tasks_without_schedule(&self, run_id: &str) -> StoreResult<BTreeSet<TaskId>> {
        let Some(run) = self.run(run_id)? else {
            return Err(StoreError::UnknownRun(run_id.to_string()));
        };
        let mut stmt = self.conn.prepare(
            "SELECT id FROM tasks WHERE task_set = ?1 AND wave_number IS NULL ORDER BY id",
        )?;
        let ids = stmt
            .query_map([&run.task_set], |row| row.get::<_, String>(0))?
            .collect::<Result<_, _>>()?;
        Ok(ids)
    }

    /// Task sets containing at least one task without a wave number.
    pub fn unscheduled_task_sets(&self) -> StoreResult<Vec<TaskSetId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT task_set FROM tasks WHERE wave_number IS NULL ORDER BY task_set",
        )?;
        let sets = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<_, _>>()?;
        Ok(sets)
    }

    /// Runs with status `planning` or `running`, oldest first.
    pub fn active_runs(&self) -> StoreResult<Vec<WaveRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM wave_runs
             WHERE status IN ('planning', 'running')
             ORDER BY created_at_ms, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map([], run_from_row)?
            .collect::<Result<_, _>>()?;
        Ok(runs)
    }

    pub fn active_run_for(&self, task_set: &str) -> StoreResult<Option<WaveRun>> {
        active_run_for_tx(&self.conn, task_set)
    }

    /// Most recently created run of a task set, whatever its status.
    pub fn latest_run_for(&self, task_set: &str) -> StoreResult<Option<WaveRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM wave_runs WHERE task_set = ?1
             ORDER BY created_at_ms DESC, rowid DESC LIMIT 1"
        );
        self.conn
            .query_row(&sql, [task_set], run_from_row)
            .optional()
            .map_err(StoreError::from)
    }

    pub fn run(&self, run_id: &str) -> StoreResult<Option<WaveRun>> {
        run_tx(&self.conn, run_id)
    }

    pub fn wave(&self, run_id: &str, wave_number: u32) -> StoreResult<Option<Wave>> {
        self.conn
            .query_row(
                "SELECT run_id, wave_number, task_ids, status FROM waves
                 WHERE run_id = ?1 AND wave_number = ?2",
                params![run_id, i64::from(wave_number)],
                wave_from_row,
            )
            .optional()
            .map_err(StoreError::from)
    }

    /// All waves of a run, wave 0 first.
    pub fn waves(&self, run_id: &str) -> StoreResult<Vec<Wave>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, wave_number, task_ids, status FROM waves
             WHERE run_id = ?1 ORDER BY wave_number",
        )?;
        let waves = stmt
            .query_map([run_id], wave_from_row)?
            .collect::<Result<_, _>>()?;
        Ok(waves)
    }

    pub fn wave_count(&self, run_id: &str) -> StoreResult<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM waves WHERE run_id = ?1",
            [run_id],
            |row| row.get(0),
        )?;
        to_u32(count, "wave count")
    }

    /// Current status of each listed task. Unknown IDs are omitted.
    pub fn task_statuses(&self, ids: &[TaskId]) -> StoreResult<BTreeMap<TaskId, TaskStatus>> {
        let mut stmt = self.conn.prepare("SELECT status FROM tasks WHERE id = ?1")?;
        let mut statuses = BTreeMap::new();
        for id in ids {
            let status: Option<String> = stmt.query_row([id], |row| row.get(0)).optional()?;
            if let Some(status) = status {
                statuses.insert(id.clone(), parse_task_status(&status)?);
            }
        }
        Ok(statuses)
    }
}

/// Insert edges and clear the computed schedule of each new edge's dependent
/// task when the dependency sits in the same task set.
///
/// A dependency's own wave never depends on who depends on it, and an edge
/// into another task set is external to the dependent's graph.
///
/// Returns `(edges inserted, schedules cleared)`.
fn insert_edges_tx(tx: &Transaction<'_>, edges: &[(&str, &str)]) -> StoreResult<(usize, usize)> {
    let mut inserted = 0;
    let mut cleared = 0;

    for &(task, dep) in edges {
        let added = tx.execute(
            "INSERT OR IGNORE INTO dependencies (task_id, depends_on) VALUES (?1, ?2)",
            params![task, dep],
        )?;
        if added == 0 {
            continue;
        }
        inserted += 1;
        cleared += tx.execute(
            "UPDATE tasks SET wave_number = NULL, lane = NULL, execution_order = NULL
             WHERE id = ?1 AND wave_number IS NOT NULL
               AND task_set = (SELECT task_set FROM tasks WHERE id = ?2)",
            params![task, dep],
        )?;
    }

    if cleared > 0 {
        info!(cleared, "new dependency edges invalidated existing schedules");
    }
    Ok((inserted, cleared))
}

/// `task` just appeared: edges recorded earlier that point at it from its
/// own task set now take part in that set's graph.
fn clear_in_set_dependents_tx(tx: &Transaction<'_>, task: &str) -> StoreResult<usize> {
    let cleared = tx.execute(
        "UPDATE tasks SET wave_number = NULL, lane = NULL, execution_order = NULL
         WHERE wave_number IS NOT NULL
           AND task_set = (SELECT task_set FROM tasks WHERE id = ?1)
           AND id IN (SELECT task_id FROM dependencies WHERE depends_on = ?1)",
        [task],
    )?;
    Ok(cleared)
}

fn run_tx(conn: &Connection, run_id: &str) -> StoreResult<Option<WaveRun>> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM wave_runs WHERE id = ?1");
    conn.query_row(&sql, [run_id], run_from_row)
        .optional()
        .map_err(StoreError::from)
}

fn active_run_for_tx(conn: &Connection, task_set: &str) -> StoreResult<Option<WaveRun>> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM wave_runs
         WHERE task_set = ?1 AND status IN ('planning', 'running')"
    );
    conn.query_row(&sql, [task_set], run_from_row)
        .optional()
        .map_err(StoreError::from)
}

/// Whether every entry of `batch` is already stored exactly as given.
fn batch_matches_tx(conn: &Connection, batch: &ScheduleBatch) -> StoreResult<bool> {
    let mut stmt = conn.prepare(
        "SELECT wave_number, lane, execution_order FROM tasks WHERE id = ?1 AND task_set = ?2",
    )?;
    for (task_id, entry) in &batch.entries {
        let stored = stmt
            .query_row(params![task_id, batch.task_set], |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })
            .optional()?;
        let expected = (
            Some(i64::from(entry.wave)),
            Some(entry.lane.clone()),
            Some(i64::from(entry.execution_order)),
        );
        if stored != Some(expected) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let priority: i64 = row.get("priority")?;
    let created_at_ms: i64 = row.get("created_at_ms")?;
    let status: String = row.get("status")?;

    let wave: Option<i64> = row.get("wave_number")?;
    let lane: Option<String> = row.get("lane")?;
    let order: Option<i64> = row.get("execution_order")?;
    let schedule = match (wave, lane, order) {
        (Some(wave), Some(lane), Some(order)) => Some(ScheduleEntry {
            wave: sql_u32(wave)?,
            lane,
            execution_order: sql_u32(order)?,
        }),
        _ => None,
    };

    let pinned_wave: Option<i64> = row.get("pinned_wave")?;
    let pinned_order: Option<i64> = row.get("pinned_order")?;

    Ok(TaskRecord {
        id: row.get("id")?,
        task_set: row.get("task_set")?,
        priority: Priority(u8::try_from(priority).map_err(|_| out_of_range(priority))?),
        category: row.get("category")?,
        created_at: millis_to_datetime(created_at_ms)?,
        depends_on: Vec::new(),
        status: status.parse().map_err(corrupt)?,
        pins: Pins {
            wave: pinned_wave.map(sql_u32).transpose()?,
            lane: row.get("pinned_lane")?,
            execution_order: pinned_order.map(sql_u32).transpose()?,
        },
        schedule,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<WaveRun> {
    let status: String = row.get("status")?;
    let current_wave: i64 = row.get("current_wave")?;
    let created_at_ms: i64 = row.get("created_at_ms")?;
    let updated_at_ms: i64 = row.get("updated_at_ms")?;

    Ok(WaveRun {
        id: row.get("id")?,
        task_set: row.get("task_set")?,
        status: status.parse().map_err(corrupt)?,
        // -1 marks a run whose first wave has not been activated yet.
        current_wave: if current_wave < 0 {
            None
        } else {
            Some(sql_u32(current_wave)?)
        },
        created_at: millis_to_datetime(created_at_ms)?,
        updated_at: millis_to_datetime(updated_at_ms)?,
    })
}

fn wave_from_row(row: &Row<'_>) -> rusqlite::Result<Wave> {
    let wave_number: i64 = row.get("wave_number")?;
    let task_ids: String = row.get("task_ids")?;
    let status: String = row.get("status")?;

    Ok(Wave {
        run_id: row.get("run_id")?,
        wave_number: sql_u32(wave_number)?,
        task_ids: serde_json::from_str(&task_ids)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        status: status.parse().map_err(corrupt)?,
    })
}

fn parse_task_status(raw: &str) -> StoreResult<TaskStatus> {
    raw.parse().map_err(StoreError::Corrupt)
}

fn millis_to_datetime(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| out_of_range(ms))
}

fn sql_u32(value: i64) -> rusqlite::Result<u32> {
    u32::try_from(value).map_err(|_| out_of_range(value))
}

fn to_u32(value: i64, what: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{what} out of range: {value}")))
}

fn out_of_range(value: i64) -> rusqlite::Error {
    rusqlite::Error::IntegralValueOutOfRange(0, value)
}

fn corrupt(msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, msg.into())
}
