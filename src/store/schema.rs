// src/store/schema.rs

use rusqlite::Connection;
use tracing::debug;

use crate::errors::StoreError;

/// Bump when the table layout changes.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
  id TEXT PRIMARY KEY,
  task_set TEXT NOT NULL,
  priority INTEGER NOT NULL,
  category TEXT,
  created_at_ms INTEGER NOT NULL,
  status TEXT NOT NULL DEFAULT 'pending',
  pinned_wave INTEGER,
  pinned_lane TEXT,
  pinned_order INTEGER,
  wave_number INTEGER,
  lane TEXT,
  execution_order INTEGER
);

CREATE INDEX IF NOT EXISTS idx_tasks_task_set ON tasks(task_set);

CREATE TABLE IF NOT EXISTS dependencies (
  task_id TEXT NOT NULL,
  depends_on TEXT NOT NULL,
  PRIMARY KEY (task_id, depends_on)
);

CREATE TABLE IF NOT EXISTS wave_runs (
  id TEXT PRIMARY KEY,
  task_set TEXT NOT NULL,
  status TEXT NOT NULL,
  current_wave INTEGER NOT NULL DEFAULT -1,
  created_at_ms INTEGER NOT NULL,
  updated_at_ms INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_wave_runs_one_active
  ON wave_runs(task_set) WHERE status IN ('planning', 'running');

CREATE TABLE IF NOT EXISTS waves (
  run_id TEXT NOT NULL REFERENCES wave_runs(id),
  wave_number INTEGER NOT NULL,
  task_ids TEXT NOT NULL,
  status TEXT NOT NULL,
  PRIMARY KEY (run_id, wave_number)
);
"#;

/// Create tables if needed and record the schema version.
pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    // journal_mode reports the resulting mode as a row ("memory" for in-memory databases).
    let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;

    conn.execute_batch(SCHEMA)?;
    conn.execute(
        "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [SCHEMA_VERSION.to_string()],
    )?;

    debug!(journal_mode = %mode, version = SCHEMA_VERSION, "store schema ready");
    Ok(())
}
