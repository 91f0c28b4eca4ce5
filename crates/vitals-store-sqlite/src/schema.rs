//! SQL schema and versioned migrations for the vitals SQLite store.
//!
//! The applied version lives in `PRAGMA user_version`. Each migration runs in
//! its own transaction and bumps the version inside it, so a step is applied
//! at most once and a failed step leaves the previous version intact.

use rusqlite::Connection;
use tracing::info;

/// Connection pragmas, applied on every open.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
";

/// v1: base tables and timestamp indexes, without uniqueness constraints.
const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS heart_rate (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    source      TEXT NOT NULL,
    metric      TEXT NOT NULL,   -- 'heart_rate', 'resting_heart_rate', ...
    value       REAL NOT NULL,   -- BPM
    unit        TEXT NOT NULL DEFAULT 'count/min',
    recorded_at TEXT NOT NULL,   -- ISO 8601 UTC
    device      TEXT,
    created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS hrv (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    source      TEXT NOT NULL,
    metric      TEXT NOT NULL,   -- 'hrv_sdnn' | 'hrv_rmssd'
    value       REAL NOT NULL,   -- milliseconds
    unit        TEXT NOT NULL DEFAULT 'ms',
    recorded_at TEXT NOT NULL,
    device      TEXT,
    created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

-- Staged segments (start_at/end_at set) and vendor nightly aggregates.
CREATE TABLE IF NOT EXISTS sleep (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    source                TEXT NOT NULL,
    stage                 TEXT,
    start_at              TEXT,
    end_at                TEXT,
    recorded_at           TEXT NOT NULL,
    device                TEXT,
    sleep_performance_pct REAL,
    time_in_bed_hours     REAL,
    light_sleep_hours     REAL,
    rem_sleep_hours       REAL,
    deep_sleep_hours      REAL,
    awake_hours           REAL,
    disturbances          REAL,
    created_at            TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS workouts (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    source           TEXT NOT NULL,
    activity         TEXT NOT NULL,
    duration_minutes REAL,
    distance_km      REAL,
    calories         REAL,   -- kcal
    recorded_at      TEXT NOT NULL,
    end_at           TEXT,
    device           TEXT,
    created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS whoop_recovery (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    source             TEXT NOT NULL DEFAULT 'whoop',
    recorded_at        TEXT NOT NULL,
    recovery_score     REAL,   -- 0-100
    hrv_ms             REAL,
    resting_heart_rate REAL,
    spo2_pct           REAL,
    skin_temp_celsius  REAL,
    created_at         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS whoop_strain (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    source         TEXT NOT NULL DEFAULT 'whoop',
    recorded_at    TEXT NOT NULL,
    day_strain     REAL,   -- 0-21
    calories       REAL,
    max_heart_rate REAL,
    avg_heart_rate REAL,
    created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS oura_readiness (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    source                TEXT NOT NULL DEFAULT 'oura',
    recorded_at           TEXT NOT NULL,
    readiness_score       REAL,   -- 0-100
    hrv_balance           REAL,
    resting_heart_rate    REAL,
    temperature_deviation REAL,   -- degrees C from baseline
    recovery_index        REAL,
    activity_balance      REAL,
    sleep_balance         REAL,
    created_at            TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_heart_rate_recorded_at     ON heart_rate(recorded_at);
CREATE INDEX IF NOT EXISTS idx_hrv_recorded_at            ON hrv(recorded_at);
CREATE INDEX IF NOT EXISTS idx_sleep_recorded_at          ON sleep(recorded_at);
CREATE INDEX IF NOT EXISTS idx_workouts_recorded_at       ON workouts(recorded_at);
CREATE INDEX IF NOT EXISTS idx_whoop_recovery_recorded_at ON whoop_recovery(recorded_at);
CREATE INDEX IF NOT EXISTS idx_whoop_strain_recorded_at   ON whoop_strain(recorded_at);
CREATE INDEX IF NOT EXISTS idx_oura_readiness_recorded_at ON oura_readiness(recorded_at);
";

/// Natural-key expression per table. Nullable columns are coalesced so two
/// rows that differ only by `NULL` vs `''` count as the same observation.
/// Sleep bounds fall back to `recorded_at` so unbounded vendor nights stay
/// distinct.
pub const NATURAL_KEYS: &[(&str, &str)] = &[
  ("heart_rate", "source, metric, recorded_at, COALESCE(device, '')"),
  ("hrv", "source, metric, recorded_at, COALESCE(device, '')"),
  (
    "sleep",
    "source, COALESCE(stage, ''), COALESCE(start_at, recorded_at), \
     COALESCE(end_at, recorded_at), COALESCE(device, '')",
  ),
  ("workouts", "source, activity, recorded_at, COALESCE(device, '')"),
  ("whoop_recovery", "source, recorded_at"),
  ("whoop_strain", "source, recorded_at"),
  ("oura_readiness", "source, recorded_at"),
];

/// v2: drop legacy duplicates, keeping the earliest row of each natural-key
/// group, then enforce the natural key with a unique index.
fn dedup_natural_keys(conn: &Connection) -> rusqlite::Result<()> {
  for (table, key) in NATURAL_KEYS {
    let removed = conn.execute(
      &format!("DELETE FROM {table} WHERE id NOT IN (SELECT MIN(id) FROM {table} GROUP BY {key})"),
      [],
    )?;
    if removed > 0 {
      info!(table, removed, "removed legacy duplicate rows");
    }
    conn.execute(
      &format!("CREATE UNIQUE INDEX IF NOT EXISTS uq_{table}_natural_key ON {table} ({key})"),
      [],
    )?;
  }
  Ok(())
}

fn create_base_tables(conn: &Connection) -> rusqlite::Result<()> { conn.execute_batch(SCHEMA_V1) }

pub struct Migration {
  pub version:     u32,
  pub description: &'static str,
  apply:           fn(&Connection) -> rusqlite::Result<()>,
}

pub const MIGRATIONS: &[Migration] = &[
  Migration {
    version:     1,
    description: "base tables and timestamp indexes",
    apply:       create_base_tables,
  },
  Migration {
    version:     2,
    description: "remove duplicates and enforce natural keys",
    apply:       dedup_natural_keys,
  },
];

/// Latest schema version known to this build.
pub fn latest_version() -> u32 { MIGRATIONS.last().map_or(0, |m| m.version) }

pub fn schema_version(conn: &Connection) -> rusqlite::Result<u32> {
  conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

/// Apply pending migrations up to `target`. Returns the resulting version.
pub fn migrate_to(conn: &mut Connection, target: u32) -> rusqlite::Result<u32> {
  let mut current = schema_version(conn)?;

  for migration in MIGRATIONS
    .iter()
    .filter(move |m| m.version > current && m.version <= target)
  {
    let tx = conn.transaction()?;
    (migration.apply)(&tx)?;
    tx.pragma_update(None, "user_version", migration.version)?;
    tx.commit()?;

    info!(
      version = migration.version,
      description = migration.description,
      "applied schema migration"
    );
    current = migration.version;
  }

  Ok(current)
}

/// Apply every pending migration.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> { migrate_to(conn, latest_version()) }
