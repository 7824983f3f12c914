// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! SQLite-backed observation/forecast store, learning run ledger, and
//! configuration store. One `Mutex<rusqlite::Connection>` guards all
//! access; writes are short and the lock is never held across an `.await`.

pub mod learning_schema;
pub mod observations;

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use mpc_types::config::PlannerConfig;
use mpc_types::ports::ConfigStore;
use parking_lot::Mutex;
use rusqlite::Connection;

/// Owns the SQLite connection and the schema. `open` is idempotent: it
/// creates tables that don't yet exist and leaves existing data alone.
pub struct Database {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS slot_observations (
    slot_start TEXT PRIMARY KEY,
    import_kwh REAL NOT NULL,
    export_kwh REAL NOT NULL,
    pv_kwh REAL NOT NULL,
    load_kwh REAL NOT NULL,
    battery_charge_kwh REAL NOT NULL,
    battery_discharge_kwh REAL NOT NULL,
    soc_start_percent REAL NOT NULL,
    soc_end_percent REAL NOT NULL,
    quality_flags TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS slot_forecasts (
    slot_start TEXT NOT NULL,
    version INTEGER NOT NULL,
    pv_forecast_kwh REAL NOT NULL,
    load_forecast_kwh REAL NOT NULL,
    temp_c REAL,
    PRIMARY KEY (slot_start, version)
);

CREATE TABLE IF NOT EXISTS sensor_totals (
    name TEXT PRIMARY KEY,
    last_value REAL NOT NULL,
    last_timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS learning_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_date TEXT NOT NULL UNIQUE,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    status TEXT NOT NULL,
    loops_run TEXT NOT NULL DEFAULT '',
    changes_proposed INTEGER NOT NULL DEFAULT 0,
    changes_applied INTEGER NOT NULL DEFAULT 0,
    result_metrics_json TEXT,
    last_error TEXT
);

CREATE TABLE IF NOT EXISTS learning_param_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES learning_runs(id),
    ts TEXT NOT NULL,
    param_path TEXT NOT NULL,
    old_value REAL NOT NULL,
    new_value REAL NOT NULL,
    loop_name TEXT NOT NULL,
    reason TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS learning_metrics (
    date TEXT NOT NULL,
    metric TEXT NOT NULL,
    value REAL NOT NULL,
    PRIMARY KEY (date, metric)
);

CREATE TABLE IF NOT EXISTS learning_daily_series (
    date TEXT NOT NULL,
    metric TEXT NOT NULL,
    values_json TEXT NOT NULL,
    PRIMARY KEY (date, metric)
);

CREATE TABLE IF NOT EXISTS config_kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl Database {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("opening sqlite database")?;
        conn.execute_batch(SCHEMA).context("initialising schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory sqlite database")?;
        conn.execute_batch(SCHEMA).context("initialising schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let guard = self.conn.lock();
        f(&guard)
    }
}

/// The learning orchestrator is the only caller of `commit`; planner runs
/// only ever `snapshot`. Both methods take `&self` and lock briefly, so a
/// `Database` can be shared behind an `Arc` across the tick loop and the
/// nightly learning task without an async mutex.
#[async_trait]
impl ConfigStore for Database {
    async fn snapshot(&self) -> anyhow::Result<PlannerConfig> {
        self.config_snapshot()
    }

    async fn commit(&self, config: PlannerConfig) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            let json = serde_json::to_string(&config).context("serialising config")?;
            conn.execute(
                "INSERT INTO config_kv (key, value) VALUES ('planner_config', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![json],
            )?;
            Ok(())
        })
    }
}
