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

//! Learning run ledger (`learning_runs`, `learning_param_history`,
//! `learning_metrics`, `learning_daily_series`) and the configuration
//! store the nightly orchestrator commits to atomically.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use mpc_types::PlannerConfig;
use rusqlite::{params, OptionalExtension};

use crate::Database;

const PLANNER_CONFIG_KEY: &str = "planner_config";

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub param_path: String,
    pub old_value: f32,
    pub new_value: f32,
    pub loop_name: String,
    pub reason: String,
}

impl Database {
    /// True if a `completed` run already exists for `run_date`; the
    /// orchestrator treats a run started for a date with a completed run
    /// as a no-op.
    pub fn has_completed_learning_run(&self, run_date: NaiveDate) -> anyhow::Result<bool> {
        self.with_conn(|conn| {
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM learning_runs WHERE run_date = ?1",
                    params![run_date.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(status.as_deref() == Some("completed"))
        })
    }

    /// Starts (or resumes, if a non-completed row already exists for this
    /// date) a learning run and returns its row id.
    pub fn begin_learning_run(&self, run_date: NaiveDate, started_at: DateTime<Utc>) -> anyhow::Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO learning_runs (run_date, started_at, status)
                 VALUES (?1, ?2, 'running')
                 ON CONFLICT(run_date) DO UPDATE SET started_at = excluded.started_at, status = 'running'
                 WHERE learning_runs.status != 'completed'",
                params![run_date.to_string(), started_at.to_rfc3339()],
            )
            .context("starting learning run")?;
            let id: i64 = conn.query_row(
                "SELECT id FROM learning_runs WHERE run_date = ?1",
                params![run_date.to_string()],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    /// Commits the outcome of a run: applied parameter changes, the
    /// updated config (if any changes were applied) and the run summary,
    /// all inside one transaction so a crash mid-commit leaves neither
    /// partial `param_history` rows nor a partially-updated config.
    pub fn commit_learning_run(
        &self,
        run_id: i64,
        ended_at: DateTime<Utc>,
        loops_run: &[String],
        changes: &[AppliedChange],
        result_metrics_json: &str,
        new_config: Option<&PlannerConfig>,
    ) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            for change in changes {
                tx.execute(
                    "INSERT INTO learning_param_history (run_id, ts, param_path, old_value, new_value, loop_name, reason)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        run_id,
                        ended_at.to_rfc3339(),
                        change.param_path,
                        change.old_value,
                        change.new_value,
                        change.loop_name,
                        change.reason,
                    ],
                )?;
            }

            if let Some(config) = new_config {
                let json = serde_json::to_string(config).context("serialising config")?;
                tx.execute(
                    "INSERT INTO config_kv (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![PLANNER_CONFIG_KEY, json],
                )?;
            }

            tx.execute(
                "UPDATE learning_runs SET ended_at = ?1, status = 'completed', loops_run = ?2,
                    changes_proposed = ?3, changes_applied = ?4, result_metrics_json = ?5
                 WHERE id = ?6",
                params![
                    ended_at.to_rfc3339(),
                    loops_run.join(","),
                    changes.len() as i64,
                    changes.len() as i64,
                    result_metrics_json,
                    run_id,
                ],
            )?;

            tx.commit().context("committing learning run")?;
            Ok(())
        })
    }

    /// Marks a run aborted without touching `param_history` or `config_kv`.
    pub fn abort_learning_run(&self, run_id: i64, reason: &str) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE learning_runs SET status = 'aborted', last_error = ?1 WHERE id = ?2",
                params![reason, run_id],
            )?;
            Ok(())
        })
    }

    /// Records a daily scalar metric (e.g. `s_index.base_factor`), kept
    /// even on days where the value did not change, so history is always
    /// queryable.
    pub fn record_daily_metric(&self, date: NaiveDate, metric: &str, value: f32) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO learning_metrics (date, metric, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(date, metric) DO UPDATE SET value = excluded.value",
                params![date.to_string(), metric, value],
            )?;
            Ok(())
        })
    }

    pub fn record_daily_series(&self, date: NaiveDate, metric: &str, values: &[f32]) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            let json = serde_json::to_string(values)?;
            conn.execute(
                "INSERT INTO learning_daily_series (date, metric, values_json) VALUES (?1, ?2, ?3)
                 ON CONFLICT(date, metric) DO UPDATE SET values_json = excluded.values_json",
                params![date.to_string(), metric, json],
            )?;
            Ok(())
        })
    }

    /// Snapshot read of the current configuration; returns the default
    /// configuration if none has ever been committed.
    pub fn config_snapshot(&self) -> anyhow::Result<PlannerConfig> {
        self.with_conn(|conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT value FROM config_kv WHERE key = ?1",
                    params![PLANNER_CONFIG_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            match json {
                Some(j) => Ok(serde_json::from_str(&j)?),
                None => Ok(PlannerConfig::default()),
            }
        })
    }
}
