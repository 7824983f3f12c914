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

//! The three background loops this binary drives: a frequent planner tick,
//! an observation recorder, and an infrequent nightly-learning check, all
//! `tokio::time::interval` loops in the same shape as every other teacher
//! binary's background task. The planner invocation itself is pure CPU
//! work, so it runs on `tokio::task::spawn_blocking` under a
//! `tokio::time::timeout`, keeping the executor free while it runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Timelike, Utc};
use mpc_store::observations::CounterSnapshot;
use mpc_store::Database;
use mpc_types::ports::{CounterSource, InputProvider, ScheduleSink};
use mpc_types::BatteryState;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::adapters::{FileCounterSource, FileInputProvider, FileScheduleSink};

/// Runs one planner cycle: read the current grid/SoC, run `plan()` off the
/// async executor under a timeout, and publish the result. Errors are
/// logged and the tick is skipped — a failed tick never panics the loop.
pub async fn run_planner_tick(
    input: &FileInputProvider,
    sink: &FileScheduleSink,
    db: &Database,
    config_store: &Arc<RwLock<mpc_types::PlannerConfig>>,
) -> anyhow::Result<()> {
    let grid = input.current_grid().await?;
    let soc_percent = input.current_soc_percent().await?;
    let config = config_store.read().clone();

    for slot in &grid.slots {
        let forecast = mpc_store::observations::ForecastRecord {
            pv_forecast_kwh: slot.pv_forecast_kwh,
            load_forecast_kwh: slot.load_forecast_kwh,
            temp_c: slot.temp_c,
            version: 0,
        };
        if let Err(e) = db.store_forecast(slot.start_time.with_timezone(&Utc), forecast) {
            warn!(error = %e, slot_start = %slot.start_time, "failed to store forecast");
        }
    }

    let usable_kwh = config.battery_usable_capacity_kwh;
    let initial_state = BatteryState::new(soc_percent, usable_kwh * soc_percent / 100.0, 0.0);
    let s_index_inputs = mpc_planner::SIndexInputs::default();

    let timeout = Duration::from_secs(config.planner_timeout_secs);
    let inputs = grid.slots.clone();
    let plan_config = config.clone();

    let outcome = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || mpc_planner::plan(&inputs, &plan_config, initial_state, s_index_inputs)),
    )
    .await;

    let outcome = match outcome {
        Ok(join_result) => join_result.map_err(|e| anyhow::anyhow!("planner task panicked: {e}"))??,
        Err(_) => {
            warn!(timeout_secs = config.planner_timeout_secs, "planner tick timed out, skipping this cycle");
            return Ok(());
        }
    };

    if outcome.warning_count > 0 {
        info!(warnings = outcome.warning_count, slots = outcome.slots.len(), "plan produced warnings");
    } else {
        debug!(slots = outcome.slots.len(), "plan produced no warnings");
    }

    sink.publish(&outcome.slots).await?;
    Ok(())
}

/// Spawns the recurring planner tick as a background task.
pub fn spawn_planner_loop(
    input: Arc<FileInputProvider>,
    sink: Arc<FileScheduleSink>,
    db: Arc<Database>,
    config_store: Arc<RwLock<mpc_types::PlannerConfig>>,
    tick_interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_interval_secs));
        info!(tick_interval_secs, "planner tick loop started");
        loop {
            interval.tick().await;
            if let Err(e) = run_planner_tick(&input, &sink, &db, &config_store).await {
                error!(error = %e, "planner tick failed");
            }
        }
    })
}

/// Spawns the nightly-learning check: fires every few minutes but only
/// runs the orchestrator when the configured local hour has just been
/// crossed and no completed run exists yet for that date (idempotency is
/// enforced again inside `run_nightly` itself, this is just the scheduling
/// gate).
pub fn spawn_learning_loop(
    db: Arc<Database>,
    config_store: Arc<RwLock<mpc_types::PlannerConfig>>,
    tz: chrono_tz::Tz,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        info!("nightly learning check loop started");
        loop {
            interval.tick().await;

            let now_local = Utc::now().with_timezone(&tz);
            let learning_hour = config_store.read().learning_hour_local;
            if now_local.hour() != learning_hour {
                continue;
            }

            let run_date = now_local.date_naive();
            match db.has_completed_learning_run(run_date) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    error!(error = %e, "failed to check learning run status");
                    continue;
                }
            }

            let history_days = config_store.read().learning_history_days;
            let end = Utc::now();
            let start = end - chrono::Duration::days(history_days);
            let history = match db.range_query(start, end) {
                Ok(rows) => rows,
                Err(e) => {
                    error!(error = %e, "failed to assemble learning history window");
                    continue;
                }
            };

            // The store does not retain historical spot prices (see
            // `mpc_learning::history`); without a price archive wired in,
            // slots with no recorded price are skipped rather than guessed.
            let history_slots: Vec<mpc_learning::HistorySlot> = history
                .into_iter()
                .filter_map(|row| {
                    let obs = row.observation?;
                    Some(mpc_learning::HistorySlot {
                        slot_start: row.slot_start,
                        import_price_sek_kwh: None,
                        pv_forecast_kwh: row.forecast.as_ref().map(|f| f.pv_forecast_kwh).unwrap_or(0.0),
                        load_forecast_kwh: row.forecast.as_ref().map(|f| f.load_forecast_kwh).unwrap_or(0.0),
                        temp_c: row.forecast.and_then(|f| f.temp_c),
                        pv_observed_kwh: Some(obs.pv_kwh),
                        load_observed_kwh: Some(obs.load_kwh),
                        soc_start_percent: Some(obs.soc_start_percent),
                    })
                })
                .collect();

            match mpc_learning::run_nightly(&db, &history_slots, tz, run_date, Utc::now()) {
                Ok(Some(summary)) => {
                    info!(%run_date, changes = summary.applied.len(), "nightly learning run completed");
                    if let Ok(new_config) = db.config_snapshot() {
                        *config_store.write() = new_config;
                    }
                }
                Ok(None) => debug!(%run_date, "nightly learning run already completed"),
                Err(e) => error!(%run_date, error = %e, "nightly learning run failed"),
            }
        }
    })
}

/// Spawns the observation recorder: on each tick it reads the cumulative
/// energy counters and the current SoC, and diffs them against the last
/// stored totals to produce one observation row per slot. The SoC at the
/// start of a slot is just the SoC recorded at the end of the previous one.
pub fn spawn_observation_loop(
    input: Arc<FileInputProvider>,
    counters: Arc<FileCounterSource>,
    db: Arc<Database>,
    dt_minutes: i64,
    tick_interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_interval_secs));
        let mut last_soc_percent: Option<f32> = None;
        info!(dt_minutes, "observation recorder loop started");
        loop {
            interval.tick().await;

            let soc_end_percent = match input.current_soc_percent().await {
                Ok(v) => v,
                Err(e) => {
                    error!(error = %e, "failed to read current SoC for observation recording");
                    continue;
                }
            };
            let totals = match counters.read_totals().await {
                Ok(t) => t,
                Err(e) => {
                    error!(error = %e, "failed to read counter totals");
                    continue;
                }
            };

            let slot_start = align_to_slot(Utc::now(), dt_minutes);
            let soc_start_percent = last_soc_percent.unwrap_or(soc_end_percent);
            let snapshot = CounterSnapshot {
                pv_kwh: totals.pv_kwh,
                load_kwh: totals.load_kwh,
                import_kwh: totals.import_kwh,
                export_kwh: totals.export_kwh,
                battery_charge_kwh: totals.battery_charge_kwh,
                battery_discharge_kwh: totals.battery_discharge_kwh,
            };

            if let Err(e) = db.record_observation_from_counters(slot_start, soc_start_percent, soc_end_percent, snapshot) {
                error!(error = %e, "failed to record observation");
                continue;
            }
            last_soc_percent = Some(soc_end_percent);
        }
    })
}

/// Floors a timestamp to the start of its enclosing `dt_minutes` slot.
fn align_to_slot(now: DateTime<Utc>, dt_minutes: i64) -> DateTime<Utc> {
    let epoch_minutes = now.timestamp().div_euclid(60);
    let aligned_minutes = epoch_minutes.div_euclid(dt_minutes) * dt_minutes;
    Utc.timestamp_opt(aligned_minutes * 60, 0).single().unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_slot_floors_to_the_enclosing_window() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 37, 42).unwrap();
        let aligned = align_to_slot(now, 15);
        assert_eq!(aligned, Utc.with_ymd_and_hms(2026, 1, 1, 12, 30, 0).unwrap());
    }
}
