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

//! Shared backtest oracle: replay a window of [`HistorySlot`]s through the
//! real planner under a candidate config, then score the result with the
//! same `mpc_simulator::simulate` the planner's own Pass 8 uses. Every
//! tuning loop calls through this one function so a candidate's scored
//! cost can never drift from what Pass 8 would have projected for it.

use chrono_tz::Tz;
use mpc_planner::SIndexInputs;
use mpc_simulator::{SimParams, SlotAction};
use mpc_types::{BatteryState, PlannerConfig, ScheduleSlot};

use crate::history::HistorySlot;

fn schedule_to_actions(slots: &[ScheduleSlot]) -> Vec<SlotAction> {
    slots
        .iter()
        .map(|s| SlotAction {
            charge_kw: s.battery_charge_kw,
            discharge_kw: s.battery_discharge_kw,
            export_kwh: s.export_kwh,
            water_kw: s.water_heating_kw,
        })
        .collect()
}

fn sim_params(config: &PlannerConfig) -> SimParams {
    SimParams {
        dt_hours: config.dt_minutes as f32 / 60.0,
        round_trip_efficiency: config.round_trip_efficiency,
        min_soc_percent: config.min_soc_percent,
        max_soc_percent: config.max_soc_percent,
        usable_capacity_kwh: config.battery_usable_capacity_kwh,
        max_battery_charge_kw: config.max_battery_charge_kw,
        max_battery_discharge_kw: config.max_battery_discharge_kw,
        max_grid_charge_kw: config.max_grid_charge_kw,
        max_export_kw: config.max_export_kw,
    }
}

/// Best-effort initial battery state for a backtest window: seeds SoC from
/// the first history slot that carries an observation, and assumes the
/// stored energy was bought at the window's first known price. Only the
/// *difference* in realised cost between a baseline and a perturbed config
/// run from this same seed matters to the tuning loops, so the absolute
/// cost basis does not need to be exact.
fn seed_state(history: &[HistorySlot], config: &PlannerConfig) -> BatteryState {
    let soc = history.iter().find_map(|h| h.soc_start_percent).unwrap_or(50.0);
    let price = history.iter().find_map(|h| h.import_price_sek_kwh).unwrap_or(0.0);
    let stored_kwh = config.battery_usable_capacity_kwh * soc / 100.0;
    BatteryState::new(soc, stored_kwh, stored_kwh * price)
}

/// Runs the planner over `history` under `config`, then scores the
/// resulting schedule with the deterministic simulator. Returns the total
/// realised cost in local currency (SEK); lower is better.
pub fn simulate_candidate(
    history: &[HistorySlot],
    tz: Tz,
    config: &PlannerConfig,
    s_index_inputs: SIndexInputs,
) -> anyhow::Result<f64> {
    if history.is_empty() {
        anyhow::bail!("cannot score an empty history window");
    }
    let inputs: Vec<_> = history.iter().map(|h| h.as_input_slot(tz)).collect();
    let initial_state = seed_state(history, config);

    let outcome = mpc_planner::plan(&inputs, config, initial_state, s_index_inputs)?;
    let actions = schedule_to_actions(&outcome.slots);
    let result = mpc_simulator::simulate(&actions, &inputs, initial_state, sim_params(config))?;
    Ok(f64::from(result.realised_cost_sek))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Europe::Prague;

    fn flat_history(count: usize, price: f32, load: f32) -> Vec<HistorySlot> {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| HistorySlot {
                slot_start: start + chrono::Duration::minutes(15 * i as i64),
                import_price_sek_kwh: Some(price),
                pv_forecast_kwh: 0.0,
                load_forecast_kwh: load,
                temp_c: None,
                pv_observed_kwh: None,
                load_observed_kwh: None,
                soc_start_percent: Some(50.0),
            })
            .collect()
    }

    #[test]
    fn empty_history_is_rejected() {
        let config = PlannerConfig::default();
        let result = simulate_candidate(&[], Prague, &config, SIndexInputs::default());
        assert!(result.is_err());
    }

    #[test]
    fn flat_day_scores_a_finite_cost() {
        let config = PlannerConfig::default();
        let history = flat_history(96, 1.0, 0.4);
        let cost = simulate_candidate(&history, Prague, &config, SIndexInputs::default()).unwrap();
        assert!(cost.is_finite());
    }
}
