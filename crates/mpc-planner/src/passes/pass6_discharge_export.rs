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

//! Pass 6 — discharge plan for self-consumption during deficit runs, plus
//! export during peak windows subject to a protective SoC floor.

use mpc_energy as energy;
use mpc_types::config::ProtectiveSocStrategy;

use crate::context::{PassContext, PlanningState};

pub fn run(mut state: PlanningState, ctx: &PassContext) -> PlanningState {
    let eta = ctx.config.one_way_efficiency();
    let avg_cost = ctx.initial_state.avg_cost_per_kwh();
    let wear = ctx.config.wear_sek_per_kwh;
    let margin = ctx.config.tunable.battery_use_margin_sek;

    // Discharge to cover deficit runs when economical.
    for run in &state.deficit_runs {
        for slot_index in run.start..run.end {
            let input = &ctx.inputs[slot_index];
            let net_load = (input.load_forecast_kwh - input.pv_forecast_kwh).max(0.0);
            if net_load <= 0.0 {
                continue;
            }
            let Some(price) = input.import_price_sek_kwh else { continue };
            let discharge_cost = energy::discharge_marginal_cost(avg_cost, eta, wear) + margin;
            if discharge_cost < price {
                let cap = ctx.config.max_battery_discharge_kw * ctx.dt_hours;
                state.discharge_plan_kwh[slot_index] = net_load.min(cap);
            }
        }
    }

    // Export during peak windows, respecting a protective SoC floor and
    // the future-price guard buffer. `running_soc` is a coarse forecast of
    // SoC at each slot from the charge/discharge plan assembled so far;
    // Pass 8's simulator resolves the exact trajectory, this only needs to
    // be accurate enough to gate export intent.
    let guard_buffer = ctx.config.tunable.future_price_guard_buffer_sek;
    let export_margin = ctx.config.tunable.export_profit_margin_sek;
    let running_soc = project_soc(ctx, &state);

    for (w_index, window) in state.export_windows.iter().enumerate() {
        let protective_floor = protective_soc_floor(ctx, &state, w_index);
        for slot_index in window.start..window.end {
            let Some(price) = ctx.inputs[slot_index].import_price_sek_kwh else { continue };
            if running_soc[slot_index] <= protective_floor {
                continue;
            }
            let revenue_equivalent = price - wear - export_margin;
            if revenue_equivalent <= avg_cost {
                continue;
            }
            if has_higher_priced_window_ahead(&state, w_index, price, guard_buffer) {
                continue;
            }
            let cap = ctx.config.max_export_kw * ctx.dt_hours;
            state.export_plan_kwh[slot_index] = cap;
        }
    }

    state
}

/// Coarse per-slot SoC forecast from the charge/discharge plan assembled
/// in Passes 4 and 6 so far, used only to gate export against the
/// protective floor; not the authoritative trajectory (Pass 8 is).
fn project_soc(ctx: &PassContext, state: &PlanningState) -> Vec<f32> {
    let eta = ctx.config.one_way_efficiency();
    let mut soc = ctx.initial_state.soc_percent;
    let mut out = Vec::with_capacity(state.len());
    for i in 0..state.len() {
        let stored_delta = energy::charge_stored_kwh(state.charge_plan_kwh[i], eta)
            - energy::discharge_stored_kwh(state.discharge_plan_kwh[i], eta);
        soc = (soc + energy::stored_kwh_to_soc_delta(stored_delta, ctx.usable_capacity_kwh))
            .clamp(ctx.config.min_soc_percent, ctx.config.max_soc_percent);
        out.push(soc);
    }
    out
}

/// Remaining downstream responsibilities after this export window
/// determine how much SoC must be preserved (`gap_based`); otherwise a
/// fixed configured floor applies.
fn protective_soc_floor(ctx: &PassContext, state: &PlanningState, window_index: usize) -> f32 {
    match ctx.config.protective_soc_strategy {
        ProtectiveSocStrategy::Fixed => ctx.config.fixed_protective_soc_percent,
        ProtectiveSocStrategy::GapBased => {
            let window = state.export_windows[window_index];
            let downstream_kwh: f32 = state
                .responsibilities
                .iter()
                .filter(|r| state.charge_windows[r.window_index].start >= window.end)
                .map(|r| r.kwh)
                .sum();
            let delta_percent = energy::stored_kwh_to_soc_delta(downstream_kwh, ctx.usable_capacity_kwh);
            (ctx.config.min_soc_percent + delta_percent).min(ctx.config.max_soc_percent)
        }
    }
}

/// True if a higher-priced export window lies ahead within the future
/// price guard buffer, meaning exporting now would forgo a better price.
fn has_higher_priced_window_ahead(state: &PlanningState, window_index: usize, price: f32, guard_buffer: f32) -> bool {
    let window = state.export_windows[window_index];
    state
        .export_windows
        .iter()
        .skip(window_index + 1)
        .take_while(|w| w.start < window.end + 96)
        .any(|w| w.avg_price > price + guard_buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PlanningState;
    use crate::passes::{pass1_windows, pass2_baseline, pass3_responsibility};
    use crate::s_index::SIndexInputs;
    use crate::test_support::{flat_inputs, planner_config, state_with_prices};
    use mpc_types::BatteryState;

    #[test]
    fn discharge_covers_deficit_when_cheaper_than_grid() {
        let config = planner_config();
        let mut inputs = flat_inputs(96, 1.0);
        for slot in inputs[72..76].iter_mut() {
            slot.load_forecast_kwh = 1.0;
            slot.import_price_sek_kwh = Some(2.0);
        }
        let initial = BatteryState::new(80.0, 5.0, 2.0);
        let ctx = PassContext::new(&inputs, &config, initial, 10.0);
        let state = PlanningState::empty(state_with_prices(&inputs));
        let state = pass1_windows::run(state, &ctx);
        let state = pass2_baseline::run(state, &ctx);
        let state = pass3_responsibility::run(state, &ctx, SIndexInputs::default());
        let state = run(state, &ctx);

        assert!(state.discharge_plan_kwh[72] > 0.0);
    }
}
