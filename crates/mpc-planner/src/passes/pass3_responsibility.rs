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

//! Pass 3 — cascading gap-responsibility assignment. Each deficit run
//! claims capacity from preceding cheap windows that are economical to
//! pre-store into, inflated by the S-index safety multiplier.

use mpc_energy as energy;

use crate::context::{PassContext, PlanningState, Responsibility, WindowKind};
use crate::s_index::{compute_s_index, SIndexInputs};

/// Capacity of a charge window: device/grid power cap times its duration,
/// converted to stored kWh via one-way efficiency.
fn window_capacity_kwh(window_len_slots: usize, ctx: &PassContext) -> f32 {
    let eta = ctx.config.one_way_efficiency();
    let per_slot = energy::max_action_kwh(
        ctx.config.max_battery_charge_kw,
        ctx.config.max_grid_charge_kw,
        ctx.dt_hours,
    );
    per_slot * window_len_slots as f32 * eta
}

/// Runs Pass 3. `s_index_inputs` carries the recent-history terms the
/// dynamic S-index mode needs; callers with no history yet may pass
/// `SIndexInputs::default()`.
pub fn run(state: PlanningState, ctx: &PassContext, s_index_inputs: SIndexInputs) -> PlanningState {
    let s_index = compute_s_index(ctx.config, s_index_inputs);

    let mut remaining_capacity: Vec<f32> = state
        .charge_windows
        .iter()
        .map(|w| window_capacity_kwh(w.len(), ctx))
        .collect();

    let mut responsibilities = Vec::new();

    // Runs are already in time order (Pass 2 scans left to right), so
    // processing them in that order and letting each claim capacity
    // before later runs implements "prefer earlier-in-time run" for the
    // case where two runs compete for the same window's capacity. Within
    // a single run, eligible windows are ranked cheapest-first, then
    // latest-first among ties.
    for (run_index, run) in state.deficit_runs.iter().enumerate() {
        let mut eligible: Vec<usize> = state
            .charge_windows
            .iter()
            .enumerate()
            .filter(|(_, w)| {
                w.kind == WindowKind::Cheap
                    && w.end <= run.start
                    && is_economical(w.avg_price, ctx, run.expected_price)
            })
            .map(|(idx, _)| idx)
            .collect();

        eligible.sort_by(|&a, &b| {
            let wa = &state.charge_windows[a];
            let wb = &state.charge_windows[b];
            wa.avg_price
                .partial_cmp(&wb.avg_price)
                .unwrap()
                .then_with(|| wb.start.cmp(&wa.start))
        });

        let mut remaining_need = run.deficit_kwh * s_index;
        for window_index in eligible {
            if remaining_need <= 0.0 {
                break;
            }
            let available = remaining_capacity[window_index];
            if available <= 0.0 {
                continue;
            }
            let assigned = remaining_need.min(available);
            remaining_capacity[window_index] -= assigned;
            remaining_need -= assigned;
            responsibilities.push(Responsibility { window_index, run_index, kwh: assigned });
        }
    }

    PlanningState { responsibilities, ..state }
}

fn is_economical(window_price: f32, ctx: &PassContext, expected_price_during_run: f32) -> bool {
    let wear = ctx.config.wear_sek_per_kwh;
    let margin = ctx.config.tunable.battery_use_margin_sek;
    window_price + wear + margin < expected_price_during_run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PlanningState;
    use crate::passes::{pass1_windows, pass2_baseline};
    use crate::test_support::{flat_inputs, planner_config, state_with_prices};

    #[test]
    fn cheap_window_inherits_responsibility_for_evening_deficit() {
        let config = planner_config();
        let mut inputs = flat_inputs(96, 1.0);
        for slot in inputs[0..4].iter_mut() {
            slot.import_price_sek_kwh = Some(0.10);
        }
        for slot in inputs[72..76].iter_mut() {
            slot.load_forecast_kwh = 1.0;
            slot.import_price_sek_kwh = Some(2.0);
        }
        let ctx = PassContext::new(&inputs, &config, Default::default(), 10.0);
        let state = PlanningState::empty(state_with_prices(&inputs));
        let state = pass1_windows::run(state, &ctx);
        let state = pass2_baseline::run(state, &ctx);
        let state = run(state, &ctx, SIndexInputs::default());

        assert!(!state.responsibilities.is_empty());
        assert_eq!(state.responsibilities[0].window_index, 0);
        assert_eq!(state.responsibilities[0].run_index, 0);
    }

    #[test]
    fn no_eligible_window_leaves_responsibilities_empty() {
        let config = planner_config();
        let mut inputs = flat_inputs(96, 1.0);
        for slot in inputs[72..76].iter_mut() {
            slot.load_forecast_kwh = 1.0;
        }
        let ctx = PassContext::new(&inputs, &config, Default::default(), 10.0);
        let state = PlanningState::empty(state_with_prices(&inputs));
        let state = pass1_windows::run(state, &ctx);
        let state = pass2_baseline::run(state, &ctx);
        let state = run(state, &ctx, SIndexInputs::default());
        assert!(state.responsibilities.is_empty());
    }
}
