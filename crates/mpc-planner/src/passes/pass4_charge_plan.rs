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

//! Pass 4 — turns each charge window's total responsibility into a
//! per-slot charge plan, propagating any shortfall backward to cheaper
//! earlier windows.

use mpc_energy as energy;
use mpc_types::WarningKind;

use crate::context::{PassContext, PlanningState, WindowKind};

/// Per-slot grid-side charge kWh cap (device/grid power cap for one slot).
fn slot_cap_kwh(ctx: &PassContext) -> f32 {
    energy::max_action_kwh(ctx.config.max_battery_charge_kw, ctx.config.max_grid_charge_kw, ctx.dt_hours)
}

pub fn run(mut state: PlanningState, ctx: &PassContext) -> PlanningState {
    let slot_cap = slot_cap_kwh(ctx);

    // Total responsibility assigned per window, from Pass 3.
    let mut window_need: Vec<f32> = vec![0.0; state.charge_windows.len()];
    for r in &state.responsibilities {
        window_need[r.window_index] += r.kwh;
    }

    // Process windows from latest to earliest so a shortfall can propagate
    // backward to the next-cheaper earlier window.
    let mut order: Vec<usize> = (0..state.charge_windows.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(state.charge_windows[i].start));

    let mut unsatisfiable_slots: Vec<usize> = Vec::new();

    for idx in order {
        if window_need[idx] <= 0.0 {
            continue;
        }
        let window = state.charge_windows[idx];
        let slots = window.start..window.end;
        let capacity = slot_cap * slots.len() as f32;
        let need = window_need[idx].min(capacity);

        for slot_index in slots.clone() {
            let fraction = 1.0 / slots.len() as f32;
            state.charge_plan_kwh[slot_index] += need * fraction;
        }

        let shortfall = window_need[idx] - need;
        if shortfall > 0.0 {
            // Find the next-cheaper earlier window to absorb the shortfall.
            let earlier_cheaper = state
                .charge_windows
                .iter()
                .enumerate()
                .filter(|(_, w)| w.kind == WindowKind::Cheap && w.end <= window.start)
                .min_by(|(_, a), (_, b)| a.avg_price.partial_cmp(&b.avg_price).unwrap());

            match earlier_cheaper {
                Some((earlier_idx, _)) => window_need[earlier_idx] += shortfall,
                None => unsatisfiable_slots.extend(slots),
            }
        }
    }

    for slot_index in unsatisfiable_slots {
        state.slots[slot_index].push_warning(mpc_types::PlannerWarning::new(
            WarningKind::Unsatisfiable,
            "charge responsibility could not be met by any earlier window",
        ));
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PlanningState;
    use crate::passes::{pass1_windows, pass2_baseline, pass3_responsibility};
    use crate::s_index::SIndexInputs;
    use crate::test_support::{flat_inputs, planner_config, state_with_prices};

    #[test]
    fn charge_plan_distributes_responsibility_across_window_slots() {
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
        let state = pass3_responsibility::run(state, &ctx, SIndexInputs::default());
        let state = run(state, &ctx);

        let total: f32 = state.charge_plan_kwh[0..4].iter().sum();
        assert!(total > 0.0);
        assert!(state.charge_plan_kwh[4..72].iter().all(|&k| k == 0.0));
    }
}
