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

//! Pass 5 — water-heating block scheduler. Prefers a single contiguous
//! block; falls back to up to `water_max_blocks_per_day` blocks only when
//! needed to reach `water_min_hours_per_day`. All slots handed to this
//! pass are assumed to be in the future relative to "now" (the planner is
//! always invoked for a forward-looking horizon); `water_schedule_future_only`
//! gates whether an external caller may additionally mark a prefix of the
//! horizon as already-executed, which this pass never disturbs.

use crate::context::{PassContext, PlanningState, WaterBlock};

/// Per-slot preference score: lower is better. PV-surplus slots are
/// always preferred over price, so when aggregate PV surplus covers the
/// day's water demand the chosen block sits entirely inside it.
fn slot_cost(ctx: &PassContext, slot_index: usize, avg_cost_per_kwh: f32, eta: f32) -> f32 {
    let input = &ctx.inputs[slot_index];
    let pv_surplus = (input.pv_forecast_kwh - input.load_forecast_kwh).max(0.0);
    if pv_surplus > 0.0 {
        // Using PV surplus is free; rank by how much surplus is on offer.
        return -pv_surplus * 1000.0;
    }
    let margin = ctx.config.tunable.battery_use_margin_sek;
    let battery_cost = avg_cost_per_kwh / eta + ctx.config.wear_sek_per_kwh + margin;
    let grid_price = input.import_price_sek_kwh.unwrap_or(f32::INFINITY);
    battery_cost.min(grid_price)
}

pub fn run(mut state: PlanningState, ctx: &PassContext) -> PlanningState {
    let n = ctx.inputs.len();
    if n == 0 || ctx.config.water_device_kw <= 0.0 {
        return state;
    }

    let slots_per_block_hour = 60.0 / ctx.config.dt_minutes as f32;
    let required_slots_for_hours =
        (ctx.config.water_min_hours_per_day * slots_per_block_hour).ceil() as usize;
    let required_slots_for_energy =
        (ctx.config.water_min_kwh_per_day / (ctx.config.water_device_kw * ctx.dt_hours)).ceil() as usize;
    let required_slots = required_slots_for_hours.max(required_slots_for_energy).min(n);

    let eta = ctx.config.one_way_efficiency();
    let avg_cost_per_kwh = ctx.initial_state.avg_cost_per_kwh();
    let costs: Vec<f32> = (0..n).map(|i| slot_cost(ctx, i, avg_cost_per_kwh, eta)).collect();

    let max_blocks = ctx.config.water_max_blocks_per_day.max(1);
    let mut remaining = required_slots;
    let mut used = vec![false; n];
    let mut blocks = Vec::new();

    for _ in 0..max_blocks {
        if remaining == 0 {
            break;
        }
        let block_len = if blocks.is_empty() { remaining } else { remaining.min(required_slots) };
        let candidate = (1..=block_len)
            .rev()
            .find_map(|len| available_window(&costs, &used, len));
        match candidate {
            Some((start, end)) => {
                for i in start..end {
                    used[i] = true;
                    state.water_plan_kw[i] = ctx.config.water_device_kw;
                }
                blocks.push(WaterBlock { start, end });
                remaining = remaining.saturating_sub(end - start);
            }
            None => break,
        }
    }

    state.water_blocks = blocks;
    state
}

/// Finds the lowest-cost contiguous run of `len` slots, skipping slots
/// already claimed by an earlier block.
fn available_window(costs: &[f32], used: &[bool], len: usize) -> Option<(usize, usize)> {
    let n = costs.len();
    if len == 0 || len > n {
        return None;
    }
    let mut best: Option<(usize, f32)> = None;
    for start in 0..=(n - len) {
        if used[start..start + len].iter().any(|&u| u) {
            continue;
        }
        let sum: f32 = costs[start..start + len].iter().sum();
        if best.is_none_or(|(_, best_sum)| sum < best_sum) {
            best = Some((start, sum));
        }
    }
    best.map(|(start, _)| (start, start + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat_inputs, planner_config, state_with_prices};

    #[test]
    fn water_block_lands_entirely_inside_pv_surplus_window() {
        let config = planner_config();
        let mut inputs = flat_inputs(96, 1.0);
        for slot in inputs[40..56].iter_mut() {
            slot.pv_forecast_kwh = 2.0;
        }
        let ctx = PassContext::new(&inputs, &config, Default::default(), 10.0);
        let state = PlanningState::empty(state_with_prices(&inputs));
        let state = run(state, &ctx);

        assert_eq!(state.water_blocks.len(), 1);
        let block = state.water_blocks[0];
        assert!(block.start >= 40 && block.end <= 56);
    }

    #[test]
    fn no_pv_still_schedules_a_block_at_cheapest_price() {
        let config = planner_config();
        let mut inputs = flat_inputs(96, 1.0);
        for slot in inputs[4..8].iter_mut() {
            slot.import_price_sek_kwh = Some(0.05);
        }
        let ctx = PassContext::new(&inputs, &config, Default::default(), 10.0);
        let state = PlanningState::empty(state_with_prices(&inputs));
        let state = run(state, &ctx);
        assert!(!state.water_blocks.is_empty());
    }
}
