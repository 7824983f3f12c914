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

//! The deterministic SoC/cost simulator. One pure function, `simulate`,
//! replays a proposed set of per-slot actions against a set of inputs and
//! an initial battery state. It is called from three places that must
//! never disagree: the planner's own Pass 8 projection, the learning
//! loops scoring a candidate configuration, and validation of an
//! externally proposed manual schedule.

use mpc_energy as energy;
use mpc_types::{BatteryState, InputSlot};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// The decision requested for one slot: at most one of charge/discharge is
/// expected to be non-zero (the simulator does not enforce this — it
/// applies charge first, then discharge, then export, then water — but a
/// well-formed planner never emits both).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotAction {
    pub charge_kw: f32,
    pub discharge_kw: f32,
    pub export_kwh: f32,
    pub water_kw: f32,
}

impl SlotAction {
    pub fn hold() -> Self {
        Self { charge_kw: 0.0, discharge_kw: 0.0, export_kwh: 0.0, water_kw: 0.0 }
    }
}

#[derive(Debug, Error)]
pub enum InvalidSchedule {
    #[error("schedule has {schedule_len} slots but inputs has {inputs_len}")]
    LengthMismatch { schedule_len: usize, inputs_len: usize },
    #[error("slot {slot}: negative power requested ({field} = {value})")]
    NegativePower { slot: usize, field: &'static str, value: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampKind {
    SocFloor,
    SocCeiling,
    ChargePowerCap,
    DischargePowerCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClampEvent {
    pub slot: usize,
    pub kind: ClampKind,
    pub requested: f32,
    pub applied: f32,
}

/// Realised energy flows for one simulated slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotFlows {
    pub grid_import_kwh: f32,
    pub grid_export_kwh: f32,
    pub battery_charge_kwh: f32,
    pub battery_discharge_kwh: f32,
    pub water_kwh: f32,
    pub pv_used_kwh: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub soc_trajectory: Vec<f32>,
    pub flows: Vec<SlotFlows>,
    pub realised_cost_sek: f32,
    pub clamp_events: Vec<ClampEvent>,
    pub final_state: BatteryState,
}

/// Static physical parameters the simulator needs; a subset of
/// [`mpc_types::PlannerConfig`] so call sites don't have to depend on the
/// whole config type.
#[derive(Debug, Clone, Copy)]
pub struct SimParams {
    pub dt_hours: f32,
    pub round_trip_efficiency: f32,
    pub min_soc_percent: f32,
    pub max_soc_percent: f32,
    pub usable_capacity_kwh: f32,
    pub max_battery_charge_kw: f32,
    pub max_battery_discharge_kw: f32,
    pub max_grid_charge_kw: f32,
    pub max_export_kw: f32,
}

/// Replays `schedule` against `inputs` starting from `initial_state`.
///
/// Fails only on structurally malformed input (mismatched lengths,
/// negative requested powers). SoC and power-cap violations are clamped
/// and recorded in `clamp_events`, never silently dropped and never a
/// reason to fail.
pub fn simulate(
    schedule: &[SlotAction],
    inputs: &[InputSlot],
    initial_state: BatteryState,
    params: SimParams,
) -> Result<SimulationResult, InvalidSchedule> {
    if schedule.len() != inputs.len() {
        return Err(InvalidSchedule::LengthMismatch {
            schedule_len: schedule.len(),
            inputs_len: inputs.len(),
        });
    }
    for (i, action) in schedule.iter().enumerate() {
        if action.charge_kw < 0.0 {
            return Err(InvalidSchedule::NegativePower { slot: i, field: "charge_kw", value: action.charge_kw });
        }
        if action.discharge_kw < 0.0 {
            return Err(InvalidSchedule::NegativePower {
                slot: i,
                field: "discharge_kw",
                value: action.discharge_kw,
            });
        }
        if action.export_kwh < 0.0 {
            return Err(InvalidSchedule::NegativePower { slot: i, field: "export_kwh", value: action.export_kwh });
        }
        if action.water_kw < 0.0 {
            return Err(InvalidSchedule::NegativePower { slot: i, field: "water_kw", value: action.water_kw });
        }
    }

    let eta = energy::one_way_efficiency(params.round_trip_efficiency);
    let mut state = initial_state;
    let mut trajectory = Vec::with_capacity(schedule.len());
    let mut flows = Vec::with_capacity(schedule.len());
    let mut clamp_events = Vec::new();
    let mut realised_cost = 0.0f32;

    for (i, (action, input)) in schedule.iter().zip(inputs.iter()).enumerate() {
        let price = input.import_price_sek_kwh.unwrap_or(0.0);
        let pv_available = input.pv_forecast_kwh;
        let load = input.load_forecast_kwh;

        let soc_headroom_kwh = (params.max_soc_percent - state.soc_percent) / 100.0 * params.usable_capacity_kwh;
        let soc_floor_kwh = (state.soc_percent - params.min_soc_percent) / 100.0 * params.usable_capacity_kwh;

        // Charge, clamped by device/grid caps and SoC ceiling.
        let requested_charge_kwh = action.charge_kw * params.dt_hours;
        let charge_cap_kwh = energy::max_action_kwh(
            params.max_battery_charge_kw,
            params.max_grid_charge_kw,
            params.dt_hours,
        );
        let mut charge_kwh = requested_charge_kwh.min(charge_cap_kwh);
        if requested_charge_kwh > charge_cap_kwh {
            clamp_events.push(ClampEvent {
                slot: i,
                kind: ClampKind::ChargePowerCap,
                requested: requested_charge_kwh,
                applied: charge_kwh,
            });
        }
        let stored_from_charge = energy::charge_stored_kwh(charge_kwh, eta);
        if stored_from_charge > soc_headroom_kwh.max(0.0) {
            let allowed_stored = soc_headroom_kwh.max(0.0);
            let allowed_charge_kwh = if eta > 0.0 { allowed_stored / eta } else { 0.0 };
            clamp_events.push(ClampEvent {
                slot: i,
                kind: ClampKind::SocCeiling,
                requested: charge_kwh,
                applied: allowed_charge_kwh,
            });
            charge_kwh = allowed_charge_kwh;
        }

        // Discharge, clamped by device cap and SoC floor.
        let requested_discharge_kwh = action.discharge_kw * params.dt_hours;
        let discharge_cap_kwh = params.max_battery_discharge_kw * params.dt_hours;
        let mut discharge_kwh = requested_discharge_kwh.min(discharge_cap_kwh);
        if requested_discharge_kwh > discharge_cap_kwh {
            clamp_events.push(ClampEvent {
                slot: i,
                kind: ClampKind::DischargePowerCap,
                requested: requested_discharge_kwh,
                applied: discharge_kwh,
            });
        }
        let stored_removed = energy::discharge_stored_kwh(discharge_kwh, eta);
        if stored_removed > soc_floor_kwh.max(0.0) {
            let allowed_removed = soc_floor_kwh.max(0.0);
            let allowed_discharge_kwh = allowed_removed * eta;
            clamp_events.push(ClampEvent {
                slot: i,
                kind: ClampKind::SocFloor,
                requested: discharge_kwh,
                applied: allowed_discharge_kwh,
            });
            discharge_kwh = allowed_discharge_kwh;
        }

        // Apply charge then discharge to the battery cost ledger.
        if charge_kwh > 0.0 {
            state = energy::apply_charge(state, charge_kwh, price, eta);
        }
        if discharge_kwh > 0.0 {
            state = energy::apply_discharge(state, discharge_kwh, eta);
        }

        let soc_delta_kwh =
            energy::charge_stored_kwh(charge_kwh, eta) - energy::discharge_stored_kwh(discharge_kwh, eta);
        let soc_delta_percent = energy::stored_kwh_to_soc_delta(soc_delta_kwh, params.usable_capacity_kwh);
        state.soc_percent = (state.soc_percent + soc_delta_percent)
            .clamp(params.min_soc_percent, params.max_soc_percent);

        // Water heating is additional load, covered by PV first, then
        // scheduled discharge, then grid, same priority as household load.
        let water_kwh = action.water_kw * params.dt_hours;
        let total_load = load + water_kwh;
        let pv_used = pv_available.max(0.0).min(total_load);
        let remaining_after_pv = (total_load - pv_used).max(0.0);
        let discharge_for_load = discharge_kwh.min(remaining_after_pv);
        let remaining_after_discharge = (remaining_after_pv - discharge_for_load).max(0.0);

        let grid_import = remaining_after_discharge + charge_kwh;

        let pv_surplus = (pv_available.max(0.0) - pv_used).max(0.0);
        let discharge_surplus = discharge_kwh - discharge_for_load;
        let export_kwh = action.export_kwh.min(pv_surplus + discharge_surplus);

        realised_cost += grid_import * price - export_kwh * price;

        trajectory.push(state.soc_percent);
        flows.push(SlotFlows {
            grid_import_kwh: grid_import,
            grid_export_kwh: export_kwh,
            battery_charge_kwh: charge_kwh,
            battery_discharge_kwh: discharge_kwh,
            water_kwh,
            pv_used_kwh: pv_used,
        });
    }

    debug!(slots = schedule.len(), clamp_events = clamp_events.len(), "simulation complete");

    Ok(SimulationResult {
        soc_trajectory: trajectory,
        flows,
        realised_cost_sek: realised_cost,
        clamp_events,
        final_state: state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Europe::Prague;

    fn params() -> SimParams {
        SimParams {
            dt_hours: 0.25,
            round_trip_efficiency: 0.95,
            min_soc_percent: 15.0,
            max_soc_percent: 95.0,
            usable_capacity_kwh: 10.0,
            max_battery_charge_kw: 5.0,
            max_battery_discharge_kw: 5.0,
            max_grid_charge_kw: 5.0,
            max_export_kw: 5.0,
        }
    }

    fn slot(price: Option<f32>, pv: f32, load: f32) -> InputSlot {
        let start = Prague.from_local_datetime(&NaiveDate::from_ymd_opt(2026, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()).single().unwrap();
        InputSlot {
            start_time: start,
            import_price_sek_kwh: price,
            pv_forecast_kwh: pv,
            load_forecast_kwh: load,
            temp_c: None,
        }
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let result = simulate(&[SlotAction::hold()], &[], BatteryState::new(20.0, 0.0, 0.0), params());
        assert!(matches!(result, Err(InvalidSchedule::LengthMismatch { .. })));
    }

    #[test]
    fn negative_power_is_rejected() {
        let mut action = SlotAction::hold();
        action.charge_kw = -1.0;
        let result = simulate(&[action], &[slot(Some(1.0), 0.0, 0.0)], BatteryState::new(20.0, 0.0, 0.0), params());
        assert!(matches!(result, Err(InvalidSchedule::NegativePower { .. })));
    }

    #[test]
    fn soc_never_exceeds_bounds_and_clamp_is_recorded() {
        let mut action = SlotAction::hold();
        action.charge_kw = 5.0;
        let schedule = vec![action; 40];
        let inputs: Vec<_> = (0..40).map(|_| slot(Some(1.0), 0.0, 0.0)).collect();
        let result = simulate(&schedule, &inputs, BatteryState::new(90.0, 9.0, 9.0), params()).unwrap();
        assert!(result.soc_trajectory.iter().all(|s| *s <= 95.0 && *s >= 15.0));
        assert!(!result.clamp_events.is_empty());
    }

    #[test]
    fn no_action_means_no_clamp_events() {
        let schedule = vec![SlotAction::hold(); 4];
        let inputs: Vec<_> = (0..4).map(|_| slot(Some(1.0), 0.0, 0.4)).collect();
        let result = simulate(&schedule, &inputs, BatteryState::new(50.0, 5.0, 5.0), params()).unwrap();
        assert!(result.clamp_events.is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_params() -> impl Strategy<Value = SimParams> {
        (10.0f32..30.0, 70.0f32..98.0).prop_map(|(min_soc, max_soc)| SimParams {
            dt_hours: 0.25,
            round_trip_efficiency: 0.95,
            min_soc_percent: min_soc,
            max_soc_percent: max_soc,
            usable_capacity_kwh: 10.0,
            max_battery_charge_kw: 5.0,
            max_battery_discharge_kw: 5.0,
            max_grid_charge_kw: 5.0,
            max_export_kw: 5.0,
        })
    }

    fn arb_action() -> impl Strategy<Value = SlotAction> {
        (0.0f32..8.0, 0.0f32..8.0, 0.0f32..2.0, 0.0f32..2.0)
            .prop_map(|(charge_kw, discharge_kw, export_kwh, water_kw)| SlotAction {
                charge_kw,
                discharge_kw,
                export_kwh,
                water_kw,
            })
    }

    fn flat_input(price: f32) -> InputSlot {
        let start = chrono_tz::Europe::Prague
            .from_local_datetime(
                &chrono::NaiveDate::from_ymd_opt(2026, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            )
            .single()
            .unwrap();
        InputSlot { start_time: start, import_price_sek_kwh: Some(price), pv_forecast_kwh: 0.3, load_forecast_kwh: 0.4, temp_c: None }
    }

    proptest! {
        /// Whatever actions are requested, the realised SoC trajectory never
        /// leaves `[min_soc_percent, max_soc_percent]` — the simulator clamps
        /// rather than overshoots.
        #[test]
        fn soc_trajectory_stays_within_configured_bounds(
            params in arb_params(),
            actions in proptest::collection::vec(arb_action(), 1..20),
            start_soc in 10.0f32..98.0,
        ) {
            let start_soc = start_soc.clamp(params.min_soc_percent, params.max_soc_percent);
            let inputs: Vec<InputSlot> = actions.iter().map(|_| flat_input(1.0)).collect();
            let initial = BatteryState::new(start_soc, params.usable_capacity_kwh * start_soc / 100.0, 0.0);

            let result = simulate(&actions, &inputs, initial, params).unwrap();

            for soc in &result.soc_trajectory {
                prop_assert!(*soc >= params.min_soc_percent - 1e-3 && *soc <= params.max_soc_percent + 1e-3);
            }
        }

        /// Holding every slot never produces a clamp event and never moves
        /// the SoC away from the starting value.
        #[test]
        fn holding_every_slot_is_a_no_op(
            params in arb_params(),
            slot_count in 1usize..20,
            start_soc in 10.0f32..98.0,
        ) {
            let start_soc = start_soc.clamp(params.min_soc_percent, params.max_soc_percent);
            let schedule = vec![SlotAction::hold(); slot_count];
            let inputs: Vec<InputSlot> = (0..slot_count).map(|_| flat_input(1.0)).collect();
            let initial = BatteryState::new(start_soc, params.usable_capacity_kwh * start_soc / 100.0, 0.0);

            let result = simulate(&schedule, &inputs, initial, params).unwrap();

            prop_assert!(result.clamp_events.is_empty());
            for soc in &result.soc_trajectory {
                prop_assert!((*soc - start_soc).abs() < 1e-3);
            }
        }
    }
}
