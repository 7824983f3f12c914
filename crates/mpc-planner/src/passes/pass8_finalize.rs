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

//! Pass 8 — runs the deterministic simulator over the assembled plan to
//! produce `projected_soc_percent`, sets `soc_target_percent`, classifies
//! each slot, and turns any clamp event into a `planner_warning`.

use mpc_simulator::{simulate, ClampKind, SimParams, SlotAction};
use mpc_types::{Classification, PlannerWarning, WarningKind};

use crate::context::{PassContext, PlanningState};
use crate::error::PlannerError;

pub fn run(mut state: PlanningState, ctx: &PassContext) -> Result<PlanningState, PlannerError> {
    let n = state.len();
    let actions: Vec<SlotAction> = (0..n)
        .map(|i| SlotAction {
            charge_kw: state.charge_plan_kwh[i] / ctx.dt_hours,
            discharge_kw: state.discharge_plan_kwh[i] / ctx.dt_hours,
            export_kwh: state.export_plan_kwh[i],
            water_kw: state.water_plan_kw[i],
        })
        .collect();

    let params = SimParams {
        dt_hours: ctx.dt_hours,
        round_trip_efficiency: ctx.config.round_trip_efficiency,
        min_soc_percent: ctx.config.min_soc_percent,
        max_soc_percent: ctx.config.max_soc_percent,
        usable_capacity_kwh: ctx.usable_capacity_kwh,
        max_battery_charge_kw: ctx.config.max_battery_charge_kw,
        max_battery_discharge_kw: ctx.config.max_battery_discharge_kw,
        max_grid_charge_kw: ctx.config.max_grid_charge_kw,
        max_export_kw: ctx.config.max_export_kw,
    };

    let result = simulate(&actions, ctx.inputs, ctx.initial_state, params)
        .map_err(|e| PlannerError::InternalPlannerError(e.to_string()))?;

    let mut soc_target = ctx.initial_state.soc_percent;
    for (i, slot) in state.slots.iter_mut().enumerate() {
        let action = &actions[i];
        let input = &ctx.inputs[i];

        slot.battery_charge_kw = action.charge_kw;
        slot.battery_discharge_kw = action.discharge_kw;
        slot.export_kwh = state.export_plan_kwh[i];
        slot.water_heating_kw = action.water_kw;
        slot.projected_soc_percent = result.soc_trajectory[i];
        slot.import_price_sek_kwh = input.import_price_sek_kwh;
        slot.pv_forecast_kwh = input.pv_forecast_kwh;
        slot.load_forecast_kwh = input.load_forecast_kwh;

        soc_target = result.soc_trajectory[i];
        slot.soc_target_percent = soc_target;

        slot.classification = if action.charge_kw > 0.0 {
            Classification::Charge
        } else if action.export_kwh > 0.0 && action.charge_kw <= 0.0 {
            Classification::Export
        } else if action.water_kw > 0.0 && action.charge_kw <= 0.0 && action.discharge_kw <= 0.0 {
            Classification::Water
        } else if action.discharge_kw > 0.0 {
            Classification::Discharge
        } else {
            Classification::Hold
        };

        if input.import_price_sek_kwh.is_none() {
            slot.push_warning(PlannerWarning::new(WarningKind::UnknownPriceWindow, "price unknown for this slot"));
        }
    }

    for event in &result.clamp_events {
        let kind = match event.kind {
            ClampKind::SocFloor | ClampKind::SocCeiling | ClampKind::ChargePowerCap | ClampKind::DischargePowerCap => {
                WarningKind::CapClamped
            }
        };
        state.slots[event.slot].push_warning(PlannerWarning::new(
            kind,
            format!("requested {:.3} kWh, applied {:.3} kWh", event.requested, event.applied),
        ));
    }

    Ok(state)
}
