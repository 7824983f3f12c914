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

//! Pass 2 — baseline net-load simulation with no battery action: finds
//! contiguous deficit runs (load exceeds PV) that the battery will need to
//! cover.

use crate::context::{DeficitRun, PassContext, PlanningState};

pub fn run(state: PlanningState, ctx: &PassContext) -> PlanningState {
    let mut deficit_runs = Vec::new();
    let n = ctx.inputs.len();
    let mut i = 0;
    while i < n {
        let net = ctx.inputs[i].load_forecast_kwh - ctx.inputs[i].pv_forecast_kwh;
        if net > 0.0 {
            let start = i;
            let mut deficit_kwh = 0.0f32;
            let mut price_weighted = 0.0f32;
            let mut priced_kwh = 0.0f32;
            while i < n {
                let net = ctx.inputs[i].load_forecast_kwh - ctx.inputs[i].pv_forecast_kwh;
                if net <= 0.0 {
                    break;
                }
                deficit_kwh += net;
                if let Some(price) = ctx.inputs[i].import_price_sek_kwh {
                    price_weighted += price * net;
                    priced_kwh += net;
                }
                i += 1;
            }
            let expected_price = if priced_kwh > 0.0 { price_weighted / priced_kwh } else { 0.0 };
            deficit_runs.push(DeficitRun { start, end: i, deficit_kwh, expected_price });
        } else {
            i += 1;
        }
    }

    PlanningState { deficit_runs, ..state }
}
