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

//! Fixture builders shared by the pass unit tests. Not compiled outside
//! `#[cfg(test)]`.

use chrono::{NaiveDate, TimeZone};
use chrono_tz::Europe::Prague;
use mpc_types::{InputSlot, PlannerConfig, ScheduleSlot};

pub fn planner_config() -> PlannerConfig {
    PlannerConfig::default()
}

/// `count` slots at 15-minute resolution starting at local midnight, all
/// sharing one flat price, zero PV, 0.4 kWh/slot load.
pub fn flat_inputs(count: usize, price: f32) -> Vec<InputSlot> {
    let start = Prague
        .from_local_datetime(&NaiveDate::from_ymd_opt(2026, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap())
        .single()
        .unwrap();
    (0..count)
        .map(|i| InputSlot {
            start_time: start + chrono::Duration::minutes(15 * i as i64),
            import_price_sek_kwh: Some(price),
            pv_forecast_kwh: 0.0,
            load_forecast_kwh: 0.4,
            temp_c: None,
        })
        .collect()
}

pub fn state_with_prices(inputs: &[InputSlot]) -> Vec<ScheduleSlot> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let mut s = ScheduleSlot::hold(i, slot.start_time.fixed_offset(), 50.0);
            s.import_price_sek_kwh = slot.import_price_sek_kwh;
            s.pv_forecast_kwh = slot.pv_forecast_kwh;
            s.load_forecast_kwh = slot.load_forecast_kwh;
            s
        })
        .collect()
}
