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

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::PlannerWarning;

/// What a slot's battery/export/water decision reduces to for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Charge,
    Discharge,
    Export,
    Water,
    Hold,
}

/// One slot of the emitted schedule. Field names are stable wire names
/// consumed by the external schedule sink and, eventually, the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSlot {
    /// Local wall-clock instant this slot starts at, serialized with its
    /// local UTC offset (e.g. `+02:00`) rather than normalised to `Z` — the
    /// executor and any downstream display must see the same local time
    /// the planner scheduled against.
    pub start_time: DateTime<FixedOffset>,
    pub slot_number: usize,

    pub battery_charge_kw: f32,
    pub battery_discharge_kw: f32,
    pub export_kwh: f32,
    pub water_heating_kw: f32,

    pub soc_target_percent: f32,
    pub projected_soc_percent: f32,
    pub classification: Classification,

    pub import_price_sek_kwh: Option<f32>,
    pub pv_forecast_kwh: f32,
    pub load_forecast_kwh: f32,

    pub planner_warnings: Vec<PlannerWarning>,
}

impl ScheduleSlot {
    pub fn hold(slot_number: usize, start_time: DateTime<FixedOffset>, soc_percent: f32) -> Self {
        Self {
            start_time,
            slot_number,
            battery_charge_kw: 0.0,
            battery_discharge_kw: 0.0,
            export_kwh: 0.0,
            water_heating_kw: 0.0,
            soc_target_percent: soc_percent,
            projected_soc_percent: soc_percent,
            classification: Classification::Hold,
            import_price_sek_kwh: None,
            pv_forecast_kwh: 0.0,
            load_forecast_kwh: 0.0,
            planner_warnings: Vec::new(),
        }
    }

    pub fn push_warning(&mut self, warning: PlannerWarning) {
        self.planner_warnings.push(warning);
    }
}
