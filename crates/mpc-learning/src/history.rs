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

//! The per-slot record the learning loops and the backtest oracle both
//! consume. Plain value types only — nothing here depends on `mpc-store`,
//! so every loop is unit-testable against a hand-built `Vec<HistorySlot>`
//! without a database, the same way the planner passes are tested against
//! a hand-built `PlanningState`.
//!
//! `mpc-store`'s persisted schema deliberately does not retain historical
//! spot prices — price retention is the input provider's concern, not the
//! core's, the same principle applied to observation retention. The
//! orchestrator's caller is responsible for joining the store's
//! observation/forecast rows with whatever price archive it keeps before
//! building `HistorySlot`s; see `DESIGN.md`.

use chrono::{DateTime, Utc};
use mpc_types::InputSlot;

/// One historical slot: the forecast that was live when it was planned,
/// matched against what was actually observed (when available).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySlot {
    pub slot_start: DateTime<Utc>,
    pub import_price_sek_kwh: Option<f32>,
    pub pv_forecast_kwh: f32,
    pub load_forecast_kwh: f32,
    pub temp_c: Option<f32>,
    pub pv_observed_kwh: Option<f32>,
    pub load_observed_kwh: Option<f32>,
    /// SoC at the start of this slot, when an observation exists for it;
    /// used only to seed the backtest oracle's initial battery state.
    pub soc_start_percent: Option<f32>,
}

impl HistorySlot {
    /// The `InputSlot` a planner run would have seen at the time: forecast
    /// values only, never the observed ones.
    pub fn as_input_slot(&self, tz: chrono_tz::Tz) -> InputSlot {
        InputSlot {
            start_time: self.slot_start.with_timezone(&tz),
            import_price_sek_kwh: self.import_price_sek_kwh,
            pv_forecast_kwh: self.pv_forecast_kwh,
            load_forecast_kwh: self.load_forecast_kwh,
            temp_c: self.temp_c,
        }
    }

    /// Relative forecast error for load, `(observed - forecast) / forecast`,
    /// or `None` when either side is unusable for a bias computation.
    pub fn load_bias_fraction(&self) -> Option<f32> {
        let observed = self.load_observed_kwh?;
        if self.load_forecast_kwh <= 0.0 {
            return None;
        }
        Some((observed - self.load_forecast_kwh) / self.load_forecast_kwh)
    }

    pub fn pv_bias_fraction(&self) -> Option<f32> {
        let observed = self.pv_observed_kwh?;
        if self.pv_forecast_kwh <= 0.0 {
            return None;
        }
        Some((observed - self.pv_forecast_kwh) / self.pv_forecast_kwh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slot() -> HistorySlot {
        HistorySlot {
            slot_start: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
            import_price_sek_kwh: Some(1.0),
            pv_forecast_kwh: 1.0,
            load_forecast_kwh: 1.0,
            temp_c: None,
            pv_observed_kwh: None,
            load_observed_kwh: None,
            soc_start_percent: None,
        }
    }

    #[test]
    fn bias_is_none_without_an_observation() {
        assert_eq!(slot().load_bias_fraction(), None);
    }

    #[test]
    fn bias_reflects_under_forecasting() {
        let mut s = slot();
        s.load_observed_kwh = Some(1.5);
        assert!((s.load_bias_fraction().unwrap() - 0.5).abs() < 1e-6);
    }
}
