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

use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One `Δt`-minute interval of the planning horizon with its forecast inputs.
///
/// Prices and forecasts are `Option` rather than defaulting to zero: an
/// absent value means "unknown", not "free" or "none expected". Planner
/// passes must never call `.unwrap_or(0.0)` on `import_price_sek_kwh`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSlot {
    /// Local-timezone start instant of this slot. Exact multiple of `Δt`
    /// minutes from local midnight; the external executor matches on this,
    /// never on slot index.
    pub start_time: DateTime<Tz>,
    /// Import price, local currency per kWh, VAT and fees inclusive.
    pub import_price_sek_kwh: Option<f32>,
    pub pv_forecast_kwh: f32,
    pub load_forecast_kwh: f32,
    pub temp_c: Option<f32>,
}

/// A canonical, ordered, contiguous time grid anchored at a local midnight.
///
/// Slot count is not assumed to be `48 * 60 / dt_minutes`: DST transition
/// days produce 23h or 25h grids, since slots are built by repeatedly
/// adding `Δt` in local time rather than by fixed-offset arithmetic.
#[derive(Debug, Clone)]
pub struct TimeGrid {
    pub tz: Tz,
    pub dt_minutes: i64,
    pub slots: Vec<InputSlot>,
}

impl TimeGrid {
    /// Builds a 48-hour grid starting at `anchor_date`'s local midnight,
    /// aligning the supplied series to it by matching slot start instants.
    ///
    /// Series are `(DateTime<Tz>, value)` pairs; they need not be
    /// contiguous or pre-aligned to `Δt` — only an exact timestamp match
    /// contributes a value, everything else is left as "unknown"/`0.0`.
    pub fn build(
        anchor_date: NaiveDate,
        tz: Tz,
        dt_minutes: i64,
        price_series: &[(DateTime<Tz>, f32)],
        pv_series: &[(DateTime<Tz>, f32)],
        load_series: &[(DateTime<Tz>, f32)],
        temp_series: &[(DateTime<Tz>, f32)],
    ) -> Self {
        let midnight = anchor_date.and_hms_opt(0, 0, 0).expect("valid midnight");
        let mut start = tz
            .from_local_datetime(&midnight)
            .single()
            .unwrap_or_else(|| tz.from_utc_datetime(&midnight));

        let horizon_end = start + Duration::hours(48);
        let step = Duration::minutes(dt_minutes);

        let mut slots = Vec::new();
        while start < horizon_end {
            let price = price_series
                .iter()
                .find(|(t, _)| *t == start)
                .map(|(_, p)| *p);
            let pv = pv_series
                .iter()
                .find(|(t, _)| *t == start)
                .map(|(_, p)| *p)
                .unwrap_or(0.0);
            let load = load_series
                .iter()
                .find(|(t, _)| *t == start)
                .map(|(_, l)| *l)
                .unwrap_or(0.0);
            let temp = temp_series.iter().find(|(t, _)| *t == start).map(|(_, t)| *t);

            slots.push(InputSlot {
                start_time: start,
                import_price_sek_kwh: price,
                pv_forecast_kwh: pv,
                load_forecast_kwh: load,
                temp_c: temp,
            });
            start += step;
        }

        Self { tz, dt_minutes, slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fraction of an hour covered by one slot, used to convert kW <-> kWh.
    pub fn dt_hours(&self) -> f32 {
        self.dt_minutes as f32 / 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Prague;

    #[test]
    fn regular_day_has_192_quarter_hour_slots() {
        let grid = TimeGrid::build(
            NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            Prague,
            15,
            &[],
            &[],
            &[],
            &[],
        );
        assert_eq!(grid.len(), 48 * 4);
    }

    #[test]
    fn dst_spring_forward_day_has_fewer_slots() {
        // 2026-03-29 is the CEST spring-forward transition in Europe/Prague.
        let grid = TimeGrid::build(
            NaiveDate::from_ymd_opt(2026, 3, 29).unwrap(),
            Prague,
            15,
            &[],
            &[],
            &[],
            &[],
        );
        assert!(grid.len() < 48 * 4, "DST day must yield a shorter grid");
    }

    #[test]
    fn missing_price_stays_none_not_zero() {
        let grid = TimeGrid::build(
            NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            Prague,
            15,
            &[],
            &[],
            &[],
            &[],
        );
        assert!(grid.slots.iter().all(|s| s.import_price_sek_kwh.is_none()));
    }
}
