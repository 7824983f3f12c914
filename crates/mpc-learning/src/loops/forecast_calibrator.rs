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

//! Loop 1 — per-hour-of-day forecast bias vs observations over the
//! trailing window. Proposes adjustments to `load_safety_margin_percent`
//! only; `pv_confidence_percent` stays read-only for learning in this
//! pass. The PV-side bias is still computed and logged so the decision is
//! revisitable later; see `DESIGN.md`.

use chrono_tz::Tz;
use mpc_types::ParamPath;
use tracing::debug;

use crate::history::HistorySlot;
use crate::loops::{LoopProposal, LoopReport};

const LOOP_NAME: &str = "forecast_calibrator";

/// Fraction of the measured bias actually rolled into the margin proposal
/// per run; the remainder is absorbed over subsequent nights by the
/// per-day `Δmax` cap rather than chased in one step.
const CALIBRATION_GAIN: f32 = 0.5;

pub struct ForecastCalibratorOutcome {
    pub report: LoopReport,
    /// Mean load-forecast bias, percent, for each local hour-of-day
    /// (`None` where no sample fell in that hour). Recorded as a daily
    /// series regardless of whether a change was proposed.
    pub load_bias_by_hour_pct: [Option<f32>; 24],
    /// Aggregate PV-side bias, logged but never persisted as a change.
    pub pv_bias_pct: Option<f32>,
}

/// Runs the calibrator over `history`, `tz` being the local timezone used
/// to bucket slots by hour-of-day.
pub fn run(
    history: &[HistorySlot],
    tz: Tz,
    current_load_safety_margin_percent: f32,
    min_improvement_threshold_pct: f32,
    min_sample_threshold: usize,
) -> ForecastCalibratorOutcome {
    use chrono::{TimeZone, Timelike};

    let mut hour_sum = [0.0f32; 24];
    let mut hour_count = [0usize; 24];
    let mut overall_sum = 0.0f32;
    let mut overall_count = 0usize;
    let mut pv_sum = 0.0f32;
    let mut pv_count = 0usize;

    for slot in history {
        if let Some(bias) = slot.load_bias_fraction() {
            let hour = tz.from_utc_datetime(&slot.slot_start.naive_utc()).hour() as usize;
            hour_sum[hour] += bias * 100.0;
            hour_count[hour] += 1;
            overall_sum += bias * 100.0;
            overall_count += 1;
        }
        if let Some(bias) = slot.pv_bias_fraction() {
            pv_sum += bias * 100.0;
            pv_count += 1;
        }
    }

    let load_bias_by_hour_pct: [Option<f32>; 24] = std::array::from_fn(|h| {
        if hour_count[h] > 0 { Some(hour_sum[h] / hour_count[h] as f32) } else { None }
    });
    let pv_bias_pct = (pv_count > 0).then(|| pv_sum / pv_count as f32);

    if let Some(pv_bias) = pv_bias_pct {
        debug!(pv_bias_pct = pv_bias, samples = pv_count, "pv forecast bias observed, not actioned");
    }

    if overall_count < min_sample_threshold {
        return ForecastCalibratorOutcome {
            report: LoopReport::skipped(LOOP_NAME, "insufficient_samples"),
            load_bias_by_hour_pct,
            pv_bias_pct,
        };
    }

    let overall_bias_pct = overall_sum / overall_count as f32;
    if overall_bias_pct.abs() < min_improvement_threshold_pct {
        return ForecastCalibratorOutcome {
            report: LoopReport::skipped(LOOP_NAME, "below_improvement_threshold"),
            load_bias_by_hour_pct,
            pv_bias_pct,
        };
    }

    // Load under-forecast (observed > forecast, positive bias) means the
    // safety margin should widen; over-forecast means it can shrink.
    let proposed = current_load_safety_margin_percent + overall_bias_pct * CALIBRATION_GAIN;
    let proposal = LoopProposal {
        path: ParamPath::LoadSafetyMarginPercent,
        proposed_new_value: proposed,
        reason: format!("load forecast bias {overall_bias_pct:.2}% over {overall_count} samples"),
    };

    ForecastCalibratorOutcome {
        report: LoopReport::proposing(LOOP_NAME, vec![proposal]),
        load_bias_by_hour_pct,
        pv_bias_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Europe::Prague;

    fn history_with_bias(count: usize, forecast: f32, observed: f32) -> Vec<HistorySlot> {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| HistorySlot {
                slot_start: start + chrono::Duration::minutes(15 * i as i64),
                import_price_sek_kwh: Some(1.0),
                pv_forecast_kwh: 0.0,
                load_forecast_kwh: forecast,
                temp_c: None,
                pv_observed_kwh: None,
                load_observed_kwh: Some(observed),
                soc_start_percent: None,
            })
            .collect()
    }

    #[test]
    fn no_bias_yields_no_proposal() {
        let history = history_with_bias(40, 1.0, 1.0);
        let outcome = run(&history, Prague, 10.0, 0.5, 36);
        assert!(outcome.report.proposals.is_empty());
        assert_eq!(outcome.report.skipped_reason.as_deref(), Some("below_improvement_threshold"));
    }

    #[test]
    fn insufficient_samples_is_reported_without_proposing() {
        let history = history_with_bias(10, 1.0, 2.0);
        let outcome = run(&history, Prague, 10.0, 0.5, 36);
        assert!(outcome.report.proposals.is_empty());
        assert_eq!(outcome.report.skipped_reason.as_deref(), Some("insufficient_samples"));
    }

    #[test]
    fn systematic_under_forecast_proposes_a_wider_margin() {
        let history = history_with_bias(40, 1.0, 1.5);
        let outcome = run(&history, Prague, 10.0, 0.5, 36);
        assert_eq!(outcome.report.proposals.len(), 1);
        let p = &outcome.report.proposals[0];
        assert_eq!(p.path, ParamPath::LoadSafetyMarginPercent);
        assert!(p.proposed_new_value > 10.0);
    }
}
