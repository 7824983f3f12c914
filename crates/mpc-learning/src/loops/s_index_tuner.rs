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

//! Loop 3 — perturbs `s_index.base_factor` by its per-day `Δmax` and keeps
//! whichever direction beats the baseline backtest by
//! `min_improvement_threshold_sek`/day. `s_index.base_factor` is recorded
//! as a daily metric by the orchestrator on every run, changed or not —
//! this loop only decides whether it changes.

use chrono_tz::Tz;
use mpc_planner::SIndexInputs;
use mpc_types::{ParamPath, PlannerConfig};
use tracing::{debug, info};

use crate::history::HistorySlot;
use crate::loops::{LoopProposal, LoopReport};
use crate::oracle::simulate_candidate;

const LOOP_NAME: &str = "s_index_tuner";
const PATH: ParamPath = ParamPath::SIndexBaseFactor;

pub fn run(
    history: &[HistorySlot],
    tz: Tz,
    config: &PlannerConfig,
    min_improvement_threshold_sek: f32,
) -> LoopReport {
    if history.len() < 4 {
        return LoopReport::skipped(LOOP_NAME, "insufficient_samples");
    }
    let days = f64::from(config.dt_minutes as f32 * history.len() as f32 / (24.0 * 60.0)).max(1.0);

    let baseline_cost = match simulate_candidate(history, tz, config, SIndexInputs::default()) {
        Ok(c) => c,
        Err(e) => return LoopReport::skipped(LOOP_NAME, format!("baseline evaluation failed: {e}")),
    };

    let (_, _, dmax) = PATH.bounds();
    let old_value = PATH.get(&config.tunable);

    let mut best: Option<(f32, f64)> = None;
    for delta in [-dmax, dmax] {
        let mut candidate = config.clone();
        PATH.set_clamped(&mut candidate.tunable, old_value + delta);
        if (PATH.get(&candidate.tunable) - old_value).abs() < f32::EPSILON {
            continue;
        }
        let cost = match simulate_candidate(history, tz, &candidate, SIndexInputs::default()) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "s_index candidate evaluation failed, skipping");
                continue;
            }
        };
        if best.is_none_or(|(_, best_cost)| cost < best_cost) {
            best = Some((PATH.get(&candidate.tunable), cost));
        }
    }

    let Some((new_value, candidate_cost)) = best else {
        return LoopReport::skipped(LOOP_NAME, "no_candidate_within_bounds");
    };

    let improvement_per_day = (baseline_cost - candidate_cost) / days;
    if improvement_per_day < f64::from(min_improvement_threshold_sek) {
        return LoopReport::skipped(LOOP_NAME, "below_improvement_threshold");
    }

    info!(new_value, improvement_per_day, "s_index_tuner proposes a change");
    LoopReport::proposing(
        LOOP_NAME,
        vec![LoopProposal {
            path: PATH,
            proposed_new_value: new_value,
            reason: format!("backtest improvement {improvement_per_day:.3} SEK/day over {days:.0} days"),
        }],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Europe::Prague;

    fn history(count: usize) -> Vec<HistorySlot> {
        let start = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| HistorySlot {
                slot_start: start + chrono::Duration::minutes(15 * i as i64),
                import_price_sek_kwh: Some(1.0),
                pv_forecast_kwh: 0.0,
                load_forecast_kwh: 0.5,
                temp_c: Some(-12.0),
                pv_observed_kwh: None,
                load_observed_kwh: None,
                soc_start_percent: Some(40.0),
            })
            .collect()
    }

    #[test]
    fn short_history_is_reported_insufficient() {
        let report = run(&history(2), Prague, &PlannerConfig::default(), 0.5);
        assert_eq!(report.skipped_reason.as_deref(), Some("insufficient_samples"));
    }

    #[test]
    fn unreasonable_threshold_yields_no_proposal() {
        let report = run(&history(4 * 24), Prague, &PlannerConfig::default(), 1000.0);
        assert!(report.proposals.is_empty());
    }
}
