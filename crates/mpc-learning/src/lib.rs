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

//! The nightly learning orchestrator: runs the four tuning loops in a
//! fixed order over a trailing history window, caps every proposal
//! centrally against `ParamPath::bounds()`, and commits the result to
//! [`mpc_store::Database`] atomically. A run is idempotent per `run_date` —
//! calling [`run_nightly`] twice for a date that already completed is a
//! no-op, not a second application of the same changes.

pub mod error;
pub mod history;
pub mod loops;
pub mod oracle;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use mpc_store::learning_schema::AppliedChange;
use mpc_store::Database;
use mpc_types::ParamPath;
use tracing::{info, warn};

pub use error::LearningError;
pub use history::HistorySlot;
pub use loops::{LoopProposal, LoopReport};

/// What one nightly run did, for logging and for the caller to report on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LearningRunSummary {
    pub run_date: Option<NaiveDate>,
    pub reports: Vec<LoopReport>,
    pub applied: Vec<AppliedChange>,
}

/// Applies a loop's uncapped proposals on top of `config`, clamping each to
/// its `[min, max]` and per-day `Δmax`, and returns the [`AppliedChange`]
/// rows worth persisting (empty when the cap reduces the move to nothing).
fn apply_capped(config: &mut mpc_types::PlannerConfig, report: &LoopReport) -> Vec<AppliedChange> {
    let mut applied = Vec::new();
    for proposal in &report.proposals {
        let path = proposal.path;
        let old_value = path.get(&config.tunable);
        let (_, _, dmax) = path.bounds();
        let capped_delta = (proposal.proposed_new_value - old_value).clamp(-dmax, dmax);
        path.set_clamped(&mut config.tunable, old_value + capped_delta);
        let new_value = path.get(&config.tunable);

        if (new_value - old_value).abs() < f32::EPSILON {
            continue;
        }
        applied.push(AppliedChange {
            param_path: path.as_str().to_owned(),
            old_value,
            new_value,
            loop_name: report.loop_name.to_owned(),
            reason: proposal.reason.clone(),
        });
    }
    applied
}

/// Runs the nightly learning orchestrator for `run_date`.
///
/// `history` must already be assembled by the caller (joining the store's
/// `range_query` rows with whatever price archive it keeps — see
/// `HistorySlot`'s documentation) and cover the trailing
/// `learning_history_days` window ending at `run_date`.
///
/// Returns `Ok(None)` if a completed run already exists for `run_date`
/// (idempotent no-op); `Ok(Some(summary))` otherwise.
pub fn run_nightly(
    db: &Database,
    history: &[HistorySlot],
    tz: Tz,
    run_date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Option<LearningRunSummary>, LearningError> {
    if db.has_completed_learning_run(run_date)? {
        info!(%run_date, "learning run already completed, skipping");
        return Ok(None);
    }

    let run_id = db.begin_learning_run(run_date, now)?;
    match run_nightly_inner(db, history, tz, run_date, run_id, now) {
        Ok(summary) => Ok(Some(summary)),
        Err(e) => {
            warn!(%run_date, error = %e, "learning run aborted");
            db.abort_learning_run(run_id, &e.to_string())?;
            Err(e)
        }
    }
}

fn run_nightly_inner(
    db: &Database,
    history: &[HistorySlot],
    tz: Tz,
    run_date: NaiveDate,
    run_id: i64,
    now: DateTime<Utc>,
) -> Result<LearningRunSummary, LearningError> {
    let mut config = db.config_snapshot()?;
    let min_improvement = config.min_improvement_threshold_sek;
    let min_samples = config.min_sample_threshold;

    let calibrator = loops::forecast_calibrator::run(
        history,
        tz,
        config.tunable.load_safety_margin_percent,
        min_improvement,
        min_samples,
    );
    db.record_daily_series(run_date, "load_bias_by_hour_pct", &bias_series(&calibrator.load_bias_by_hour_pct))?;

    let mut reports = vec![calibrator.report];
    reports.push(loops::threshold_tuner::run(history, tz, &config, min_improvement));
    reports.push(loops::s_index_tuner::run(history, tz, &config, min_improvement));
    reports.push(loops::export_guard_tuner::run(history, tz, &config, min_improvement));

    let loops_run: Vec<String> = reports.iter().map(|r| r.loop_name.to_owned()).collect();
    let mut applied = Vec::new();
    for report in &reports {
        let changes = apply_capped(&mut config, report);
        for change in &changes {
            info!(
                param = change.param_path,
                old_value = change.old_value,
                new_value = change.new_value,
                loop_name = change.loop_name,
                "applying learned parameter change"
            );
        }
        applied.extend(changes);
    }

    // s_index.base_factor is recorded as a daily metric regardless of
    // whether this run changed it, so its history stays queryable.
    db.record_daily_metric(run_date, ParamPath::SIndexBaseFactor.as_str(), config.tunable.s_index_base_factor)?;

    let metrics_json = serde_json::json!({
        "samples": history.len(),
        "changes_applied": applied.len(),
    })
    .to_string();

    let new_config = (!applied.is_empty()).then_some(&config);
    db.commit_learning_run(run_id, now, &loops_run, &applied, &metrics_json, new_config)?;

    Ok(LearningRunSummary { run_date: Some(run_date), reports, applied })
}

fn bias_series(by_hour: &[Option<f32>; 24]) -> Vec<f32> {
    by_hour.iter().map(|v| v.unwrap_or(f32::NAN)).collect()
}
