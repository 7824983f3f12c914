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

//! The multi-pass MPC planner. `plan()` is the single entry point: given a
//! time-aligned set of inputs, the current battery state and a
//! configuration snapshot, it runs the eight-pass pipeline and returns a
//! finished schedule plus any non-fatal warnings. The function is pure and
//! synchronous — it performs no I/O and can be invoked concurrently on
//! independent snapshots.

pub mod context;
pub mod error;
pub mod passes;
pub mod s_index;

#[cfg(test)]
mod test_support;

use mpc_types::{BatteryState, InputSlot, PlannerConfig, ScheduleSlot};
use tracing::debug;

pub use context::{DeficitRun, PassContext, PlanningState, PriceWindow, Responsibility, WaterBlock, WindowKind};
pub use error::PlannerError;
pub use s_index::SIndexInputs;

#[derive(Debug, Clone)]
pub struct PlannerOutcome {
    pub slots: Vec<ScheduleSlot>,
    pub warning_count: usize,
}

/// Runs the full eight-pass pipeline and returns the finished schedule.
///
/// `inputs` must be non-empty (an empty input series is `MissingInput`); a
/// subset of missing prices is tolerated and surfaces as
/// `UnknownPriceWindow` annotations on the affected slots, not as an
/// error.
pub fn plan(
    inputs: &[InputSlot],
    config: &PlannerConfig,
    initial_state: BatteryState,
    s_index_inputs: SIndexInputs,
) -> Result<PlannerOutcome, PlannerError> {
    if inputs.is_empty() {
        return Err(PlannerError::MissingInput("input slot series is empty".to_owned()));
    }

    let ctx = PassContext::new(inputs, config, initial_state, config.battery_usable_capacity_kwh);

    let initial_slots: Vec<ScheduleSlot> = inputs
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let mut s = ScheduleSlot::hold(i, slot.start_time.fixed_offset(), initial_state.soc_percent);
            s.import_price_sek_kwh = slot.import_price_sek_kwh;
            s.pv_forecast_kwh = slot.pv_forecast_kwh;
            s.load_forecast_kwh = slot.load_forecast_kwh;
            s
        })
        .collect();

    let state = PlanningState::empty(initial_slots);
    let state = passes::pass1_windows::run(state, &ctx);
    let state = passes::pass2_baseline::run(state, &ctx);
    let state = passes::pass3_responsibility::run(state, &ctx, s_index_inputs);
    let state = passes::pass4_charge_plan::run(state, &ctx);
    let state = passes::pass5_water::run(state, &ctx);
    let state = passes::pass6_discharge_export::run(state, &ctx);
    let state = passes::pass7_smoothing::run(state, &ctx);
    let state = passes::pass8_finalize::run(state, &ctx)?;

    let warning_count: usize = state.slots.iter().map(|s| s.planner_warnings.len()).sum();
    debug!(
        slots = state.slots.len(),
        charge_windows = state.charge_windows.len(),
        export_windows = state.export_windows.len(),
        deficit_runs = state.deficit_runs.len(),
        warning_count,
        "planner run complete"
    );

    Ok(PlannerOutcome { slots: state.slots, warning_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat_inputs, planner_config};
    use mpc_types::Classification;

    #[test]
    fn empty_inputs_is_missing_input_error() {
        let config = planner_config();
        let result = plan(&[], &config, BatteryState::default(), SIndexInputs::default());
        assert!(matches!(result, Err(PlannerError::MissingInput(_))));
    }

    #[test]
    fn idempotent_on_identical_inputs() {
        let config = planner_config();
        let inputs = flat_inputs(96, 1.0);
        let initial = BatteryState::new(50.0, 5.0, 5.0);
        let first = plan(&inputs, &config, initial, SIndexInputs::default()).unwrap();
        let second = plan(&inputs, &config, initial, SIndexInputs::default()).unwrap();
        for (a, b) in first.slots.iter().zip(second.slots.iter()) {
            assert_eq!(a.classification, b.classification);
            assert!((a.projected_soc_percent - b.projected_soc_percent).abs() < 1e-6);
        }
    }

    #[test]
    fn all_missing_prices_classifies_everything_hold() {
        let config = planner_config();
        let inputs: Vec<InputSlot> = flat_inputs(96, 1.0)
            .into_iter()
            .map(|mut s| {
                s.import_price_sek_kwh = None;
                s
            })
            .collect();
        let outcome = plan(&inputs, &config, BatteryState::default(), SIndexInputs::default()).unwrap();
        assert!(outcome.slots.iter().all(|s| s.classification == Classification::Hold));
        assert!(outcome
            .slots
            .iter()
            .all(|s| s.planner_warnings.iter().all(|w| w.kind == mpc_types::WarningKind::UnknownPriceWindow)));
    }

    #[test]
    fn single_cheap_window_and_evening_peak_charges_then_discharges() {
        let config = planner_config();
        let mut inputs = flat_inputs(96, 1.0);
        for slot in inputs[0..4].iter_mut() {
            slot.import_price_sek_kwh = Some(0.50);
        }
        for slot in inputs[72..76].iter_mut() {
            slot.import_price_sek_kwh = Some(2.00);
            slot.load_forecast_kwh = 1.0;
        }
        let initial = BatteryState::new(20.0, 2.0, 2.0);
        let outcome = plan(&inputs, &config, initial, SIndexInputs::default()).unwrap();

        assert!(outcome.slots[0..4].iter().any(|s| s.classification == Classification::Charge));
        assert!(outcome.slots[72..76]
            .iter()
            .any(|s| matches!(s.classification, Classification::Discharge | Classification::Hold)));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::test_support::planner_config;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Europe::Prague;
    use proptest::prelude::*;

    fn arb_inputs(prices: Vec<Option<f32>>) -> Vec<InputSlot> {
        let start = Prague
            .from_local_datetime(&NaiveDate::from_ymd_opt(2026, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap())
            .single()
            .unwrap();
        prices
            .into_iter()
            .enumerate()
            .map(|(i, price)| InputSlot {
                start_time: start + chrono::Duration::minutes(15 * i as i64),
                import_price_sek_kwh: price,
                pv_forecast_kwh: 0.0,
                load_forecast_kwh: 0.4,
                temp_c: None,
            })
            .collect()
    }

    proptest! {
        /// `plan()` never mutates shared state between calls: given the same
        /// inputs, config and battery state, two runs agree on every slot's
        /// classification and projected SoC.
        #[test]
        fn plan_is_idempotent_on_identical_inputs(
            prices in proptest::collection::vec(0.1f32..5.0, 4..40),
            start_soc in 15.0f32..95.0,
        ) {
            let config = planner_config();
            let inputs = arb_inputs(prices.into_iter().map(Some).collect());
            let initial = BatteryState::new(start_soc, config.battery_usable_capacity_kwh * start_soc / 100.0, 0.0);

            let first = plan(&inputs, &config, initial, SIndexInputs::default()).unwrap();
            let second = plan(&inputs, &config, initial, SIndexInputs::default()).unwrap();

            for (a, b) in first.slots.iter().zip(second.slots.iter()) {
                prop_assert_eq!(a.classification, b.classification);
                prop_assert!((a.projected_soc_percent - b.projected_soc_percent).abs() < 1e-6);
            }
        }

        /// Whatever the price series, the projected SoC the planner commits
        /// to never leaves the configured battery bounds.
        #[test]
        fn projected_soc_stays_within_configured_bounds(
            prices in proptest::collection::vec(0.1f32..5.0, 4..40),
            start_soc in 15.0f32..95.0,
        ) {
            let config = planner_config();
            let inputs = arb_inputs(prices.into_iter().map(Some).collect());
            let initial = BatteryState::new(start_soc, config.battery_usable_capacity_kwh * start_soc / 100.0, 0.0);

            let outcome = plan(&inputs, &config, initial, SIndexInputs::default()).unwrap();

            for slot in &outcome.slots {
                prop_assert!(slot.projected_soc_percent >= config.min_soc_percent - 1e-3);
                prop_assert!(slot.projected_soc_percent <= config.max_soc_percent + 1e-3);
            }
        }

        /// A price series with gaps never errors — missing-price slots are
        /// annotated with a warning and held, not rejected.
        #[test]
        fn missing_prices_never_fail_the_plan(
            prices in proptest::collection::vec(proptest::option::of(0.1f32..5.0), 4..40),
            start_soc in 15.0f32..95.0,
        ) {
            let config = planner_config();
            let inputs = arb_inputs(prices);
            let initial = BatteryState::new(start_soc, config.battery_usable_capacity_kwh * start_soc / 100.0, 0.0);

            prop_assert!(plan(&inputs, &config, initial, SIndexInputs::default()).is_ok());
        }
    }
}
