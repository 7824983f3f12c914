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

//! Pass 1 — price windowing: cheap/peak percentile thresholds, grouped
//! into contiguous windows.

use crate::context::{PassContext, PlanningState, PriceWindow, WindowKind};

/// Nearest-rank percentile (0-100) over a sorted slice.
fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * (sorted.len() as f32 - 1.0)).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// An absolute floor below which a short window is still admitted even if
/// it doesn't reach `min_window_slots`; prevents discarding a single
/// extremely cheap slot just because it's isolated.
const SHORT_WINDOW_ABSOLUTE_CHEAP_SEK: f32 = 0.10;
const SHORT_WINDOW_ABSOLUTE_PEAK_SEK: f32 = 3.00;

pub fn run(state: PlanningState, ctx: &PassContext) -> PlanningState {
    let mut known: Vec<f32> = ctx.inputs.iter().filter_map(|s| s.import_price_sek_kwh).collect();
    known.sort_by(|a, b| a.partial_cmp(b).unwrap());

    if known.is_empty() {
        return state;
    }

    let cheap_threshold = percentile(&known, ctx.config.cheap_price_percentile);
    let peak_threshold = percentile(&known, ctx.config.peak_price_percentile);
    let smoothing = ctx.config.price_smoothing_sek_kwh;

    let mut charge_windows = Vec::new();
    let mut export_windows = Vec::new();

    let mut i = 0;
    let n = ctx.inputs.len();
    while i < n {
        let price = ctx.inputs[i].import_price_sek_kwh;
        let kind = match price {
            Some(p) if p <= cheap_threshold + smoothing => Some(WindowKind::Cheap),
            Some(p) if p >= peak_threshold - smoothing => Some(WindowKind::Peak),
            _ => None,
        };

        match kind {
            Some(k) => {
                let start = i;
                let mut sum = 0.0f32;
                let mut count = 0usize;
                while i < n {
                    let this_kind = match ctx.inputs[i].import_price_sek_kwh {
                        Some(p) if p <= cheap_threshold + smoothing => Some(WindowKind::Cheap),
                        Some(p) if p >= peak_threshold - smoothing => Some(WindowKind::Peak),
                        _ => None,
                    };
                    if this_kind != Some(k) {
                        break;
                    }
                    sum += ctx.inputs[i].import_price_sek_kwh.unwrap_or(0.0);
                    count += 1;
                    i += 1;
                }
                let window = PriceWindow { kind: k, start, end: i, avg_price: sum / count as f32 };
                let meets_min_length = window.len() >= ctx.config.min_window_slots;
                let meets_absolute = match k {
                    WindowKind::Cheap => window.avg_price <= SHORT_WINDOW_ABSOLUTE_CHEAP_SEK,
                    WindowKind::Peak => window.avg_price >= SHORT_WINDOW_ABSOLUTE_PEAK_SEK,
                };
                if meets_min_length || meets_absolute {
                    match k {
                        WindowKind::Cheap => charge_windows.push(window),
                        WindowKind::Peak => export_windows.push(window),
                    }
                }
            }
            None => i += 1,
        }
    }

    PlanningState { charge_windows, export_windows, ..state }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat_inputs, planner_config, state_with_prices};

    #[test]
    fn single_cheap_block_forms_one_window() {
        let config = planner_config();
        let mut inputs = flat_inputs(96, 1.0);
        for slot in inputs.iter_mut().take(4) {
            slot.import_price_sek_kwh = Some(0.05);
        }
        let ctx = PassContext::new(&inputs, &config, Default::default(), 10.0);
        let state = run(PlanningState::empty(state_with_prices(&inputs)), &ctx);
        assert_eq!(state.charge_windows.len(), 1);
        assert_eq!(state.charge_windows[0].start, 0);
        assert_eq!(state.charge_windows[0].end, 4);
    }

    #[test]
    fn all_missing_prices_yields_no_windows() {
        let config = planner_config();
        let inputs = flat_inputs(96, 1.0)
            .into_iter()
            .map(|mut s| {
                s.import_price_sek_kwh = None;
                s
            })
            .collect::<Vec<_>>();
        let ctx = PassContext::new(&inputs, &config, Default::default(), 10.0);
        let state = run(PlanningState::empty(state_with_prices(&inputs)), &ctx);
        assert!(state.charge_windows.is_empty());
        assert!(state.export_windows.is_empty());
    }
}
