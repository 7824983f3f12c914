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

//! The safety multiplier applied to cascading responsibilities (Pass 3
//! only). Never touches real-time discharge decisions.

use mpc_types::config::SIndexMode;
use mpc_types::PlannerConfig;

/// Recent realised/forecast PV ratio and the forecast temperature used by
/// the dynamic mode. Both are optional: a fresh deployment with no
/// observation history yet falls back to the static-mode-equivalent
/// behaviour (deficit/temp terms contribute zero).
#[derive(Debug, Clone, Copy, Default)]
pub struct SIndexInputs {
    pub realised_pv_recent_kwh: Option<f32>,
    pub forecast_pv_recent_kwh: Option<f32>,
    pub forecast_temp_c: Option<f32>,
}

/// Computes `S_index`, clamped to `[1.0, s_index_max_factor]`.
pub fn compute_s_index(config: &PlannerConfig, inputs: SIndexInputs) -> f32 {
    let max_factor = config.s_index_max_factor;
    let raw = match config.s_index_mode {
        SIndexMode::Static => config.s_index_static_factor,
        SIndexMode::Dynamic => {
            let base = config.tunable.s_index_base_factor;

            let pv_deficit_term = match (inputs.realised_pv_recent_kwh, inputs.forecast_pv_recent_kwh) {
                (Some(realised), Some(forecast)) if forecast > 0.0 => {
                    let ratio = realised / forecast;
                    config.tunable.s_index_pv_deficit_weight * (1.0 - ratio).max(0.0)
                }
                _ => 0.0,
            };

            let temp_term = match inputs.forecast_temp_c {
                Some(forecast_temp) => {
                    let baseline = config.s_index_baseline_temp_c;
                    let cold = config.s_index_cold_temp_c;
                    let denom = baseline - cold;
                    if denom.abs() > f32::EPSILON {
                        let frac = ((baseline - forecast_temp) / denom).max(0.0);
                        config.tunable.s_index_temp_weight * frac
                    } else {
                        0.0
                    }
                }
                None => 0.0,
            };

            base + pv_deficit_term + temp_term
        }
    };

    raw.clamp(1.0, max_factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> PlannerConfig {
        PlannerConfig::default()
    }

    #[test]
    fn static_mode_returns_configured_factor_clamped() {
        let mut config = base_config();
        config.s_index_mode = SIndexMode::Static;
        config.s_index_static_factor = 1.5;
        config.s_index_max_factor = 1.25;
        let s = compute_s_index(&config, SIndexInputs::default());
        assert_eq!(s, 1.25);
    }

    #[test]
    fn dynamic_mode_with_no_history_falls_back_to_base_factor() {
        let mut config = base_config();
        config.s_index_mode = SIndexMode::Dynamic;
        config.tunable.s_index_base_factor = 1.1;
        let s = compute_s_index(&config, SIndexInputs::default());
        assert!((s - 1.1).abs() < 1e-6);
    }

    #[test]
    fn pv_deficit_increases_s_index() {
        let mut config = base_config();
        config.s_index_mode = SIndexMode::Dynamic;
        config.tunable.s_index_base_factor = 1.0;
        config.tunable.s_index_pv_deficit_weight = 0.2;
        let s = compute_s_index(
            &config,
            SIndexInputs {
                realised_pv_recent_kwh: Some(2.0),
                forecast_pv_recent_kwh: Some(10.0),
                forecast_temp_c: None,
            },
        );
        // realised/forecast = 0.2, deficit fraction = 0.8, term = 0.16
        assert!((s - 1.16).abs() < 0.01);
    }

    #[test]
    fn s_index_never_drops_below_one() {
        let mut config = base_config();
        config.s_index_mode = SIndexMode::Static;
        config.s_index_static_factor = 0.5;
        let s = compute_s_index(&config, SIndexInputs::default());
        assert_eq!(s, 1.0);
    }
}
