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

use serde::{Deserialize, Serialize};

fn default_dt_minutes() -> i64 {
    15
}
fn default_round_trip_efficiency() -> f32 {
    0.95
}
fn default_min_soc() -> f32 {
    15.0
}
fn default_max_soc() -> f32 {
    95.0
}
fn default_wear_sek_per_kwh() -> f32 {
    0.20
}
fn default_max_battery_charge_kw() -> f32 {
    5.0
}
fn default_max_battery_discharge_kw() -> f32 {
    5.0
}
fn default_max_grid_charge_kw() -> f32 {
    5.0
}
fn default_max_export_kw() -> f32 {
    5.0
}
fn default_usable_capacity_kwh() -> f32 {
    10.0
}
fn default_cheap_percentile() -> f32 {
    30.0
}
fn default_peak_percentile() -> f32 {
    80.0
}
fn default_min_window_slots() -> usize {
    2
}
fn default_min_on_slots() -> usize {
    2
}
fn default_min_off_slots() -> usize {
    1
}
fn default_water_min_kwh_per_day() -> f32 {
    2.0
}
fn default_water_min_hours_per_day() -> f32 {
    0.67
}
fn default_water_max_blocks_per_day() -> usize {
    2
}
fn default_water_device_kw() -> f32 {
    3.0
}
fn default_schedule_future_only() -> bool {
    true
}
fn default_protective_soc_strategy() -> ProtectiveSocStrategy {
    ProtectiveSocStrategy::GapBased
}
fn default_fixed_protective_soc_percent() -> f32 {
    30.0
}
fn default_s_index_mode() -> SIndexMode {
    SIndexMode::Dynamic
}
fn default_s_index_max_factor() -> f32 {
    1.25
}
fn default_s_index_cold_temp_c() -> f32 {
    -10.0
}
fn default_s_index_baseline_temp_c() -> f32 {
    5.0
}
fn default_planner_timeout_secs() -> u64 {
    10
}
fn default_learning_timeout_secs() -> u64 {
    300
}
fn default_min_improvement_threshold() -> f32 {
    0.5
}
fn default_min_sample_threshold() -> usize {
    36
}
fn default_learning_history_days() -> i64 {
    14
}
fn default_learning_hour_local() -> u32 {
    3
}

/// Protective-SoC floor strategy used ahead of export decisions (Pass 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectiveSocStrategy {
    GapBased,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SIndexMode {
    Static,
    Dynamic,
}

/// The subset of configuration the nightly learning orchestrator is
/// permitted to mutate. Each field corresponds to exactly one [`ParamPath`]
/// variant; `param_bounds` is the single source of truth for `[min, max]`
/// and the per-day `Δmax` cap, so a loop can never invent an unbounded
/// adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TunableConfig {
    pub battery_use_margin_sek: f32,
    pub export_profit_margin_sek: f32,
    pub future_price_guard_buffer_sek: f32,
    pub load_safety_margin_percent: f32,
    pub pv_confidence_percent: f32,
    pub s_index_base_factor: f32,
    pub s_index_pv_deficit_weight: f32,
    pub s_index_temp_weight: f32,
}

impl Default for TunableConfig {
    fn default() -> Self {
        Self {
            battery_use_margin_sek: 0.05,
            export_profit_margin_sek: 0.05,
            future_price_guard_buffer_sek: 0.10,
            load_safety_margin_percent: 10.0,
            pv_confidence_percent: 90.0,
            s_index_base_factor: 1.05,
            s_index_pv_deficit_weight: 0.15,
            s_index_temp_weight: 0.10,
        }
    }
}

/// A named, exhaustive path into [`TunableConfig`]. Learning loops address
/// parameters through this enum rather than a string key, so an
/// out-of-table path fails to compile instead of failing at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamPath {
    BatteryUseMarginSek,
    ExportProfitMarginSek,
    FuturePriceGuardBufferSek,
    LoadSafetyMarginPercent,
    PvConfidencePercent,
    SIndexBaseFactor,
    SIndexPvDeficitWeight,
    SIndexTempWeight,
}

impl ParamPath {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamPath::BatteryUseMarginSek => "battery_use_margin_sek",
            ParamPath::ExportProfitMarginSek => "export_profit_margin_sek",
            ParamPath::FuturePriceGuardBufferSek => "future_price_guard_buffer_sek",
            ParamPath::LoadSafetyMarginPercent => "load_safety_margin_percent",
            ParamPath::PvConfidencePercent => "pv_confidence_percent",
            ParamPath::SIndexBaseFactor => "s_index.base_factor",
            ParamPath::SIndexPvDeficitWeight => "s_index.pv_deficit_weight",
            ParamPath::SIndexTempWeight => "s_index.temp_weight",
        }
    }

    /// `(min, max, daily_max_delta)` for this parameter.
    pub fn bounds(self) -> (f32, f32, f32) {
        match self {
            ParamPath::BatteryUseMarginSek => (0.0, 0.50, 0.02),
            ParamPath::ExportProfitMarginSek => (0.0, 0.50, 0.02),
            ParamPath::FuturePriceGuardBufferSek => (0.0, 1.00, 0.05),
            ParamPath::LoadSafetyMarginPercent => (0.0, 40.0, 2.0),
            ParamPath::PvConfidencePercent => (50.0, 100.0, 2.0),
            ParamPath::SIndexBaseFactor => (1.0, 1.25, 0.02),
            ParamPath::SIndexPvDeficitWeight => (0.0, 0.50, 0.02),
            ParamPath::SIndexTempWeight => (0.0, 0.50, 0.02),
        }
    }

    pub fn get(self, config: &TunableConfig) -> f32 {
        match self {
            ParamPath::BatteryUseMarginSek => config.battery_use_margin_sek,
            ParamPath::ExportProfitMarginSek => config.export_profit_margin_sek,
            ParamPath::FuturePriceGuardBufferSek => config.future_price_guard_buffer_sek,
            ParamPath::LoadSafetyMarginPercent => config.load_safety_margin_percent,
            ParamPath::PvConfidencePercent => config.pv_confidence_percent,
            ParamPath::SIndexBaseFactor => config.s_index_base_factor,
            ParamPath::SIndexPvDeficitWeight => config.s_index_pv_deficit_weight,
            ParamPath::SIndexTempWeight => config.s_index_temp_weight,
        }
    }

    /// Sets the value after clamping it to this parameter's `[min, max]`.
    pub fn set_clamped(self, config: &mut TunableConfig, value: f32) {
        let (min, max, _) = self.bounds();
        let clamped = value.clamp(min, max);
        match self {
            ParamPath::BatteryUseMarginSek => config.battery_use_margin_sek = clamped,
            ParamPath::ExportProfitMarginSek => config.export_profit_margin_sek = clamped,
            ParamPath::FuturePriceGuardBufferSek => config.future_price_guard_buffer_sek = clamped,
            ParamPath::LoadSafetyMarginPercent => config.load_safety_margin_percent = clamped,
            ParamPath::PvConfidencePercent => config.pv_confidence_percent = clamped,
            ParamPath::SIndexBaseFactor => config.s_index_base_factor = clamped,
            ParamPath::SIndexPvDeficitWeight => config.s_index_pv_deficit_weight = clamped,
            ParamPath::SIndexTempWeight => config.s_index_temp_weight = clamped,
        }
    }
}

/// The complete, enumerated configuration record. `#[serde(deny_unknown_fields)]`
/// makes an unrecognised key in the config file a load-time error rather
/// than a silently-ignored one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerConfig {
    #[serde(default = "default_dt_minutes")]
    pub dt_minutes: i64,
    #[serde(default)]
    pub timezone: String,

    #[serde(default = "default_round_trip_efficiency")]
    pub round_trip_efficiency: f32,
    #[serde(default = "default_min_soc")]
    pub min_soc_percent: f32,
    #[serde(default = "default_max_soc")]
    pub max_soc_percent: f32,
    #[serde(default = "default_wear_sek_per_kwh")]
    pub wear_sek_per_kwh: f32,
    #[serde(default = "default_max_battery_charge_kw")]
    pub max_battery_charge_kw: f32,
    #[serde(default = "default_max_battery_discharge_kw")]
    pub max_battery_discharge_kw: f32,
    #[serde(default = "default_max_grid_charge_kw")]
    pub max_grid_charge_kw: f32,
    #[serde(default = "default_max_export_kw")]
    pub max_export_kw: f32,
    #[serde(default = "default_usable_capacity_kwh")]
    pub battery_usable_capacity_kwh: f32,

    #[serde(default = "default_cheap_percentile")]
    pub cheap_price_percentile: f32,
    #[serde(default = "default_peak_percentile")]
    pub peak_price_percentile: f32,
    #[serde(default = "default_min_window_slots")]
    pub min_window_slots: usize,
    #[serde(default)]
    pub price_smoothing_sek_kwh: f32,

    #[serde(default = "default_min_on_slots")]
    pub min_on_slots_charge: usize,
    #[serde(default = "default_min_off_slots")]
    pub min_off_slots_charge: usize,
    #[serde(default = "default_min_on_slots")]
    pub min_on_slots_discharge: usize,
    #[serde(default = "default_min_off_slots")]
    pub min_off_slots_discharge: usize,

    #[serde(default = "default_water_min_kwh_per_day")]
    pub water_min_kwh_per_day: f32,
    #[serde(default = "default_water_min_hours_per_day")]
    pub water_min_hours_per_day: f32,
    #[serde(default = "default_water_max_blocks_per_day")]
    pub water_max_blocks_per_day: usize,
    #[serde(default = "default_water_device_kw")]
    pub water_device_kw: f32,
    #[serde(default = "default_schedule_future_only")]
    pub water_schedule_future_only: bool,

    #[serde(default = "default_protective_soc_strategy")]
    pub protective_soc_strategy: ProtectiveSocStrategy,
    #[serde(default = "default_fixed_protective_soc_percent")]
    pub fixed_protective_soc_percent: f32,

    #[serde(default = "default_s_index_mode")]
    pub s_index_mode: SIndexMode,
    #[serde(default = "default_s_index_max_factor")]
    pub s_index_max_factor: f32,
    #[serde(default)]
    pub s_index_static_factor: f32,
    #[serde(default = "default_s_index_cold_temp_c")]
    pub s_index_cold_temp_c: f32,
    #[serde(default = "default_s_index_baseline_temp_c")]
    pub s_index_baseline_temp_c: f32,

    #[serde(default = "default_planner_timeout_secs")]
    pub planner_timeout_secs: u64,
    #[serde(default = "default_learning_timeout_secs")]
    pub learning_timeout_secs: u64,
    #[serde(default = "default_min_improvement_threshold")]
    pub min_improvement_threshold_sek: f32,
    #[serde(default = "default_min_sample_threshold")]
    pub min_sample_threshold: usize,
    #[serde(default = "default_learning_history_days")]
    pub learning_history_days: i64,
    #[serde(default = "default_learning_hour_local")]
    pub learning_hour_local: u32,

    #[serde(default)]
    pub tunable: TunableConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            dt_minutes: default_dt_minutes(),
            timezone: "Europe/Prague".to_owned(),
            round_trip_efficiency: default_round_trip_efficiency(),
            min_soc_percent: default_min_soc(),
            max_soc_percent: default_max_soc(),
            wear_sek_per_kwh: default_wear_sek_per_kwh(),
            max_battery_charge_kw: default_max_battery_charge_kw(),
            max_battery_discharge_kw: default_max_battery_discharge_kw(),
            max_grid_charge_kw: default_max_grid_charge_kw(),
            max_export_kw: default_max_export_kw(),
            battery_usable_capacity_kwh: default_usable_capacity_kwh(),
            cheap_price_percentile: default_cheap_percentile(),
            peak_price_percentile: default_peak_percentile(),
            min_window_slots: default_min_window_slots(),
            price_smoothing_sek_kwh: 0.0,
            min_on_slots_charge: default_min_on_slots(),
            min_off_slots_charge: default_min_off_slots(),
            min_on_slots_discharge: default_min_on_slots(),
            min_off_slots_discharge: default_min_off_slots(),
            water_min_kwh_per_day: default_water_min_kwh_per_day(),
            water_min_hours_per_day: default_water_min_hours_per_day(),
            water_max_blocks_per_day: default_water_max_blocks_per_day(),
            water_device_kw: default_water_device_kw(),
            water_schedule_future_only: default_schedule_future_only(),
            protective_soc_strategy: default_protective_soc_strategy(),
            fixed_protective_soc_percent: default_fixed_protective_soc_percent(),
            s_index_mode: default_s_index_mode(),
            s_index_max_factor: default_s_index_max_factor(),
            s_index_static_factor: 1.05,
            s_index_cold_temp_c: default_s_index_cold_temp_c(),
            s_index_baseline_temp_c: default_s_index_baseline_temp_c(),
            planner_timeout_secs: default_planner_timeout_secs(),
            learning_timeout_secs: default_learning_timeout_secs(),
            min_improvement_threshold_sek: default_min_improvement_threshold(),
            min_sample_threshold: default_min_sample_threshold(),
            learning_history_days: default_learning_history_days(),
            learning_hour_local: default_learning_hour_local(),
            tunable: TunableConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// `η = sqrt(η_rt)`, applied symmetrically to charge and discharge.
    pub fn one_way_efficiency(&self) -> f32 {
        self.round_trip_efficiency.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clamped_respects_bounds() {
        let mut tunable = TunableConfig::default();
        ParamPath::SIndexBaseFactor.set_clamped(&mut tunable, 5.0);
        assert_eq!(tunable.s_index_base_factor, 1.25);
        ParamPath::SIndexBaseFactor.set_clamped(&mut tunable, 0.0);
        assert_eq!(tunable.s_index_base_factor, 1.0);
    }

    #[test]
    fn unknown_config_key_is_rejected_at_load() {
        let toml = r#"
            dt_minutes = 15
            bogus_field = 1
        "#;
        let result: Result<PlannerConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
