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

//! Shared value types threaded through the eight-pass pipeline. Each pass
//! in `crate::passes` is a plain function `fn(PlanningState) -> PlanningState`
//! (or a `Result` of one for the single pass that can fail fatally); there
//! is no shared mutable schedule.

use mpc_types::{BatteryState, InputSlot, PlannerConfig, ScheduleSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Cheap,
    Peak,
}

/// A maximal contiguous run of slots sharing a price classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceWindow {
    pub kind: WindowKind,
    pub start: usize,
    /// Exclusive end index.
    pub end: usize,
    pub avg_price: f32,
}

impl PriceWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// A contiguous run of slots where `load > pv` with no battery action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeficitRun {
    pub start: usize,
    pub end: usize,
    pub deficit_kwh: f32,
    /// Load-weighted average import price expected during the run,
    /// ignoring slots with unknown price.
    pub expected_price: f32,
}

/// kWh that a charge window (`window_index` into `charge_windows`) has
/// committed to pre-store for a deficit run (`run_index` into `deficit_runs`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Responsibility {
    pub window_index: usize,
    pub run_index: usize,
    pub kwh: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterBlock {
    pub start: usize,
    pub end: usize,
}

/// Everything that flows between passes. `slots` is the schedule under
/// construction (immutable-by-convention: every pass takes `self` by value
/// and returns a new `PlanningState`); the rest is scratch state that only
/// matters mid-pipeline and is discarded once Pass 8 finalises `slots`.
#[derive(Debug, Clone)]
pub struct PlanningState {
    pub slots: Vec<ScheduleSlot>,
    pub charge_windows: Vec<PriceWindow>,
    pub export_windows: Vec<PriceWindow>,
    pub deficit_runs: Vec<DeficitRun>,
    pub responsibilities: Vec<Responsibility>,
    pub water_blocks: Vec<WaterBlock>,
    /// Per-slot battery-kWh charge/discharge plan, built up across passes
    /// and finally handed to the simulator in Pass 8.
    pub charge_plan_kwh: Vec<f32>,
    pub discharge_plan_kwh: Vec<f32>,
    pub export_plan_kwh: Vec<f32>,
    pub water_plan_kw: Vec<f32>,
}

impl PlanningState {
    pub fn empty(slots: Vec<ScheduleSlot>) -> Self {
        let n = slots.len();
        Self {
            slots,
            charge_windows: Vec::new(),
            export_windows: Vec::new(),
            deficit_runs: Vec::new(),
            responsibilities: Vec::new(),
            water_blocks: Vec::new(),
            charge_plan_kwh: vec![0.0; n],
            discharge_plan_kwh: vec![0.0; n],
            export_plan_kwh: vec![0.0; n],
            water_plan_kw: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Read-only context shared by every pass: the inputs, config and battery
/// parameters it needs. Passes never mutate this; it is handed by
/// reference alongside the `PlanningState` they transform.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub inputs: &'a [InputSlot],
    pub config: &'a PlannerConfig,
    pub initial_state: BatteryState,
    pub usable_capacity_kwh: f32,
    pub dt_hours: f32,
}

impl<'a> PassContext<'a> {
    pub fn new(
        inputs: &'a [InputSlot],
        config: &'a PlannerConfig,
        initial_state: BatteryState,
        usable_capacity_kwh: f32,
    ) -> Self {
        Self {
            inputs,
            config,
            initial_state,
            usable_capacity_kwh,
            dt_hours: config.dt_minutes as f32 / 60.0,
        }
    }
}
