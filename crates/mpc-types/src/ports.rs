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

//! Trait boundaries for everything this crate deliberately does not own:
//! reading inputs, publishing schedules, reading cumulative counters and
//! reading/writing configuration. Concrete adapters live in downstream
//! crates (`mpc-store`, `mpc-cli`); nothing in here talks to a socket or a
//! database directly.

use async_trait::async_trait;

use crate::config::PlannerConfig;
use crate::grid::TimeGrid;
use crate::schedule::ScheduleSlot;

/// Supplies the aligned time grid and the current measured state of charge.
#[async_trait]
pub trait InputProvider: Send + Sync {
    async fn current_grid(&self) -> anyhow::Result<TimeGrid>;
    async fn current_soc_percent(&self) -> anyhow::Result<f32>;
}

/// Accepts a complete schedule and atomically replaces the active plan.
#[async_trait]
pub trait ScheduleSink: Send + Sync {
    async fn publish(&self, slots: &[ScheduleSlot]) -> anyhow::Result<()>;
}

/// Monotonic cumulative kWh counters, read on demand by the observation
/// recorder. Each call returns the latest totals; deltas are computed by
/// the caller against the previously stored `last_value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterTotals {
    pub pv_kwh: f64,
    pub load_kwh: f64,
    pub import_kwh: f64,
    pub export_kwh: f64,
    pub battery_charge_kwh: f64,
    pub battery_discharge_kwh: f64,
}

#[async_trait]
pub trait CounterSource: Send + Sync {
    async fn read_totals(&self) -> anyhow::Result<CounterTotals>;
}

/// Hierarchical key/value configuration store with snapshot reads and an
/// atomic multi-key write, used exclusively by the learning orchestrator's
/// commit path; planner runs only ever call `snapshot`.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn snapshot(&self) -> anyhow::Result<PlannerConfig>;
    async fn commit(&self, config: PlannerConfig) -> anyhow::Result<()>;
}
