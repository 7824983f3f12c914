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

//! Binary-level configuration: the `[planner]` table is the enumerated
//! `PlannerConfig` record; everything else here is specific to how
//! this binary wires ports to adapters and is never read by the planner,
//! simulator or learning crates.

use std::path::Path;

use anyhow::{Context, Result};
use mpc_types::PlannerConfig;
use serde::Deserialize;

fn default_database_path() -> String {
    "./data/mpc-planner.db".to_owned()
}

fn default_input_dir() -> String {
    "./data/inputs".to_owned()
}

fn default_schedule_path() -> String {
    "./data/schedule.json".to_owned()
}

fn default_tick_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_input_dir")]
    pub input_dir: String,
    #[serde(default = "default_schedule_path")]
    pub schedule_path: String,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl CliConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("parsing config TOML")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config.database_path, default_database_path());
        assert_eq!(config.planner, PlannerConfig::default());
    }

    #[test]
    fn rejects_an_unknown_planner_key() {
        let toml = r#"
            [planner]
            bogus_field = 1
        "#;
        let result: Result<CliConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
