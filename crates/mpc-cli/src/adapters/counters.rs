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

//! File-backed [`CounterSource`]: reads cumulative kWh counters from a JSON
//! fixture dropped by an external poller. A real deployment would read
//! these from the inverter/meter directly.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use mpc_types::ports::{CounterSource, CounterTotals};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct CounterFixture {
    #[serde(default)]
    pv_kwh: f64,
    #[serde(default)]
    load_kwh: f64,
    #[serde(default)]
    import_kwh: f64,
    #[serde(default)]
    export_kwh: f64,
    #[serde(default)]
    battery_charge_kwh: f64,
    #[serde(default)]
    battery_discharge_kwh: f64,
}

#[derive(Debug)]
pub struct FileCounterSource {
    path: PathBuf,
}

impl FileCounterSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CounterSource for FileCounterSource {
    async fn read_totals(&self) -> anyhow::Result<CounterTotals> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading counter fixture {}", self.path.display()))?;
        let fixture: CounterFixture =
            serde_json::from_str(&content).with_context(|| format!("parsing counter fixture {}", self.path.display()))?;
        Ok(CounterTotals {
            pv_kwh: fixture.pv_kwh,
            load_kwh: fixture.load_kwh,
            import_kwh: fixture.import_kwh,
            export_kwh: fixture.export_kwh,
            battery_charge_kwh: fixture.battery_charge_kwh,
            battery_discharge_kwh: fixture.battery_discharge_kwh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn reads_counter_totals_from_a_fixture_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"pv_kwh": 12.5, "import_kwh": 3.0}"#).unwrap();

        let source = FileCounterSource::new(file.path());
        let totals = source.read_totals().await.unwrap();
        assert_eq!(totals.pv_kwh, 12.5);
        assert_eq!(totals.import_kwh, 3.0);
        assert_eq!(totals.export_kwh, 0.0);
    }
}
