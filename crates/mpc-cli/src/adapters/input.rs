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

//! File-backed [`InputProvider`]: reads a pre-built time grid plus the
//! current measured SoC from a JSON fixture. Intended for running the
//! planner end-to-end locally against a file dropped by an external
//! forecaster/poller, not as a production input source.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use mpc_types::ports::InputProvider;
use mpc_types::{InputSlot, TimeGrid};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct GridFixture {
    tz: String,
    dt_minutes: i64,
    slots: Vec<InputSlot>,
    soc_percent: f32,
}

#[derive(Debug)]
pub struct FileInputProvider {
    grid_path: PathBuf,
}

impl FileInputProvider {
    pub fn new(grid_path: impl Into<PathBuf>) -> Self {
        Self { grid_path: grid_path.into() }
    }

    async fn read_fixture(&self) -> anyhow::Result<GridFixture> {
        let content = tokio::fs::read_to_string(&self.grid_path)
            .await
            .with_context(|| format!("reading input grid fixture {}", self.grid_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing input grid fixture {}", self.grid_path.display()))
    }
}

#[async_trait]
impl InputProvider for FileInputProvider {
    async fn current_grid(&self) -> anyhow::Result<TimeGrid> {
        let fixture = self.read_fixture().await?;
        let tz: chrono_tz::Tz = fixture.tz.parse().map_err(|e| anyhow::anyhow!("invalid timezone {}: {e}", fixture.tz))?;
        Ok(TimeGrid { tz, dt_minutes: fixture.dt_minutes, slots: fixture.slots })
    }

    async fn current_soc_percent(&self) -> anyhow::Result<f32> {
        Ok(self.read_fixture().await?.soc_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn reads_grid_and_soc_from_a_fixture_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{
                "tz": "Europe/Prague",
                "dt_minutes": 15,
                "soc_percent": 42.0,
                "slots": []
            }"#,
        )
        .unwrap();

        let provider = FileInputProvider::new(file.path());
        assert_eq!(provider.current_soc_percent().await.unwrap(), 42.0);
        let grid = provider.current_grid().await.unwrap();
        assert_eq!(grid.dt_minutes, 15);
        assert!(grid.slots.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_a_contextual_error() {
        let provider = FileInputProvider::new("/nonexistent/grid.json");
        assert!(provider.current_grid().await.is_err());
    }
}
