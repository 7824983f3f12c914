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

//! File-backed [`ScheduleSink`]: writes the finished schedule as JSON via a
//! temp-file-then-rename so a concurrent reader never observes a partial
//! file — the same atomic-replace pattern used elsewhere in the ecosystem
//! for small local state files.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use mpc_types::ports::ScheduleSink;
use mpc_types::ScheduleSlot;

#[derive(Debug)]
pub struct FileScheduleSink {
    path: PathBuf,
}

impl FileScheduleSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScheduleSink for FileScheduleSink {
    async fn publish(&self, slots: &[ScheduleSlot]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating schedule directory {}", parent.display()))?;
            }
        }

        let json = serde_json::to_string_pretty(slots).context("serialising schedule")?;
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &json)
            .await
            .with_context(|| format!("writing {}", temp_path.display()))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("renaming {} to {}", temp_path.display(), self.path.display()))?;
        Ok(())
    }
}
