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

use thiserror::Error;

/// Fatal failures of a nightly learning run. `InsufficientData` and
/// `BelowThreshold` are deliberately *not* here — those are per-loop
/// outcomes recorded as a skip reason on [`crate::LoopReport`], never an
/// `Err`, per the propagation policy in the planner's error design.
#[derive(Debug, Error)]
pub enum LearningError {
    #[error("learning run for {0} already completed")]
    AlreadyCompleted(chrono::NaiveDate),
    #[error("learning run exceeded its wall-clock budget")]
    LearningTimeout,
    #[error("config write conflict committing learning run {0}")]
    ConfigWriteConflict(i64),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
