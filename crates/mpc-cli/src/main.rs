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

//! Thin outer scheduler: loads configuration, wires the file-backed port
//! adapters and the SQLite store, and drives the planner tick, the
//! observation recorder and the nightly learning loop. Not the inverter
//! executor, the forecaster or the price feed — those remain external
//! collaborators.

mod adapters;
mod config;
mod tick;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mpc_types::ports::ConfigStore;
use parking_lot::RwLock;
use tracing::info;
use tracing_subscriber::EnvFilter;

use adapters::{FileCounterSource, FileInputProvider, FileScheduleSink};
use config::CliConfig;

#[derive(Debug, Parser)]
#[command(name = "mpc-cli", about = "Home-energy MPC planner — local scheduler binary")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mpc_cli=info")))
        .init();

    let args = Args::parse();
    info!(path = %args.config.display(), "loading configuration");
    let cli_config = CliConfig::from_file(&args.config)?;

    let db = Arc::new(mpc_store::Database::open(&cli_config.database_path).context("opening database")?);
    info!(path = %cli_config.database_path, "database opened");

    // The store's committed config takes precedence over the file's
    // `[planner]` table once the learning orchestrator has run at least
    // once; the file value seeds it on first boot.
    let seeded_config = db.config_snapshot().unwrap_or(cli_config.planner.clone());
    let config_store = Arc::new(RwLock::new(seeded_config.clone()));
    db.commit(seeded_config.clone()).await.context("seeding config store")?;

    let tz: chrono_tz::Tz = seeded_config
        .timezone
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid timezone {}: {e}", seeded_config.timezone))?;

    let input = Arc::new(FileInputProvider::new(format!("{}/grid.json", cli_config.input_dir)));
    let sink = Arc::new(FileScheduleSink::new(&cli_config.schedule_path));
    let counters = Arc::new(FileCounterSource::new(format!("{}/counters.json", cli_config.input_dir)));

    let planner_task = tick::spawn_planner_loop(
        Arc::clone(&input),
        sink,
        Arc::clone(&db),
        Arc::clone(&config_store),
        cli_config.tick_interval_secs,
    );
    let learning_task = tick::spawn_learning_loop(Arc::clone(&db), Arc::clone(&config_store), tz);
    let observation_task = tick::spawn_observation_loop(
        input,
        counters,
        Arc::clone(&db),
        seeded_config.dt_minutes,
        cli_config.tick_interval_secs,
    );

    info!("mpc-cli running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");

    planner_task.abort();
    learning_task.abort();
    observation_task.abort();
    Ok(())
}
