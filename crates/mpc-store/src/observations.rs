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

//! Append-only, idempotent per-slot observation and forecast storage.

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::Database;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationMetrics {
    pub import_kwh: f32,
    pub export_kwh: f32,
    pub pv_kwh: f32,
    pub load_kwh: f32,
    pub battery_charge_kwh: f32,
    pub battery_discharge_kwh: f32,
    pub soc_start_percent: f32,
    pub soc_end_percent: f32,
    pub quality_flags: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub pv_kwh: f64,
    pub load_kwh: f64,
    pub import_kwh: f64,
    pub export_kwh: f64,
    pub battery_charge_kwh: f64,
    pub battery_discharge_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub pv_forecast_kwh: f32,
    pub load_forecast_kwh: f32,
    pub temp_c: Option<f32>,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub slot_start: DateTime<Utc>,
    pub observation: Option<ObservationMetrics>,
    pub forecast: Option<ForecastRecord>,
}

impl Database {
    /// Inserts or replaces the observation row for `slot_start`. Calling
    /// this twice with the same arguments leaves the store unchanged
    /// after the second call (idempotent upsert).
    pub fn record_observation(&self, slot_start: DateTime<Utc>, metrics: ObservationMetrics) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO slot_observations
                    (slot_start, import_kwh, export_kwh, pv_kwh, load_kwh,
                     battery_charge_kwh, battery_discharge_kwh, soc_start_percent, soc_end_percent, quality_flags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(slot_start) DO UPDATE SET
                    import_kwh = excluded.import_kwh,
                    export_kwh = excluded.export_kwh,
                    pv_kwh = excluded.pv_kwh,
                    load_kwh = excluded.load_kwh,
                    battery_charge_kwh = excluded.battery_charge_kwh,
                    battery_discharge_kwh = excluded.battery_discharge_kwh,
                    soc_start_percent = excluded.soc_start_percent,
                    soc_end_percent = excluded.soc_end_percent,
                    quality_flags = excluded.quality_flags",
                params![
                    slot_start.to_rfc3339(),
                    metrics.import_kwh,
                    metrics.export_kwh,
                    metrics.pv_kwh,
                    metrics.load_kwh,
                    metrics.battery_charge_kwh,
                    metrics.battery_discharge_kwh,
                    metrics.soc_start_percent,
                    metrics.soc_end_percent,
                    metrics.quality_flags,
                ],
            )
            .context("upserting slot_observations")?;
            Ok(())
        })
    }

    /// Differences `totals` against the previously stored counter values
    /// for `slot_start`, clamping any negative delta (counter reset) to
    /// zero, and records the resulting observation. An unseen counter
    /// contributes a zero delta for this slot rather than erroring.
    pub fn record_observation_from_counters(
        &self,
        slot_start: DateTime<Utc>,
        soc_start_percent: f32,
        soc_end_percent: f32,
        totals: CounterSnapshot,
    ) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            let previous = read_sensor_totals(conn)?;
            let delta = |name: &str, current: f64| -> f64 {
                let prev = previous.get(name).copied().unwrap_or(current);
                (current - prev).max(0.0)
            };

            let metrics = ObservationMetrics {
                import_kwh: delta("import", totals.import_kwh) as f32,
                export_kwh: delta("export", totals.export_kwh) as f32,
                pv_kwh: delta("pv", totals.pv_kwh) as f32,
                load_kwh: delta("load", totals.load_kwh) as f32,
                battery_charge_kwh: delta("battery_charge", totals.battery_charge_kwh) as f32,
                battery_discharge_kwh: delta("battery_discharge", totals.battery_discharge_kwh) as f32,
                soc_start_percent,
                soc_end_percent,
                quality_flags: String::new(),
            };

            upsert_observation(conn, slot_start, &metrics)?;
            write_sensor_totals(conn, slot_start, totals)?;
            Ok(())
        })
    }

    /// Upsert per `(slot_start, version)`.
    pub fn store_forecast(&self, slot_start: DateTime<Utc>, forecast: ForecastRecord) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO slot_forecasts (slot_start, version, pv_forecast_kwh, load_forecast_kwh, temp_c)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(slot_start, version) DO UPDATE SET
                    pv_forecast_kwh = excluded.pv_forecast_kwh,
                    load_forecast_kwh = excluded.load_forecast_kwh,
                    temp_c = excluded.temp_c",
                params![
                    slot_start.to_rfc3339(),
                    forecast.version,
                    forecast.pv_forecast_kwh,
                    forecast.load_forecast_kwh,
                    forecast.temp_c,
                ],
            )
            .context("upserting slot_forecasts")?;
            Ok(())
        })
    }

    /// Joined observation + highest-version (active) forecast rows for
    /// `[start, end)`.
    pub fn range_query(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> anyhow::Result<Vec<JoinedRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT o.slot_start, o.import_kwh, o.export_kwh, o.pv_kwh, o.load_kwh,
                        o.battery_charge_kwh, o.battery_discharge_kwh, o.soc_start_percent, o.soc_end_percent,
                        o.quality_flags
                 FROM slot_observations o
                 WHERE o.slot_start >= ?1 AND o.slot_start < ?2
                 ORDER BY o.slot_start",
            )?;
            let obs_rows = stmt
                .query_map(params![start.to_rfc3339(), end.to_rfc3339()], |row| {
                    let slot_start: String = row.get(0)?;
                    Ok((
                        slot_start,
                        ObservationMetrics {
                            import_kwh: row.get(1)?,
                            export_kwh: row.get(2)?,
                            pv_kwh: row.get(3)?,
                            load_kwh: row.get(4)?,
                            battery_charge_kwh: row.get(5)?,
                            battery_discharge_kwh: row.get(6)?,
                            soc_start_percent: row.get(7)?,
                            soc_end_percent: row.get(8)?,
                            quality_flags: row.get(9)?,
                        },
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut joined = Vec::with_capacity(obs_rows.len());
            for (slot_start_str, metrics) in obs_rows {
                let slot_start = DateTime::parse_from_rfc3339(&slot_start_str)?.with_timezone(&Utc);
                let forecast = latest_forecast(conn, &slot_start_str)?;
                joined.push(JoinedRow { slot_start, observation: Some(metrics), forecast });
            }
            Ok(joined)
        })
    }
}

fn upsert_observation(conn: &rusqlite::Connection, slot_start: DateTime<Utc>, metrics: &ObservationMetrics) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO slot_observations
            (slot_start, import_kwh, export_kwh, pv_kwh, load_kwh,
             battery_charge_kwh, battery_discharge_kwh, soc_start_percent, soc_end_percent, quality_flags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(slot_start) DO UPDATE SET
            import_kwh = excluded.import_kwh,
            export_kwh = excluded.export_kwh,
            pv_kwh = excluded.pv_kwh,
            load_kwh = excluded.load_kwh,
            battery_charge_kwh = excluded.battery_charge_kwh,
            battery_discharge_kwh = excluded.battery_discharge_kwh,
            soc_start_percent = excluded.soc_start_percent,
            soc_end_percent = excluded.soc_end_percent,
            quality_flags = excluded.quality_flags",
        params![
            slot_start.to_rfc3339(),
            metrics.import_kwh,
            metrics.export_kwh,
            metrics.pv_kwh,
            metrics.load_kwh,
            metrics.battery_charge_kwh,
            metrics.battery_discharge_kwh,
            metrics.soc_start_percent,
            metrics.soc_end_percent,
            metrics.quality_flags,
        ],
    )?;
    Ok(())
}

fn read_sensor_totals(conn: &rusqlite::Connection) -> anyhow::Result<std::collections::HashMap<String, f64>> {
    let mut stmt = conn.prepare("SELECT name, last_value FROM sensor_totals")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().collect())
}

fn write_sensor_totals(conn: &rusqlite::Connection, at: DateTime<Utc>, totals: CounterSnapshot) -> anyhow::Result<()> {
    let entries = [
        ("pv", totals.pv_kwh),
        ("load", totals.load_kwh),
        ("import", totals.import_kwh),
        ("export", totals.export_kwh),
        ("battery_charge", totals.battery_charge_kwh),
        ("battery_discharge", totals.battery_discharge_kwh),
    ];
    for (name, value) in entries {
        conn.execute(
            "INSERT INTO sensor_totals (name, last_value, last_timestamp) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET last_value = excluded.last_value, last_timestamp = excluded.last_timestamp",
            params![name, value, at.to_rfc3339()],
        )?;
    }
    Ok(())
}

fn latest_forecast(conn: &rusqlite::Connection, slot_start: &str) -> anyhow::Result<Option<ForecastRecord>> {
    let result = conn
        .query_row(
            "SELECT pv_forecast_kwh, load_forecast_kwh, temp_c, version
             FROM slot_forecasts WHERE slot_start = ?1 ORDER BY version DESC LIMIT 1",
            params![slot_start],
            |row| {
                Ok(ForecastRecord {
                    pv_forecast_kwh: row.get(0)?,
                    load_forecast_kwh: row.get(1)?,
                    temp_c: row.get(2)?,
                    version: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_metrics() -> ObservationMetrics {
        ObservationMetrics {
            import_kwh: 1.0,
            export_kwh: 0.0,
            pv_kwh: 0.5,
            load_kwh: 1.5,
            battery_charge_kwh: 0.0,
            battery_discharge_kwh: 1.0,
            soc_start_percent: 40.0,
            soc_end_percent: 35.0,
            quality_flags: String::new(),
        }
    }

    #[test]
    fn recording_same_observation_twice_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let slot = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        db.record_observation(slot, sample_metrics()).unwrap();
        db.record_observation(slot, sample_metrics()).unwrap();

        let rows = db.range_query(slot, slot + chrono::Duration::minutes(15)).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn counter_delta_clamps_negative_to_zero_on_reset() {
        let db = Database::open_in_memory().unwrap();
        let slot1 = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let slot2 = slot1 + chrono::Duration::minutes(15);

        db.record_observation_from_counters(
            slot1,
            50.0,
            48.0,
            CounterSnapshot { import_kwh: 10.0, ..Default::default() },
        )
        .unwrap();
        // counter reset: new cumulative value is lower than before
        db.record_observation_from_counters(
            slot2,
            48.0,
            47.0,
            CounterSnapshot { import_kwh: 2.0, ..Default::default() },
        )
        .unwrap();

        let rows = db.range_query(slot1, slot2 + chrono::Duration::minutes(15)).unwrap();
        let second = rows.iter().find(|r| r.slot_start == slot2).unwrap();
        assert_eq!(second.observation.unwrap().import_kwh, 0.0);
    }

    #[test]
    fn forecast_upsert_keeps_latest_version_per_slot() {
        let db = Database::open_in_memory().unwrap();
        let slot = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        db.store_forecast(slot, ForecastRecord { pv_forecast_kwh: 1.0, load_forecast_kwh: 2.0, temp_c: None, version: 1 })
            .unwrap();
        db.store_forecast(slot, ForecastRecord { pv_forecast_kwh: 1.5, load_forecast_kwh: 2.0, temp_c: None, version: 2 })
            .unwrap();

        db.record_observation(slot, sample_metrics()).unwrap();
        let rows = db.range_query(slot, slot + chrono::Duration::minutes(15)).unwrap();
        assert_eq!(rows[0].forecast.as_ref().unwrap().version, 2);
        assert!((rows[0].forecast.as_ref().unwrap().pv_forecast_kwh - 1.5).abs() < 1e-6);
    }
}
