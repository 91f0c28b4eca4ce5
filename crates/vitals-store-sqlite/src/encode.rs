//! Encoding and decoding between canonical records and SQLite rows.
//!
//! All timestamps are stored in the canonical UTC form
//! `YYYY-MM-DDTHH:MM:SSZ`, so lexicographic order is chronological order.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use vitals_core::canonical::{NormalizedRecord, SleepSegment, SleepStage, canonical_timestamp};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { canonical_timestamp(dt) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Inserts ─────────────────────────────────────────────────────────────────

const INSERT_HEART_RATE: &str = "
INSERT INTO heart_rate (source, metric, value, unit, recorded_at, device)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT DO NOTHING";

const INSERT_HRV: &str = "
INSERT INTO hrv (source, metric, value, unit, recorded_at, device)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT DO NOTHING";

const INSERT_SLEEP: &str = "
INSERT INTO sleep (
  source, stage, start_at, end_at, recorded_at, device,
  sleep_performance_pct, time_in_bed_hours, light_sleep_hours,
  rem_sleep_hours, deep_sleep_hours, awake_hours, disturbances
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
ON CONFLICT DO NOTHING";

const INSERT_WORKOUT: &str = "
INSERT INTO workouts (
  source, activity, duration_minutes, distance_km, calories,
  recorded_at, end_at, device
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT DO NOTHING";

const INSERT_RECOVERY: &str = "
INSERT INTO whoop_recovery (
  source, recorded_at, recovery_score, hrv_ms, resting_heart_rate,
  spo2_pct, skin_temp_celsius
) VALUES ('whoop', ?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT DO NOTHING";

const INSERT_STRAIN: &str = "
INSERT INTO whoop_strain (
  source, recorded_at, day_strain, calories, max_heart_rate, avg_heart_rate
) VALUES ('whoop', ?1, ?2, ?3, ?4, ?5)
ON CONFLICT DO NOTHING";

const INSERT_READINESS: &str = "
INSERT INTO oura_readiness (
  source, recorded_at, readiness_score, hrv_balance, resting_heart_rate,
  temperature_deviation, recovery_index, activity_balance, sleep_balance
) VALUES ('oura', ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT DO NOTHING";

/// Insert `record` unless its natural key is already present. Returns
/// whether a row was added.
pub fn insert_record(conn: &Connection, record: &NormalizedRecord) -> rusqlite::Result<bool> {
  let changed = match record {
    NormalizedRecord::HeartRate(s) | NormalizedRecord::Hrv(s) => {
      let sql = match record {
        NormalizedRecord::HeartRate(_) => INSERT_HEART_RATE,
        _ => INSERT_HRV,
      };
      conn.prepare_cached(sql)?.execute(params![
        s.source.as_str(),
        s.metric,
        s.value,
        s.unit,
        encode_dt(s.recorded_at),
        s.device,
      ])?
    }
    NormalizedRecord::Sleep(s) => {
      let a = &s.aggregates;
      conn.prepare_cached(INSERT_SLEEP)?.execute(params![
        s.source.as_str(),
        s.stage.as_str(),
        s.start.map(encode_dt),
        s.end.map(encode_dt),
        encode_dt(s.recorded_at),
        s.device,
        a.performance_pct,
        a.time_in_bed_hours,
        a.light_hours,
        a.rem_hours,
        a.deep_hours,
        a.awake_hours,
        a.disturbances,
      ])?
    }
    NormalizedRecord::Workout(w) => conn.prepare_cached(INSERT_WORKOUT)?.execute(params![
      w.source.as_str(),
      w.activity,
      w.duration_minutes,
      w.distance_km,
      w.calories,
      encode_dt(w.recorded_at),
      w.end.map(encode_dt),
      w.device,
    ])?,
    NormalizedRecord::WhoopRecovery(r) => conn.prepare_cached(INSERT_RECOVERY)?.execute(params![
      encode_dt(r.recorded_at),
      r.recovery_score,
      r.hrv_ms,
      r.resting_heart_rate,
      r.spo2_pct,
      r.skin_temp_celsius,
    ])?,
    NormalizedRecord::WhoopStrain(s) => conn.prepare_cached(INSERT_STRAIN)?.execute(params![
      encode_dt(s.recorded_at),
      s.day_strain,
      s.calories,
      s.max_heart_rate,
      s.avg_heart_rate,
    ])?,
    NormalizedRecord::OuraReadiness(r) => {
      conn.prepare_cached(INSERT_READINESS)?.execute(params![
        encode_dt(r.recorded_at),
        r.readiness_score,
        r.hrv_balance,
        r.resting_heart_rate,
        r.temperature_deviation,
        r.recovery_index,
        r.activity_balance,
        r.sleep_balance,
      ])?
    }
  };
  Ok(changed == 1)
}

// ─── Sleep segments ──────────────────────────────────────────────────────────

/// Raw sleep-segment row as read from SQLite, before decoding.
pub struct RawSegment {
  pub stage:  String,
  pub start:  String,
  pub end:    String,
  pub device: String,
}

impl RawSegment {
  pub fn into_segment(self) -> Result<SleepSegment> {
    Ok(SleepSegment::new(
      decode_dt(&self.start)?,
      decode_dt(&self.end)?,
      SleepStage::decode(&self.stage)?,
      self.device,
    )?)
  }
}
