//! Series store — the durable CSV time series of accepted samples.
//!
//! Records are append-only and immutable once written. Loading tolerates a
//! missing, empty, or corrupt file by starting fresh (a broken series file
//! must never crash a run), and absent columns default empty so old files
//! keep working as the schema grows. Every write re-checks plausibility
//! against the last persisted value, recomputes percent-change, re-sorts by
//! timestamp, and persists through a temp-file-then-rename so a crash
//! mid-write never leaves a truncated file.

use crate::plausibility::PlausibilityBounds;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Canonical timestamp rendering, UTC, second precision.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header columns, in on-disk order.
const COLUMNS: [&str; 5] = [
    "datetime_utc",
    "dxy_index",
    "source",
    "parse_trace",
    "dxy_change_pct",
];

/// One persisted sample. Never edited or deleted after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRecord {
    /// Sample time, UTC, second precision.
    pub datetime_utc: DateTime<Utc>,
    /// Accepted index value.
    pub dxy_index: f64,
    /// Where the value came from (`investing_live` or `synthetic_fx`).
    pub source: String,
    /// Which strategy/signal produced the value. Free text, may be empty.
    pub parse_trace: String,
    /// Percent change versus the previous record (or the baseline).
    pub dxy_change_pct: f64,
}

/// Outcome of one append attempt. The file is modified only for `Appended`.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// A new record was written and persisted.
    Appended(SeriesRecord),
    /// Inside the dedup interval of the last record; dropped silently.
    SkippedDuplicate,
    /// Failed the plausibility re-check at persistence time.
    RejectedImplausible,
}

/// CSV-backed series store.
pub struct SeriesStore {
    path: PathBuf,
    bounds: PlausibilityBounds,
    dedup_interval_secs: i64,
    baseline: f64,
}

impl SeriesStore {
    pub fn new(
        path: impl Into<PathBuf>,
        bounds: PlausibilityBounds,
        dedup_interval_secs: i64,
        baseline: f64,
    ) -> Self {
        Self {
            path: path.into(),
            bounds,
            dedup_interval_secs,
            baseline,
        }
    }

    /// Load the series. Missing, zero-length, or unparsable files yield an
    /// empty series; individually malformed rows are skipped. Corruption is
    /// recovered from locally, never propagated.
    pub fn load(&self) -> Vec<SeriesRecord> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };
        if raw.trim().is_empty() {
            return Vec::new();
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(raw.as_bytes());

        let headers = match reader.headers() {
            Ok(h) => h.clone(),
            Err(e) => {
                warn!("unreadable series header, starting fresh: {e}");
                return Vec::new();
            }
        };
        // Column positions by name; absent columns default empty so files
        // written by older versions keep loading.
        let col = |name: &str| headers.iter().position(|h| h == name);
        let (c_dt, c_val, c_src, c_trace, c_pct) = (
            col("datetime_utc"),
            col("dxy_index"),
            col("source"),
            col("parse_trace"),
            col("dxy_change_pct"),
        );

        let mut records = Vec::new();
        for row in reader.records() {
            let row = match row {
                Ok(r) => r,
                Err(e) => {
                    warn!("skipping unreadable series row: {e}");
                    continue;
                }
            };
            let field = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or("");

            let Some(datetime_utc) = parse_timestamp(field(c_dt)) else {
                warn!(row = ?row, "skipping row with bad timestamp");
                continue;
            };
            let Ok(dxy_index) = field(c_val).trim().parse::<f64>() else {
                warn!(row = ?row, "skipping row with bad index value");
                continue;
            };
            let dxy_change_pct = field(c_pct).trim().parse::<f64>().unwrap_or(0.0);

            records.push(SeriesRecord {
                datetime_utc,
                dxy_index,
                source: field(c_src).to_string(),
                parse_trace: field(c_trace).to_string(),
                dxy_change_pct,
            });
        }

        debug!(records = records.len(), "loaded series");
        records
    }

    /// Last persisted index value, if any and positive.
    pub fn last_value(&self) -> Option<f64> {
        self.load()
            .last()
            .map(|r| r.dxy_index)
            .filter(|v| *v > 0.0)
    }

    /// Append one sample at the current wall-clock time.
    pub fn append(&self, value: f64, source: &str, trace: &str) -> Result<AppendOutcome> {
        self.append_at(value, source, trace, Utc::now())
    }

    /// Append one sample with an explicit timestamp. Gates run in order,
    /// each a hard stop: dedup, plausibility, then compute + persist.
    pub fn append_at(
        &self,
        value: f64,
        source: &str,
        trace: &str,
        now: DateTime<Utc>,
    ) -> Result<AppendOutcome> {
        let mut records = self.load();

        // Dedup gate: a write inside the interval is dropped, not merged.
        if let Some(last) = records.last() {
            let elapsed = (now - last.datetime_utc).num_seconds().abs();
            if elapsed < self.dedup_interval_secs {
                info!(
                    elapsed,
                    interval = self.dedup_interval_secs,
                    "skipping duplicate sample inside dedup interval"
                );
                return Ok(AppendOutcome::SkippedDuplicate);
            }
        }

        let previous = records
            .last()
            .map(|r| r.dxy_index)
            .filter(|v| *v > 0.0);

        // Outlier guard: same filter as the fetch path, re-applied at
        // persistence time in case anything upstream was bypassed.
        if !self.bounds.is_acceptable(value, previous) {
            warn!(value, ?previous, "rejecting implausible value at persistence time");
            return Ok(AppendOutcome::RejectedImplausible);
        }

        let reference = previous.unwrap_or(self.baseline);
        let dxy_change_pct = round6((value - reference) / reference * 100.0);

        let record = SeriesRecord {
            datetime_utc: truncate_to_seconds(now),
            dxy_index: value,
            source: source.to_string(),
            parse_trace: trace.to_string(),
            dxy_change_pct,
        };
        records.push(record.clone());

        // Absorb any out-of-order writes before persisting.
        records.sort_by_key(|r| r.datetime_utc);

        self.persist(&records)?;
        info!(
            value,
            source,
            change_pct = dxy_change_pct,
            "appended series record"
        );
        Ok(AppendOutcome::Appended(record))
    }

    /// Write the full series to a temp file and rename it over the canonical
    /// path. The series file is never left truncated or half-written.
    fn persist(&self, records: &[SeriesRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp)
                .with_context(|| format!("failed to open {}", tmp.display()))?;
            writer.write_record(COLUMNS)?;
            for r in records {
                writer.write_record([
                    r.datetime_utc.format(TIMESTAMP_FORMAT).to_string(),
                    format!("{:.4}", r.dxy_index),
                    r.source.clone(),
                    r.parse_trace.clone(),
                    format!("{:.6}", r.dxy_change_pct),
                ])?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    // The canonical format is second precision; drop anything finer so the
    // in-memory record matches what a reload would produce.
    Utc.timestamp_opt(ts.timestamp(), 0).single().unwrap_or(ts)
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn store(dir: &TempDir, max_delta: f64, dedup_secs: i64) -> SeriesStore {
        SeriesStore::new(
            dir.path().join("dxy_history.csv"),
            PlausibilityBounds {
                hard_min: 70.0,
                hard_max: 130.0,
                max_delta,
            },
            dedup_secs,
            100.0,
        )
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir, 1.5, 60).load().is_empty());
    }

    #[test]
    fn test_zero_length_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 1.5, 60);
        std::fs::write(s.path(), "").unwrap();
        assert!(s.load().is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 1.5, 60);
        std::fs::write(s.path(), "\x00\x01garbage\nnot,a,csv\x02").unwrap();
        assert!(s.load().is_empty());
    }

    #[test]
    fn test_first_record_uses_baseline() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 1.5, 60);
        let outcome = s.append(97.324, "investing_live", "selector:x").unwrap();
        match outcome {
            AppendOutcome::Appended(r) => {
                assert_eq!(r.dxy_index, 97.324);
                assert_eq!(r.dxy_change_pct, -2.676);
            }
            other => panic!("expected append, got {other:?}"),
        }
        assert_eq!(s.load().len(), 1);
    }

    #[test]
    fn test_percent_change_against_previous() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 1.0, 60);
        let t0 = Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 0).unwrap();
        s.append_at(97.3, "investing_live", "", t0).unwrap();
        let outcome = s
            .append_at(97.9, "investing_live", "", t0 + Duration::minutes(30))
            .unwrap();
        match outcome {
            AppendOutcome::Appended(r) => {
                // (97.9 - 97.3) / 97.3 * 100 = 0.616649...
                assert!((r.dxy_change_pct - 0.616650).abs() < 1e-6);
            }
            other => panic!("expected append, got {other:?}"),
        }
    }

    #[test]
    fn test_dedup_interval_drops_second_write() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 1.5, 60);
        let t0 = Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 0).unwrap();
        s.append_at(97.3, "investing_live", "", t0).unwrap();
        let outcome = s
            .append_at(97.4, "investing_live", "", t0 + Duration::seconds(30))
            .unwrap();
        assert_eq!(outcome, AppendOutcome::SkippedDuplicate);
        assert_eq!(s.load().len(), 1);
    }

    #[test]
    fn test_outlier_rejected_and_file_unchanged() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 0.8, 60);
        let t0 = Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 0).unwrap();
        s.append_at(97.3, "investing_live", "", t0).unwrap();
        let before = std::fs::read_to_string(s.path()).unwrap();

        // 0.9 over the previous sample against a 0.8 delta bound
        let outcome = s
            .append_at(98.2, "investing_live", "", t0 + Duration::minutes(30))
            .unwrap();
        assert_eq!(outcome, AppendOutcome::RejectedImplausible);
        let after = std::fs::read_to_string(s.path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_within_delta_bound_accepted() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 0.8, 60);
        let t0 = Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 0).unwrap();
        s.append_at(97.3, "investing_live", "", t0).unwrap();
        // 0.6 away is inside a 0.8 bound, so this lands
        let outcome = s
            .append_at(97.9, "investing_live", "", t0 + Duration::minutes(30))
            .unwrap();
        assert!(matches!(outcome, AppendOutcome::Appended(_)));
        assert_eq!(s.load().len(), 2);
    }

    #[test]
    fn test_same_delta_accepted_with_wider_bound() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 1.0, 60);
        let t0 = Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 0).unwrap();
        s.append_at(97.3, "investing_live", "", t0).unwrap();
        let outcome = s
            .append_at(97.9, "investing_live", "", t0 + Duration::minutes(30))
            .unwrap();
        assert!(matches!(outcome, AppendOutcome::Appended(_)));
        assert_eq!(s.load().len(), 2);
    }

    #[test]
    fn test_records_sorted_by_timestamp_after_write() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 1.5, 60);
        let t0 = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        s.append_at(97.3, "investing_live", "", t0).unwrap();
        // Earlier timestamp appended later (clock skew)
        s.append_at(97.5, "investing_live", "", t0 - Duration::hours(1))
            .unwrap();

        let records = s.load();
        assert_eq!(records.len(), 2);
        assert!(records[0].datetime_utc < records[1].datetime_utc);
        assert_eq!(records[0].dxy_index, 97.5);
    }

    #[test]
    fn test_load_persist_reload_is_stable() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 1.5, 60);
        let t0 = Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 0).unwrap();
        s.append_at(97.324, "investing_live", "selector:x", t0).unwrap();
        s.append_at(97.5, "synthetic_fx", "", t0 + Duration::hours(1))
            .unwrap();

        let first = s.load();
        s.persist(&first).unwrap();
        let second = s.load();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_columns_default_empty() {
        // A file written before parse_trace and dxy_change_pct existed.
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 1.5, 60);
        std::fs::write(
            s.path(),
            "datetime_utc,dxy_index,source\n2026-08-30 10:00:00,97.3000,investing_live\n",
        )
        .unwrap();

        let records = s.load();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].parse_trace, "");
        assert_eq!(records[0].dxy_change_pct, 0.0);
        assert_eq!(records[0].dxy_index, 97.3);
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 1.5, 60);
        std::fs::write(
            s.path(),
            "datetime_utc,dxy_index,source,parse_trace,dxy_change_pct\n\
             2026-08-30 10:00:00,97.3000,investing_live,,0.000000\n\
             not-a-date,97.4000,investing_live,,0.000000\n\
             2026-08-30 11:00:00,not-a-number,investing_live,,0.000000\n\
             2026-08-30 12:00:00,97.5000,investing_live,,0.205550\n",
        )
        .unwrap();
        let records = s.load();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_last_value_ignores_nonpositive() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 1.5, 60);
        std::fs::write(
            s.path(),
            "datetime_utc,dxy_index,source,parse_trace,dxy_change_pct\n\
             2026-08-30 10:00:00,0.0000,investing_live,,0.000000\n",
        )
        .unwrap();
        assert_eq!(s.last_value(), None);
    }
}
