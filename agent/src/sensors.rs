// File: agent/src/sensors.rs
//
// Samples the hardware monitor's rolling CSV export into compact yearly
// logs. The export is append-only and grows fast, so it is truncated once
// it passes a size cap; dedup by time slot keeps the yearly file at one
// row per sampling interval regardless of the export rate.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use protocol::fsio::{self, RetryPolicy};

pub const YEARLY_HEADER: &str =
    "timestamp,cpu_usage_percent,cpu_temp_c,chipset_temp_c,memory_temp_c,ssd_temp_c,gpu_temp_c,disk_total_gb,disk_free_gb";
pub const MAX_INPUT_BYTES: u64 = 1_048_576;
pub const SENSOR_STATE_FILE: &str = "sensor_state.json";

/// Column indexes into the monitor's CSV export. The export layout is fixed
/// by the monitoring tool's sensor ordering on these machines.
#[derive(Debug, Clone)]
pub struct SensorColumns {
    pub date: usize,
    pub time: usize,
    pub cpu_usage: usize,
    pub cpu_temp: usize,
    pub pch_temp: usize,
    pub memory_temp: usize,
    pub ssd_temp: usize,
    pub gpu_temp: usize,
}

impl Default for SensorColumns {
    fn default() -> Self {
        Self {
            date: 0,
            time: 1,
            cpu_usage: 118,
            cpu_temp: 156,
            pch_temp: 337,
            memory_temp: 338,
            ssd_temp: 358,
            gpu_temp: 373,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SensorState {
    #[serde(default)]
    last_written_slot: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    /// A row was appended for this slot.
    Appended(String),
    /// Nothing written; the reason is for logs only.
    Skipped(&'static str),
}

pub struct SensorAggregator {
    input_csv: PathBuf,
    yearly_dir: PathBuf,
    state_path: PathBuf,
    sample_minutes: u32,
    columns: SensorColumns,
}

impl SensorAggregator {
    pub fn new(
        input_csv: PathBuf,
        yearly_dir: PathBuf,
        state_dir: &Path,
        sample_minutes: u32,
    ) -> Self {
        Self {
            input_csv,
            yearly_dir,
            state_path: state_dir.join(SENSOR_STATE_FILE),
            sample_minutes: sample_minutes.max(1),
            columns: SensorColumns::default(),
        }
    }

    /// Read the newest export row and append it to the yearly log, at most
    /// once per sampling slot. Incomplete rows are dropped, not guessed at.
    pub fn sample_once(&self, disk: Option<(f64, f64)>) -> Result<SampleOutcome> {
        let raw = match std::fs::read(&self.input_csv) {
            Ok(raw) => raw,
            Err(_) => return Ok(SampleOutcome::Skipped("input missing")),
        };
        let text = String::from_utf8_lossy(&raw);
        let Some(line) = text.lines().rev().find(|l| !l.trim().is_empty()) else {
            return Ok(SampleOutcome::Skipped("input empty"));
        };
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();

        let c = &self.columns;
        let metric_cols = [
            c.cpu_usage,
            c.cpu_temp,
            c.pch_temp,
            c.memory_temp,
            c.ssd_temp,
            c.gpu_temp,
        ];
        let max_col = metric_cols.iter().chain([&c.date, &c.time]).max().copied();
        if max_col.map_or(true, |m| m >= fields.len()) {
            return Ok(SampleOutcome::Skipped("row too short"));
        }
        let mut metrics = Vec::with_capacity(metric_cols.len());
        for col in metric_cols {
            let v = fields[col];
            if v.is_empty() {
                return Ok(SampleOutcome::Skipped("missing values"));
            }
            metrics.push(v.to_string());
        }

        let Some(recorded_at) = parse_row_datetime(fields[c.date], fields[c.time]) else {
            return Ok(SampleOutcome::Skipped("bad timestamp"));
        };
        let slot = slot_label(recorded_at, self.sample_minutes);

        let state: SensorState = fsio::read_json_tolerant(&self.state_path).unwrap_or_default();
        if state.last_written_slot.as_deref() == Some(slot.as_str()) {
            return Ok(SampleOutcome::Skipped("slot already written"));
        }

        self.append_row(recorded_at.year(), &slot, &metrics, disk)?;
        let state = SensorState {
            last_written_slot: Some(slot.clone()),
        };
        fsio::write_json_retry(&self.state_path, &state, RetryPolicy::WRITE)
            .context("persisting sensor state")?;
        Ok(SampleOutcome::Appended(slot))
    }

    /// The export is rewritten from scratch by the monitor after truncation,
    /// so cutting it to zero is safe.
    pub fn truncate_input_if_oversized(&self) -> bool {
        let Ok(meta) = std::fs::metadata(&self.input_csv) else {
            return false;
        };
        if meta.len() <= MAX_INPUT_BYTES {
            return false;
        }
        match std::fs::File::create(&self.input_csv) {
            Ok(_) => {
                info!(
                    "Truncated sensor export {} ({} bytes)",
                    self.input_csv.display(),
                    meta.len()
                );
                true
            }
            Err(e) => {
                warn!("Could not truncate sensor export: {}", e);
                false
            }
        }
    }

    pub fn yearly_path(&self, year: i32) -> PathBuf {
        self.yearly_dir.join(format!("hwinfo_{}.csv", year))
    }

    fn append_row(
        &self,
        year: i32,
        slot: &str,
        metrics: &[String],
        disk: Option<(f64, f64)>,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.yearly_dir)?;
        let path = self.yearly_path(year);
        let new_file = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        if new_file {
            writeln!(file, "{}", YEARLY_HEADER)?;
        }
        let (disk_total, disk_free) = match disk {
            Some((total, free)) => (format!("{:.1}", total), format!("{:.1}", free)),
            None => (String::new(), String::new()),
        };
        writeln!(
            file,
            "{},{},{},{}",
            slot,
            metrics.join(","),
            disk_total,
            disk_free
        )?;
        Ok(())
    }
}

/// The export writes local time as separate date and time fields, with
/// optional fractional seconds on the time.
pub fn parse_row_datetime(date: &str, time: &str) -> Option<NaiveDateTime> {
    let time = time.split('.').next().unwrap_or(time);
    let joined = format!("{} {}", date.trim(), time.trim());
    for fmt in ["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d.%m.%Y %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&joined, fmt) {
            return Some(dt);
        }
    }
    None
}

/// Floor a timestamp to its sampling slot, labelled `YYYY/MM/DD HH:MM`.
pub fn slot_label(dt: NaiveDateTime, sample_minutes: u32) -> String {
    let floored = (dt.minute() / sample_minutes) * sample_minutes;
    format!(
        "{:04}/{:02}/{:02} {:02}:{:02}",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        floored
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_floors_to_sampling_interval() {
        let dt = parse_row_datetime("2026/03/14", "09:47:12.381").unwrap();
        assert_eq!(slot_label(dt, 30), "2026/03/14 09:30");
        assert_eq!(slot_label(dt, 15), "2026/03/14 09:45");
    }

    #[test]
    fn fractional_seconds_are_tolerated() {
        assert!(parse_row_datetime("2026/01/02", "00:00:00.5").is_some());
        assert!(parse_row_datetime("garbage", "00:00:00").is_none());
    }
}
