//! Agent supervisor: relaunch on crash, reboot on a crash loop.
//!
//! Crash history lives in a small local CSV (`epoch_sec,code`). On every
//! crash the history is pruned to the recency window `[now - window, now]`
//! (both edges inclusive) and the surviving count is compared against the
//! escalation threshold. Persisting the pruned file keeps it from growing
//! without bound.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::process::Command as AsyncCommand;
use tracing::{error, info, warn};

use protocol::types::{CommandAction, CrashRecord};

use crate::power::PowerControl;

pub const CRASH_CSV_HEADER: &str = "epoch_sec,code";
pub const CRASH_CSV_NAME: &str = "crash_history.csv";

/// Tolerant CSV load: the header row, blank lines and malformed rows are
/// skipped, a missing file is an empty history.
pub fn load_crash_history(path: &Path) -> Vec<CrashRecord> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    raw.lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(2, ',');
            let epoch_sec = parts.next()?.trim().parse::<i64>().ok()?;
            let exit_code = parts.next()?.trim().parse::<i32>().ok()?;
            Some(CrashRecord {
                epoch_sec,
                exit_code,
            })
        })
        .collect()
}

pub fn save_crash_history(path: &Path, records: &[CrashRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = String::with_capacity(64 + records.len() * 16);
    out.push_str(CRASH_CSV_HEADER);
    out.push('\n');
    for r in records {
        out.push_str(&format!("{},{}\n", r.epoch_sec, r.exit_code));
    }
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(out.as_bytes())?;
    Ok(())
}

/// Records inside the recency window. A crash exactly on the lower edge
/// still counts.
pub fn recent_crashes(
    records: &[CrashRecord],
    now_epoch: i64,
    window_seconds: i64,
) -> Vec<CrashRecord> {
    let floor = now_epoch - window_seconds;
    records
        .iter()
        .copied()
        .filter(|r| r.epoch_sec >= floor && r.epoch_sec <= now_epoch)
        .collect()
}

#[derive(Debug, Clone)]
pub struct WatchdogSettings {
    pub agent_exe: PathBuf,
    pub agent_args: Vec<String>,
    pub crash_csv: PathBuf,
    pub window_seconds: i64,
    pub max_crashes: usize,
    pub restart_delay: Duration,
}

pub struct Watchdog<P: PowerControl> {
    settings: WatchdogSettings,
    power: P,
}

impl<P: PowerControl> Watchdog<P> {
    pub fn new(settings: WatchdogSettings, power: P) -> Self {
        Self { settings, power }
    }

    /// Supervise the agent until a crash loop forces a reboot. The missing
    /// executable check is the one condition allowed to abort startup;
    /// everything after that is relaunch-and-carry-on, including spawn
    /// failures and an unwritable crash CSV.
    pub async fn run(&self) -> Result<()> {
        let exe = &self.settings.agent_exe;
        if !exe.exists() {
            bail!("agent executable not found: {}", exe.display());
        }

        loop {
            info!("Launching agent: {}", exe.display());
            match AsyncCommand::new(exe)
                .args(&self.settings.agent_args)
                .status()
                .await
            {
                Ok(status) if status.success() => {
                    info!("Agent exited cleanly, relaunching");
                }
                Ok(status) => {
                    let code = status.code().unwrap_or(-1);
                    warn!("Agent crashed with code {}", code);
                    match self.record_crash(code) {
                        Ok(true) => {
                            error!(
                                "{} crashes within {}s, requesting reboot",
                                self.settings.max_crashes, self.settings.window_seconds
                            );
                            match self.power.execute(CommandAction::Reboot) {
                                Ok(()) => return Ok(()),
                                Err(e) => error!("Reboot request failed: {}", e),
                            }
                        }
                        Ok(false) => {}
                        Err(e) => warn!("Could not record crash: {}", e),
                    }
                }
                Err(e) => {
                    warn!("Could not launch {}: {}", exe.display(), e);
                }
            }

            tokio::time::sleep(self.settings.restart_delay).await;
        }
    }

    /// Append one crash, prune to the window, persist. True when the crash
    /// count has reached the escalation threshold.
    fn record_crash(&self, exit_code: i32) -> Result<bool> {
        let now_epoch = Utc::now().timestamp();
        let mut records = load_crash_history(&self.settings.crash_csv);
        records.push(CrashRecord {
            epoch_sec: now_epoch,
            exit_code,
        });
        let recent = recent_crashes(&records, now_epoch, self.settings.window_seconds);
        save_crash_history(&self.settings.crash_csv, &recent)?;
        Ok(recent.len() >= self.settings.max_crashes)
    }
}
