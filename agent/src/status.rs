// File: agent/src/status.rs
//
// Folds the local heartbeat, resolver output and disk headroom into the
// single cross-boundary health record, `pc_status.json`.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use sysinfo::Disks;
use tracing::{debug, warn};

use protocol::fsio::{self, RetryPolicy};
use protocol::paths::SharePaths;
use protocol::types::{Heartbeat, PcStatus};

use crate::config_apply::ResolvedState;

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub struct StatusPublisher {
    share: SharePaths,
    host: String,
    heartbeat_stale_after: Duration,
    min_free_gb: f64,
}

impl StatusPublisher {
    pub fn new(
        share: SharePaths,
        host: String,
        heartbeat_stale_secs: i64,
        min_free_gb: f64,
    ) -> Self {
        Self {
            share,
            host,
            heartbeat_stale_after: Duration::seconds(heartbeat_stale_secs),
            min_free_gb,
        }
    }

    /// Total and free space, in GB, of the volume holding the share root.
    /// Picks the mounted disk with the longest path prefix match.
    pub fn disk_usage(&self) -> Option<(f64, f64)> {
        disk_usage_for(self.share.root())
    }

    pub fn collect(
        &self,
        resolved: Option<&ResolvedState>,
        disk: Option<(f64, f64)>,
        now: DateTime<Utc>,
    ) -> PcStatus {
        let mut errors: Vec<String> = Vec::new();

        let heartbeat = fsio::read_json_tolerant::<Heartbeat>(&self.share.heartbeat());
        let mut online = false;
        let mut playing_file = None;
        match heartbeat {
            Some(hb) => {
                let age = now - hb.timestamp;
                if age > self.heartbeat_stale_after {
                    errors.push(format!("player heartbeat stale ({}s)", age.num_seconds()));
                } else if !process_alive(hb.pid) {
                    errors.push(format!("player pid {} not running", hb.pid));
                } else {
                    online = true;
                }
                if let Some(err) = hb.error {
                    errors.push(format!("player: {}", err));
                }
                playing_file = hb.current_file;
            }
            None => errors.push("player heartbeat missing".to_string()),
        }

        if let Some((_total, free)) = disk {
            if free < self.min_free_gb {
                errors.push(format!("low disk: {:.1} GB free", free));
            }
        }

        PcStatus {
            host: self.host.clone(),
            online,
            enabled: resolved.map(|r| r.enabled).unwrap_or(true),
            last_update: now,
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
            derived_channel: resolved.map(|r| r.channel.clone()),
            playing_file,
            disk_total_gb: disk.map(|(total, _)| total),
            disk_free_gb: disk.map(|(_, free)| free),
        }
    }

    pub fn publish(&self, status: &PcStatus) {
        debug!(
            "Publishing status: online={} channel={:?}",
            status.online, status.derived_channel
        );
        if let Err(e) =
            fsio::write_json_retry(&self.share.pc_status(), status, RetryPolicy::WRITE)
        {
            warn!("Could not publish status: {}", e);
        }
    }
}

pub fn disk_usage_for(path: &Path) -> Option<(f64, f64)> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| {
            (
                d.total_space() as f64 / GB,
                d.available_space() as f64 / GB,
            )
        })
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    // Heartbeat freshness is the only liveness signal we have here.
    true
}
