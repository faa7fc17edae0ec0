//! Overwrite-with-retry file discipline for share traffic.
//!
//! The transport rejects replace-in-use: swapping a file a concurrent reader
//! holds open raises a sharing violation. So share artifacts are never
//! written through a temp-file-then-rename sequence. The safe pattern is a
//! direct in-place overwrite, retried a bounded number of times with a short
//! backoff, after which the writer gives up for this cycle and logs.
//!
//! Reads are tolerant: a file that is missing, locked past the retry budget
//! or unparsable is reported as absent for this cycle, never as an error.

use crate::error::ProtocolError;
use filetime::FileTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Default for share writes; mirrors the 10-attempt discipline the
    /// transport needs to ride out a reader holding the file open.
    pub const WRITE: RetryPolicy = RetryPolicy {
        attempts: 10,
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(500),
    };

    /// Reads recover faster or not at all.
    pub const READ: RetryPolicy = RetryPolicy {
        attempts: 3,
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
    };

    fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(8));
        exp.min(self.max_delay)
    }
}

/// Read and parse a JSON artifact. Returns `None` for a missing, locked or
/// corrupt file; transient read errors are retried within the policy budget.
pub fn read_json_tolerant<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let mut last_err: Option<String> = None;
    for attempt in 0..RetryPolicy::READ.attempts {
        match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(value) => return Some(value),
                Err(e) => {
                    // Possibly caught mid-overwrite; one more look is cheap.
                    last_err = Some(e.to_string());
                    std::thread::sleep(RetryPolicy::READ.delay(attempt));
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                last_err = Some(e.to_string());
                std::thread::sleep(RetryPolicy::READ.delay(attempt));
            }
        }
    }
    warn!(
        "Treating {} as absent after failed reads: {}",
        path.display(),
        last_err.unwrap_or_default()
    );
    None
}

/// Serialize `value` and overwrite `path` in place with bounded retries.
/// Parent directories are created for local paths; on the share the layout
/// is expected to exist already.
pub fn write_json_retry<T: Serialize>(
    path: &Path,
    value: &T,
    policy: RetryPolicy,
) -> Result<(), ProtocolError> {
    let payload = serde_json::to_vec_pretty(value)
        .map_err(|e| ProtocolError::corrupt(path.display().to_string(), e.to_string()))?;
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    write_bytes_retry(path, &payload, policy)
}

fn write_bytes_retry(path: &Path, payload: &[u8], policy: RetryPolicy) -> Result<(), ProtocolError> {
    let mut last_err = String::new();
    for attempt in 0..policy.attempts.max(1) {
        match try_overwrite(path, payload) {
            Ok(()) => return Ok(()),
            Err(e) => {
                last_err = e.to_string();
                std::thread::sleep(policy.delay(attempt));
            }
        }
    }
    Err(ProtocolError::transient(path.display().to_string(), last_err))
}

fn try_overwrite(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(payload)?;
    file.flush()?;
    // Best effort; the share may not support it.
    let _ = file.sync_all();
    Ok(())
}

/// Copy `src` over `dst` in place with bounded retries, carrying the source
/// mtime along. Fingerprints compare mtimes, so a copy that reset them
/// would re-flag every synced file as an update on the next scan.
pub fn copy_overwrite_retry(src: &Path, dst: &Path, policy: RetryPolicy) -> Result<(), ProtocolError> {
    if let Some(parent) = dst.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let mut last_err = String::new();
    for attempt in 0..policy.attempts.max(1) {
        match fs::copy(src, dst) {
            Ok(_) => {
                if let Ok(meta) = fs::metadata(src) {
                    if let Ok(mtime) = meta.modified() {
                        let _ = filetime::set_file_mtime(dst, FileTime::from_system_time(mtime));
                    }
                }
                return Ok(());
            }
            Err(e) => {
                last_err = e.to_string();
                std::thread::sleep(policy.delay(attempt));
            }
        }
    }
    Err(ProtocolError::transient(dst.display().to_string(), last_err))
}
