//! Derives the active channel and publishes `active.json`.
//!
//! Rule changes are picked up through a [`ChangeSource`]: a filesystem
//! watcher where the volume supports change notification, otherwise a fixed
//! ten-second stat poll. Either way the channel is also re-derived once per
//! wall-clock minute, because timer windows open and close with no file
//! changing at all.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant, SystemTime};

use chrono::{Local, Timelike};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use protocol::fsio::{self, RetryPolicy};
use protocol::paths::SharePaths;
use protocol::resolver;
use protocol::types::{ActiveChannel, AiSignal, ConfigRules};

pub const POLL_FALLBACK_INTERVAL: Duration = Duration::from_secs(10);

pub trait ChangeSource: Send {
    /// True if the watched inputs may have changed since the last call.
    fn changed(&mut self) -> bool;

    fn kind(&self) -> &'static str;
}

pub struct WatchSource {
    rx: Receiver<notify::Result<notify::Event>>,
    // Dropping the watcher tears the watch down.
    _watcher: RecommendedWatcher,
}

impl ChangeSource for WatchSource {
    fn changed(&mut self) -> bool {
        let mut seen = false;
        loop {
            match self.rx.try_recv() {
                Ok(Ok(_event)) => seen = true,
                Ok(Err(e)) => {
                    debug!("Watch event error: {}", e);
                    // Err on the side of re-reading the rules.
                    seen = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        seen
    }

    fn kind(&self) -> &'static str {
        "watch"
    }
}

pub struct PollSource {
    paths: Vec<PathBuf>,
    interval: Duration,
    next_check: Instant,
    fingerprints: Vec<Option<(u64, SystemTime)>>,
}

impl PollSource {
    pub fn new(paths: Vec<PathBuf>, interval: Duration) -> Self {
        let fingerprints = paths.iter().map(|p| Self::fingerprint(p)).collect();
        Self {
            paths,
            interval,
            next_check: Instant::now() + interval,
            fingerprints,
        }
    }

    fn fingerprint(path: &Path) -> Option<(u64, SystemTime)> {
        let meta = std::fs::metadata(path).ok()?;
        Some((meta.len(), meta.modified().ok()?))
    }
}

impl ChangeSource for PollSource {
    fn changed(&mut self) -> bool {
        if Instant::now() < self.next_check {
            return false;
        }
        self.next_check = Instant::now() + self.interval;
        let current: Vec<_> = self.paths.iter().map(|p| Self::fingerprint(p)).collect();
        if current != self.fingerprints {
            self.fingerprints = current;
            return true;
        }
        false
    }

    fn kind(&self) -> &'static str {
        "poll"
    }
}

/// Prefer push notification, degrade to polling when the share volume
/// cannot deliver it.
pub fn detect_change_source(share: &SharePaths) -> Box<dyn ChangeSource> {
    let config_dir = share.config_dir();
    let (tx, rx) = std::sync::mpsc::channel();
    match notify::recommended_watcher(tx) {
        Ok(mut watcher) => match watcher.watch(&config_dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                info!("Watching {} for rule changes", config_dir.display());
                return Box::new(WatchSource {
                    rx,
                    _watcher: watcher,
                });
            }
            Err(e) => warn!(
                "Change notification unavailable on {} ({}), polling instead",
                config_dir.display(),
                e
            ),
        },
        Err(e) => warn!("Could not create watcher ({}), polling instead", e),
    }
    Box::new(PollSource::new(
        vec![share.config_rules(), share.ai_status()],
        POLL_FALLBACK_INTERVAL,
    ))
}

/// What the resolver produced this cycle, fanned out to the status lane.
#[derive(Debug, Clone)]
pub struct ResolvedState {
    pub enabled: bool,
    pub channel: String,
}

pub struct ConfigApplier {
    share: SharePaths,
    source: Box<dyn ChangeSource>,
    last_written: Option<String>,
    last_minute: Option<u32>,
    last_state: Option<ResolvedState>,
}

impl ConfigApplier {
    pub fn new(share: SharePaths, source: Box<dyn ChangeSource>) -> Self {
        Self {
            share,
            source,
            last_written: None,
            last_minute: None,
            last_state: None,
        }
    }

    /// Re-derive the channel when the inputs changed or the minute rolled
    /// over, and rewrite `active.json` only when the result differs.
    /// Returns the current resolution for the status lane, or `None` when
    /// no rules have been distributed yet.
    pub fn apply(&mut self) -> Option<ResolvedState> {
        let now = Local::now();
        let minute = now.hour() * 60 + now.minute();
        let inputs_changed = self.source.changed();
        let minute_rolled = self.last_minute != Some(minute);
        if !inputs_changed && !minute_rolled && self.last_state.is_some() {
            return self.last_state.clone();
        }
        self.last_minute = Some(minute);

        let rules = fsio::read_json_tolerant::<ConfigRules>(&self.share.config_rules())?;
        let ai = fsio::read_json_tolerant::<AiSignal>(&self.share.ai_status());
        let channel = resolver::resolve(&rules, now.time(), ai);

        if self.last_written.as_deref() != Some(channel.as_str()) {
            let record = ActiveChannel {
                active_channel: channel.clone(),
            };
            match fsio::write_json_retry(&self.share.active_channel(), &record, RetryPolicy::WRITE)
            {
                Ok(()) => {
                    info!("Active channel -> {} (source: {})", channel, self.source.kind());
                    self.last_written = Some(channel.clone());
                }
                // Leave last_written stale so the write is retried next cycle.
                Err(e) => warn!("Could not publish active channel: {}", e),
            }
        }

        self.last_state = Some(ResolvedState {
            enabled: rules.enabled,
            channel,
        });
        self.last_state.clone()
    }
}
