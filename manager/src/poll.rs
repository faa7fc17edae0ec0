// File: manager/src/poll.rs
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use protocol::fsio;
use protocol::paths::SharePaths;
use protocol::types::PcStatus;

use crate::config::ManagerConfig;
use crate::fleet::{BackoffSchedule, BackoffTracker, FleetSnapshot, NodeState};

/// Polls node shares on the round-robin schedule and folds the results
/// into fleet snapshots. One stuck share never blocks a batch: every probe
/// runs on the blocking pool under its own timeout.
pub struct FleetPoller {
    config: Arc<ManagerConfig>,
    backoff: tokio::sync::Mutex<BackoffTracker>,
    last_states: tokio::sync::Mutex<HashMap<String, NodeState>>,
}

impl FleetPoller {
    pub fn new(config: Arc<ManagerConfig>) -> Self {
        let schedule = BackoffSchedule {
            ok: Duration::from_secs(config.poll_interval_ok_seconds),
            ng_min: Duration::from_secs(config.poll_interval_ng_min_seconds),
            ng_max: Duration::from_secs(config.poll_interval_ng_max_seconds),
        };
        Self {
            config,
            backoff: tokio::sync::Mutex::new(BackoffTracker::new(schedule)),
            last_states: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Poll the nodes whose schedule slot has come up; everyone else keeps
    /// their last known state in the snapshot.
    pub async fn poll_cycle(&self) -> FleetSnapshot {
        self.poll_inner(false).await
    }

    /// Poll every existing node now, schedule or not. Used by the one-shot
    /// status command.
    pub async fn poll_all(&self) -> FleetSnapshot {
        self.poll_inner(true).await
    }

    async fn poll_inner(&self, force: bool) -> FleetSnapshot {
        let now = Instant::now();
        let mut due: Vec<(String, PathBuf)> = Vec::new();
        {
            let backoff = self.backoff.lock().await;
            for (name, entry) in &self.config.nodes {
                if !entry.exists {
                    continue;
                }
                if force || backoff.is_due(name, now) {
                    due.push((name.clone(), entry.share_root.clone()));
                }
            }
        }
        debug!("Polling {} of {} nodes", due.len(), self.config.nodes.len());

        let timeout_budget = Duration::from_secs(self.config.node_timeout_seconds);
        let stale_after = self.config.status_stale_after_seconds;

        let mut fresh: Vec<(NodeState, bool)> = Vec::new();
        for batch in due.chunks(self.config.thread_workers.max(1)) {
            let mut tasks = Vec::new();
            for (name, share_root) in batch {
                let name = name.clone();
                let share_root = share_root.clone();
                tasks.push(tokio::spawn(async move {
                    let probe_name = name.clone();
                    let probe = tokio::task::spawn_blocking(move || {
                        probe_share(&probe_name, &share_root, stale_after)
                    });
                    match timeout(timeout_budget, probe).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(e)) => {
                            error!("Probe task for {} panicked: {}", name, e);
                            (NodeState::unreachable(&name, "probe failed"), false)
                        }
                        Err(_) => {
                            warn!("Probe for {} timed out", name);
                            (NodeState::unreachable(&name, "probe timed out"), false)
                        }
                    }
                }));
            }
            for result in join_all(tasks).await {
                match result {
                    Ok(state) => fresh.push(state),
                    Err(e) => error!("Probe join failed: {}", e),
                }
            }
        }

        {
            let now = Instant::now();
            let mut backoff = self.backoff.lock().await;
            for (state, reachable) in &fresh {
                if *reachable {
                    backoff.record_success(&state.name, now);
                } else {
                    backoff.record_failure(&state.name, now);
                    debug!(
                        "{} unreachable ({} consecutive failures)",
                        state.name,
                        backoff.consecutive_failures(&state.name)
                    );
                }
            }
        }

        let mut last_states = self.last_states.lock().await;
        for (state, _) in fresh {
            last_states.insert(state.name.clone(), state);
        }

        let nodes = self
            .config
            .nodes
            .iter()
            .map(|(name, entry)| {
                if !entry.exists {
                    return NodeState::absent(name);
                }
                last_states
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| NodeState::unreachable(name, "not yet polled"))
            })
            .collect();

        FleetSnapshot {
            taken_at: Utc::now(),
            nodes,
        }
    }

    /// Log transitions between two consecutive snapshots.
    pub fn log_transitions(previous: &FleetSnapshot, current: &FleetSnapshot) {
        for node in &current.nodes {
            let was_online = previous
                .nodes
                .iter()
                .find(|n| n.name == node.name)
                .map(|n| n.online);
            match (was_online, node.online) {
                (Some(true), false) => warn!(
                    "Node {} went offline: {}",
                    node.name,
                    node.error.as_deref().unwrap_or("no detail")
                ),
                (Some(false), true) => info!("Node {} recovered", node.name),
                _ => {}
            }
        }
    }
}

/// Synchronous share probe, run on the blocking pool. The bool reports
/// whether the share answered at all; staleness is an agent problem, not a
/// share problem, and keeps the healthy polling cadence.
fn probe_share(name: &str, share_root: &std::path::Path, stale_after_seconds: i64) -> (NodeState, bool) {
    let share = SharePaths::new(share_root);
    let Some(status) = fsio::read_json_tolerant::<PcStatus>(&share.pc_status()) else {
        return (
            NodeState::unreachable(name, "status unreadable or missing"),
            false,
        );
    };

    let age_seconds = (Utc::now() - status.last_update).num_seconds();
    let stale = age_seconds > stale_after_seconds;
    let state = NodeState {
        name: name.to_string(),
        exists: true,
        online: status.online && !stale,
        enabled: status.enabled,
        last_update: Some(status.last_update),
        derived_channel: status.derived_channel,
        playing_file: status.playing_file,
        disk_free_gb: status.disk_free_gb,
        error: if stale {
            Some(format!("status stale ({}s old)", age_seconds))
        } else {
            status.error
        },
    };
    (state, true)
}

/// Read back the latest command result from a node share, if any.
pub fn read_command_result(share_root: &std::path::Path) -> Option<protocol::types::CommandResult> {
    let share = SharePaths::new(share_root);
    fsio::read_json_tolerant(&share.command_result())
}
