// File: manager/src/fleet.rs
//
// Fleet snapshot model and the per-node failure backoff. A node that stops
// answering is retried on an exponential schedule so one dead share cannot
// eat the whole polling budget; a node that answers again snaps back to the
// healthy interval at once.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub name: String,
    pub exists: bool,
    pub online: bool,
    pub enabled: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub derived_channel: Option<String>,
    pub playing_file: Option<String>,
    pub disk_free_gb: Option<f64>,
    pub error: Option<String>,
}

impl NodeState {
    pub fn absent(name: &str) -> Self {
        Self {
            name: name.to_string(),
            exists: false,
            online: false,
            enabled: false,
            last_update: None,
            derived_channel: None,
            playing_file: None,
            disk_free_gb: None,
            error: None,
        }
    }

    pub fn unreachable(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            exists: true,
            online: false,
            enabled: true,
            last_update: None,
            derived_channel: None,
            playing_file: None,
            disk_free_gb: None,
            error: Some(reason.to_string()),
        }
    }
}

/// Immutable picture of the fleet taken at one poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub taken_at: DateTime<Utc>,
    pub nodes: Vec<NodeState>,
}

impl FleetSnapshot {
    pub fn online_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.online).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}/{} online",
            self.online_count(),
            self.nodes.iter().filter(|n| n.exists).count()
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffSchedule {
    pub ok: Duration,
    pub ng_min: Duration,
    pub ng_max: Duration,
}

#[derive(Debug, Clone, Copy)]
struct NodeBackoff {
    failures: u32,
    next_due: Instant,
}

/// Per-node polling schedule. Time is passed in explicitly so the schedule
/// arithmetic stays testable.
#[derive(Debug)]
pub struct BackoffTracker {
    schedule: BackoffSchedule,
    states: HashMap<String, NodeBackoff>,
}

impl BackoffTracker {
    pub fn new(schedule: BackoffSchedule) -> Self {
        Self {
            schedule,
            states: HashMap::new(),
        }
    }

    /// Never-seen nodes are due immediately.
    pub fn is_due(&self, name: &str, now: Instant) -> bool {
        match self.states.get(name) {
            Some(state) => now >= state.next_due,
            None => true,
        }
    }

    pub fn record_success(&mut self, name: &str, now: Instant) {
        self.states.insert(
            name.to_string(),
            NodeBackoff {
                failures: 0,
                next_due: now + self.schedule.ok,
            },
        );
    }

    pub fn record_failure(&mut self, name: &str, now: Instant) {
        let failures = self
            .states
            .get(name)
            .map(|s| s.failures.saturating_add(1))
            .unwrap_or(1);
        self.states.insert(
            name.to_string(),
            NodeBackoff {
                failures,
                next_due: now + self.failure_delay(failures),
            },
        );
    }

    pub fn consecutive_failures(&self, name: &str) -> u32 {
        self.states.get(name).map(|s| s.failures).unwrap_or(0)
    }

    fn failure_delay(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(16);
        let delay = self.schedule.ng_min.saturating_mul(1u32 << doublings);
        delay.min(self.schedule.ng_max)
    }
}
