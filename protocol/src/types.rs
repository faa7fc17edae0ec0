//! Wire record types exchanged through the share.
//!
//! Every record here is a plain JSON object with exactly one conventional
//! writer per epoch: the manager writes `ConfigRules`, `AiSignal` and
//! `Command`; the node writes `PcStatus`, `CommandResult` and
//! `ActiveChannel`. Rewriting a record with identical content is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A `[start, end)` wall-clock window in `HH:MM` notation. Windows where
/// `start > end` wrap past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRule {
    pub start: String,
    pub end: String,
    pub channel: String,
}

/// Per-node channel selection rules (`config.json`). Owned by the manager,
/// mutated only by operator action, distributed to the node share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRules {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub sleep_channel: String,
    pub normal_channel: String,
    /// Congestion tier -> channel, keyed `level2`, `level3`, ... A tier may
    /// map to [`SAME_AS_NORMAL`] to fall through to `normal_channel`.
    #[serde(default)]
    pub ai_channels: BTreeMap<String, String>,
    #[serde(default)]
    pub sleep_rules: Vec<TimeWindow>,
    /// Evaluated in declaration order, first match wins.
    #[serde(default)]
    pub timer_rules: Vec<TimerRule>,
}

/// Sentinel value in `ai_channels` meaning "use the normal channel".
pub const SAME_AS_NORMAL: &str = "same_as_normal";

fn default_true() -> bool {
    true
}

/// Derived channel cache (`active.json`). Never the source of truth; the
/// resolver output always wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveChannel {
    pub active_channel: String,
}

/// Congestion signal from the AI analysis box (`ai_status.json`).
/// Level 1 means clear; tiers 2 and up map through `ai_channels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSignal {
    pub congestion_level: u8,
}

impl Default for AiSignal {
    fn default() -> Self {
        Self { congestion_level: 1 }
    }
}

/// Playback supervisor heartbeat (`auto_play_heartbeat.json`). Local to the
/// node; never read across the node boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub current_file: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The sole cross-boundary health record (`pc_status.json`), written by the
/// node agent once per cycle. `exists` is roster knowledge on the manager
/// side and does not travel on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcStatus {
    pub host: String,
    pub online: bool,
    pub enabled: bool,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub derived_channel: Option<String>,
    #[serde(default)]
    pub playing_file: Option<String>,
    #[serde(default)]
    pub disk_total_gb: Option<f64>,
    #[serde(default)]
    pub disk_free_gb: Option<f64>,
}

/// Imperative command (`command.json`). Write-once by the manager, immutable
/// once issued. `action` stays a free string on the wire so that an unknown
/// action is a policy decision for the agent, not a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub command_id: String,
    pub action: String,
    #[serde(default)]
    pub force: bool,
    pub issued_at: DateTime<Utc>,
    pub issuer: String,
}

/// Validated command actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    Shutdown,
    Reboot,
}

impl CommandAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "shutdown" => Some(CommandAction::Shutdown),
            "reboot" => Some(CommandAction::Reboot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandAction::Shutdown => "shutdown",
            CommandAction::Reboot => "reboot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Ok,
    Error,
    Skipped,
}

/// Written exactly once per `command_id` (`command_result.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command_id: String,
    pub status: CommandStatus,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
}

/// One row of the crash history CSV (`epoch_sec,code`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashRecord {
    pub epoch_sec: i64,
    pub exit_code: i32,
}
