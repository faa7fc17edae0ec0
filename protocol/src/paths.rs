//! Share layout conventions, agreed by both sides of the protocol.
//!
//! A node share root looks like:
//!
//! ```text
//! <root>/app/config/      config.json, active.json, ai_status.json,
//!                         command.json, command.done.<epoch>.json
//! <root>/logs/status/     pc_status.json, command_result.json,
//!                         auto_play_heartbeat.json
//! <root>/logs/            *.log
//! <root>/content/<ch>/    media files
//! <root>/staging/sync_tmp media staged mid-transfer
//! ```

use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";
pub const ACTIVE_FILE: &str = "active.json";
pub const AI_STATUS_FILE: &str = "ai_status.json";
pub const COMMAND_FILE: &str = "command.json";
pub const PC_STATUS_FILE: &str = "pc_status.json";
pub const COMMAND_RESULT_FILE: &str = "command_result.json";
pub const HEARTBEAT_FILE: &str = "auto_play_heartbeat.json";

/// Resolves the conventional file locations under one share root. Both the
/// manager (pointing at a mounted node share) and the agent (pointing at its
/// local base directory) construct the same paths through this type.
#[derive(Debug, Clone)]
pub struct SharePaths {
    root: PathBuf,
}

impl SharePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("app").join("config")
    }

    pub fn status_dir(&self) -> PathBuf {
        self.root.join("logs").join("status")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join("content")
    }

    pub fn channel_dir(&self, channel: &str) -> PathBuf {
        self.content_dir().join(channel)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging").join("sync_tmp")
    }

    pub fn config_rules(&self) -> PathBuf {
        self.config_dir().join(CONFIG_FILE)
    }

    pub fn active_channel(&self) -> PathBuf {
        self.config_dir().join(ACTIVE_FILE)
    }

    pub fn ai_status(&self) -> PathBuf {
        self.config_dir().join(AI_STATUS_FILE)
    }

    pub fn command(&self) -> PathBuf {
        self.config_dir().join(COMMAND_FILE)
    }

    /// Audit marker for an executed command. Renaming instead of deleting
    /// avoids racing a concurrent reader of `command.json`.
    pub fn command_done(&self, epoch_sec: i64) -> PathBuf {
        self.config_dir()
            .join(format!("command.done.{}.json", epoch_sec))
    }

    pub fn pc_status(&self) -> PathBuf {
        self.status_dir().join(PC_STATUS_FILE)
    }

    pub fn command_result(&self) -> PathBuf {
        self.status_dir().join(COMMAND_RESULT_FILE)
    }

    pub fn heartbeat(&self) -> PathBuf {
        self.status_dir().join(HEARTBEAT_FILE)
    }

    /// Reachability probe target: the config dir doubles as the "share is
    /// alive" marker, matching how the manager checks connectivity.
    pub fn probe_dir(&self) -> PathBuf {
        self.config_dir()
    }
}
