//! Durable agent state, persisted beside the share config directory.
//!
//! The only thing that must survive a restart is the id of the last
//! executed command. Without it a reboot command would loop: the node
//! comes back up, sees the same `command.json`, and reboots again.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use protocol::fsio::{self, RetryPolicy};
use protocol::ProtocolError;

pub const STATE_FILE_NAME: &str = "agent_state.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default)]
    pub last_executed_command_id: Option<String>,
}

#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(STATE_FILE_NAME),
        }
    }

    /// A missing or corrupt state file degrades to the default state.
    /// Worst case the node re-executes one command after a torn write.
    pub fn load(&self) -> AgentState {
        fsio::read_json_tolerant(&self.path).unwrap_or_default()
    }

    pub fn save(&self, state: &AgentState) -> Result<(), ProtocolError> {
        fsio::write_json_retry(&self.path, state, RetryPolicy::WRITE)
    }
}
