// File: agent/src/command.rs
//
// Command lifecycle on the node side: Issued -> Executed -> Acknowledged.
// Execution strictly precedes the result write, and the done-marker rename
// strictly follows it. A command file that fails validation is left in
// place untouched; the manager sees the missing done marker and escalates.

use chrono::Utc;
use tracing::{info, warn};

use protocol::fsio::{self, RetryPolicy};
use protocol::paths::SharePaths;
use protocol::types::{Command, CommandAction, CommandResult, CommandStatus};

use crate::power::PowerControl;
use crate::state::{AgentState, StateStore};

pub struct CommandProcessor<P: PowerControl> {
    share: SharePaths,
    store: StateStore,
    power: P,
    last_executed_command_id: Option<String>,
    // Remembered so a rejected command is logged once, not every cycle.
    last_rejected_command_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// No command file, or one we have already processed.
    Idle,
    /// Command failed validation and was left in place.
    Rejected,
    /// Command was executed and acknowledged this cycle.
    Processed(CommandStatus),
}

impl<P: PowerControl> CommandProcessor<P> {
    pub fn new(share: SharePaths, store: StateStore, power: P) -> Self {
        let state = store.load();
        Self {
            share,
            store,
            power,
            last_executed_command_id: state.last_executed_command_id,
            last_rejected_command_id: None,
        }
    }

    /// One cycle of the command lane. Never returns an error: every failure
    /// mode here is either tolerated or deferred to the next cycle.
    pub fn poll_once(&mut self) -> CommandOutcome {
        let Some(cmd) = fsio::read_json_tolerant::<Command>(&self.share.command()) else {
            return CommandOutcome::Idle;
        };

        if self.last_executed_command_id.as_deref() == Some(cmd.command_id.as_str()) {
            // Already executed; a previous acknowledge rename must have
            // failed. Retry the rename, never the execution.
            self.acknowledge(&cmd.command_id);
            return CommandOutcome::Idle;
        }

        let action = match self.validate(&cmd) {
            Ok(action) => action,
            Err(reason) => {
                if self.last_rejected_command_id.as_deref() != Some(cmd.command_id.as_str()) {
                    warn!(
                        "Ignoring command {} from {}: {}",
                        cmd.command_id, cmd.issuer, reason
                    );
                    self.last_rejected_command_id = Some(cmd.command_id.clone());
                }
                return CommandOutcome::Rejected;
            }
        };

        info!(
            "Executing command {} ({}) issued by {}",
            cmd.command_id,
            action.as_str(),
            cmd.issuer
        );

        let (status, message) = match self.power.execute(action) {
            Ok(()) => (CommandStatus::Ok, String::new()),
            Err(e) => {
                warn!("Command {} failed: {}", cmd.command_id, e);
                (CommandStatus::Error, e.to_string())
            }
        };

        let result = CommandResult {
            command_id: cmd.command_id.clone(),
            status,
            finished_at: Utc::now(),
            message,
        };
        if let Err(e) =
            fsio::write_json_retry(&self.share.command_result(), &result, RetryPolicy::WRITE)
        {
            warn!("Could not write command result for {}: {}", cmd.command_id, e);
        }

        self.last_executed_command_id = Some(cmd.command_id.clone());
        let state = AgentState {
            last_executed_command_id: self.last_executed_command_id.clone(),
        };
        if let Err(e) = self.store.save(&state) {
            warn!("Could not persist command state: {}", e);
        }

        self.acknowledge(&cmd.command_id);
        CommandOutcome::Processed(status)
    }

    fn validate(&self, cmd: &Command) -> Result<CommandAction, String> {
        if !cmd.force {
            return Err("force flag not set".to_string());
        }
        CommandAction::parse(&cmd.action)
            .ok_or_else(|| format!("unknown action '{}'", cmd.action))
    }

    /// Rename `command.json` to its done marker. Failure is tolerated: the
    /// next cycle recognizes the executed id and retries the rename.
    fn acknowledge(&self, command_id: &str) {
        let src = self.share.command();
        if !src.exists() {
            return;
        }
        let dst = self.share.command_done(Utc::now().timestamp());
        if let Err(e) = std::fs::rename(&src, &dst) {
            warn!("Could not acknowledge command {}: {}", command_id, e);
        } else {
            info!("Command {} acknowledged as {}", command_id, dst.display());
        }
    }
}
