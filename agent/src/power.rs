// File: agent/src/power.rs
//
// OS power transitions. Kept behind a trait so the command processor and
// the crash watchdog can be exercised in tests without taking the host down.

use std::process::Command as OsCommand;

use anyhow::{anyhow, Result};
use tracing::info;

use protocol::types::CommandAction;

pub trait PowerControl: Send + Sync {
    fn execute(&self, action: CommandAction) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct OsPowerControl;

impl PowerControl for OsPowerControl {
    fn execute(&self, action: CommandAction) -> Result<()> {
        info!("Executing power transition: {}", action.as_str());

        #[cfg(target_os = "windows")]
        let mut cmd = {
            let mut c = OsCommand::new("shutdown");
            match action {
                CommandAction::Shutdown => c.args(["/s", "/t", "0"]),
                CommandAction::Reboot => c.args(["/r", "/t", "0"]),
            };
            c
        };

        #[cfg(not(target_os = "windows"))]
        let mut cmd = {
            let mut c = OsCommand::new("shutdown");
            match action {
                CommandAction::Shutdown => c.args(["-h", "now"]),
                CommandAction::Reboot => c.args(["-r", "now"]),
            };
            c
        };

        let status = cmd
            .status()
            .map_err(|e| anyhow!("Failed to invoke shutdown: {}", e))?;
        if status.success() {
            Ok(())
        } else {
            Err(anyhow!("shutdown exited with status {}", status))
        }
    }
}
