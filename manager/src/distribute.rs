// File: manager/src/distribute.rs
//
// Pushes manager-owned artifacts onto the node shares: channel rules, the
// congestion signal, and power commands. All writes are idempotent
// overwrites; re-running a distribution is always safe.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use protocol::fsio::{self, RetryPolicy};
use protocol::paths::SharePaths;
use protocol::types::{AiSignal, Command, CommandAction, ConfigRules};

use crate::config::{ConfigManager, ManagerConfig};

#[derive(Debug, Default, Clone, Copy)]
pub struct DistributionReport {
    pub rules_written: usize,
    pub ai_written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Distribute per-node rules and the congestion signal to every share in
/// the roster. Per-node failures are isolated: one unreachable share costs
/// one counter, never the cycle.
pub async fn distribute_all(
    config_manager: &ConfigManager,
    config: &ManagerConfig,
) -> Result<DistributionReport> {
    let mut report = DistributionReport::default();
    let ai_signal = read_ai_signal(config);

    for (name, entry) in &config.nodes {
        if !entry.exists {
            continue;
        }
        let rules = match config_manager.load_node_rules(name).await {
            Ok(Some(rules)) => Some(rules),
            Ok(None) => {
                debug!("No rules configured for {}, skipping", name);
                report.skipped += 1;
                None
            }
            Err(e) => {
                warn!("Rules for {} unusable: {}", name, e);
                report.failed += 1;
                None
            }
        };

        let name = name.clone();
        let share_root = entry.share_root.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            write_node_artifacts(&share_root, rules.as_ref(), ai_signal.as_ref())
        })
        .await
        .map_err(|e| anyhow!("distribution task failed: {}", e))?;

        match outcome {
            Ok((wrote_rules, wrote_ai)) => {
                report.rules_written += usize::from(wrote_rules);
                report.ai_written += usize::from(wrote_ai);
            }
            Err(e) => {
                warn!("Distribution to {} failed: {}", name, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Distribution: {} rules, {} ai signals, {} skipped, {} failed",
        report.rules_written, report.ai_written, report.skipped, report.failed
    );
    Ok(report)
}

fn write_node_artifacts(
    share_root: &Path,
    rules: Option<&ConfigRules>,
    ai: Option<&AiSignal>,
) -> Result<(bool, bool)> {
    let share = SharePaths::new(share_root);
    let mut wrote_rules = false;
    if let Some(rules) = rules {
        fsio::write_json_retry(&share.config_rules(), rules, RetryPolicy::WRITE)?;
        wrote_rules = true;
    }
    let mut wrote_ai = false;
    if let Some(ai) = ai {
        fsio::write_json_retry(&share.ai_status(), ai, RetryPolicy::WRITE)?;
        wrote_ai = true;
    }
    Ok((wrote_rules, wrote_ai))
}

/// The congestion signal is produced by the analysis box on its own share;
/// the coordinator only relays it. Absent or corrupt input relays nothing,
/// and the nodes keep their last signal.
fn read_ai_signal(config: &ManagerConfig) -> Option<AiSignal> {
    let source = config.ai_status_source.as_ref()?;
    fsio::read_json_tolerant(source)
}

/// Issue a power command to one node. Refuses while a previous command is
/// still awaiting its done marker, so command files are write-once per id.
/// `replace_pending` reclaims a stuck command the agent will never execute
/// (rejected validation, lost state); the new id supersedes the old one.
pub async fn send_power_command(
    config: &ManagerConfig,
    node_name: &str,
    action: CommandAction,
    replace_pending: bool,
) -> Result<String> {
    let entry = config
        .nodes
        .get(node_name)
        .ok_or_else(|| anyhow!("Node {} not found in inventory", node_name))?;
    if !entry.exists {
        bail!("Node {} is decommissioned", node_name);
    }

    let share = SharePaths::new(&entry.share_root);
    if share.command().exists() {
        if !replace_pending {
            bail!(
                "Node {} still has a pending command; wait for its done marker \
                 or pass --force-replace",
                node_name
            );
        }
        match fsio::read_json_tolerant::<Command>(&share.command()) {
            Some(pending) => warn!(
                "Replacing pending command {} on {}",
                pending.command_id, node_name
            ),
            None => warn!("Replacing unreadable pending command on {}", node_name),
        }
    }

    let command = Command {
        command_id: Uuid::new_v4().to_string(),
        action: action.as_str().to_string(),
        force: true,
        issued_at: Utc::now(),
        issuer: config.issuer.clone(),
    };
    let command_id = command.command_id.clone();

    let path = share.command();
    tokio::task::spawn_blocking(move || {
        fsio::write_json_retry(&path, &command, RetryPolicy::WRITE)
    })
    .await
    .map_err(|e| anyhow!("command write task failed: {}", e))??;

    info!(
        "Issued {} command {} to {}",
        action.as_str(),
        command_id,
        node_name
    );
    Ok(command_id)
}
