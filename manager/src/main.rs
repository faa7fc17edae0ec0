// File: manager/src/main.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use protocol::manifest::FingerprintOptions;
use protocol::paths::SharePaths;
use protocol::types::CommandAction;

use manager::config::ConfigManager;
use manager::distribute;
use manager::fleet::FleetSnapshot;
use manager::poll::{self, FleetPoller};
use manager::sync;

#[derive(Parser, Debug)]
#[command(name = "manager", about = "Signage fleet coordinator")]
struct Cli {
    /// Directory holding main.toml, inventory.toml and per-node rules
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Continuous coordination loop: poll, distribute, sync
    Run,
    /// One-shot fleet status
    Status,
    /// Distribute rules and the congestion signal once
    Distribute,
    /// Mirror master content to one node, or the whole fleet
    Sync {
        #[arg(long)]
        node: Option<String>,
    },
    /// Issue a power command to one node
    SendCommand {
        #[arg(long)]
        node: String,
        /// "shutdown" or "reboot"
        #[arg(long)]
        action: String,
        /// Overwrite a pending command the node never executed
        #[arg(long)]
        force_replace: bool,
    },
    /// Copy node logs into the backup tree
    CollectLogs {
        #[arg(long)]
        node: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("manager=info".parse()?)
        .add_directive("protocol=info".parse()?);
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let config_manager = ConfigManager::new(cli.config_dir).await?;
    let config = config_manager.get_current_config();

    match cli.command {
        CliCommand::Run => run_loop(config_manager, config).await,
        CliCommand::Status => {
            let poller = FleetPoller::new(config.clone());
            let snapshot = poller.poll_all().await;
            print_snapshot(&snapshot);
            for node in &snapshot.nodes {
                if let Some(entry) = config.nodes.get(&node.name) {
                    if let Some(result) = poll::read_command_result(&entry.share_root) {
                        println!(
                            "  {} last command {}: {:?} at {}",
                            node.name, result.command_id, result.status, result.finished_at
                        );
                    }
                }
            }
            Ok(())
        }
        CliCommand::Distribute => {
            distribute::distribute_all(&config_manager, &config).await?;
            Ok(())
        }
        CliCommand::Sync { node } => sync_nodes(&config, node.as_deref()).await,
        CliCommand::SendCommand {
            node,
            action,
            force_replace,
        } => {
            let action = CommandAction::parse(&action)
                .ok_or_else(|| anyhow!("Unknown action '{}'", action))?;
            let command_id =
                distribute::send_power_command(&config, &node, action, force_replace).await?;
            println!("Issued {} as {}", action.as_str(), command_id);
            Ok(())
        }
        CliCommand::CollectLogs { node } => collect_logs(&config, node.as_deref()).await,
    }
}

/// The coordination daemon. Polling honors per-node backoff inside the
/// poller. Distribution is an operator action (the `distribute`
/// subcommand); `auto_distribute = true` additionally piggybacks it on the
/// healthy poll cadence for installations that want hands-off relaying.
async fn run_loop(
    config_manager: ConfigManager,
    config: Arc<manager::config::ManagerConfig>,
) -> Result<()> {
    info!("Starting fleet coordinator: {} nodes", config.nodes.len());
    let poller = FleetPoller::new(config.clone());

    let mut previous: Option<FleetSnapshot> = None;
    let mut tick = tokio::time::interval(Duration::from_secs(5));
    let distribute_every = Duration::from_secs(config.poll_interval_ok_seconds);
    let mut last_distribution: Option<std::time::Instant> = None;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down coordinator");
                return Ok(());
            }
        }

        let snapshot = poller.poll_cycle().await;
        if let Some(prev) = &previous {
            FleetPoller::log_transitions(prev, &snapshot);
        } else {
            info!("Fleet: {}", snapshot.summary());
        }
        previous = Some(snapshot);

        if config.auto_distribute {
            let due = last_distribution
                .map(|at| at.elapsed() >= distribute_every)
                .unwrap_or(true);
            if due {
                last_distribution = Some(std::time::Instant::now());
                if let Err(e) = distribute::distribute_all(&config_manager, &config).await {
                    error!("Distribution cycle failed: {}", e);
                }
            }
        }
    }
}

async fn sync_nodes(
    config: &manager::config::ManagerConfig,
    only: Option<&str>,
) -> Result<()> {
    let opts = FingerprintOptions {
        ignore_ctime: config.ignore_ctime,
    };
    for (name, entry) in &config.nodes {
        if !entry.exists {
            continue;
        }
        if let Some(only) = only {
            if only != name {
                continue;
            }
        }
        let name = name.clone();
        let master_root = config.content_root.clone();
        let share = SharePaths::new(&entry.share_root);
        let report = tokio::task::spawn_blocking(move || {
            sync::sync_node(&name, &master_root, &share, opts)
        })
        .await
        .map_err(|e| anyhow!("sync task failed: {}", e))?;

        match report {
            Ok(report) => println!(
                "{}: {} ops ({} failed), verified_clean={}",
                report.node,
                report.total_ops(),
                report.failed,
                report.verified_clean
            ),
            Err(e) => warn!("Sync failed: {}", e),
        }
    }
    Ok(())
}

async fn collect_logs(
    config: &manager::config::ManagerConfig,
    only: Option<&str>,
) -> Result<()> {
    for (name, entry) in &config.nodes {
        if !entry.exists {
            continue;
        }
        if let Some(only) = only {
            if only != name {
                continue;
            }
        }
        let name = name.clone();
        let share = SharePaths::new(&entry.share_root);
        let backup_dir = config.backup_dir.clone();
        let copied = tokio::task::spawn_blocking(move || {
            sync::collect_logs(&name, &share, &backup_dir)
        })
        .await
        .map_err(|e| anyhow!("log collection task failed: {}", e))??;
        println!("collected {} files", copied);
    }
    Ok(())
}

fn print_snapshot(snapshot: &FleetSnapshot) {
    println!("Fleet at {}: {}", snapshot.taken_at, snapshot.summary());
    for node in &snapshot.nodes {
        if !node.exists {
            println!("  {:<12} decommissioned", node.name);
            continue;
        }
        println!(
            "  {:<12} online={:<5} enabled={:<5} channel={:<8} {}",
            node.name,
            node.online,
            node.enabled,
            node.derived_channel.as_deref().unwrap_or("-"),
            node.error.as_deref().unwrap_or("")
        );
    }
}
