// File: agent/src/main.rs
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use protocol::paths::SharePaths;

use agent::command::CommandProcessor;
use agent::config_apply::{self, ConfigApplier};
use agent::power::OsPowerControl;
use agent::sensors::SensorAggregator;
use agent::state::StateStore;
use agent::status::{self, StatusPublisher};

#[derive(Parser, Debug)]
#[command(name = "agent", about = "Signage node agent")]
struct Args {
    /// Share root for this node
    #[arg(long)]
    base: PathBuf,

    /// Hostname reported in status records (defaults to the OS hostname)
    #[arg(long)]
    hostname: Option<String>,

    /// Main cycle interval in seconds
    #[arg(long, default_value_t = 5)]
    interval_seconds: u64,

    /// Heartbeat older than this counts as a dead player
    #[arg(long, default_value_t = 30)]
    heartbeat_stale_seconds: i64,

    /// Free space below this is reported as an error
    #[arg(long, default_value_t = 5.0)]
    min_free_gb: f64,

    /// Hardware monitor CSV export to sample; sampling is off when absent
    #[arg(long)]
    sensor_csv: Option<PathBuf>,

    /// One yearly sensor row per this many minutes
    #[arg(long, default_value_t = 30)]
    sensor_sample_minutes: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let share = SharePaths::new(&args.base);

    // The only fatal startup condition: the share layout cannot be created.
    for dir in [share.config_dir(), share.status_dir(), share.logs_dir()] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    let hostname = args.hostname.unwrap_or_else(os_hostname);
    info!(
        "Starting node agent for {} on {}",
        hostname,
        share.root().display()
    );

    if let Some(sensor_csv) = args.sensor_csv.clone() {
        let aggregator = SensorAggregator::new(
            sensor_csv,
            share.logs_dir(),
            &share.config_dir(),
            args.sensor_sample_minutes,
        );
        let probe_root = share.root().to_path_buf();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(2));
            loop {
                tick.tick().await;
                aggregator.truncate_input_if_oversized();
                let disk = status::disk_usage_for(&probe_root);
                if let Err(e) = aggregator.sample_once(disk) {
                    warn!("Sensor sampling failed: {}", e);
                }
            }
        });
    }

    let source = config_apply::detect_change_source(&share);
    let mut applier = ConfigApplier::new(share.clone(), source);
    let publisher = StatusPublisher::new(
        share.clone(),
        hostname,
        args.heartbeat_stale_seconds,
        args.min_free_gb,
    );
    let store = StateStore::new(&share.config_dir());
    let mut commands = CommandProcessor::new(share.clone(), store, OsPowerControl);

    let mut tick = tokio::time::interval(Duration::from_secs(args.interval_seconds.max(1)));
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down node agent");
                return Ok(());
            }
        }

        let resolved = applier.apply();
        let disk = publisher.disk_usage();
        let pc_status = publisher.collect(resolved.as_ref(), disk, Utc::now());
        publisher.publish(&pc_status);
        commands.poll_once();
    }
}

fn os_hostname() -> String {
    for var in ["COMPUTERNAME", "HOSTNAME"] {
        if let Ok(name) = std::env::var(var) {
            if !name.is_empty() {
                return name;
            }
        }
    }
    "unknown-host".to_string()
}
