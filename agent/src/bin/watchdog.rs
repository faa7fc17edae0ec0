// File: agent/src/bin/watchdog.rs
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agent::power::OsPowerControl;
use agent::watchdog::{Watchdog, WatchdogSettings, CRASH_CSV_NAME};

#[derive(Parser, Debug)]
#[command(name = "watchdog", about = "Agent process supervisor")]
struct Args {
    /// Agent executable to supervise
    #[arg(long)]
    agent_exe: PathBuf,

    /// Arguments passed to the agent
    #[arg(long)]
    agent_arg: Vec<String>,

    /// Directory holding the crash history CSV
    #[arg(long)]
    state_dir: PathBuf,

    /// Crash recency window in seconds
    #[arg(long, default_value_t = 600)]
    window_seconds: i64,

    /// Reboot once this many crashes land inside the window
    #[arg(long, default_value_t = 3)]
    max_crashes: usize,

    /// Pause between relaunches in seconds
    #[arg(long, default_value_t = 10)]
    restart_delay_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Starting watchdog for {}", args.agent_exe.display());

    let settings = WatchdogSettings {
        agent_exe: args.agent_exe,
        agent_args: args.agent_arg,
        crash_csv: args.state_dir.join(CRASH_CSV_NAME),
        window_seconds: args.window_seconds,
        max_crashes: args.max_crashes,
        restart_delay: Duration::from_secs(args.restart_delay_seconds),
    };

    Watchdog::new(settings, OsPowerControl).run().await
}
