// File: manager/tests/distribute_tests.rs
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use manager::config::{ManagerConfig, NodeEntry};
use manager::distribute::send_power_command;
use protocol::fsio::{self, RetryPolicy};
use protocol::paths::SharePaths;
use protocol::types::{Command, CommandAction};

fn config_for(nodes: BTreeMap<String, NodeEntry>) -> Arc<ManagerConfig> {
    Arc::new(ManagerConfig {
        poll_interval_ok_seconds: 60,
        poll_interval_ng_min_seconds: 30,
        poll_interval_ng_max_seconds: 480,
        node_timeout_seconds: 5,
        thread_workers: 2,
        status_stale_after_seconds: 180,
        content_root: "/nonexistent/master".into(),
        backup_dir: "/nonexistent/backup".into(),
        ignore_ctime: true,
        ai_status_source: None,
        issuer: "controller01".to_string(),
        auto_distribute: false,
        nodes,
    })
}

fn roster(root: &Path) -> BTreeMap<String, NodeEntry> {
    let mut nodes = BTreeMap::new();
    nodes.insert(
        "Sign01".to_string(),
        NodeEntry {
            share_root: root.to_path_buf(),
            exists: true,
        },
    );
    nodes
}

#[tokio::test]
async fn issues_a_forced_command_with_a_fresh_id() {
    let dir = TempDir::new().unwrap();
    let share = SharePaths::new(dir.path());
    let config = config_for(roster(dir.path()));

    let id = send_power_command(&config, "Sign01", CommandAction::Reboot, false)
        .await
        .unwrap();

    let written: Command = fsio::read_json_tolerant(&share.command()).unwrap();
    assert_eq!(written.command_id, id);
    assert_eq!(written.action, "reboot");
    assert!(written.force);
    assert_eq!(written.issuer, "controller01");
}

#[tokio::test]
async fn pending_command_blocks_reissue() {
    let dir = TempDir::new().unwrap();
    let share = SharePaths::new(dir.path());
    let config = config_for(roster(dir.path()));

    let first = send_power_command(&config, "Sign01", CommandAction::Reboot, false)
        .await
        .unwrap();

    let err = send_power_command(&config, "Sign01", CommandAction::Shutdown, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("pending command"));

    // The command on the share is untouched.
    let written: Command = fsio::read_json_tolerant(&share.command()).unwrap();
    assert_eq!(written.command_id, first);
    assert_eq!(written.action, "reboot");
}

#[tokio::test]
async fn force_replace_reclaims_a_stuck_command() {
    let dir = TempDir::new().unwrap();
    let share = SharePaths::new(dir.path());
    let config = config_for(roster(dir.path()));

    // A command the agent rejects and never acknowledges.
    let stuck = Command {
        command_id: "stuck-1".to_string(),
        action: "reboot".to_string(),
        force: false,
        issued_at: Utc::now(),
        issuer: "controller01".to_string(),
    };
    fsio::write_json_retry(&share.command(), &stuck, RetryPolicy::WRITE).unwrap();

    let id = send_power_command(&config, "Sign01", CommandAction::Shutdown, true)
        .await
        .unwrap();

    let written: Command = fsio::read_json_tolerant(&share.command()).unwrap();
    assert_eq!(written.command_id, id);
    assert_ne!(written.command_id, "stuck-1");
    assert_eq!(written.action, "shutdown");
    assert!(written.force);
}

#[tokio::test]
async fn decommissioned_node_refuses_commands() {
    let dir = TempDir::new().unwrap();
    let mut nodes = roster(dir.path());
    nodes.get_mut("Sign01").unwrap().exists = false;
    let config = config_for(nodes);

    let err = send_power_command(&config, "Sign01", CommandAction::Reboot, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("decommissioned"));
}
