// File: manager/tests/poll_tests.rs
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use manager::config::{ManagerConfig, NodeEntry};
use manager::poll::FleetPoller;
use protocol::fsio::{self, RetryPolicy};
use protocol::paths::SharePaths;
use protocol::types::PcStatus;

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

fn node(root: &Path, exists: bool) -> NodeEntry {
    NodeEntry {
        share_root: root.to_path_buf(),
        exists,
    }
}

fn write_status(root: &Path, host: &str, online: bool, age_seconds: i64) {
    let share = SharePaths::new(root);
    let status = PcStatus {
        host: host.to_string(),
        online,
        enabled: true,
        last_update: Utc::now() - Duration::seconds(age_seconds),
        error: None,
        derived_channel: Some("ch05".to_string()),
        playing_file: None,
        disk_total_gb: Some(460.0),
        disk_free_gb: Some(120.0),
    };
    fsio::write_json_retry(&share.pc_status(), &status, RetryPolicy::WRITE).unwrap();
}

#[tokio::test]
async fn corrupt_status_marks_one_node_offline_without_hurting_the_batch() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("sign01");
    let bad = dir.path().join("sign02");
    write_status(&good, "Sign01", true, 0);
    let bad_share = SharePaths::new(&bad);
    std::fs::create_dir_all(bad_share.status_dir()).unwrap();
    std::fs::write(bad_share.pc_status(), b"{\"host\": \"Sign0").unwrap();

    let mut nodes = BTreeMap::new();
    nodes.insert("Sign01".to_string(), node(&good, true));
    nodes.insert("Sign02".to_string(), node(&bad, true));
    let poller = FleetPoller::new(config_for(nodes));

    let snapshot = poller.poll_all().await;
    assert_eq!(snapshot.nodes.len(), 2);

    let sign01 = snapshot.nodes.iter().find(|n| n.name == "Sign01").unwrap();
    assert!(sign01.online);
    assert_eq!(sign01.derived_channel.as_deref(), Some("ch05"));

    let sign02 = snapshot.nodes.iter().find(|n| n.name == "Sign02").unwrap();
    assert!(!sign02.online);
    assert!(sign02.error.as_deref().unwrap().contains("unreadable"));
}

#[tokio::test]
async fn stale_status_counts_as_offline() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("sign01");
    write_status(&root, "Sign01", true, 3600);

    let mut nodes = BTreeMap::new();
    nodes.insert("Sign01".to_string(), node(&root, true));
    let poller = FleetPoller::new(config_for(nodes));

    let snapshot = poller.poll_all().await;
    let state = &snapshot.nodes[0];
    assert!(!state.online);
    assert!(state.error.as_deref().unwrap().contains("stale"));
}

#[tokio::test]
async fn decommissioned_nodes_are_never_probed() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("gone");

    let mut nodes = BTreeMap::new();
    nodes.insert("SignOld".to_string(), node(&root, false));
    let poller = FleetPoller::new(config_for(nodes));

    let snapshot = poller.poll_all().await;
    let state = &snapshot.nodes[0];
    assert!(!state.exists);
    assert!(!state.online);
    assert!(state.error.is_none());
    assert_eq!(snapshot.summary(), "0/0 online");
}
