// File: manager/src/config/mod.rs
pub mod manager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
pub use manager::ConfigManager;

/// Coordinator settings (`main.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Healthy nodes are polled this often.
    #[serde(default = "default_poll_ok")]
    pub poll_interval_ok_seconds: u64,
    /// First retry delay after a node stops answering.
    #[serde(default = "default_poll_ng_min")]
    pub poll_interval_ng_min_seconds: u64,
    /// Failure backoff cap.
    #[serde(default = "default_poll_ng_max")]
    pub poll_interval_ng_max_seconds: u64,
    /// Budget for one node's share probe.
    #[serde(default = "default_node_timeout")]
    pub node_timeout_seconds: u64,
    /// Nodes probed concurrently per batch.
    #[serde(default = "default_thread_workers")]
    pub thread_workers: usize,
    /// A status record older than this counts as offline even if readable.
    #[serde(default = "default_status_stale")]
    pub status_stale_after_seconds: i64,
    /// Master content tree mirrored to the nodes.
    pub content_root: PathBuf,
    /// Destination for collected node logs.
    pub backup_dir: PathBuf,
    /// Compare size + mtime only. Copies cannot carry creation times, so
    /// ctime comparison is opt-in for volumes known to preserve them.
    #[serde(default = "default_true")]
    pub ignore_ctime: bool,
    /// Congestion signal to redistribute, usually on the analysis share.
    #[serde(default)]
    pub ai_status_source: Option<PathBuf>,
    /// Issuer recorded on outgoing commands.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Redistribute rules and the congestion signal on the healthy poll
    /// cadence. Off by default: distribution is an operator action.
    #[serde(default)]
    pub auto_distribute: bool,
    // Populated from inventory.toml
    #[serde(skip)]
    pub nodes: BTreeMap<String, NodeEntry>,
}

/// One roster row (`inventory.toml`). `exists = false` keeps a
/// decommissioned node in the roster without ever probing its share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    pub share_root: PathBuf,
    #[serde(default = "default_true")]
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryFile {
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeEntry>,
}

fn default_true() -> bool {
    true
}

fn default_poll_ok() -> u64 {
    60
}

fn default_poll_ng_min() -> u64 {
    30
}

fn default_poll_ng_max() -> u64 {
    480
}

fn default_node_timeout() -> u64 {
    15
}

fn default_thread_workers() -> usize {
    4
}

fn default_status_stale() -> i64 {
    180
}

fn default_issuer() -> String {
    "controller".to_string()
}
