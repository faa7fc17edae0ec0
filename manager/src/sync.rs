// File: manager/src/sync.rs
//
// Content mirroring and log collection. Mirroring works master -> node:
// scan both trees, diff fingerprints, then apply ADD/UPDATE through a
// staging file on the node's own volume so the final hop is a local
// overwrite instead of a long cross-share copy.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use protocol::fsio::{self, RetryPolicy};
use protocol::manifest::{self, FingerprintOptions, Manifest};
use protocol::paths::SharePaths;

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub node: String,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    /// True when the post-sync re-scan found nothing left to do.
    pub verified_clean: bool,
}

impl SyncReport {
    pub fn total_ops(&self) -> usize {
        self.added + self.updated + self.deleted
    }
}

/// Mirror the master content tree onto one node share. Every file is its
/// own failure domain: a locked or vanishing file is logged, counted and
/// left for the next run.
pub fn sync_node(
    node_name: &str,
    master_root: &Path,
    share: &SharePaths,
    opts: FingerprintOptions,
) -> Result<SyncReport> {
    let master = Manifest::scan(master_root)?;
    let node_root = share.content_dir();
    let node = Manifest::scan(&node_root)?;
    let plan = manifest::diff(&master, &node, opts);

    if plan.is_empty() {
        debug!("{}: content already in sync", node_name);
        return Ok(SyncReport {
            node: node_name.to_string(),
            added: 0,
            updated: 0,
            deleted: 0,
            failed: 0,
            verified_clean: true,
        });
    }

    info!(
        "{}: syncing {} ops ({} add, {} update, {} delete)",
        node_name,
        plan.total_ops(),
        plan.add.len(),
        plan.update.len(),
        plan.delete.len()
    );

    let staging_dir = share.staging_dir();
    let mut report = SyncReport {
        node: node_name.to_string(),
        added: 0,
        updated: 0,
        deleted: 0,
        failed: 0,
        verified_clean: false,
    };

    for rel in &plan.add {
        match stage_and_place(master_root, &node_root, &staging_dir, rel) {
            Ok(()) => report.added += 1,
            Err(e) => {
                warn!("{}: add {} failed: {}", node_name, rel, e);
                report.failed += 1;
            }
        }
    }
    for rel in &plan.update {
        match stage_and_place(master_root, &node_root, &staging_dir, rel) {
            Ok(()) => report.updated += 1,
            Err(e) => {
                warn!("{}: update {} failed: {}", node_name, rel, e);
                report.failed += 1;
            }
        }
    }
    for rel in &plan.delete {
        match remove_with_retry(&node_root.join(rel)) {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                warn!("{}: delete {} failed: {}", node_name, rel, e);
                report.failed += 1;
            }
        }
    }

    // The node manifest is only believed after a fresh scan.
    let rescan = Manifest::scan(&node_root)?;
    report.verified_clean = manifest::diff(&master, &rescan, opts).is_empty();
    if !report.verified_clean {
        warn!("{}: residual diff after sync, will retry next run", node_name);
    }

    Ok(report)
}

/// Copy master -> staging (long cross-share hop, no reader contention),
/// then staging -> destination (short local overwrite with retries).
fn stage_and_place(
    master_root: &Path,
    node_root: &Path,
    staging_dir: &Path,
    rel: &str,
) -> Result<()> {
    let src = master_root.join(rel);
    let dst = node_root.join(rel);
    let staged = staging_dir.join(format!(
        "{}.{}",
        rel.replace('/', "_"),
        std::process::id()
    ));

    std::fs::create_dir_all(staging_dir)
        .with_context(|| format!("creating {}", staging_dir.display()))?;
    fsio::copy_overwrite_retry(&src, &staged, RetryPolicy::WRITE)?;
    let placed = fsio::copy_overwrite_retry(&staged, &dst, RetryPolicy::WRITE);
    let _ = std::fs::remove_file(&staged);
    placed?;
    Ok(())
}

fn remove_with_retry(path: &Path) -> Result<()> {
    let policy = RetryPolicy::WRITE;
    let mut last_err = String::new();
    for attempt in 0..policy.attempts {
        match std::fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                last_err = e.to_string();
                std::thread::sleep(policy.base_delay.saturating_mul(1 << attempt.min(8)));
            }
        }
    }
    anyhow::bail!("removing {}: {}", path.display(), last_err)
}

/// Pull everything under a node's log directory into a timestamped folder
/// on the backup tree. Returns the number of files copied.
pub fn collect_logs(node_name: &str, share: &SharePaths, backup_dir: &Path) -> Result<usize> {
    let logs_root = share.logs_dir();
    if !logs_root.exists() {
        debug!("{}: no logs directory yet", node_name);
        return Ok(0);
    }

    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let dest_root: PathBuf = backup_dir.join("logs").join(node_name).join(stamp);

    let mut copied = 0usize;
    for item in WalkDir::new(&logs_root).follow_links(false) {
        let item = item.with_context(|| format!("walking {}", logs_root.display()))?;
        if !item.file_type().is_file() {
            continue;
        }
        let rel = item
            .path()
            .strip_prefix(&logs_root)
            .unwrap_or(item.path());
        let dest = dest_root.join(rel);
        match fsio::copy_overwrite_retry(item.path(), &dest, RetryPolicy::WRITE) {
            Ok(()) => copied += 1,
            Err(e) => warn!("{}: log copy {} failed: {}", node_name, rel.display(), e),
        }
    }

    info!("{}: collected {} log files", node_name, copied);
    Ok(copied)
}
