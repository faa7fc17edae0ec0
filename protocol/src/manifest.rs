//! Content manifests and the three-way mirror diff.
//!
//! Fingerprints are size + timestamps; no content hashing. The node's
//! manifest is never trusted as ground truth until re-scanned after a sync.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use walkdir::WalkDir;

/// Media extensions eligible for mirroring.
const SYNC_EXTENSIONS: &[&str] = &["mp4", "mov", "jpg", "jpeg", "png", "webp"];

/// Preview clips stay out of the mirror; the console renders them locally.
const SAMPLE_SUFFIX: &str = "_sample.mp4";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub relative_path: String,
    pub size: u64,
    /// Modification time, milliseconds since the epoch.
    pub mtime_ms: i64,
    /// Creation time where the filesystem reports one, else equal to mtime.
    pub ctime_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintOptions {
    /// Some shares rewrite creation times on copy; setting this compares
    /// size + mtime only.
    pub ignore_ctime: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Present in master, absent on the node.
    pub add: Vec<String>,
    /// Present on both sides with differing fingerprints.
    pub update: Vec<String>,
    /// Present on the node, absent in master.
    pub delete: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn total_ops(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }
}

fn system_time_ms(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn is_sync_candidate(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(SAMPLE_SUFFIX) {
        return false;
    }
    match lower.rsplit_once('.') {
        Some((_, ext)) => SYNC_EXTENSIONS.contains(&ext),
        None => false,
    }
}

impl Manifest {
    /// Walk `root` and fingerprint every eligible media file. A missing root
    /// yields an empty manifest (a node that has never synced).
    pub fn scan(root: &Path) -> Result<Manifest> {
        let mut entries = BTreeMap::new();
        if !root.exists() {
            return Ok(Manifest { entries });
        }
        for item in WalkDir::new(root).follow_links(false) {
            let item = item.with_context(|| format!("walking {}", root.display()))?;
            if !item.file_type().is_file() {
                continue;
            }
            let name = item.file_name().to_string_lossy();
            if !is_sync_candidate(&name) {
                continue;
            }
            // Files can vanish mid-walk; the next scan reconciles.
            let Ok(meta) = item.metadata() else { continue };
            let relative = item
                .path()
                .strip_prefix(root)
                .unwrap_or(item.path())
                .to_string_lossy()
                .replace('\\', "/");
            let mtime_ms = meta.modified().map(system_time_ms).unwrap_or(0);
            let ctime_ms = meta.created().map(system_time_ms).unwrap_or(mtime_ms);
            entries.insert(
                relative.clone(),
                ManifestEntry {
                    relative_path: relative,
                    size: meta.len(),
                    mtime_ms,
                    ctime_ms,
                },
            );
        }
        debug!("Scanned {}: {} entries", root.display(), entries.len());
        Ok(Manifest { entries })
    }
}

fn same_fingerprint(a: &ManifestEntry, b: &ManifestEntry, opts: FingerprintOptions) -> bool {
    if a.size != b.size || a.mtime_ms != b.mtime_ms {
        return false;
    }
    opts.ignore_ctime || a.ctime_ms == b.ctime_ms
}

/// Compute the ADD / UPDATE / DELETE reconciliation of a node tree against
/// the master tree. Deterministic: output paths are sorted.
pub fn diff(master: &Manifest, node: &Manifest, opts: FingerprintOptions) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for (path, master_entry) in &master.entries {
        match node.entries.get(path) {
            None => plan.add.push(path.clone()),
            Some(node_entry) => {
                if !same_fingerprint(master_entry, node_entry, opts) {
                    plan.update.push(path.clone());
                }
            }
        }
    }

    for path in node.entries.keys() {
        if !master.entries.contains_key(path) {
            plan.delete.push(path.clone());
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, size: u64, mtime_ms: i64, ctime_ms: i64) -> ManifestEntry {
        ManifestEntry {
            relative_path: path.to_string(),
            size,
            mtime_ms,
            ctime_ms,
        }
    }

    fn manifest(entries: Vec<ManifestEntry>) -> Manifest {
        Manifest {
            entries: entries
                .into_iter()
                .map(|e| (e.relative_path.clone(), e))
                .collect(),
        }
    }

    #[test]
    fn size_change_updates_and_orphan_deletes() {
        let master = manifest(vec![entry("a.mp4", 10, 1000, 1000)]);
        let node = manifest(vec![
            entry("a.mp4", 9, 1000, 1000),
            entry("b.mp4", 5, 1000, 1000),
        ]);
        let plan = diff(&master, &node, FingerprintOptions::default());
        assert_eq!(plan.update, vec!["a.mp4"]);
        assert_eq!(plan.delete, vec!["b.mp4"]);
        assert!(plan.add.is_empty());
    }

    #[test]
    fn identical_trees_produce_an_empty_plan() {
        let master = manifest(vec![entry("ch01/a.mp4", 10, 1000, 2000)]);
        let node = manifest(vec![entry("ch01/a.mp4", 10, 1000, 2000)]);
        assert!(diff(&master, &node, FingerprintOptions::default()).is_empty());
    }

    #[test]
    fn ctime_difference_respects_the_ignore_flag() {
        let master = manifest(vec![entry("a.mp4", 10, 1000, 2000)]);
        let node = manifest(vec![entry("a.mp4", 10, 1000, 3000)]);
        assert_eq!(
            diff(&master, &node, FingerprintOptions::default()).update,
            vec!["a.mp4"]
        );
        assert!(diff(&master, &node, FingerprintOptions { ignore_ctime: true }).is_empty());
    }

    #[test]
    fn missing_on_node_is_an_add() {
        let master = manifest(vec![entry("ch02/new.mp4", 3, 1, 1)]);
        let plan = diff(&master, &Manifest::default(), FingerprintOptions::default());
        assert_eq!(plan.add, vec!["ch02/new.mp4"]);
    }

    #[test]
    fn samples_and_foreign_extensions_are_not_scanned() {
        assert!(is_sync_candidate("movie.mp4"));
        assert!(is_sync_candidate("poster.JPG"));
        assert!(!is_sync_candidate("movie_sample.mp4"));
        assert!(!is_sync_candidate("notes.txt"));
        assert!(!is_sync_candidate("noextension"));
    }

    #[test]
    fn scan_of_missing_root_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let manifest = Manifest::scan(&dir.path().join("absent")).unwrap();
        assert!(manifest.entries.is_empty());
    }

    #[test]
    fn scan_fingerprints_real_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let ch = dir.path().join("ch01");
        std::fs::create_dir_all(&ch).unwrap();
        std::fs::write(ch.join("clip.mp4"), b"0123456789").unwrap();
        std::fs::write(ch.join("clip_sample.mp4"), b"xx").unwrap();
        std::fs::write(ch.join("readme.txt"), b"xx").unwrap();

        let manifest = Manifest::scan(dir.path()).unwrap();
        assert_eq!(manifest.entries.len(), 1);
        let entry = manifest.entries.get("ch01/clip.mp4").unwrap();
        assert_eq!(entry.size, 10);
        assert!(entry.mtime_ms > 0);
    }
}
