// File: manager/tests/sync_tests.rs
use std::path::Path;

use tempfile::TempDir;

use manager::sync::{collect_logs, sync_node};
use protocol::manifest::FingerprintOptions;
use protocol::paths::SharePaths;

fn write_file(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn opts() -> FingerprintOptions {
    FingerprintOptions { ignore_ctime: true }
}

#[test]
fn mirrors_adds_updates_and_deletes() {
    let dir = TempDir::new().unwrap();
    let master = dir.path().join("master");
    let node_root = dir.path().join("sign01");
    let share = SharePaths::new(&node_root);

    write_file(&master, "ch05/a.mp4", b"aaaa-v2");
    write_file(&master, "ch05/c.mp4", b"cccc");
    write_file(&share.content_dir(), "ch05/a.mp4", b"aaaa");
    write_file(&share.content_dir(), "ch05/b.mp4", b"bbbb");

    let report = sync_node("Sign01", &master, &share, opts()).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed, 0);
    assert!(report.verified_clean);

    assert_eq!(
        std::fs::read(share.content_dir().join("ch05/a.mp4")).unwrap(),
        b"aaaa-v2"
    );
    assert!(share.content_dir().join("ch05/c.mp4").exists());
    assert!(!share.content_dir().join("ch05/b.mp4").exists());
}

#[test]
fn second_run_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let master = dir.path().join("master");
    let node_root = dir.path().join("sign01");
    let share = SharePaths::new(&node_root);

    write_file(&master, "ch01/movie.mp4", b"data");
    let first = sync_node("Sign01", &master, &share, opts()).unwrap();
    assert_eq!(first.total_ops(), 1);

    let second = sync_node("Sign01", &master, &share, opts()).unwrap();
    assert_eq!(second.total_ops(), 0);
    assert!(second.verified_clean);
}

#[test]
fn samples_and_non_media_stay_out_of_the_mirror() {
    let dir = TempDir::new().unwrap();
    let master = dir.path().join("master");
    let node_root = dir.path().join("sign01");
    let share = SharePaths::new(&node_root);

    write_file(&master, "ch05/a.mp4", b"aaaa");
    write_file(&master, "ch05/a_sample.mp4", b"preview");
    write_file(&master, "ch05/notes.txt", b"do not ship");

    let report = sync_node("Sign01", &master, &share, opts()).unwrap();
    assert_eq!(report.added, 1);

    assert!(share.content_dir().join("ch05/a.mp4").exists());
    assert!(!share.content_dir().join("ch05/a_sample.mp4").exists());
    assert!(!share.content_dir().join("ch05/notes.txt").exists());
}

#[test]
fn missing_master_tree_empties_the_node() {
    let dir = TempDir::new().unwrap();
    let master = dir.path().join("no-such-master");
    let node_root = dir.path().join("sign01");
    let share = SharePaths::new(&node_root);
    write_file(&share.content_dir(), "ch05/old.mp4", b"old");

    let report = sync_node("Sign01", &master, &share, opts()).unwrap();
    assert_eq!(report.deleted, 1);
    assert!(!share.content_dir().join("ch05/old.mp4").exists());
}

#[test]
fn log_collection_copies_the_tree() {
    let dir = TempDir::new().unwrap();
    let node_root = dir.path().join("sign01");
    let backup = dir.path().join("backup");
    let share = SharePaths::new(&node_root);

    write_file(&share.logs_dir(), "hwinfo_2026.csv", b"timestamp,cpu\n");
    write_file(&share.logs_dir(), "player/out.log", b"started\n");

    let copied = collect_logs("Sign01", &share, &backup).unwrap();
    assert_eq!(copied, 2);

    let collected = backup.join("logs").join("Sign01");
    let stamp_dir = std::fs::read_dir(&collected)
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    assert!(stamp_dir.join("hwinfo_2026.csv").exists());
    assert!(stamp_dir.join("player/out.log").exists());
}
