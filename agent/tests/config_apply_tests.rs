// File: agent/tests/config_apply_tests.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use agent::config_apply::{ChangeSource, ConfigApplier, PollSource};
use protocol::fsio::{self, RetryPolicy};
use protocol::paths::SharePaths;
use protocol::types::{ActiveChannel, ConfigRules};

struct FlagSource {
    flag: Arc<AtomicBool>,
}

impl ChangeSource for FlagSource {
    fn changed(&mut self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    fn kind(&self) -> &'static str {
        "flag"
    }
}

fn rules(normal: &str) -> ConfigRules {
    ConfigRules {
        enabled: true,
        sleep_channel: "ch09".to_string(),
        normal_channel: normal.to_string(),
        ai_channels: Default::default(),
        sleep_rules: Vec::new(),
        timer_rules: Vec::new(),
    }
}

fn applier_with_flag(share: &SharePaths) -> (ConfigApplier, Arc<AtomicBool>) {
    let flag = Arc::new(AtomicBool::new(true));
    let source = Box::new(FlagSource { flag: flag.clone() });
    (ConfigApplier::new(share.clone(), source), flag)
}

#[test]
fn unchanged_inputs_write_active_only_once() {
    let dir = TempDir::new().unwrap();
    let share = SharePaths::new(dir.path());
    fsio::write_json_retry(&share.config_rules(), &rules("ch01"), RetryPolicy::WRITE).unwrap();
    let (mut applier, _flag) = applier_with_flag(&share);

    let resolved = applier.apply().unwrap();
    assert_eq!(resolved.channel, "ch01");
    let active: ActiveChannel = fsio::read_json_tolerant(&share.active_channel()).unwrap();
    assert_eq!(active.active_channel, "ch01");

    // Plant a sentinel: any rewrite of active.json would clobber it.
    std::fs::write(share.active_channel(), b"sentinel").unwrap();

    let resolved = applier.apply().unwrap();
    assert_eq!(resolved.channel, "ch01");
    assert_eq!(
        std::fs::read(share.active_channel()).unwrap(),
        b"sentinel"
    );
}

#[test]
fn same_resolution_after_input_change_is_not_rewritten() {
    let dir = TempDir::new().unwrap();
    let share = SharePaths::new(dir.path());
    fsio::write_json_retry(&share.config_rules(), &rules("ch01"), RetryPolicy::WRITE).unwrap();
    let (mut applier, flag) = applier_with_flag(&share);

    applier.apply().unwrap();
    std::fs::write(share.active_channel(), b"sentinel").unwrap();

    // Rules rewritten with the same content: recompute, same channel, no write.
    fsio::write_json_retry(&share.config_rules(), &rules("ch01"), RetryPolicy::WRITE).unwrap();
    flag.store(true, Ordering::SeqCst);
    applier.apply().unwrap();
    assert_eq!(
        std::fs::read(share.active_channel()).unwrap(),
        b"sentinel"
    );
}

#[test]
fn changed_resolution_is_published() {
    let dir = TempDir::new().unwrap();
    let share = SharePaths::new(dir.path());
    fsio::write_json_retry(&share.config_rules(), &rules("ch01"), RetryPolicy::WRITE).unwrap();
    let (mut applier, flag) = applier_with_flag(&share);

    applier.apply().unwrap();

    fsio::write_json_retry(&share.config_rules(), &rules("ch05"), RetryPolicy::WRITE).unwrap();
    flag.store(true, Ordering::SeqCst);
    let resolved = applier.apply().unwrap();
    assert_eq!(resolved.channel, "ch05");

    let active: ActiveChannel = fsio::read_json_tolerant(&share.active_channel()).unwrap();
    assert_eq!(active.active_channel, "ch05");
}

#[test]
fn missing_rules_resolve_to_nothing() {
    let dir = TempDir::new().unwrap();
    let share = SharePaths::new(dir.path());
    let (mut applier, _flag) = applier_with_flag(&share);

    assert!(applier.apply().is_none());
    assert!(!share.active_channel().exists());
}

#[test]
fn poll_source_detects_rule_rewrites() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, b"{}").unwrap();

    let mut source = PollSource::new(vec![path.clone()], Duration::from_millis(0));
    assert!(!source.changed());

    std::fs::write(&path, b"{\"enabled\": false}").unwrap();
    assert!(source.changed());
    assert!(!source.changed());
}
