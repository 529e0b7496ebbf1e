//! Integration tests for profile storage and the resolver
//!
//! These tests validate profiles as users author them: JSON documents
//! on disk, loaded into a store, and driven through the engine:
//! - Full descriptor schema (module offsets, pointer chains, transforms)
//! - Broken and duplicate files are skipped, not fatal
//! - Module-name reconciliation on a live profile

mod common;

use common::{test_timeout, wait_until};
use crossbeam_channel::bounded;
use outrig::device::MockProvider;
use outrig::engine::{EngineEvent, EngineHandle, EngineOptions, OutputEngine};
use outrig::types::{DeviceKey, Value};
use outrig::{MockProcess, ProfileStore};
use std::time::Duration;

fn spawn_engine(provider: MockProvider) -> EngineHandle {
    let (_packet_tx, packet_rx) = bounded::<outrig::RawPacket>(16);
    let options = EngineOptions {
        poll_interval: Duration::from_millis(5),
        metrics_interval: Duration::from_millis(100),
        detection_timeout: Duration::from_secs(1),
        bindings: Vec::new(),
    };
    OutputEngine::spawn(options, packet_rx, Box::new(provider))
}

const BOOST_PROFILE: &str = r#"{
    "name": "ridge-cab",
    "game": "ridgerac",
    "pointer_width": 8,
    "poll_interval_ms": 5,
    "outputs": [
        {
            "label": "boost",
            "address": { "ModuleOffset": { "module": "game.dll", "offset": 32 } },
            "pointer_chain": [8],
            "kind": "U16",
            "transform": "value + 1",
            "format": "0",
            "targets": [
                { "LedSegment": { "host": "wled.local", "segment": 1 } }
            ]
        }
    ]
}"#;

/// Target process layout matching the boost profile
fn boost_process() -> MockProcess {
    let mut process = MockProcess::new("ridge.exe");
    process.add_module("game.dll", 4_194_304, 65_536);
    process.add_region(4_194_304, 4_096);
    process.add_region(536_870_912, 256);

    // game.dll+32 holds a pointer; pointer+8 holds the boost gauge
    process.write_value(4_194_304 + 32, 536_870_912u64);
    process.write_value(536_870_912 + 8, 777u16);
    process
}

#[test]
fn test_profile_json_resolves_through_engine() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ridge.json"), BOOST_PROFILE).unwrap();

    let store = ProfileStore::load_dir(dir.path()).unwrap();
    assert_eq!(store.len(), 1);
    let profile = store.get("ridge-cab").unwrap().clone();

    let provider = MockProvider::new();
    let engine = spawn_engine(provider.clone());
    engine.start(profile, Box::new(boost_process()));

    let device = DeviceKey::Led("wled.local".to_string());
    let arrived = wait_until(test_timeout(), || {
        !provider.applied_for(&device).is_empty()
    });
    assert!(arrived, "the resolved value never reached the device");

    // u16 777, then transform value + 1
    let applied = provider.applied_for(&device);
    assert_eq!(applied[0].value, Value::Number(778.0));
    assert_eq!(applied[0].display, "778");

    engine.shutdown();
}

#[test]
fn test_broken_and_duplicate_files_skipped() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("a.json"),
        r#"{"name": "dupe", "game": "first"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("b.json"),
        r#"{"name": "dupe", "game": "second"}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("c.json"), "{ not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let store = ProfileStore::load_dir(dir.path()).unwrap();

    // File-name order wins for duplicates; broken files are skipped
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("dupe").unwrap().game, "first");
}

#[test]
fn test_missing_directory_yields_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::load_dir(dir.path().join("nope")).unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_module_reconciliation_on_live_profile() {
    let dir = tempfile::tempdir().unwrap();
    let stale = BOOST_PROFILE.replace("game.dll", "old_game.dll");
    std::fs::write(dir.path().join("ridge.json"), stale).unwrap();

    let store = ProfileStore::load_dir(dir.path()).unwrap();
    let profile = store.get("ridge-cab").unwrap().clone();

    let provider = MockProvider::new();
    let engine = spawn_engine(provider.clone());

    // The process has "game.dll"; the profile still says "old_game.dll"
    engine.start(profile, Box::new(boost_process()));

    let failing = wait_until(test_timeout(), || {
        engine.drain().iter().any(
            |e| matches!(e, EngineEvent::Metrics(m) if m.failed_samples > 0),
        )
    });
    assert!(failing, "the stale module name should fail to resolve");

    engine.reconcile_modules("OLD_GAME.DLL", "game.dll");

    let reconciled = wait_until(test_timeout(), || {
        engine.drain().iter().any(|e| {
            matches!(
                e,
                EngineEvent::ModulesReconciled { changed, .. } if *changed == 1
            )
        })
    });
    assert!(reconciled, "reconciliation never happened");

    let device = DeviceKey::Led("wled.local".to_string());
    let arrived = wait_until(test_timeout(), || {
        !provider.applied_for(&device).is_empty()
    });
    assert!(arrived, "the value never flowed after reconciliation");

    engine.shutdown();
}
