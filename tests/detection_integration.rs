//! Integration tests for game detection over the message stream
//!
//! These tests validate the detection handshake end to end:
//! - Start marker, game name, profile match
//! - Unknown games and session resets
//! - Detection timeout
//! - Message values reaching devices through a matched profile's outputs

mod common;

use common::builders::{mapped_profile, OutputBuilder};
use common::{test_timeout, wait_until};
use crossbeam_channel::{bounded, Sender};
use outrig::device::MockProvider;
use outrig::engine::{EngineEvent, EngineHandle, EngineOptions, OutputEngine};
use outrig::message::{wire, DetectionEvent, GameBinding};
use outrig::types::{EngineStatus, RawPacket, Value};
use std::time::Duration;

fn spawn_engine(bindings: Vec<GameBinding>) -> (EngineHandle, Sender<RawPacket>, MockProvider) {
    let (packet_tx, packet_rx) = bounded(64);
    let provider = MockProvider::new();
    let options = EngineOptions {
        poll_interval: Duration::from_millis(5),
        metrics_interval: Duration::from_millis(100),
        detection_timeout: Duration::from_millis(300),
        bindings,
    };
    let engine = OutputEngine::spawn(options, packet_rx, Box::new(provider.clone()));
    (engine, packet_tx, provider)
}

/// Collect detection events seen while draining the engine
fn drain_detections(engine: &EngineHandle) -> Vec<DetectionEvent> {
    engine
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::Detection(detection) => Some(detection),
            _ => None,
        })
        .collect()
}

#[test]
fn test_start_and_name_match_profile() {
    let bindings = vec![
        GameBinding::new("outrun-cab", "outrun"),
        GameBinding::new("daytona-cab", "daytona"),
    ];
    let (engine, packet_tx, _provider) = spawn_engine(bindings);

    packet_tx
        .send(RawPacket::value(wire::START_KEY, 1))
        .unwrap();
    packet_tx
        .send(RawPacket::text(wire::GAME_NAME_KEY, "Daytona"))
        .unwrap();

    let mut matched = None;
    let found = wait_until(test_timeout(), || {
        for detection in drain_detections(&engine) {
            if let DetectionEvent::Matched { profile, game } = detection {
                matched = Some((profile, game));
            }
        }
        matched.is_some()
    });

    assert!(found, "detection never matched");
    let (profile, game) = matched.unwrap();
    assert_eq!(profile, "daytona-cab");
    assert_eq!(game, "Daytona");

    engine.shutdown();
}

#[test]
fn test_unknown_game_reports_no_match() {
    let bindings = vec![GameBinding::new("daytona-cab", "daytona")];
    let (engine, packet_tx, _provider) = spawn_engine(bindings);

    packet_tx
        .send(RawPacket::value(wire::START_KEY, 1))
        .unwrap();
    packet_tx
        .send(RawPacket::text(wire::GAME_NAME_KEY, "sf2"))
        .unwrap();

    let no_match = wait_until(test_timeout(), || {
        drain_detections(&engine)
            .iter()
            .any(|d| matches!(d, DetectionEvent::NoMatch { game } if game == "sf2"))
    });
    assert!(no_match, "no-match event never arrived");

    engine.shutdown();
}

#[test]
fn test_stop_marker_resets_session() {
    let bindings = vec![GameBinding::new("daytona-cab", "daytona")];
    let (engine, packet_tx, _provider) = spawn_engine(bindings);

    packet_tx
        .send(RawPacket::value(wire::START_KEY, 1))
        .unwrap();
    packet_tx
        .send(RawPacket::text(wire::GAME_NAME_KEY, "daytona"))
        .unwrap();
    packet_tx.send(RawPacket::value(wire::STOP_KEY, 0)).unwrap();

    let reset = wait_until(test_timeout(), || {
        drain_detections(&engine)
            .iter()
            .any(|d| matches!(d, DetectionEvent::Reset))
    });
    assert!(reset, "stop marker never reset the session");

    engine.shutdown();
}

#[test]
fn test_detection_times_out_without_name() {
    let (engine, packet_tx, _provider) = spawn_engine(Vec::new());

    packet_tx
        .send(RawPacket::value(wire::START_KEY, 1))
        .unwrap();

    // The 300ms timeout expires with no game name announcement
    let timed_out = wait_until(test_timeout(), || {
        drain_detections(&engine)
            .iter()
            .any(|d| matches!(d, DetectionEvent::TimedOut))
    });
    assert!(timed_out, "detection never timed out");

    engine.shutdown();
}

#[test]
fn test_stream_values_reach_devices_after_match() {
    let bindings = vec![GameBinding::new("test-cab", "testgame")];
    let (engine, packet_tx, provider) = spawn_engine(bindings);

    // The profile binds its lamp output to a stream key via the label
    let (profile, process) = mapped_profile(vec![OutputBuilder::new("lamp0")
        .address(0x1020)
        .led("wled.local", 3)
        .build()]);

    packet_tx
        .send(RawPacket::value(wire::START_KEY, 1))
        .unwrap();
    packet_tx
        .send(RawPacket::text(wire::GAME_NAME_KEY, "testgame"))
        .unwrap();

    let matched = wait_until(test_timeout(), || {
        drain_detections(&engine)
            .iter()
            .any(|d| matches!(d, DetectionEvent::Matched { .. }))
    });
    assert!(matched, "detection never matched");

    // The embedder reacts to the match by starting the profile
    engine.start(profile, Box::new(process));
    let running = wait_until(test_timeout(), || {
        engine
            .drain()
            .iter()
            .any(|e| matches!(e, EngineEvent::Status(EngineStatus::Running)))
    });
    assert!(running, "engine never reported running");

    packet_tx.send(RawPacket::value("lamp0", 255)).unwrap();

    let arrived = wait_until(test_timeout(), || {
        provider
            .applied()
            .iter()
            .any(|cmd| cmd.value == Value::Number(255.0))
    });
    assert!(arrived, "stream value never reached the mock device");

    engine.shutdown();
}
