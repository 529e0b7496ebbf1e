//! Outrig - Main Entry Point
//!
//! Headless bridge between an emulator's output stream and physical
//! feedback devices. It listens for emulator packets over TCP, matches
//! announced games against stored profiles, and drives LED controllers,
//! relay boards, and serial displays from the resulting values.

use anyhow::Context;
use crossbeam_channel::Sender;
use outrig::config::{AppConfig, LogSettings};
use outrig::device::StandardProvider;
use outrig::engine::{EngineEvent, EngineHandle, EngineOptions, OutputEngine};
use outrig::message::{wire, DetectionEvent};
use outrig::process::{MockPattern, MockProcess};
use outrig::profile::{Profile, ProfileStore};
use outrig::types::{AddressKind, OutputDescriptor, RawPacket, ValueKind};
use std::io::BufRead;
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Capacity of the raw packet queue feeding the message pump
const PACKET_QUEUE: usize = 256;

fn main() -> anyhow::Result<()> {
    let config = AppConfig::load_or_default();
    let _log_guard = init_logging(&config.log, &config.effective_log_dir());

    tracing::info!("Starting outrig");

    let profiles_dir = config.effective_profiles_dir();
    let store = ProfileStore::load_dir(&profiles_dir)
        .with_context(|| format!("Failed to load profiles from {}", profiles_dir.display()))?;
    tracing::info!(
        "Loaded {} profile(s) from {}",
        store.len(),
        profiles_dir.display()
    );

    let (packet_tx, packet_rx) = crossbeam_channel::bounded(PACKET_QUEUE);
    let provider = Box::new(StandardProvider::new(config.dispatch.clone()));
    let options = EngineOptions::from_config(&config, store.bindings());
    let engine = OutputEngine::spawn(options, packet_rx, provider);

    if config.listener.enabled {
        spawn_listener(&config.listener.bind, packet_tx.clone())?;
    } else {
        tracing::info!("Network listener disabled");
    }

    if config.demo {
        let (profile, process) = demo_session();
        tracing::info!("Demo mode: polling simulated game '{}'", process.name());
        engine.start(profile, Box::new(process));
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        })
        .context("Failed to install the interrupt handler")?;
    }

    run_event_loop(&engine, &store, &interrupted);

    tracing::info!("Shutting down");
    engine.shutdown();
    Ok(())
}

/// Initialize the tracing stack: console layer plus an optional daily
/// rolling file under the log directory
///
/// Returns the appender guard; dropping it flushes buffered log lines,
/// so the caller holds it for the process lifetime.
fn init_logging(
    settings: &LogSettings,
    log_dir: &Path,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    if settings.file_logging {
        match std::fs::create_dir_all(log_dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(log_dir, "outrig.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(writer)
                            .with_ansi(false),
                    )
                    .init();
                return Some(guard);
            }
            Err(e) => {
                registry.init();
                tracing::warn!(
                    "Failed to create log directory {}: {}, console only",
                    log_dir.display(),
                    e
                );
                return None;
            }
        }
    }

    registry.init();
    None
}

/// Accept emulator connections and feed parsed packets to the engine
fn spawn_listener(bind: &str, packet_tx: Sender<RawPacket>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .with_context(|| format!("Failed to bind the listener on {bind}"))?;
    tracing::info!("Listening for emulator connections on {}", bind);

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let packet_tx = packet_tx.clone();
                    std::thread::spawn(move || serve_connection(stream, packet_tx));
                }
                Err(e) => tracing::warn!("Failed to accept a connection: {}", e),
            }
        }
    });

    Ok(())
}

/// Read newline-delimited `key=value` pairs from one emulator connection
fn serve_connection(stream: TcpStream, packet_tx: Sender<RawPacket>) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::info!("Emulator connected from {}", peer);

    let reader = std::io::BufReader::new(stream);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        let Some(packet) = wire::parse_kv_line(&line) else {
            tracing::trace!("Ignoring malformed line from {}: {:?}", peer, line);
            continue;
        };
        if packet_tx.send(packet).is_err() {
            return;
        }
    }

    tracing::info!("Emulator disconnected: {}", peer);
}

/// React to engine events until interrupted
fn run_event_loop(engine: &EngineHandle, store: &ProfileStore, interrupted: &AtomicBool) {
    while !interrupted.load(Ordering::SeqCst) {
        let Some(event) = engine.recv_timeout(Duration::from_millis(100)) else {
            continue;
        };

        match event {
            EngineEvent::Detection(DetectionEvent::Matched { profile, game }) => {
                tracing::info!("Game '{}' matched profile '{}'", game, profile);
                match store.get(&profile) {
                    Some(matched) => {
                        // Outputs arrive as packets by label; no memory
                        // attach, so no poll ticks run
                        engine.start_stream(matched.clone());
                    }
                    None => {
                        tracing::warn!("Matched profile '{}' is gone from the store", profile)
                    }
                }
            }
            EngineEvent::Detection(DetectionEvent::Reset) => {
                tracing::info!("Emulator session ended");
                engine.stop();
            }
            EngineEvent::Detection(DetectionEvent::NoMatch { game }) => {
                tracing::info!("No profile for game '{}'", game);
            }
            EngineEvent::Detection(event) => {
                tracing::debug!("Detection: {:?}", event);
            }
            EngineEvent::Status(status) => {
                tracing::info!("Engine status: {}", status);
            }
            EngineEvent::Metrics(snapshot) => {
                tracing::debug!(
                    "{:.1} polls/s, avg {:.0}us, {} skipped, {} failed samples",
                    snapshot.polls_per_second,
                    snapshot.avg_poll_us,
                    snapshot.skipped_polls,
                    snapshot.failed_samples
                );
            }
            EngineEvent::ModulesReconciled { old, new, changed } => {
                tracing::info!("Module '{}' renamed to '{}' ({} outputs)", old, new, changed);
            }
            EngineEvent::DispatchError { device, error } => {
                tracing::debug!("Dispatch error on {}: {}", device, error);
            }
            EngineEvent::TickBatch(batch) => {
                tracing::trace!("Tick batch of {} value(s)", batch.len());
            }
            EngineEvent::Record(record) => {
                tracing::trace!("{} = {}", record.key, record.last_value);
            }
            EngineEvent::Shutdown => break,
        }
    }
}

/// Build the demo profile and its simulated game process
///
/// The patterns sweep the transform and format stages without any real
/// emulator or devices attached; values show up in the logs.
fn demo_session() -> (Profile, MockProcess) {
    let mut process = MockProcess::new("demo");
    process.add_region(0x1000, 64);
    process.set_pattern(
        0x1000,
        ValueKind::F32,
        MockPattern::Sine {
            frequency: 0.2,
            amplitude: 120.0,
            offset: 120.0,
        },
    );
    process.set_pattern(
        0x1008,
        ValueKind::U8,
        MockPattern::Square {
            period: 2.0,
            amplitude: 1.0,
        },
    );
    process.set_pattern(
        0x1010,
        ValueKind::U32,
        MockPattern::Counter {
            step: 1.0,
            min: 0.0,
            max: 9999.0,
        },
    );

    let profile = Profile::new("demo", "demo")
        .with_output(
            OutputDescriptor::new(
                "speed",
                AddressKind::Absolute { address: 0x1000 },
                ValueKind::F32,
            )
            .with_format("0"),
        )
        .with_output(OutputDescriptor::new(
            "shift_lamp",
            AddressKind::Absolute { address: 0x1008 },
            ValueKind::U8,
        ))
        .with_output(
            OutputDescriptor::new(
                "score",
                AddressKind::Absolute { address: 0x1010 },
                ValueKind::U32,
            )
            .with_transform("value * 10")
            .with_format("Score: {value}"),
        );

    (profile, process)
}
