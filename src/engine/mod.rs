//! Engine module - polling, decoding, and dispatch behind channels
//!
//! The engine runs three worker threads and exposes everything through
//! a single [`EngineHandle`]:
//!
//! - The **poll worker** samples process memory on a fixed cadence,
//!   applies transforms, and hands batches to the dispatcher
//! - The **message pump** decodes raw emulator packets into output
//!   records and drives game detection
//! - The **device dispatcher** fans transformed values out to LED
//!   controllers, relay boards, and serial devices
//!
//! All channels are bounded. When a consumer falls behind, batches and
//! events are dropped and counted rather than queued without limit, so
//! the poll cadence never degrades.
//!
//! # Example
//!
//! ```ignore
//! use outrig::engine::{EngineOptions, OutputEngine};
//!
//! let (packet_tx, packet_rx) = crossbeam_channel::bounded(256);
//! let provider = Box::new(outrig::device::StandardProvider::new(settings));
//! let engine = OutputEngine::spawn(EngineOptions::default(), packet_rx, provider);
//!
//! engine.start(profile, process);
//! for event in engine.drain() {
//!     // react to records, detections, batches
//! }
//! engine.shutdown();
//! ```

pub mod metrics;
pub mod worker;

pub use metrics::{PollMetrics, RECENT_WINDOW_SIZE};
pub use worker::{MessagePump, PollWorker};

use crate::config::AppConfig;
use crate::device::{BackendProvider, DispatchError, Dispatcher};
use crate::message::{DetectionEvent, GameBinding, MessageDecoder};
use crate::process::ProcessMemory;
use crate::profile::Profile;
use crate::types::{
    DeviceKey, EngineStatus, MetricsSnapshot, OutputRecord, RawPacket, TransformedValue,
    DEFAULT_POLL_INTERVAL_MS,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Command queue capacity
const COMMAND_QUEUE: usize = 256;

/// Event queue capacity. Bounded for backpressure so a stalled
/// embedder cannot grow memory without limit; roomy enough for several
/// seconds of tick batches.
const EVENT_QUEUE: usize = 10_000;

/// Dispatch queue capacity between poll worker and dispatcher
const BATCH_QUEUE: usize = 256;

/// Record queue capacity between message pump and poll worker
const RECORD_QUEUE: usize = 256;

/// Commands accepted by the engine
pub enum EngineCommand {
    /// Start a session for a profile
    ///
    /// With a process attached the poll worker samples memory on the
    /// tick cadence. Without one the session is stream-only: outputs
    /// are fed by message records and no poll ticks run.
    Start {
        /// Profile to run
        profile: Box<Profile>,
        /// Memory capability for the target process, if any
        process: Option<Box<dyn ProcessMemory>>,
    },
    /// Stop polling and discard unsent work
    Stop,
    /// Change the tick interval
    SetPollInterval(Duration),
    /// Rewrite module names in the active profile
    ReconcileModules {
        /// Module name to replace, matched case-insensitively
        old: String,
        /// Replacement module name
        new: String,
    },
    /// Request an immediate metrics snapshot
    RequestMetrics,
    /// Stop all engine threads
    Shutdown,
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineCommand::Start { profile, .. } => f
                .debug_struct("Start")
                .field("profile", &profile.name)
                .finish_non_exhaustive(),
            EngineCommand::Stop => write!(f, "Stop"),
            EngineCommand::SetPollInterval(interval) => {
                f.debug_tuple("SetPollInterval").field(interval).finish()
            }
            EngineCommand::ReconcileModules { old, new } => f
                .debug_struct("ReconcileModules")
                .field("old", old)
                .field("new", new)
                .finish(),
            EngineCommand::RequestMetrics => write!(f, "RequestMetrics"),
            EngineCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Events emitted by the engine to the embedding application
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Engine run state changed
    Status(EngineStatus),
    /// One tick's transformed values, in profile order
    TickBatch(Vec<TransformedValue>),
    /// An output record changed through the message stream
    Record(OutputRecord),
    /// Game detection progressed
    Detection(DetectionEvent),
    /// Periodic poll metrics snapshot
    Metrics(MetricsSnapshot),
    /// A device failed to open or apply
    DispatchError {
        /// Device that failed
        device: DeviceKey,
        /// What went wrong
        error: DispatchError,
    },
    /// Module names were rewritten in the active profile
    ModulesReconciled {
        /// Module name that was replaced
        old: String,
        /// Replacement module name
        new: String,
        /// Number of outputs changed
        changed: usize,
    },
    /// The poll worker has exited
    Shutdown,
}

/// Options for spawning an engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Default tick interval, overridable per profile
    pub poll_interval: Duration,
    /// How often metrics snapshots are emitted
    pub metrics_interval: Duration,
    /// How long detection waits for a game name after a start
    pub detection_timeout: Duration,
    /// Game bindings for detection, in match priority order
    pub bindings: Vec<GameBinding>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            metrics_interval: Duration::from_millis(500),
            detection_timeout: Duration::from_secs(10),
            bindings: Vec::new(),
        }
    }
}

impl EngineOptions {
    /// Build options from the application config and a binding set
    pub fn from_config(config: &AppConfig, bindings: Vec<GameBinding>) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            metrics_interval: config.metrics_interval(),
            detection_timeout: config.detection.timeout(),
            bindings,
        }
    }
}

/// The output engine entry point
pub struct OutputEngine;

impl OutputEngine {
    /// Spawn the poll worker, message pump, and device dispatcher
    ///
    /// `packet_rx` feeds the message pump; the network listener or the
    /// embedding application owns the sending side. `provider` opens
    /// device backends on demand.
    pub fn spawn(
        options: EngineOptions,
        packet_rx: Receiver<RawPacket>,
        provider: Box<dyn BackendProvider>,
    ) -> EngineHandle {
        let (cmd_tx, cmd_rx) = bounded(COMMAND_QUEUE);
        let (event_tx, event_rx) = bounded(EVENT_QUEUE);
        let (batch_tx, batch_rx) = bounded(BATCH_QUEUE);
        let (record_tx, record_rx) = bounded(RECORD_QUEUE);
        let running = Arc::new(AtomicBool::new(true));

        let mut poll_worker = PollWorker::new(
            options.poll_interval,
            options.metrics_interval,
            cmd_rx,
            record_rx,
            event_tx.clone(),
            batch_tx,
            running.clone(),
        );

        let mut decoder = MessageDecoder::new(options.detection_timeout);
        decoder.set_bindings(options.bindings);
        let mut pump = MessagePump::new(
            decoder,
            packet_rx,
            event_tx.clone(),
            record_tx,
            running.clone(),
        );

        let mut dispatcher = Dispatcher::new(provider, batch_rx, event_tx, running.clone());

        let threads = vec![
            std::thread::spawn(move || poll_worker.run()),
            std::thread::spawn(move || pump.run()),
            std::thread::spawn(move || dispatcher.run()),
        ];

        EngineHandle {
            command_sender: cmd_tx,
            event_receiver: event_rx,
            running,
            threads,
        }
    }
}

/// Handle to a running engine
///
/// Owns the command sender, the event receiver, and the worker thread
/// handles. Dropping the handle without calling [`shutdown`] leaves the
/// threads running until their channels disconnect.
///
/// [`shutdown`]: EngineHandle::shutdown
pub struct EngineHandle {
    /// Sender for engine commands
    command_sender: Sender<EngineCommand>,
    /// Receiver for engine events
    event_receiver: Receiver<EngineEvent>,
    /// Running flag shared with the worker threads
    running: Arc<AtomicBool>,
    /// Worker thread handles
    threads: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Send a command to the engine
    pub fn send_command(&self, cmd: EngineCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    /// Start polling a profile against a process
    pub fn start(&self, profile: Profile, process: Box<dyn ProcessMemory>) {
        let _ = self.command_sender.send(EngineCommand::Start {
            profile: Box::new(profile),
            process: Some(process),
        });
    }

    /// Start a stream-only session with no memory attach
    ///
    /// Outputs reach their devices through message records alone; the
    /// poll worker runs no ticks, so addressed outputs never produce
    /// resolution failures.
    pub fn start_stream(&self, profile: Profile) {
        let _ = self.command_sender.send(EngineCommand::Start {
            profile: Box::new(profile),
            process: None,
        });
    }

    /// Stop polling
    pub fn stop(&self) {
        let _ = self.command_sender.send(EngineCommand::Stop);
    }

    /// Change the tick interval
    pub fn set_poll_interval(&self, interval: Duration) {
        let _ = self
            .command_sender
            .send(EngineCommand::SetPollInterval(interval));
    }

    /// Rewrite module names in the active profile
    pub fn reconcile_modules(&self, old: impl Into<String>, new: impl Into<String>) {
        let _ = self.command_sender.send(EngineCommand::ReconcileModules {
            old: old.into(),
            new: new.into(),
        });
    }

    /// Request an immediate metrics snapshot
    pub fn request_metrics(&self) {
        let _ = self.command_sender.send(EngineCommand::RequestMetrics);
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_receiver.try_recv().ok()
    }

    /// Receive all pending events
    pub fn drain(&self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Whether the engine threads are still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop all engine threads and wait for them to exit
    pub fn shutdown(mut self) {
        let _ = self.command_sender.send(EngineCommand::Shutdown);
        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("An engine thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockProvider;
    use crate::message::wire;
    use crate::process::MockProcess;
    use crate::types::{AddressKind, DeviceTarget, OutputDescriptor, ValueKind};
    use std::time::Instant;

    fn spawn_test_engine(
        bindings: Vec<GameBinding>,
    ) -> (EngineHandle, Sender<RawPacket>, MockProvider) {
        let (packet_tx, packet_rx) = bounded(64);
        let provider = MockProvider::new();
        let options = EngineOptions {
            poll_interval: Duration::from_millis(5),
            metrics_interval: Duration::from_millis(100),
            detection_timeout: Duration::from_secs(1),
            bindings,
        };
        let engine = OutputEngine::spawn(options, packet_rx, Box::new(provider.clone()));
        (engine, packet_tx, provider)
    }

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn test_spawn_and_shutdown() {
        let (engine, _packet_tx, _provider) = spawn_test_engine(Vec::new());
        assert!(engine.is_running());
        engine.shutdown();
    }

    #[test]
    fn test_engine_polls_and_dispatches() {
        let (engine, _packet_tx, provider) = spawn_test_engine(Vec::new());

        let mut process = MockProcess::new("game.exe");
        process.add_region(0x1000, 16);
        process.write_value(0x1000, 200u32);

        let profile = Profile::new("cab", "game").with_output(
            OutputDescriptor::new(
                "rpm",
                AddressKind::Absolute { address: 0x1000 },
                ValueKind::U32,
            )
            .with_target(DeviceTarget::LedSegment {
                host: "wled.local".to_string(),
                segment: 0,
            }),
        );

        engine.start(profile, Box::new(process));

        let dispatched = wait_until(Duration::from_secs(2), || !provider.applied().is_empty());
        assert!(dispatched, "no value reached the mock device");

        let applied = provider.applied();
        assert_eq!(applied[0].value, crate::types::Value::Number(200.0));

        let events = engine.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Status(EngineStatus::Running))));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::TickBatch(_))));

        engine.shutdown();
    }

    #[test]
    fn test_engine_detection_through_packets() {
        let bindings = vec![GameBinding::new("daytona-cab", "daytona")];
        let (engine, packet_tx, _provider) = spawn_test_engine(bindings);

        packet_tx
            .send(RawPacket::value(wire::START_KEY, 1))
            .unwrap();
        packet_tx
            .send(RawPacket::text(wire::GAME_NAME_KEY, "daytona"))
            .unwrap();

        let mut matched_profile = None;
        let found = wait_until(Duration::from_secs(2), || {
            while let Some(event) = engine.try_recv() {
                if let EngineEvent::Detection(DetectionEvent::Matched { profile, .. }) = event {
                    matched_profile = Some(profile);
                }
            }
            matched_profile.is_some()
        });

        assert!(found, "detection never matched");
        assert_eq!(matched_profile.as_deref(), Some("daytona-cab"));

        engine.shutdown();
    }

    #[test]
    fn test_message_record_reaches_device() {
        let (engine, packet_tx, provider) = spawn_test_engine(Vec::new());

        let mut process = MockProcess::new("game.exe");
        process.add_region(0x1000, 16);

        let profile = Profile::new("cab", "game").with_output(
            OutputDescriptor::new(
                "lamp0",
                AddressKind::Absolute { address: 0x1000 },
                ValueKind::U8,
            )
            .with_target(DeviceTarget::LedSegment {
                host: "wled.local".to_string(),
                segment: 1,
            }),
        );

        engine.start(profile, Box::new(process));
        let started = wait_until(Duration::from_secs(2), || {
            engine
                .drain()
                .iter()
                .any(|e| matches!(e, EngineEvent::Status(EngineStatus::Running)))
        });
        assert!(started, "engine never reported running");

        packet_tx.send(RawPacket::value("lamp0", 7)).unwrap();

        // Memory holds zero, so only the message path can produce a 7
        let arrived = wait_until(Duration::from_secs(2), || {
            provider
                .applied()
                .iter()
                .any(|cmd| cmd.value == crate::types::Value::Number(7.0))
        });
        assert!(arrived, "record value never reached the mock device");

        engine.shutdown();
    }

    #[test]
    fn test_stream_session_metrics_stay_clean() {
        let (engine, packet_tx, provider) = spawn_test_engine(Vec::new());

        // An addressed output with no process attached: only the
        // message path can feed it
        let profile = Profile::new("cab", "game").with_output(
            OutputDescriptor::new(
                "lamp0",
                AddressKind::ModuleOffset {
                    module: "game.dll".to_string(),
                    offset: 0x10,
                },
                ValueKind::U8,
            )
            .with_target(DeviceTarget::LedSegment {
                host: "wled.local".to_string(),
                segment: 1,
            }),
        );

        engine.start_stream(profile);

        packet_tx.send(RawPacket::value("lamp0", 9)).unwrap();

        let arrived = wait_until(Duration::from_secs(2), || {
            provider
                .applied()
                .iter()
                .any(|cmd| cmd.value == crate::types::Value::Number(9.0))
        });
        assert!(arrived, "record value never reached the mock device");

        // The session ran long enough to dispatch, yet never polled,
        // so no resolution failures accumulate
        engine.request_metrics();
        let mut snapshot = None;
        wait_until(Duration::from_secs(2), || {
            snapshot = engine.drain().into_iter().find_map(|e| match e {
                EngineEvent::Metrics(m) => Some(m),
                _ => None,
            });
            snapshot.is_some()
        });
        let snapshot = snapshot.expect("no metrics snapshot arrived");
        assert_eq!(snapshot.total_polls, 0);
        assert_eq!(snapshot.failed_samples, 0);

        engine.shutdown();
    }

    #[test]
    fn test_metrics_events_arrive() {
        let (engine, _packet_tx, _provider) = spawn_test_engine(Vec::new());

        let mut process = MockProcess::new("game.exe");
        process.add_region(0x1000, 16);
        let profile = Profile::new("cab", "game").with_output(OutputDescriptor::new(
            "x",
            AddressKind::Absolute { address: 0x1000 },
            ValueKind::U8,
        ));
        engine.start(profile, Box::new(process));

        let mut saw_metrics = false;
        wait_until(Duration::from_secs(2), || {
            saw_metrics |= engine
                .drain()
                .iter()
                .any(|e| matches!(e, EngineEvent::Metrics(_)));
            saw_metrics
        });
        assert!(saw_metrics, "no metrics snapshot arrived");

        engine.shutdown();
    }
}
