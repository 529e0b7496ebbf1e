//! Engine Worker Thread Implementation
//!
//! This module contains the poll worker loop that runs in a separate
//! thread and samples process memory at a fixed cadence, plus the
//! message pump that decodes emulator packets. Both communicate with
//! the embedding application through crossbeam channels.
//!
//! # Responsibilities
//!
//! The poll worker handles:
//!
//! - **Command processing**: Responds to engine commands (start, stop, etc.)
//! - **Memory sampling**: Resolves every output descriptor once per tick
//! - **Value transformation**: Applies compiled transforms and formats
//! - **Statistics tracking**: Monitors tick timing, skips, and drops
//! - **Process loss**: Detects target exit and stops polling
//!
//! # Scheduling
//!
//! Ticks run against absolute deadlines. When a tick overruns its slot
//! the worker skips the missed slots and realigns to the next future
//! deadline instead of queueing catch-up ticks, so a stall never causes
//! a burst of stale samples. A stop that arrives while a tick is
//! resolving lets the tick finish but discards its results.

use crate::engine::metrics::PollMetrics;
use crate::engine::{EngineCommand, EngineEvent};
use crate::message::{MessageDecoder, MessageEvent};
use crate::process::{resolve, ProcessMemory};
use crate::profile::Profile;
use crate::transform::TransformPipeline;
use crate::types::{
    EngineStatus, OutputRecord, RawPacket, ResolvedSample, TransformedValue, Value,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sleep while idle with no active profile
const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Longest single sleep while waiting for the next deadline, so
/// commands stay responsive between ticks
const MAX_DEADLINE_WAIT: Duration = Duration::from_millis(5);

/// Receive timeout for the message pump, which doubles as the
/// detection timeout check cadence
const PUMP_RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// Advance a tick deadline past `now`, counting skipped slots
///
/// Returns the next future deadline and how many whole slots were
/// missed. A tick that finishes within its slot skips nothing.
pub(crate) fn advance_deadline(
    deadline: Instant,
    interval: Duration,
    now: Instant,
) -> (Instant, u64) {
    let mut next = deadline + interval;
    let mut skipped = 0u64;
    while next <= now {
        next += interval;
        skipped += 1;
    }
    (next, skipped)
}

/// The poll worker that samples process memory on a fixed cadence
pub struct PollWorker {
    /// Command receiver from the embedding application
    command_rx: Receiver<EngineCommand>,
    /// Commands pulled off the queue mid-tick, handled next iteration
    deferred: VecDeque<EngineCommand>,
    /// Record receiver from the message pump
    record_rx: Receiver<OutputRecord>,
    /// Event sender to the embedding application
    event_tx: Sender<EngineEvent>,
    /// Batch sender to the device dispatcher
    batch_tx: Sender<Vec<TransformedValue>>,
    /// Running flag shared with the engine handle
    running: Arc<AtomicBool>,
    /// Process memory capability for the active profile
    process: Option<Box<dyn ProcessMemory>>,
    /// Active profile
    profile: Option<Profile>,
    /// Compiled transforms for the active profile
    pipeline: TransformPipeline,
    /// Poll timing statistics
    metrics: PollMetrics,
    /// Current engine status
    status: EngineStatus,
    /// Tick interval
    poll_interval: Duration,
    /// Next absolute tick deadline
    next_deadline: Option<Instant>,
    /// How often metrics snapshots are emitted
    metrics_interval: Duration,
    /// Last time a metrics snapshot was sent
    last_metrics: Instant,
}

impl PollWorker {
    /// Create a new poll worker
    pub fn new(
        poll_interval: Duration,
        metrics_interval: Duration,
        command_rx: Receiver<EngineCommand>,
        record_rx: Receiver<OutputRecord>,
        event_tx: Sender<EngineEvent>,
        batch_tx: Sender<Vec<TransformedValue>>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            command_rx,
            deferred: VecDeque::new(),
            record_rx,
            event_tx,
            batch_tx,
            running,
            process: None,
            profile: None,
            pipeline: TransformPipeline::new(),
            metrics: PollMetrics::new(),
            status: EngineStatus::Idle,
            poll_interval,
            next_deadline: None,
            metrics_interval,
            last_metrics: Instant::now(),
        }
    }

    /// Run the main worker loop
    pub fn run(&mut self) {
        tracing::info!("Poll worker started");

        while self.running.load(Ordering::SeqCst) {
            // Process pending commands
            self.process_commands();

            // Route message-stream records to their output targets
            self.process_records();

            if self.status == EngineStatus::Running {
                self.tick_if_due();

                // Send metrics periodically
                if self.last_metrics.elapsed() >= self.metrics_interval {
                    self.send_metrics();
                    self.last_metrics = Instant::now();
                }
            } else {
                std::thread::sleep(IDLE_SLEEP);
            }
        }

        let _ = self.event_tx.send(EngineEvent::Shutdown);
        tracing::info!("Poll worker stopped");
    }

    /// Process pending commands from the embedding application
    ///
    /// Commands set aside during a tick are handled first so arrival
    /// order is preserved.
    fn process_commands(&mut self) {
        while let Some(cmd) = self.deferred.pop_front() {
            self.handle_command(cmd);
        }
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    /// Dispatch message-stream record updates through the transform stage
    ///
    /// A record whose key matches an output label of the active profile
    /// flows through that output's transform and format and reaches its
    /// device targets, the same path tick samples take. The channel is
    /// drained even while idle so stale records never pile up.
    fn process_records(&mut self) {
        while let Ok(record) = self.record_rx.try_recv() {
            if self.status != EngineStatus::Running {
                continue;
            }
            let transformed = {
                let Some(profile) = &self.profile else {
                    continue;
                };
                let Some(descriptor) = profile.outputs.iter().find(|d| d.label == record.key)
                else {
                    continue;
                };
                if descriptor.targets.is_empty() {
                    continue;
                }
                let sample = ResolvedSample::ok(
                    &descriptor.label,
                    Value::Number(f64::from(record.last_value)),
                );
                self.pipeline.apply(descriptor, &sample)
            };
            if self.batch_tx.try_send(vec![transformed]).is_err() {
                self.metrics.record_drop();
            }
        }
    }

    /// Handle a single command
    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Start { profile, process } => {
                self.start_polling(*profile, process);
            }
            EngineCommand::Stop => {
                self.stop_polling();
            }
            EngineCommand::SetPollInterval(interval) => {
                self.set_poll_interval(interval);
            }
            EngineCommand::ReconcileModules { old, new } => {
                self.reconcile_modules(&old, &new);
            }
            EngineCommand::RequestMetrics => {
                self.send_metrics();
            }
            EngineCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Begin a session for a profile
    ///
    /// With a process the tick deadline is armed and polling begins.
    /// Without one the session is stream-only: no deadline is set, so
    /// the tick path never runs and outputs are fed by records alone.
    fn start_polling(&mut self, profile: Profile, process: Option<Box<dyn ProcessMemory>>) {
        if let Some(interval) = profile.poll_interval_ms {
            self.poll_interval = Duration::from_millis(interval.max(1));
        }

        self.pipeline = TransformPipeline::new();
        self.pipeline.load_outputs(&profile.outputs);
        self.metrics.reset();

        if process.is_some() {
            self.next_deadline = Some(Instant::now());
            tracing::info!(
                "Started polling profile '{}' ({} outputs, {:?} interval)",
                profile.name,
                profile.outputs.len(),
                self.poll_interval
            );
        } else {
            self.next_deadline = None;
            tracing::info!(
                "Started stream session for profile '{}' ({} outputs)",
                profile.name,
                profile.outputs.len()
            );
        }

        self.profile = Some(profile);
        self.process = process;
        self.last_metrics = Instant::now();
        self.update_status(EngineStatus::Running);
    }

    /// Stop polling, discarding any unsent work
    fn stop_polling(&mut self) {
        if self.status == EngineStatus::Idle {
            return;
        }
        self.profile = None;
        self.process = None;
        self.next_deadline = None;
        self.pipeline = TransformPipeline::new();
        self.update_status(EngineStatus::Idle);
        tracing::info!("Stopped polling");
    }

    /// Change the tick interval and realign the deadline
    fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval.max(Duration::from_millis(1));
        if self.next_deadline.is_some() {
            self.next_deadline = Some(Instant::now() + self.poll_interval);
        }
        tracing::debug!("Poll interval set to {:?}", self.poll_interval);
    }

    /// Rewrite module names in the active profile
    fn reconcile_modules(&mut self, old: &str, new: &str) {
        let changed = match self.profile.as_mut() {
            Some(profile) => profile.reconcile_modules(old, new),
            None => {
                tracing::warn!("Reconcile requested with no active profile");
                0
            }
        };
        tracing::info!(
            "Reconciled module '{}' -> '{}' ({} outputs changed)",
            old,
            new,
            changed
        );
        self.try_send_event(EngineEvent::ModulesReconciled {
            old: old.to_string(),
            new: new.to_string(),
            changed,
        });
    }

    /// Run a tick when its deadline has passed, otherwise wait briefly
    fn tick_if_due(&mut self) {
        let Some(deadline) = self.next_deadline else {
            // Stream-only session: nothing to tick, stay responsive
            // to commands and records without spinning
            std::thread::sleep(IDLE_SLEEP);
            return;
        };

        let now = Instant::now();
        if now < deadline {
            std::thread::sleep((deadline - now).min(MAX_DEADLINE_WAIT));
            return;
        }

        let started = Instant::now();
        self.poll_tick();
        let elapsed_us = started.elapsed().as_micros() as u64;

        // Realign to the next future slot, never queueing missed ticks
        if self.next_deadline.is_some() {
            let (next, skipped) = advance_deadline(deadline, self.poll_interval, Instant::now());
            if skipped > 0 {
                self.metrics.record_skip(skipped);
                tracing::trace!("Tick overran its slot, skipped {} tick(s)", skipped);
            }
            self.next_deadline = Some(next);
            self.metrics.record_tick(elapsed_us);
        }
    }

    /// Sample every output once and hand the batch off
    fn poll_tick(&mut self) {
        let Some(profile) = self.profile.take() else {
            return;
        };
        let Some(mut process) = self.process.take() else {
            self.profile = Some(profile);
            return;
        };

        if !process.is_alive() {
            tracing::warn!("Target process exited, polling stopped");
            self.profile = Some(profile);
            self.next_deadline = None;
            self.update_status(EngineStatus::ProcessLost);
            return;
        }

        let mut batch = Vec::with_capacity(profile.outputs.len());
        let mut dispatchable = Vec::with_capacity(profile.outputs.len());
        let mut failures = 0u64;
        for descriptor in &profile.outputs {
            let sample = resolve(process.as_mut(), descriptor, profile.pointer_width);
            let value = self.pipeline.apply(descriptor, &sample);
            // Only successful reads reach devices; failures stay in the
            // batch as zeroes for observers and count toward metrics
            if sample.is_ok() {
                if !descriptor.targets.is_empty() {
                    dispatchable.push(value.clone());
                }
            } else {
                failures += 1;
            }
            batch.push(value);
        }

        self.profile = Some(profile);
        self.process = Some(process);

        if failures > 0 {
            self.metrics.record_failed_samples(failures);
        }

        // A session command that raced the tick wins: the tick
        // completes but its results are discarded, not dispatched
        while let Ok(command) = self.command_rx.try_recv() {
            self.deferred.push_back(command);
        }
        let interrupted = !self.running.load(Ordering::SeqCst)
            || self.deferred.iter().any(|command| {
                matches!(
                    command,
                    EngineCommand::Stop | EngineCommand::Shutdown | EngineCommand::Start { .. }
                )
            });
        if interrupted {
            tracing::debug!("Discarded a tick batch, a session command is pending");
            return;
        }

        if !dispatchable.is_empty() && self.batch_tx.try_send(dispatchable).is_err() {
            self.metrics.record_drop();
        }

        if !batch.is_empty() {
            self.try_send_event(EngineEvent::TickBatch(batch));
        }
    }

    /// Update engine status and notify the embedding application
    fn update_status(&mut self, status: EngineStatus) {
        self.status = status;
        let _ = self.event_tx.send(EngineEvent::Status(status));
    }

    /// Send a metrics snapshot
    fn send_metrics(&mut self) {
        self.try_send_event(EngineEvent::Metrics(self.metrics.snapshot()));
    }

    /// Try to send an event without blocking
    ///
    /// A full event queue only loses observability messages, never
    /// dispatched values, so dropping here is acceptable.
    fn try_send_event(&mut self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            tracing::trace!("Event queue full, dropped an engine event");
        }
    }
}

/// Pumps raw emulator packets through the message decoder
///
/// Runs on its own thread so a quiet poll loop never delays message
/// handling. The receive timeout drives the detection timeout check.
pub struct MessagePump {
    /// Raw packet receiver from the listener or embedding application
    packet_rx: Receiver<RawPacket>,
    /// Event sender to the embedding application
    event_tx: Sender<EngineEvent>,
    /// Record sender feeding the poll worker's dispatch path
    record_tx: Sender<OutputRecord>,
    /// Running flag shared with the engine handle
    running: Arc<AtomicBool>,
    /// Packet decoder and record table
    decoder: MessageDecoder,
}

impl MessagePump {
    /// Create a new message pump
    pub fn new(
        decoder: MessageDecoder,
        packet_rx: Receiver<RawPacket>,
        event_tx: Sender<EngineEvent>,
        record_tx: Sender<OutputRecord>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            packet_rx,
            event_tx,
            record_tx,
            running,
            decoder,
        }
    }

    /// Run the pump loop
    pub fn run(&mut self) {
        tracing::info!("Message pump started");

        while self.running.load(Ordering::SeqCst) {
            match self.packet_rx.recv_timeout(PUMP_RECV_TIMEOUT) {
                Ok(packet) => {
                    for event in self.decoder.handle_packet(&packet) {
                        self.forward(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(event) = self.decoder.tick() {
                        self.forward(event);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!("Message pump stopped");
    }

    /// Map a decoder event onto the engine event stream
    ///
    /// Record updates additionally feed the poll worker so outputs
    /// bound to message keys reach their devices.
    fn forward(&mut self, event: MessageEvent) {
        let engine_event = match event {
            MessageEvent::RecordUpdated(record) => {
                if self.record_tx.try_send(record.clone()).is_err() {
                    tracing::trace!(key = %record.key, "Record queue full, dropped an update");
                }
                EngineEvent::Record(record)
            }
            MessageEvent::Detection(detection) => EngineEvent::Detection(detection),
        };
        if self.event_tx.try_send(engine_event).is_err() {
            tracing::trace!("Event queue full, dropped a message event");
        }
    }
}
