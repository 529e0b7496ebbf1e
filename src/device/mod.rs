//! Device dispatch module
//!
//! Routes transformed output values to physical devices. Each batch
//! from the poll worker fans out to the targets named by its values:
//! LED strip controllers over HTTP, USB HID relay boards, and serial
//! devices.
//!
//! # Main Types
//!
//! - [`DeviceBackend`] - One open device connection that applies values
//! - [`BackendProvider`] - Opens backends for targets on demand
//! - [`Dispatcher`] - The dispatch thread: lazy opens, change
//!   suppression, per-device failure isolation
//! - [`DispatchError`] - Per-device failure classification on events
//! - [`StandardProvider`] - Production provider for LED, HID and serial
//!
//! # Failure Isolation
//!
//! A device that fails to open or apply is closed and reported, then
//! retried after a cooldown. Other devices keep receiving values; one
//! unplugged relay board never stalls the LED strip.
//!
//! # Change Suppression
//!
//! Commands are absolute (set brightness, set relay state), so
//! re-sending an unchanged value is a no-op on the device. The
//! dispatcher tracks the last value sent per device and label and only
//! writes on change. A freshly opened device always receives the next
//! value so it starts from current state.

pub mod led;
pub mod mock;
pub mod relay;
pub mod serial;

pub use led::LedBackend;
pub use mock::{AppliedCommand, MockBackend, MockProvider};
pub use relay::HidRelayBackend;
pub use serial::SerialBackend;

use crate::config::DispatchSettings;
use crate::engine::EngineEvent;
use crate::error::{OutrigError, Result};
use crate::types::{DeviceKey, DeviceTarget, TransformedValue, Value};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a failed device stays closed before another open attempt
const OPEN_RETRY_COOLDOWN: Duration = Duration::from_secs(5);

/// Receive timeout for the dispatch loop
const DISPATCH_RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// How a dispatch attempt failed
///
/// Per-device outcomes carried on dispatch error events; they never
/// stop the dispatch loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// The device could not be opened
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// I/O against the open device failed
    #[error("device i/o failed: {0}")]
    Io(String),

    /// The backend or device refused the command
    #[error("command rejected: {0}")]
    Rejected(String),
}

impl DispatchError {
    /// Classify an apply failure: transport errors are I/O, everything
    /// else is the backend refusing the command
    fn from_apply(error: &OutrigError) -> Self {
        match error {
            OutrigError::Http(_)
            | OutrigError::Hid(_)
            | OutrigError::Serial(_)
            | OutrigError::Io(_) => DispatchError::Io(error.to_string()),
            other => DispatchError::Rejected(other.to_string()),
        }
    }
}

/// One open device connection
pub trait DeviceBackend: Send {
    /// Apply a value to a target on this device
    ///
    /// `display` is the formatted string for backends that write text,
    /// `value` the numeric/text value for backends that switch state.
    fn apply(&mut self, value: &Value, target: &DeviceTarget, display: &str) -> Result<()>;
}

/// Opens device backends for dispatch targets
pub trait BackendProvider: Send {
    /// Open a backend for the device a target belongs to
    fn open(&mut self, target: &DeviceTarget) -> Result<Box<dyn DeviceBackend>>;
}

/// Production provider covering all supported device families
pub struct StandardProvider {
    settings: DispatchSettings,
    hid: Option<hidapi::HidApi>,
}

impl StandardProvider {
    /// Create a provider with the given I/O settings
    pub fn new(settings: DispatchSettings) -> Self {
        Self {
            settings,
            hid: None,
        }
    }
}

impl BackendProvider for StandardProvider {
    fn open(&mut self, target: &DeviceTarget) -> Result<Box<dyn DeviceBackend>> {
        match target {
            DeviceTarget::LedSegment { host, .. } => {
                let backend = LedBackend::new(host, self.settings.http_timeout())?;
                Ok(Box::new(backend))
            }
            DeviceTarget::HidRelay {
                vendor_id,
                product_id,
                device_index,
                ..
            } => {
                // The HID context is created once and re-enumerated per
                // open so freshly plugged boards are found
                if self.hid.is_none() {
                    self.hid = Some(hidapi::HidApi::new()?);
                }
                let Some(api) = self.hid.as_mut() else {
                    return Err(OutrigError::Device("HID context unavailable".to_string()));
                };
                api.refresh_devices()?;
                let backend = HidRelayBackend::open(api, *vendor_id, *product_id, *device_index)?;
                Ok(Box::new(backend))
            }
            DeviceTarget::Serial { port, baud, .. } => {
                let backend = SerialBackend::open(port, *baud, self.settings.serial_timeout())?;
                Ok(Box::new(backend))
            }
        }
    }
}

/// The dispatch thread that feeds device backends
pub struct Dispatcher {
    /// Batch receiver from the poll worker
    batch_rx: Receiver<Vec<TransformedValue>>,
    /// Event sender to the embedding application
    event_tx: Sender<EngineEvent>,
    /// Running flag shared with the engine handle
    running: Arc<AtomicBool>,
    /// Backend factory
    provider: Box<dyn BackendProvider>,
    /// Open device connections
    backends: HashMap<DeviceKey, Box<dyn DeviceBackend>>,
    /// When each failed device last errored
    failed_at: HashMap<DeviceKey, Instant>,
    /// Last value sent per device and label for change suppression
    last_sent: HashMap<(DeviceKey, String), Value>,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        provider: Box<dyn BackendProvider>,
        batch_rx: Receiver<Vec<TransformedValue>>,
        event_tx: Sender<EngineEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            batch_rx,
            event_tx,
            running,
            provider,
            backends: HashMap::new(),
            failed_at: HashMap::new(),
            last_sent: HashMap::new(),
        }
    }

    /// Run the dispatch loop
    pub fn run(&mut self) {
        tracing::info!("Device dispatcher started");

        while self.running.load(Ordering::SeqCst) {
            match self.batch_rx.recv_timeout(DISPATCH_RECV_TIMEOUT) {
                Ok(batch) => self.dispatch_batch(&batch),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!("Device dispatcher stopped");
    }

    /// Fan a batch out to every target of every value
    fn dispatch_batch(&mut self, batch: &[TransformedValue]) {
        for value in batch {
            for target in &value.targets {
                self.dispatch_one(value, target);
            }
        }
    }

    /// Send one value to one target, isolating failures to its device
    fn dispatch_one(&mut self, value: &TransformedValue, target: &DeviceTarget) {
        let key = target.device_key();

        let sent_key = (key.clone(), value.label.clone());
        if self.last_sent.get(&sent_key) == Some(&value.dispatch) {
            return;
        }

        let result = match self.backend_for(&key, target) {
            Some(backend) => backend.apply(&value.dispatch, target, &value.display),
            None => return,
        };

        match result {
            Ok(()) => {
                tracing::trace!("Dispatched '{}' = {} to {}", value.label, value.display, key);
                self.last_sent.insert(sent_key, value.dispatch.clone());
            }
            Err(e) => {
                tracing::warn!("Dispatch to {} failed: {}", key, e);
                self.backends.remove(&key);
                self.failed_at.insert(key.clone(), Instant::now());
                self.report_error(key, DispatchError::from_apply(&e));
            }
        }
    }

    /// Get the open backend for a device, opening it if needed
    ///
    /// Returns None while the device is inside its failure cooldown or
    /// when opening fails.
    fn backend_for(
        &mut self,
        key: &DeviceKey,
        target: &DeviceTarget,
    ) -> Option<&mut Box<dyn DeviceBackend>> {
        if !self.backends.contains_key(key) {
            if let Some(failed) = self.failed_at.get(key) {
                if failed.elapsed() < OPEN_RETRY_COOLDOWN {
                    return None;
                }
            }
            match self.provider.open(target) {
                Ok(backend) => {
                    tracing::info!("Opened device {}", key);
                    self.failed_at.remove(key);
                    // A fresh handle must receive current state even if
                    // the value has not changed since the last send
                    self.last_sent.retain(|(device, _), _| device != key);
                    self.backends.insert(key.clone(), backend);
                }
                Err(e) => {
                    tracing::warn!("Failed to open device {}: {}", key, e);
                    self.failed_at.insert(key.clone(), Instant::now());
                    self.report_error(key.clone(), DispatchError::Unavailable(e.to_string()));
                    return None;
                }
            }
        }
        self.backends.get_mut(key)
    }

    /// Report a device error to the embedding application
    fn report_error(&self, device: DeviceKey, error: DispatchError) {
        let event = EngineEvent::DispatchError { device, error };
        if self.event_tx.try_send(event).is_err() {
            tracing::trace!("Event queue full, dropped a dispatch error");
        }
    }
}
