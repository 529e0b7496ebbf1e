//! Mock device backends for tests and demo mode
//!
//! [`MockProvider`] hands out recording backends instead of touching
//! hardware. All state lives behind [`Arc`]s so a clone kept by the
//! test still sees everything after the provider moves into the
//! dispatcher. Failures can be injected per device, both at open and
//! at apply time.

use crate::device::{BackendProvider, DeviceBackend};
use crate::error::{OutrigError, Result};
use crate::types::{DeviceKey, DeviceTarget, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One value as a backend received it
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedCommand {
    /// Device the command went to
    pub device: DeviceKey,
    /// Exact target within the device
    pub target: DeviceTarget,
    /// Dispatched value
    pub value: Value,
    /// Formatted display string
    pub display: String,
}

/// A backend that records instead of writing to hardware
pub struct MockBackend {
    device: DeviceKey,
    applied: Arc<Mutex<Vec<AppliedCommand>>>,
    fail: Arc<AtomicBool>,
}

impl DeviceBackend for MockBackend {
    fn apply(&mut self, value: &Value, target: &DeviceTarget, display: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OutrigError::Device(format!(
                "injected apply failure on {}",
                self.device
            )));
        }
        if let Ok(mut log) = self.applied.lock() {
            log.push(AppliedCommand {
                device: self.device.clone(),
                target: target.clone(),
                value: value.clone(),
                display: display.to_string(),
            });
        }
        Ok(())
    }
}

/// Provider handing out recording backends
#[derive(Clone, Default)]
pub struct MockProvider {
    applied: Arc<Mutex<Vec<AppliedCommand>>>,
    opened: Arc<Mutex<Vec<DeviceKey>>>,
    open_attempts: Arc<Mutex<HashMap<DeviceKey, usize>>>,
    fail_open: Arc<Mutex<HashSet<DeviceKey>>>,
    fail_apply: Arc<Mutex<HashMap<DeviceKey, Arc<AtomicBool>>>>,
}

impl MockProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command applied across all backends, in order
    pub fn applied(&self) -> Vec<AppliedCommand> {
        self.applied.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Commands applied to one device, in order
    pub fn applied_for(&self, device: &DeviceKey) -> Vec<AppliedCommand> {
        self.applied()
            .into_iter()
            .filter(|cmd| cmd.device == *device)
            .collect()
    }

    /// Devices opened successfully, in order
    pub fn opened(&self) -> Vec<DeviceKey> {
        self.opened.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// How many open attempts a device has seen, successful or not
    pub fn open_attempts(&self, device: &DeviceKey) -> usize {
        self.open_attempts
            .lock()
            .map(|counts| counts.get(device).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Make every open attempt for a device fail
    pub fn fail_open(&self, device: &DeviceKey) {
        if let Ok(mut failing) = self.fail_open.lock() {
            failing.insert(device.clone());
        }
    }

    /// Let a device open again
    pub fn allow_open(&self, device: &DeviceKey) {
        if let Ok(mut failing) = self.fail_open.lock() {
            failing.remove(device);
        }
    }

    /// Toggle apply failures for a device's backends
    ///
    /// Affects backends already handed out as well as future ones.
    pub fn set_apply_failure(&self, device: &DeviceKey, failing: bool) {
        self.apply_flag(device).store(failing, Ordering::SeqCst);
    }

    fn apply_flag(&self, device: &DeviceKey) -> Arc<AtomicBool> {
        match self.fail_apply.lock() {
            Ok(mut flags) => flags.entry(device.clone()).or_default().clone(),
            Err(_) => Arc::new(AtomicBool::new(false)),
        }
    }
}

impl BackendProvider for MockProvider {
    fn open(&mut self, target: &DeviceTarget) -> Result<Box<dyn DeviceBackend>> {
        let key = target.device_key();

        if let Ok(mut attempts) = self.open_attempts.lock() {
            *attempts.entry(key.clone()).or_insert(0) += 1;
        }

        let failing = self
            .fail_open
            .lock()
            .map(|set| set.contains(&key))
            .unwrap_or(false);
        if failing {
            return Err(OutrigError::Device(format!(
                "injected open failure on {}",
                key
            )));
        }

        if let Ok(mut opened) = self.opened.lock() {
            opened.push(key.clone());
        }

        Ok(Box::new(MockBackend {
            device: key.clone(),
            applied: self.applied.clone(),
            fail: self.apply_flag(&key),
        }))
    }
}
