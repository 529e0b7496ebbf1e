//! USB HID relay board backend
//!
//! Drives the common HID relay boards (dcttech/ucreatefun style) that
//! switch mains loads: solenoids, contactors, cabinet lamps. Channels
//! are 1-based and switched individually with a feature report.
//!
//! A value switches its channel by truthiness: zero or empty text is
//! off, everything else is on.

use crate::device::DeviceBackend;
use crate::error::{OutrigError, Result};
use crate::types::{DeviceTarget, Value};
use hidapi::{HidApi, HidDevice};

/// Feature report opcode to close a relay channel
const RELAY_ON: u8 = 0xFF;

/// Feature report opcode to open a relay channel
const RELAY_OFF: u8 = 0xFD;

/// Build the 9-byte feature report for one channel switch
///
/// Byte 0 is the report id, byte 1 the opcode, byte 2 the channel.
pub(crate) fn relay_report(channel: u8, on: bool) -> [u8; 9] {
    let mut report = [0u8; 9];
    report[1] = if on { RELAY_ON } else { RELAY_OFF };
    report[2] = channel;
    report
}

/// One open relay board
pub struct HidRelayBackend {
    device: HidDevice,
    label: String,
}

impl HidRelayBackend {
    /// Open the nth board matching a vendor and product id
    pub fn open(api: &mut HidApi, vendor_id: u16, product_id: u16, device_index: u8) -> Result<Self> {
        let label = format!("{:04x}:{:04x}#{}", vendor_id, product_id, device_index);
        let info = api
            .device_list()
            .filter(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
            .nth(device_index as usize)
            .ok_or_else(|| OutrigError::Device(format!("No HID relay board {}", label)))?;
        let device = info.open_device(api)?;
        tracing::debug!("Opened HID relay board {}", label);
        Ok(Self { device, label })
    }

    /// Switch one channel
    fn write_channel(&mut self, channel: u8, on: bool) -> Result<()> {
        let report = relay_report(channel, on);
        self.device.send_feature_report(&report)?;
        tracing::trace!(
            "Relay {} channel {} -> {}",
            self.label,
            channel,
            if on { "on" } else { "off" }
        );
        Ok(())
    }
}

impl DeviceBackend for HidRelayBackend {
    fn apply(&mut self, value: &Value, target: &DeviceTarget, _display: &str) -> Result<()> {
        let DeviceTarget::HidRelay { channel, .. } = target else {
            return Err(OutrigError::Device(format!(
                "Relay backend {} received a non-relay target",
                self.label
            )));
        };
        self.write_channel(*channel, value.is_truthy())
    }
}
