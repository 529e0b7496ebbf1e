//! Serial output backend
//!
//! Writes formatted command strings to a serial device: motor drivers,
//! custom cabinet controllers, anything line-driven. The target's
//! command template is rendered with the formatted display string and
//! written as-is, so the template controls framing and terminators.

use crate::device::DeviceBackend;
use crate::error::{OutrigError, Result};
use crate::types::{DeviceTarget, Value};
use std::io::Write;
use std::time::Duration;

/// Placeholder replaced with the formatted value in command templates
const VALUE_PLACEHOLDER: &str = "{value}";

/// Render a command template against a display string
pub(crate) fn render_command(template: &str, display: &str) -> String {
    template.replace(VALUE_PLACEHOLDER, display)
}

/// One open serial port
pub struct SerialBackend {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SerialBackend {
    /// Open a port at the given baud rate
    pub fn open(port_name: &str, baud: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(port_name, baud).timeout(timeout).open()?;
        tracing::debug!("Opened serial port {} at {} baud", port_name, baud);
        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl DeviceBackend for SerialBackend {
    fn apply(&mut self, _value: &Value, target: &DeviceTarget, display: &str) -> Result<()> {
        let DeviceTarget::Serial { command, .. } = target else {
            return Err(OutrigError::Device(format!(
                "Serial backend {} received a non-serial target",
                self.name
            )));
        };
        let line = render_command(command, display);
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_placeholder() {
        assert_eq!(render_command("S{value}\r", "1250"), "S1250\r");
    }

    #[test]
    fn test_render_replaces_every_occurrence() {
        assert_eq!(render_command("{value},{value}\n", "7"), "7,7\n");
    }

    #[test]
    fn test_render_without_placeholder_is_literal() {
        assert_eq!(render_command("RESET\r\n", "99"), "RESET\r\n");
    }
}
