//! Test data builders for creating test objects

use outrig::types::{AddressKind, DeviceTarget, OutputDescriptor, ValueKind};
use outrig::{MockProcess, Profile};

/// Builder for creating test output descriptors
pub struct OutputBuilder {
    label: String,
    address: u64,
    kind: ValueKind,
    transform: Option<String>,
    format: Option<String>,
    targets: Vec<DeviceTarget>,
}

impl OutputBuilder {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            address: 0x1000,
            kind: ValueKind::U32,
            transform: None,
            format: None,
            targets: Vec::new(),
        }
    }

    pub fn address(mut self, address: u64) -> Self {
        self.address = address;
        self
    }

    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn transform(mut self, script: &str) -> Self {
        self.transform = Some(script.to_string());
        self
    }

    pub fn format(mut self, spec: &str) -> Self {
        self.format = Some(spec.to_string());
        self
    }

    pub fn led(mut self, host: &str, segment: u32) -> Self {
        self.targets.push(DeviceTarget::LedSegment {
            host: host.to_string(),
            segment,
        });
        self
    }

    pub fn serial(mut self, port: &str, command: &str) -> Self {
        self.targets.push(DeviceTarget::Serial {
            port: port.to_string(),
            baud: 115_200,
            command: command.to_string(),
        });
        self
    }

    pub fn relay(mut self, vendor_id: u16, product_id: u16, channel: u8) -> Self {
        self.targets.push(DeviceTarget::HidRelay {
            vendor_id,
            product_id,
            device_index: 0,
            channel,
        });
        self
    }

    pub fn build(self) -> OutputDescriptor {
        let mut descriptor = OutputDescriptor::new(
            self.label,
            AddressKind::Absolute {
                address: self.address,
            },
            self.kind,
        );
        if let Some(script) = self.transform {
            descriptor = descriptor.with_transform(script);
        }
        if let Some(spec) = self.format {
            descriptor = descriptor.with_format(spec);
        }
        for target in self.targets {
            descriptor = descriptor.with_target(target);
        }
        descriptor
    }
}

/// A profile with one mapped memory region backing its outputs
pub fn mapped_profile(outputs: Vec<OutputDescriptor>) -> (Profile, MockProcess) {
    let mut process = MockProcess::new("game.exe");
    process.add_region(0x1000, 256);

    let mut profile = Profile::new("test-cab", "testgame");
    for output in outputs {
        profile = profile.with_output(output);
    }

    (profile, process)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_builder() {
        let descriptor = OutputBuilder::new("rpm")
            .address(0x1010)
            .kind(ValueKind::F32)
            .transform("value / 100")
            .led("wled.local", 2)
            .build();

        assert_eq!(descriptor.label, "rpm");
        assert_eq!(descriptor.kind, ValueKind::F32);
        assert_eq!(descriptor.targets.len(), 1);
    }
}
