//! Core data types for Outrig
//!
//! This module contains the fundamental data structures used throughout
//! the application for describing outputs, resolved samples, and the
//! message-stream records that drive output devices.
//!
//! # Main Types
//!
//! - [`ValueKind`] - Enum of supported memory value types (u8, u16, f32, text, etc.)
//! - [`Value`] - A decoded value, numeric or textual
//! - [`OutputDescriptor`] - Configuration for one output (address, chain, transform, targets)
//! - [`ResolvedSample`] - The outcome of one address resolution, success or failure
//! - [`TransformedValue`] - A sample after the transform pipeline, ready for dispatch
//! - [`RawPacket`] / [`OutputRecord`] - The message-stream model
//!
//! # Value Types
//!
//! Supports the data types emulator memory maps commonly use:
//! - Unsigned integers: u8, u16, u32, u64
//! - Signed integers: i8, i16, i32, i64
//! - Floating point: f32, f64
//! - Boolean values
//! - Fixed-length text (NUL-trimmed)
//!
//! All multi-byte reads decode little-endian.

use crate::process::ResolveError;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Default poll interval in milliseconds (roughly one emulator frame)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 16;

/// Represents the type of a value read from process memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ValueKind {
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    #[default]
    U32,
    /// 64-bit unsigned integer
    U64,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
    /// Boolean value
    Bool,
    /// Fixed-length text, trimmed at the first NUL byte
    Text(usize),
}

impl ValueKind {
    /// Returns the size in bytes of this value type
    pub fn size_bytes(&self) -> usize {
        match self {
            ValueKind::U8 | ValueKind::I8 | ValueKind::Bool => 1,
            ValueKind::U16 | ValueKind::I16 => 2,
            ValueKind::U32 | ValueKind::I32 | ValueKind::F32 => 4,
            ValueKind::U64 | ValueKind::I64 | ValueKind::F64 => 8,
            ValueKind::Text(len) => *len,
        }
    }

    /// Returns true if this type decodes to a number
    pub fn is_numeric(&self) -> bool {
        !matches!(self, ValueKind::Text(_))
    }

    /// Decode raw little-endian bytes into a [`Value`]
    pub fn decode(&self, bytes: &[u8]) -> Option<Value> {
        if bytes.len() < self.size_bytes() {
            return None;
        }

        Some(match self {
            ValueKind::U8 => Value::Number(bytes[0] as f64),
            ValueKind::I8 => Value::Number(bytes[0] as i8 as f64),
            ValueKind::Bool => Value::Number(if bytes[0] != 0 { 1.0 } else { 0.0 }),
            ValueKind::U16 => Value::Number(u16::from_le_bytes([bytes[0], bytes[1]]) as f64),
            ValueKind::I16 => Value::Number(i16::from_le_bytes([bytes[0], bytes[1]]) as f64),
            ValueKind::U32 => Value::Number(u32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]) as f64),
            ValueKind::I32 => Value::Number(i32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]) as f64),
            ValueKind::F32 => Value::Number(f32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]) as f64),
            ValueKind::U64 => Value::Number(u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as f64),
            ValueKind::I64 => Value::Number(i64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as f64),
            ValueKind::F64 => Value::Number(f64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            ValueKind::Text(len) => {
                let raw = &bytes[..*len];
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                Value::Text(String::from_utf8_lossy(&raw[..end]).into_owned())
            }
        })
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::U8 => write!(f, "u8"),
            ValueKind::U16 => write!(f, "u16"),
            ValueKind::U32 => write!(f, "u32"),
            ValueKind::U64 => write!(f, "u64"),
            ValueKind::I8 => write!(f, "i8"),
            ValueKind::I16 => write!(f, "i16"),
            ValueKind::I32 => write!(f, "i32"),
            ValueKind::I64 => write!(f, "i64"),
            ValueKind::F32 => write!(f, "f32"),
            ValueKind::F64 => write!(f, "f64"),
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Text(len) => write!(f, "text[{}]", len),
        }
    }
}

/// A decoded value from process memory or the message stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A numeric value (all integer and float reads widen to f64)
    Number(f64),
    /// A textual value
    Text(String),
}

impl Value {
    /// The numeric form of this value; text parses when possible, else 0
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        }
    }

    /// True if the value counts as "on" for switch-style devices
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

/// Where an output's base address comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressKind {
    /// A fixed absolute address in the target process
    Absolute { address: u64 },
    /// An offset from a named module's load base
    ModuleOffset { module: String, offset: u64 },
}

impl Default for AddressKind {
    fn default() -> Self {
        AddressKind::Absolute { address: 0 }
    }
}

/// Bit operation applied after a masked read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitOp {
    /// Bitwise AND with the mask
    And,
    /// Bitwise OR with the mask
    Or,
    /// Bitwise XOR with the mask
    Xor,
    /// Shift right by the mask's value
    Shr,
}

/// Configuration for one output to sample and dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDescriptor {
    /// Unique label within a profile
    pub label: String,
    /// Base address source
    pub address: AddressKind,
    /// Pointer chain offsets applied after the base address (empty = direct read)
    #[serde(default)]
    pub pointer_chain: Vec<u64>,
    /// Optional mask operand applied to the decoded integer value
    #[serde(default)]
    pub bitmask: Option<u64>,
    /// Operation combining the value with the mask (defaults to AND when masked)
    #[serde(default)]
    pub bit_op: Option<BitOp>,
    /// Invert the final value (negate numbers, logically negate booleans)
    #[serde(default)]
    pub invert: bool,
    /// Type of the value at the resolved address
    #[serde(default)]
    pub kind: ValueKind,
    /// Optional transform expression over `value`
    #[serde(default)]
    pub transform: Option<String>,
    /// Optional display format pattern
    #[serde(default)]
    pub format: Option<String>,
    /// Devices this output feeds
    #[serde(default)]
    pub targets: Vec<DeviceTarget>,
}

impl Default for OutputDescriptor {
    fn default() -> Self {
        Self {
            label: String::from("unnamed"),
            address: AddressKind::default(),
            pointer_chain: Vec::new(),
            bitmask: None,
            bit_op: None,
            invert: false,
            kind: ValueKind::U32,
            transform: None,
            format: None,
            targets: Vec::new(),
        }
    }
}

impl OutputDescriptor {
    /// Create a descriptor with a label, address source and value type
    pub fn new(label: impl Into<String>, address: AddressKind, kind: ValueKind) -> Self {
        Self {
            label: label.into(),
            address,
            kind,
            ..Default::default()
        }
    }

    /// Set the pointer chain offsets
    pub fn with_pointer_chain(mut self, chain: Vec<u64>) -> Self {
        self.pointer_chain = chain;
        self
    }

    /// Set the bitmask operand and operation
    pub fn with_bitmask(mut self, mask: u64, op: BitOp) -> Self {
        self.bitmask = Some(mask);
        self.bit_op = Some(op);
        self
    }

    /// Enable value inversion
    pub fn with_invert(mut self) -> Self {
        self.invert = true;
        self
    }

    /// Set the transform expression
    pub fn with_transform(mut self, expr: impl Into<String>) -> Self {
        self.transform = Some(expr.into());
        self
    }

    /// Set the display format pattern
    pub fn with_format(mut self, pattern: impl Into<String>) -> Self {
        self.format = Some(pattern.into());
        self
    }

    /// Add a dispatch target
    pub fn with_target(mut self, target: DeviceTarget) -> Self {
        self.targets.push(target);
        self
    }
}

/// The outcome of resolving one descriptor in one tick
///
/// A sample is immutable once created. The next tick produces a fresh
/// sample for the same label rather than mutating this one.
#[derive(Debug, Clone)]
pub struct ResolvedSample {
    /// Label of the descriptor this sample belongs to
    pub label: String,
    /// The decoded value on success
    pub value: Option<Value>,
    /// The failure, if resolution did not complete
    pub error: Option<ResolveError>,
    /// When the resolution finished
    pub sampled_at: Instant,
}

impl ResolvedSample {
    /// Create a successful sample
    pub fn ok(label: impl Into<String>, value: Value) -> Self {
        Self {
            label: label.into(),
            value: Some(value),
            error: None,
            sampled_at: Instant::now(),
        }
    }

    /// Create a failed sample
    pub fn failed(label: impl Into<String>, error: ResolveError) -> Self {
        Self {
            label: label.into(),
            value: None,
            error: Some(error),
            sampled_at: Instant::now(),
        }
    }

    /// True if resolution produced a value
    pub fn is_ok(&self) -> bool {
        self.value.is_some() && self.error.is_none()
    }
}

/// A sample after the transform pipeline, ready for dispatch
///
/// `display` is the formatted string shown to humans and sent to serial
/// targets; `dispatch` is the numeric-or-text value device backends act on.
#[derive(Debug, Clone)]
pub struct TransformedValue {
    /// Label of the source descriptor
    pub label: String,
    /// Formatted display string
    pub display: String,
    /// Value after transform, before formatting
    pub dispatch: Value,
    /// Devices this value feeds
    pub targets: Vec<DeviceTarget>,
}

/// One message-stream packet after wire decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// Output key the packet refers to
    pub key: String,
    /// The single field this packet carries
    pub body: PacketBody,
}

/// The exactly-one field a packet updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketBody {
    /// A human-readable label for the key
    Label(String),
    /// Free-form text (game names, markers)
    Text(String),
    /// A numeric state update
    Value(i32),
}

impl RawPacket {
    /// Packet carrying a label registration
    pub fn label(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            body: PacketBody::Label(label.into()),
        }
    }

    /// Packet carrying free-form text
    pub fn text(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            body: PacketBody::Text(text.into()),
        }
    }

    /// Packet carrying a numeric value
    pub fn value(key: impl Into<String>, value: i32) -> Self {
        Self {
            key: key.into(),
            body: PacketBody::Value(value),
        }
    }
}

/// Live state of one output key seen on the message stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Output key as sent by the emulator
    pub key: String,
    /// Display label (defaults to the key until a label packet arrives)
    pub label: String,
    /// Most recent numeric value
    pub last_value: i32,
}

impl OutputRecord {
    /// Create a record for a newly seen key
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            last_value: 0,
        }
    }
}

/// A snapshot of polling health, published on a fixed cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Wall-clock time the snapshot was taken
    pub captured_at: chrono::DateTime<chrono::Local>,
    /// Completed polls per second over the trailing window
    pub polls_per_second: f64,
    /// Ticks skipped because the previous tick was still running
    pub skipped_polls: u64,
    /// Tick batches dropped due to dispatch backpressure
    pub dropped_batches: u64,
    /// Duration of the most recent tick in microseconds
    pub last_poll_us: u64,
    /// Average tick duration over the trailing window in microseconds
    pub avg_poll_us: f64,
    /// Minimum tick duration in the trailing window in microseconds
    pub min_poll_us: u64,
    /// Maximum tick duration in the trailing window in microseconds
    pub max_poll_us: u64,
    /// Tick duration jitter (max - min) in microseconds
    pub jitter_us: u64,
    /// Total completed ticks since polling started
    pub total_polls: u64,
    /// Total per-sample resolution failures since polling started
    pub failed_samples: u64,
}

/// Represents the run state of the polling engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineStatus {
    /// No profile active, not polling
    #[default]
    Idle,
    /// Actively polling the target process
    Running,
    /// The target process disappeared; polling stopped
    ProcessLost,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineStatus::Idle => write!(f, "Idle"),
            EngineStatus::Running => write!(f, "Running"),
            EngineStatus::ProcessLost => write!(f, "Process lost"),
        }
    }
}

/// Identifies one physical output device
///
/// Multiple targets can share a device (an LED host with several segments);
/// the key is what the dispatcher owns exactly one handle per.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceKey {
    /// An LED controller, keyed by host
    Led(String),
    /// A HID relay board, keyed by vendor, product and device index
    Hid(u16, u16, u8),
    /// A serial port, keyed by port name
    Serial(String),
}

impl std::fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKey::Led(host) => write!(f, "led://{}", host),
            DeviceKey::Hid(vid, pid, idx) => {
                write!(f, "hid://{:04x}:{:04x}/{}", vid, pid, idx)
            }
            DeviceKey::Serial(port) => write!(f, "serial://{}", port),
        }
    }
}

/// One dispatch destination for an output value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceTarget {
    /// A segment of an addressable LED strip controller
    LedSegment {
        /// Controller host name or IP
        host: String,
        /// Segment index on the controller
        segment: u32,
    },
    /// A channel on a USB HID relay board
    HidRelay {
        /// USB vendor ID
        vendor_id: u16,
        /// USB product ID
        product_id: u16,
        /// Index among identical boards (0 = first found)
        #[serde(default)]
        device_index: u8,
        /// Relay channel number, 1-based
        channel: u8,
    },
    /// A serial device receiving formatted command strings
    Serial {
        /// Port name (e.g. "/dev/ttyUSB0" or "COM3")
        port: String,
        /// Baud rate
        baud: u32,
        /// Command template; `{value}` is replaced with the display string
        command: String,
    },
}

impl DeviceTarget {
    /// The physical device this target belongs to
    pub fn device_key(&self) -> DeviceKey {
        match self {
            DeviceTarget::LedSegment { host, .. } => DeviceKey::Led(host.clone()),
            DeviceTarget::HidRelay {
                vendor_id,
                product_id,
                device_index,
                ..
            } => DeviceKey::Hid(*vendor_id, *product_id, *device_index),
            DeviceTarget::Serial { port, .. } => DeviceKey::Serial(port.clone()),
        }
    }
}
