//! Mock process implementation for testing and demo mode
//!
//! Simulates a target process with named modules and virtual memory
//! regions, so the whole pipeline can run without a real emulator.
//!
//! # Features
//!
//! - **Simulated memory**: Bounds-checked reads and writes against virtual regions
//! - **Module table**: Named modules with base addresses for module-offset descriptors
//! - **Pattern cells**: Addresses that regenerate oscillating values on every read
//! - **Scriptable failures**: Force the next N reads to fail, or kill the process
//!
//! # Example
//!
//! ```ignore
//! use outrig::process::{MockPattern, MockProcess, ProcessMemory};
//!
//! let mut process = MockProcess::new("demo.exe");
//! process.add_module("demo.exe", 0x0040_0000, 0x10_0000);
//! process.add_region(0x0040_0000, 0x1000);
//! process.set_pattern(0x0040_0010, ValueKind::F32, MockPattern::Sine {
//!     frequency: 0.5,
//!     amplitude: 4000.0,
//!     offset: 4000.0,
//! });
//!
//! let bytes = process.read_memory(0x0040_0010, 4)?;
//! ```

use crate::error::{OutrigError, Result};
use crate::process::{ModuleInfo, ProcessMemory};
use crate::types::ValueKind;
use std::collections::HashMap;
use std::time::Instant;

/// Pattern for generating mock data
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockPattern {
    /// Constant value
    Constant(f64),
    /// Sine wave with frequency and amplitude
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Counter that increments and wraps
    Counter { step: f64, min: f64, max: f64 },
    /// Sawtooth wave
    Sawtooth { period: f64, amplitude: f64 },
    /// Square wave
    Square { period: f64, amplitude: f64 },
}

impl Default for MockPattern {
    fn default() -> Self {
        MockPattern::Sine {
            frequency: 1.0,
            amplitude: 100.0,
            offset: 0.0,
        }
    }
}

impl MockPattern {
    /// Generate a value for the given elapsed time, advancing counter state
    fn generate(&self, elapsed_secs: f64, counter: &mut f64) -> f64 {
        match *self {
            MockPattern::Constant(v) => v,
            MockPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * elapsed_secs).sin(),
            MockPattern::Counter { step, min, max } => {
                *counter += step;
                if *counter > max {
                    *counter = min;
                } else if *counter < min {
                    *counter = max;
                }
                *counter
            }
            MockPattern::Sawtooth { period, amplitude } => {
                let t = elapsed_secs % period;
                amplitude * (t / period)
            }
            MockPattern::Square { period, amplitude } => {
                let t = elapsed_secs % period;
                if t < period / 2.0 {
                    amplitude
                } else {
                    0.0
                }
            }
        }
    }
}

/// A memory cell that regenerates from a pattern before every read
#[derive(Debug, Clone)]
struct PatternCell {
    address: u64,
    kind: ValueKind,
    pattern: MockPattern,
    counter: f64,
}

/// A simulated target process with modules and virtual memory
#[derive(Debug)]
pub struct MockProcess {
    /// Process name, reported in logs
    name: String,
    /// Loaded module table
    modules: Vec<ModuleInfo>,
    /// Memory regions mapped by base address
    regions: HashMap<u64, Vec<u8>>,
    /// Addresses regenerated from patterns on read
    patterns: Vec<PatternCell>,
    /// Whether the simulated process is still running
    alive: bool,
    /// Total read_memory calls, for test assertions
    read_count: u64,
    /// Remaining forced read failures
    fail_reads: u64,
    /// When the process was created, for pattern time bases
    started: Instant,
}

impl MockProcess {
    /// Create a new mock process with no modules or memory
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: Vec::new(),
            regions: HashMap::new(),
            patterns: Vec::new(),
            alive: true,
            read_count: 0,
            fail_reads: 0,
            started: Instant::now(),
        }
    }

    /// Add a module to the simulated process
    pub fn add_module(&mut self, name: impl Into<String>, base: u64, size: u64) {
        self.modules.push(ModuleInfo::new(name, base, size));
    }

    /// Add a zero-filled memory region
    pub fn add_region(&mut self, base_address: u64, size: usize) {
        self.regions.insert(base_address, vec![0u8; size]);
    }

    /// Write raw bytes to memory, returning false if unmapped
    pub fn write_bytes(&mut self, address: u64, data: &[u8]) -> bool {
        for (&base, region) in &mut self.regions {
            let end = base + region.len() as u64;
            if address >= base && address + data.len() as u64 <= end {
                let offset = (address - base) as usize;
                region[offset..offset + data.len()].copy_from_slice(data);
                return true;
            }
        }
        false
    }

    /// Write a typed value to memory at the given address
    pub fn write_value<T: ToBytes>(&mut self, address: u64, value: T) -> bool {
        self.write_bytes(address, &value.to_le_bytes_vec())
    }

    /// Attach a pattern to an address; the cell regenerates before each read
    ///
    /// Only numeric kinds make sense here; text cells stay as written.
    pub fn set_pattern(&mut self, address: u64, kind: ValueKind, pattern: MockPattern) {
        self.patterns.push(PatternCell {
            address,
            kind,
            pattern,
            counter: 0.0,
        });
    }

    /// Mark the simulated process as exited
    pub fn kill(&mut self) {
        self.alive = false;
    }

    /// Force the next `count` reads to fail
    pub fn fail_next_reads(&mut self, count: u64) {
        self.fail_reads = count;
    }

    /// Total read_memory calls so far
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// Process name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&self, address: u64, size: usize) -> Option<Vec<u8>> {
        for (&base, region) in &self.regions {
            let end = base + region.len() as u64;
            if address >= base && address + size as u64 <= end {
                let offset = (address - base) as usize;
                return Some(region[offset..offset + size].to_vec());
            }
        }
        None
    }

    /// Regenerate all pattern cells into memory
    fn refresh_patterns(&mut self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let mut writes = Vec::with_capacity(self.patterns.len());
        for cell in &mut self.patterns {
            let value = cell.pattern.generate(elapsed, &mut cell.counter);
            writes.push((cell.address, encode_value(cell.kind, value)));
        }
        for (address, bytes) in writes {
            self.write_bytes(address, &bytes);
        }
    }
}

impl ProcessMemory for MockProcess {
    fn list_modules(&mut self) -> Result<Vec<ModuleInfo>> {
        if !self.alive {
            return Err(OutrigError::Process(format!(
                "process '{}' has exited",
                self.name
            )));
        }
        Ok(self.modules.clone())
    }

    fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.read_count += 1;

        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(OutrigError::MemoryAccess {
                address,
                message: "injected read failure".to_string(),
            });
        }
        if !self.alive {
            return Err(OutrigError::Process(format!(
                "process '{}' has exited",
                self.name
            )));
        }

        self.refresh_patterns();
        self.read_bytes(address, size)
            .ok_or(OutrigError::MemoryAccess {
                address,
                message: "region not mapped".to_string(),
            })
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

/// Encode a numeric value into little-endian bytes for the given kind
fn encode_value(kind: ValueKind, value: f64) -> Vec<u8> {
    match kind {
        ValueKind::U8 => vec![value as u8],
        ValueKind::I8 => vec![value as i8 as u8],
        ValueKind::Bool => vec![if value != 0.0 { 1 } else { 0 }],
        ValueKind::U16 => (value as u16).to_le_bytes().to_vec(),
        ValueKind::I16 => (value as i16).to_le_bytes().to_vec(),
        ValueKind::U32 => (value as u32).to_le_bytes().to_vec(),
        ValueKind::I32 => (value as i32).to_le_bytes().to_vec(),
        ValueKind::U64 => (value as u64).to_le_bytes().to_vec(),
        ValueKind::I64 => (value as i64).to_le_bytes().to_vec(),
        ValueKind::F32 => (value as f32).to_le_bytes().to_vec(),
        ValueKind::F64 => value.to_le_bytes().to_vec(),
        ValueKind::Text(len) => vec![0u8; len],
    }
}

/// Trait for converting values to bytes
pub trait ToBytes {
    fn to_le_bytes_vec(&self) -> Vec<u8>;
}

impl ToBytes for u8 {
    fn to_le_bytes_vec(&self) -> Vec<u8> {
        vec![*self]
    }
}
impl ToBytes for u16 {
    fn to_le_bytes_vec(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}
impl ToBytes for u32 {
    fn to_le_bytes_vec(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}
impl ToBytes for u64 {
    fn to_le_bytes_vec(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}
impl ToBytes for i8 {
    fn to_le_bytes_vec(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}
impl ToBytes for i16 {
    fn to_le_bytes_vec(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}
impl ToBytes for i32 {
    fn to_le_bytes_vec(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}
impl ToBytes for i64 {
    fn to_le_bytes_vec(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}
impl ToBytes for f32 {
    fn to_le_bytes_vec(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}
impl ToBytes for f64 {
    fn to_le_bytes_vec(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}
