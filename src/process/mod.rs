//! Process memory access for Outrig
//!
//! This module provides a common trait for reading a target process's
//! memory, enabling both OS-specific providers (supplied by embedders)
//! and the in-crate mock process for testing and demo mode.
//!
//! Address resolution (module plus offset, pointer chains, bit operations)
//! lives in [`resolver`]; it consumes any [`ProcessMemory`] implementation.

pub mod mock;
pub mod resolver;

pub use mock::{MockPattern, MockProcess};
pub use resolver::resolve;

use crate::error::Result;
use thiserror::Error;

/// A module loaded into the target process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Module file name (e.g. "game.exe")
    pub name: String,
    /// Load base address
    pub base: u64,
    /// Mapped size in bytes
    pub size: u64,
}

impl ModuleInfo {
    /// Create a module entry
    pub fn new(name: impl Into<String>, base: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            base,
            size,
        }
    }
}

/// Why a single sample failed to resolve
///
/// These are per-sample outcomes carried inside [`crate::types::ResolvedSample`];
/// they never abort the polling loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// The descriptor names a module the process has not loaded
    #[error("module '{module}' not found in target process")]
    ModuleNotFound { module: String },

    /// A pointer chain link was null or unreadable
    #[error("invalid pointer at chain step {step} (address 0x{address:08X})")]
    InvalidPointer { step: usize, address: u64 },

    /// The final typed read failed
    #[error("read of {len} bytes at 0x{address:08X} failed: {message}")]
    ReadFailed {
        address: u64,
        len: usize,
        message: String,
    },

    /// The read returned too few bytes to decode the value type
    #[error("could not decode {kind} from {len} bytes")]
    Decode {
        kind: crate::types::ValueKind,
        len: usize,
    },
}

/// Unified interface for target process memory access
///
/// Implementations must be `Send` so the polling worker can own them.
/// All reads are raw bytes; typed decoding happens in the resolver.
///
/// # Example
///
/// ```ignore
/// fn dump(process: &mut dyn ProcessMemory) -> Result<Vec<u8>> {
///     let modules = process.list_modules()?;
///     process.read_memory(modules[0].base, 16)
/// }
/// ```
pub trait ProcessMemory: Send {
    /// List the modules currently loaded in the target process
    fn list_modules(&mut self) -> Result<Vec<ModuleInfo>>;

    /// Read raw memory from the target
    ///
    /// # Arguments
    /// * `address` - Memory address to read from
    /// * `size` - Number of bytes to read
    fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Check whether the target process is still running
    fn is_alive(&self) -> bool;
}
