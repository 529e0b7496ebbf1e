//! # Outrig: Emulator Output Bridge
//!
//! A real-time bridge between emulated arcade games and physical cabinet
//! hardware. Outrig reads game state two ways - polling process memory
//! through resolved addresses, and decoding the emulator's output message
//! stream - then transforms the values and drives LED strips, relay
//! boards, and serial devices.
//!
//! ## Architecture
//!
//! - **Process**: Memory capability trait with module and pointer-chain
//!   address resolution
//! - **Message**: Wire decoding of emulator output packets, the output
//!   record table, and game detection
//! - **Transform**: Sandboxed value expressions and format patterns
//! - **Engine**: Poll worker, message pump, and metrics behind
//!   crossbeam channels
//! - **Device**: Dispatch to LED controllers, HID relays, and serial
//!   ports with per-device failure isolation
//!
//! ## Configuration
//!
//! Configuration and profiles are stored in the platform-appropriate
//! data directory under `dev.outrig.outrig`:
//!
//! - **Linux**: `~/.local/share/dev.outrig.outrig/`
//! - **macOS**: `~/Library/Application Support/dev.outrig.outrig/`
//! - **Windows**: `%APPDATA%\dev.outrig.outrig\`
//!
//! ## Example
//!
//! ```ignore
//! use outrig::{
//!     config::AppConfig,
//!     device::StandardProvider,
//!     engine::{EngineOptions, OutputEngine},
//!     profile::ProfileStore,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load_or_default();
//!     let store = ProfileStore::load_dir(config.effective_profiles_dir())?;
//!
//!     let (packet_tx, packet_rx) = crossbeam_channel::bounded(256);
//!     let provider = Box::new(StandardProvider::new(config.dispatch.clone()));
//!     let engine = OutputEngine::spawn(
//!         EngineOptions::from_config(&config, store.bindings()),
//!         packet_rx,
//!         provider,
//!     );
//!
//!     // feed packet_tx from the network listener, react to engine events,
//!     // start profiles when detection matches...
//!
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod message;
pub mod process;
pub mod profile;
pub mod transform;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use engine::{EngineCommand, EngineEvent, EngineHandle, EngineOptions, OutputEngine};
pub use error::{OutrigError, Result};
pub use message::{DetectionEvent, GameBinding, MessageDecoder};
pub use process::{MockProcess, ProcessMemory};
pub use profile::{Profile, ProfileStore};
pub use types::{OutputDescriptor, OutputRecord, RawPacket, TransformedValue, Value, ValueKind};
