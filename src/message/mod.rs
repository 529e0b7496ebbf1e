//! Emulator message stream decoding
//!
//! Packets arrive from an injected transport (the binary ships a TCP
//! line adapter; embedders can feed packets from any source). The
//! decoder maintains the live [`OutputRecord`] table with upsert
//! semantics and drives the [`DetectionSession`] handshake.
//!
//! Wire-level parsing lives in [`wire`]; this module is transport-free.

pub mod detection;
pub mod wire;

pub use detection::{DetectionEvent, DetectionSession, DetectionState, GameBinding};

use crate::types::{OutputRecord, PacketBody, RawPacket};
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

/// Live table of output records keyed by output key
#[derive(Debug, Default)]
pub struct RecordTable {
    records: HashMap<String, OutputRecord>,
}

impl RecordTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Upsert one packet into the table
    ///
    /// An unseen key creates a record whose label defaults to the key.
    /// A packet patches only the field its body carries; label and text
    /// bodies both patch the label, value bodies patch the value.
    pub fn apply(&mut self, packet: &RawPacket) -> OutputRecord {
        let record = self
            .records
            .entry(packet.key.clone())
            .or_insert_with(|| OutputRecord::new(&packet.key));

        match &packet.body {
            PacketBody::Label(label) | PacketBody::Text(label) => {
                record.label = label.clone();
            }
            PacketBody::Value(value) => {
                record.last_value = *value;
            }
        }
        record.clone()
    }

    /// Look up a record by key
    pub fn get(&self, key: &str) -> Option<&OutputRecord> {
        self.records.get(key)
    }

    /// Number of known keys
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no keys have been seen
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forget every record
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Snapshot all records, sorted by key for stable iteration
    pub fn snapshot(&self) -> Vec<OutputRecord> {
        let mut records: Vec<OutputRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }
}

/// Events produced by decoding one packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    /// A record was created or patched
    RecordUpdated(OutputRecord),
    /// The detection handshake transitioned
    Detection(DetectionEvent),
}

/// Decoder combining the record table and the detection handshake
#[derive(Debug)]
pub struct MessageDecoder {
    table: RecordTable,
    detection: DetectionSession,
}

impl MessageDecoder {
    /// Create a decoder with the given detection timeout
    pub fn new(detection_timeout: Duration) -> Self {
        Self {
            table: RecordTable::new(),
            detection: DetectionSession::new(detection_timeout),
        }
    }

    /// Replace the profile bindings used for game matching
    pub fn set_bindings(&mut self, bindings: Vec<GameBinding>) {
        self.detection.set_bindings(bindings);
    }

    /// The detection session, for state queries
    pub fn detection(&self) -> &DetectionSession {
        &self.detection
    }

    /// The record table, for state queries
    pub fn records(&self) -> &RecordTable {
        &self.table
    }

    /// Decode one packet into record and detection events
    ///
    /// A start marker clears the table first; the emulator re-announces
    /// its outputs after every start, so stale keys must not linger.
    pub fn handle_packet(&mut self, packet: &RawPacket) -> Vec<MessageEvent> {
        trace!(key = %packet.key, "packet");
        if packet.key == wire::START_KEY {
            self.table.clear();
        }

        let mut events = Vec::with_capacity(2);
        events.push(MessageEvent::RecordUpdated(self.table.apply(packet)));
        if let Some(event) = self.detection.on_packet(packet) {
            events.push(MessageEvent::Detection(event));
        }
        events
    }

    /// Run timeout housekeeping; call periodically between packets
    pub fn tick(&mut self) -> Option<MessageEvent> {
        self.detection.tick().map(MessageEvent::Detection)
    }
}
