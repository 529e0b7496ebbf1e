//! Address resolution for output descriptors
//!
//! Turns an [`OutputDescriptor`] into a [`ResolvedSample`] against a live
//! process: module base lookup, pointer chain walking, typed decoding and
//! the optional bit operations and inversion.
//!
//! Resolution never returns an `Err`; every failure mode is carried inside
//! the sample so one bad descriptor cannot abort a polling tick.

use crate::process::{ModuleInfo, ProcessMemory, ResolveError};
use crate::types::{AddressKind, BitOp, OutputDescriptor, ResolvedSample, Value, ValueKind};
use tracing::trace;

/// Resolve one descriptor against the target process
///
/// `pointer_width` is the size in bytes of a pointer in the target
/// process (4 or 8), taken from the active profile.
pub fn resolve(
    process: &mut dyn ProcessMemory,
    descriptor: &OutputDescriptor,
    pointer_width: u8,
) -> ResolvedSample {
    let base = match base_address(process, &descriptor.address) {
        Ok(addr) => addr,
        Err(err) => return ResolvedSample::failed(&descriptor.label, err),
    };

    let addr = match walk_chain(process, base, &descriptor.pointer_chain, pointer_width) {
        Ok(addr) => addr,
        Err(err) => return ResolvedSample::failed(&descriptor.label, err),
    };

    let size = descriptor.kind.size_bytes();
    let bytes = match process.read_memory(addr, size) {
        Ok(bytes) => bytes,
        Err(err) => {
            return ResolvedSample::failed(
                &descriptor.label,
                ResolveError::ReadFailed {
                    address: addr,
                    len: size,
                    message: err.to_string(),
                },
            )
        }
    };

    let value = match descriptor.kind.decode(&bytes) {
        Some(value) => value,
        None => {
            return ResolvedSample::failed(
                &descriptor.label,
                ResolveError::Decode {
                    kind: descriptor.kind,
                    len: bytes.len(),
                },
            )
        }
    };

    let value = apply_bit_op(value, descriptor);
    let value = apply_invert(value, descriptor);

    trace!(label = %descriptor.label, address = addr, "resolved");
    ResolvedSample::ok(&descriptor.label, value)
}

/// Look up the base address for a descriptor's address source
fn base_address(
    process: &mut dyn ProcessMemory,
    address: &AddressKind,
) -> Result<u64, ResolveError> {
    match address {
        AddressKind::Absolute { address } => Ok(*address),
        AddressKind::ModuleOffset { module, offset } => {
            let modules = process.list_modules().map_err(|e| ResolveError::ReadFailed {
                address: 0,
                len: 0,
                message: e.to_string(),
            })?;
            let info = find_module(&modules, module).ok_or_else(|| {
                ResolveError::ModuleNotFound {
                    module: module.clone(),
                }
            })?;
            Ok(info.base.wrapping_add(*offset))
        }
    }
}

/// Case-insensitive module lookup
fn find_module<'a>(modules: &'a [ModuleInfo], name: &str) -> Option<&'a ModuleInfo> {
    modules.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

/// Walk a pointer chain from the base address
///
/// Each link reads one pointer at the current address, then adds the
/// link's offset. The first null or unreadable pointer fails the walk
/// at that step; links past it are never dereferenced.
fn walk_chain(
    process: &mut dyn ProcessMemory,
    base: u64,
    chain: &[u64],
    pointer_width: u8,
) -> Result<u64, ResolveError> {
    let width = pointer_width as usize;
    let mut addr = base;

    for (step, offset) in chain.iter().enumerate() {
        let bytes = process.read_memory(addr, width).map_err(|_| {
            ResolveError::InvalidPointer { step, address: addr }
        })?;
        let pointer = match decode_pointer(&bytes, width) {
            Some(p) => p,
            None => return Err(ResolveError::InvalidPointer { step, address: addr }),
        };
        if pointer == 0 {
            return Err(ResolveError::InvalidPointer { step, address: addr });
        }
        addr = pointer.wrapping_add(*offset);
    }

    Ok(addr)
}

/// Decode a little-endian pointer of the given width
fn decode_pointer(bytes: &[u8], width: usize) -> Option<u64> {
    if bytes.len() < width {
        return None;
    }
    match width {
        4 => Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64),
        8 => Some(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])),
        _ => None,
    }
}

/// Apply the descriptor's bit operation to a numeric value
///
/// Operates in the i64 domain; masks on non-numeric values are ignored.
fn apply_bit_op(value: Value, descriptor: &OutputDescriptor) -> Value {
    let Some(mask) = descriptor.bitmask else {
        return value;
    };
    let Value::Number(n) = value else {
        return value;
    };

    let raw = n as i64;
    let mask = mask as i64;
    let result = match descriptor.bit_op.unwrap_or(BitOp::And) {
        BitOp::And => raw & mask,
        BitOp::Or => raw | mask,
        BitOp::Xor => raw ^ mask,
        BitOp::Shr => raw >> (mask as u32).min(63),
    };
    Value::Number(result as f64)
}

/// Apply the descriptor's inversion to the resolved value
fn apply_invert(value: Value, descriptor: &OutputDescriptor) -> Value {
    if !descriptor.invert {
        return value;
    }
    match (&descriptor.kind, value) {
        (ValueKind::Bool, Value::Number(n)) => {
            Value::Number(if n == 0.0 { 1.0 } else { 0.0 })
        }
        (_, Value::Number(n)) => Value::Number(-n),
        (_, text) => text,
    }
}
