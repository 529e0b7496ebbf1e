//! Wire parsing for the emulator message stream
//!
//! Two transports carry output packets:
//!
//! - **Id+label frames**: `[u32 LE id][label bytes]`, label trimmed at the
//!   first NUL. Id `0` is the game-name announcement; other ids map to the
//!   stable key `id_<n>`. A frame registers the label and seeds the key
//!   with value 0.
//! - **Key=value lines**: UTF-8 `key=value` text. An integer value is a
//!   state update; any other value is text, which is how the game name
//!   travels over the line transport.
//!
//! Marker keys flow through the same packet stream and drive the
//! detection state machine.

use crate::types::RawPacket;

/// Key announcing the running game's name
pub const GAME_NAME_KEY: &str = "__GAME_NAME__";

/// Key marking the start of an emulator output session
pub const START_KEY: &str = "__MAME_START__";

/// Key marking the end of an emulator output session
pub const STOP_KEY: &str = "__MAME_STOP__";

/// Minimum id+label frame size: a u32 id plus at least one label byte
const MIN_FRAME_LEN: usize = 5;

/// The stable key for a numeric output id
pub fn key_for_id(id: u32) -> String {
    if id == 0 {
        GAME_NAME_KEY.to_string()
    } else {
        format!("id_{}", id)
    }
}

/// Parse an id+label frame into its packets
///
/// Returns `None` for frames too short to carry an id and a label.
/// A valid frame yields two packets: the label (or game-name text)
/// registration, and a zero seed value for the same key.
pub fn parse_id_frame(data: &[u8]) -> Option<Vec<RawPacket>> {
    if data.len() < MIN_FRAME_LEN {
        return None;
    }

    let id = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let raw = &data[4..];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let label = String::from_utf8_lossy(&raw[..end]).into_owned();

    let key = key_for_id(id);
    let packets = if id == 0 {
        vec![
            RawPacket::text(&key, label),
            RawPacket::value(&key, 0),
        ]
    } else {
        vec![
            RawPacket::label(&key, label),
            RawPacket::value(&key, 0),
        ]
    };
    Some(packets)
}

/// Parse a `key=value` line into a packet
///
/// A decimal integer value yields a value packet; any other non-empty
/// value yields a text packet. Returns `None` when there is no `=`, or
/// the key or value is empty. Whitespace around key and value is
/// tolerated.
pub fn parse_kv_line(line: &str) -> Option<RawPacket> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }
    match value.parse::<i32>() {
        Ok(number) => Some(RawPacket::value(key, number)),
        Err(_) => Some(RawPacket::text(key, value)),
    }
}

/// Build the packet for a numeric state update of an output id
pub fn packet_for_update(id: u32, value: i32) -> RawPacket {
    RawPacket::value(key_for_id(id), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PacketBody;

    fn frame(id: u32, label: &[u8]) -> Vec<u8> {
        let mut data = id.to_le_bytes().to_vec();
        data.extend_from_slice(label);
        data
    }

    #[test]
    fn test_key_for_id() {
        assert_eq!(key_for_id(0), "__GAME_NAME__");
        assert_eq!(key_for_id(7), "id_7");
        assert_eq!(key_for_id(41), "id_41");
    }

    #[test]
    fn test_id_frame_label_registration() {
        let packets = parse_id_frame(&frame(5, b"lamp_start\0\0")).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0], RawPacket::label("id_5", "lamp_start"));
        assert_eq!(packets[1], RawPacket::value("id_5", 0));
    }

    #[test]
    fn test_id_frame_game_name() {
        let packets = parse_id_frame(&frame(0, b"daytona\0")).unwrap();
        assert_eq!(packets[0], RawPacket::text("__GAME_NAME__", "daytona"));
        assert_eq!(packets[1], RawPacket::value("__GAME_NAME__", 0));
    }

    #[test]
    fn test_id_frame_without_nul() {
        let packets = parse_id_frame(&frame(3, b"wheel")).unwrap();
        assert_eq!(packets[0], RawPacket::label("id_3", "wheel"));
    }

    #[test]
    fn test_id_frame_too_short() {
        assert_eq!(parse_id_frame(&[]), None);
        assert_eq!(parse_id_frame(&1u32.to_le_bytes()), None);
    }

    #[test]
    fn test_kv_line() {
        assert_eq!(
            parse_kv_line("lamp0=1"),
            Some(RawPacket::value("lamp0", 1))
        );
        assert_eq!(
            parse_kv_line("rpm=-250\r\n"),
            Some(RawPacket::value("rpm", -250))
        );
        assert_eq!(
            parse_kv_line("wheel = 128"),
            Some(RawPacket::value("wheel", 128))
        );
    }

    #[test]
    fn test_kv_line_text_value() {
        assert_eq!(
            parse_kv_line("__GAME_NAME__=daytona"),
            Some(RawPacket::text("__GAME_NAME__", "daytona"))
        );
    }

    #[test]
    fn test_kv_line_malformed() {
        assert_eq!(parse_kv_line("no separator"), None);
        assert_eq!(parse_kv_line("=5"), None);
        assert_eq!(parse_kv_line("lamp0="), None);
    }

    #[test]
    fn test_kv_value_carries_body() {
        let packet = parse_kv_line("id_9=42").unwrap();
        assert_eq!(packet.key, "id_9");
        assert_eq!(packet.body, PacketBody::Value(42));
    }

    #[test]
    fn test_packet_for_update() {
        assert_eq!(packet_for_update(0, 1), RawPacket::value("__GAME_NAME__", 1));
        assert_eq!(packet_for_update(12, 255), RawPacket::value("id_12", 255));
    }
}
