//! Unconnected_Send and Multiple_Service_Packet envelope parse/build.

use byteorder::{ByteOrder as _, LittleEndian};

/// Builds an Unconnected_Send request payload wrapping `embedded` and
/// routed via `route`.
pub fn build_unconnected_send(embedded: &[u8], route: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(6 + embedded.len() + route.len());
    buf.push(0x0A); // priority/tick
    buf.push(0x0E); // timeout ticks
    let mut size = [0u8; 2];
    LittleEndian::write_u16(&mut size, embedded.len() as u16);
    buf.extend_from_slice(&size);
    buf.extend_from_slice(embedded);
    if embedded.len() % 2 == 1 {
        buf.push(0);
    }
    let route_words = (route.len() / 2) as u8;
    buf.push(route_words);
    buf.push(0x00); // reserved
    buf.extend_from_slice(route);
    buf
}

/// Parses an Unconnected_Send payload, returning `(embedded, route)`.
///
/// Some captured vendor traffic encodes `msg_size` as a word count rather
/// than a byte count; when the byte-count interpretation doesn't fit in the
/// remaining payload, the word-count interpretation is tried as a fallback.
pub fn parse_unconnected_send(data: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    if data.len() < 4 {
        return None;
    }
    let declared = LittleEndian::read_u16(&data[2..4]) as usize;
    let after_size = &data[4..];

    let msg_size = if declared <= after_size.len() {
        declared
    } else if declared * 2 <= after_size.len() {
        declared * 2
    } else {
        return None;
    };

    let embedded = after_size.get(..msg_size)?.to_vec();
    let mut pos = msg_size;
    if msg_size % 2 == 1 {
        pos += 1;
    }
    if after_size.len() < pos + 2 {
        return Some((embedded, Vec::new()));
    }
    let route_words = after_size[pos] as usize;
    pos += 2; // route word count + reserved byte
    let route_len = route_words * 2;
    let route = after_size.get(pos..pos + route_len).unwrap_or(&[]).to_vec();
    Some((embedded, route))
}

/// Builds a Multiple_Service_Packet request payload from complete CIP
/// sub-requests. Offsets are relative to the count word and emitted in
/// increasing order.
pub fn build_multiple_service(sub_messages: &[Vec<u8>]) -> Vec<u8> {
    let count = sub_messages.len();
    let mut buf = Vec::new();
    let mut count_bytes = [0u8; 2];
    LittleEndian::write_u16(&mut count_bytes, count as u16);
    buf.extend_from_slice(&count_bytes);

    let offsets_len = count * 2;
    let mut offset = 2 + offsets_len;
    let mut offsets = Vec::with_capacity(count);
    for msg in sub_messages {
        offsets.push(offset as u16);
        offset += msg.len();
    }
    for off in &offsets {
        let mut o = [0u8; 2];
        LittleEndian::write_u16(&mut o, *off);
        buf.extend_from_slice(&o);
    }
    for msg in sub_messages {
        buf.extend_from_slice(msg);
    }
    buf
}

/// Parses a Multiple_Service_Packet payload into its sub-messages, in order.
pub fn parse_multiple_service(data: &[u8]) -> Option<Vec<Vec<u8>>> {
    if data.len() < 2 {
        return None;
    }
    let count = LittleEndian::read_u16(&data[0..2]) as usize;
    let offsets_end = 2 + count * 2;
    if data.len() < offsets_end {
        return None;
    }
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let start = 2 + i * 2;
        offsets.push(LittleEndian::read_u16(&data[start..start + 2]) as usize);
    }

    let mut messages = Vec::with_capacity(count);
    for i in 0..count {
        let start = offsets[i];
        let end = offsets.get(i + 1).copied().unwrap_or(data.len());
        if start > data.len() || end > data.len() || start > end {
            return None;
        }
        messages.push(data[start..end].to_vec());
    }
    Some(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_unconnected_send() {
        let embedded = vec![0x4C, 0x02, 0x20, 0x6B, 0x24, 0x01];
        let route = vec![0x01, 0x00];
        let built = build_unconnected_send(&embedded, &route);
        let (parsed_embedded, parsed_route) = parse_unconnected_send(&built).unwrap();
        assert_eq!(parsed_embedded, embedded);
        assert_eq!(parsed_route, route);
    }

    #[test]
    fn round_trips_multiple_service_packet_preserving_order() {
        let subs = vec![vec![0x4C, 0x01], vec![0x4D, 0x02, 0x03], vec![0x01]];
        let built = build_multiple_service(&subs);
        let parsed = parse_multiple_service(&built).unwrap();
        assert_eq!(parsed, subs);
    }
}
