//! CIP request encode/decode.

use super::epath::{decode_epath, decode_symbolic, encode_epath, encode_symbolic, CipPath};
use super::{ByteOrder, CodecError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipRequest {
    pub service: u8,
    pub path: CipPath,
    /// When set, overrides the computed EPATH encoding verbatim — still
    /// participates in path-size-word accounting and padding.
    pub raw_path: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

fn path_bytes(req: &CipRequest, order: ByteOrder) -> Vec<u8> {
    if let Some(raw) = &req.raw_path {
        return raw.clone();
    }
    if req.path.is_symbolic() {
        encode_symbolic(&req.path.name)
    } else {
        encode_epath(&req.path, order)
    }
}

pub fn encode_request(req: &CipRequest, order: ByteOrder, include_path_size: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + req.payload.len());
    buf.push(req.service);

    let mut path = path_bytes(req, order);
    if path.len() % 2 == 1 {
        path.push(0);
    }

    if include_path_size {
        buf.push((path.len() / 2) as u8);
    }
    buf.extend_from_slice(&path);
    buf.extend_from_slice(&req.payload);
    buf
}

pub fn decode_request(data: &[u8], order: ByteOrder, include_path_size: bool) -> Result<CipRequest, CodecError> {
    if data.is_empty() {
        return Err(CodecError::too_short(0, 1, 0));
    }
    let service = data[0];
    let mut pos = 1usize;

    let path_len: usize;
    if include_path_size {
        if data.len() < pos + 1 {
            return Err(CodecError::too_short(pos, 1, 0));
        }
        let words = data[pos] as usize;
        path_len = words * 2;
        pos += 1;
        if data.len() < pos + path_len {
            return Err(CodecError::bad_path_size(pos, path_len, data.len() - pos));
        }
    } else {
        path_len = (data.len() - pos).min(6);
    }

    let path_slice = &data[pos..pos + path_len.min(data.len() - pos)];
    let path = match decode_epath(path_slice, order) {
        Ok(decoded) => decoded.path,
        Err(logical_err) => match decode_symbolic(path_slice) {
            Ok(decoded) => decoded.path,
            Err(_) => return Err(logical_err),
        },
    };
    let raw_path = Some(path_slice.to_vec());

    let consumed_path = if include_path_size { path_len } else { path_slice.len() };
    pos += consumed_path;

    let payload = data.get(pos..).unwrap_or(&[]).to_vec();
    Ok(CipRequest { service, path, raw_path, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_logical_read_tag_request() {
        let req = CipRequest {
            service: 0x4C,
            path: CipPath { class: 0x6B, instance: 1, attribute: 0, name: String::new() },
            raw_path: None,
            payload: vec![0x01, 0x00],
        };
        let encoded = encode_request(&req, ByteOrder::Little, true);
        let decoded = decode_request(&encoded, ByteOrder::Little, true).unwrap();
        assert_eq!(decoded.service, req.service);
        assert_eq!(decoded.path, req.path);
        assert_eq!(decoded.payload, req.payload);
    }

    #[test]
    fn raw_path_overrides_computed_encoding() {
        let req = CipRequest {
            service: 0x4C,
            path: CipPath::default(),
            raw_path: Some(vec![0x91, 0x04, b'T', b'a', b'g', b'1']),
            payload: vec![],
        };
        let encoded = encode_request(&req, ByteOrder::Little, true);
        assert_eq!(encoded[1], 3); // 6 bytes / 2 = 3 words
        let decoded = decode_request(&encoded, ByteOrder::Little, true).unwrap();
        assert_eq!(decoded.path.name, "Tag1");
    }

    #[test]
    fn decode_reconstructs_raw_path_from_consumed_bytes() {
        let data = [0x0E, 0x03, 0x20, 0x04, 0x24, 0x65, 0x30, 0x03];
        let decoded = decode_request(&data, ByteOrder::Little, true).unwrap();
        assert_eq!(decoded.raw_path, Some(vec![0x20, 0x04, 0x24, 0x65, 0x30, 0x03]));
        assert_eq!(decoded.path, CipPath { class: 0x04, instance: 0x65, attribute: 0x03, name: String::new() });
    }

    #[test]
    fn decode_without_path_size_consumes_minimum_logical_path() {
        let req = CipRequest {
            service: 0x4C,
            path: CipPath { class: 1, instance: 1, attribute: 1, name: String::new() },
            raw_path: None,
            payload: vec![0xAA],
        };
        let encoded = encode_request(&req, ByteOrder::Little, false);
        let decoded = decode_request(&encoded, ByteOrder::Little, false).unwrap();
        assert_eq!(decoded.path, req.path);
        assert_eq!(decoded.payload, req.payload);
    }
}
