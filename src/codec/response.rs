//! CIP response encode/decode.

use super::epath::CipPath;
use super::CodecError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipResponse {
    pub service: u8,
    pub path: CipPath,
    pub status: u8,
    pub ext_status: Vec<u8>,
    pub payload: Vec<u8>,
}

pub fn encode_response(resp: &CipResponse, include_resp_reserved: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + resp.ext_status.len() + resp.payload.len());
    buf.push(resp.service);

    if include_resp_reserved {
        buf.push(0x00);
        buf.push(resp.status);
        let ext_words = resp.ext_status.len().div_ceil(2);
        buf.push(ext_words as u8);
        let mut padded = resp.ext_status.clone();
        if padded.len() % 2 == 1 {
            padded.push(0);
        }
        buf.extend_from_slice(&padded);
    } else {
        buf.push(resp.status);
        if resp.status != 0 {
            buf.push(resp.ext_status.len() as u8);
            buf.extend_from_slice(&resp.ext_status);
        }
    }
    buf.extend_from_slice(&resp.payload);
    buf
}

pub fn decode_response(data: &[u8], include_resp_reserved: bool) -> Result<CipResponse, CodecError> {
    if data.is_empty() {
        return Err(CodecError::too_short(0, 1, 0));
    }
    let service = data[0];
    let mut pos = 1usize;

    let (status, ext_status, payload_start);
    if include_resp_reserved {
        if data.len() < pos + 3 {
            return Err(CodecError::too_short(pos, 3, data.len() - pos));
        }
        pos += 1; // reserved byte
        status = data[pos];
        pos += 1;
        let ext_words = data[pos] as usize;
        pos += 1;
        let ext_len = ext_words * 2;
        if data.len() < pos + ext_len {
            return Err(CodecError::bad_ext_status_size(pos, ext_len, data.len() - pos));
        }
        ext_status = data[pos..pos + ext_len].to_vec();
        pos += ext_len;
        payload_start = pos;
    } else {
        status = data[pos];
        pos += 1;
        if status != 0 {
            if data.len() < pos + 1 {
                return Err(CodecError::too_short(pos, 1, 0));
            }
            let ext_len = data[pos] as usize;
            pos += 1;
            if data.len() < pos + ext_len {
                return Err(CodecError::bad_ext_status_size(pos, ext_len, data.len() - pos));
            }
            ext_status = data[pos..pos + ext_len].to_vec();
            pos += ext_len;
        } else {
            ext_status = Vec::new();
        }
        payload_start = pos;
    }

    let payload = if status == 0 {
        data.get(payload_start..).unwrap_or(&[]).to_vec()
    } else {
        Vec::new()
    };

    Ok(CipResponse { service, path: CipPath::default(), status, ext_status, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_success_response_with_reserved_framing() {
        let resp = CipResponse {
            service: 0xCC,
            path: CipPath::default(),
            status: 0,
            ext_status: vec![],
            payload: vec![0xC4, 0x00, 0x2A, 0x00, 0x00, 0x00],
        };
        let encoded = encode_response(&resp, true);
        let decoded = decode_response(&encoded, true).unwrap();
        assert_eq!(decoded.status, 0);
        assert_eq!(decoded.payload, resp.payload);
    }

    #[test]
    fn error_response_without_reserved_uses_byte_sized_ext_status() {
        let resp = CipResponse {
            service: 0xCC,
            path: CipPath::default(),
            status: 0x05,
            ext_status: vec![0x01, 0x02],
            payload: vec![],
        };
        let encoded = encode_response(&resp, false);
        let decoded = decode_response(&encoded, false).unwrap();
        assert_eq!(decoded.status, 0x05);
        assert_eq!(decoded.ext_status, vec![0x01, 0x02]);
        assert!(decoded.payload.is_empty());
    }
}
