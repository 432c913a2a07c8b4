//! EtherNet/IP encapsulation: the 24-byte header, Common Packet Format
//! items, and session-command builders.
//!
//! A session opens with `RegisterSession`, after which `SendRRData` carries
//! unconnected CIP request/response pairs and `SendUnitData` carries
//! connected (class-3 or class-1) traffic, each wrapping its CIP payload in
//! one or more CPF items addressed by item type id.

use byteorder::{ByteOrder as _, LittleEndian};
use thiserror::Error;

pub const ENCAP_CMD_NOP: u16 = 0x0000;
pub const ENCAP_CMD_LIST_SERVICES: u16 = 0x0004;
pub const ENCAP_CMD_LIST_IDENTITY: u16 = 0x0063;
pub const ENCAP_CMD_LIST_INTERFACES: u16 = 0x0064;
pub const ENCAP_CMD_REGISTER_SESSION: u16 = 0x0065;
pub const ENCAP_CMD_UNREGISTER_SESSION: u16 = 0x0066;
pub const ENCAP_CMD_SEND_RR_DATA: u16 = 0x006F;
pub const ENCAP_CMD_SEND_UNIT_DATA: u16 = 0x0070;

pub const CPF_ITEM_NULL_ADDRESS: u16 = 0x0000;
pub const CPF_ITEM_CONNECTED_ADDRESS: u16 = 0x00A1;
pub const CPF_ITEM_UNCONNECTED_DATA: u16 = 0x00B2;
pub const CPF_ITEM_CONNECTED_DATA: u16 = 0x00B1;

pub const HEADER_LEN: usize = 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnipError {
    #[error("encapsulation header too short: got {0} bytes, need {HEADER_LEN}")]
    HeaderTooShort(usize),
    #[error("declared length {declared} does not match actual body length {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("CPF item count implausible: {0}")]
    CpfItemCountImplausible(usize),
    #[error("CPF item length mismatch at item {index}: declared {declared}, remaining {remaining}")]
    CpfItemLengthMismatch { index: usize, declared: usize, remaining: usize },
    #[error("CPF data truncated")]
    CpfTruncated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncapHeader {
    pub command: u16,
    pub length: u16,
    pub session_handle: u32,
    pub status: u32,
    pub sender_context: [u8; 8],
    pub options: u32,
}

impl EncapHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        LittleEndian::write_u16(&mut buf[0..2], self.command);
        LittleEndian::write_u16(&mut buf[2..4], self.length);
        LittleEndian::write_u32(&mut buf[4..8], self.session_handle);
        LittleEndian::write_u32(&mut buf[8..12], self.status);
        buf[12..20].copy_from_slice(&self.sender_context);
        LittleEndian::write_u32(&mut buf[20..24], self.options);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, EnipError> {
        if data.len() < HEADER_LEN {
            return Err(EnipError::HeaderTooShort(data.len()));
        }
        let mut sender_context = [0u8; 8];
        sender_context.copy_from_slice(&data[12..20]);
        Ok(EncapHeader {
            command: LittleEndian::read_u16(&data[0..2]),
            length: LittleEndian::read_u16(&data[2..4]),
            session_handle: LittleEndian::read_u32(&data[4..8]),
            status: LittleEndian::read_u32(&data[8..12]),
            sender_context,
            options: LittleEndian::read_u32(&data[20..24]),
        })
    }
}

/// Builds a full encapsulation frame (header + body) and patches `length`.
pub fn build_frame(command: u16, session_handle: u32, sender_context: [u8; 8], body: &[u8]) -> Vec<u8> {
    let header = EncapHeader {
        command,
        length: body.len() as u16,
        session_handle,
        status: 0,
        sender_context,
        options: 0,
    };
    let mut frame = header.encode().to_vec();
    frame.extend_from_slice(body);
    frame
}

/// Splits a full frame into `(header, body)`, validating that the declared
/// length matches the actual trailing byte count.
pub fn split_frame(data: &[u8]) -> Result<(EncapHeader, &[u8]), EnipError> {
    let header = EncapHeader::decode(data)?;
    let body = &data[HEADER_LEN..];
    if header.length as usize != body.len() {
        return Err(EnipError::LengthMismatch { declared: header.length as usize, actual: body.len() });
    }
    Ok((header, body))
}

pub fn build_register_session() -> Vec<u8> {
    let mut data = vec![0u8; 4];
    LittleEndian::write_u16(&mut data[0..2], 1); // protocol version
    LittleEndian::write_u16(&mut data[2..4], 0); // option flags
    data
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpfItem {
    pub type_id: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cpf {
    pub items: Vec<CpfItem>,
}

impl Cpf {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut count = [0u8; 2];
        LittleEndian::write_u16(&mut count, self.items.len() as u16);
        buf.extend_from_slice(&count);
        for item in &self.items {
            let mut header = [0u8; 4];
            LittleEndian::write_u16(&mut header[0..2], item.type_id);
            LittleEndian::write_u16(&mut header[2..4], item.data.len() as u16);
            buf.extend_from_slice(&header);
            buf.extend_from_slice(&item.data);
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, EnipError> {
        if data.len() < 2 {
            return Err(EnipError::CpfTruncated);
        }
        let count = LittleEndian::read_u16(&data[0..2]) as usize;
        if count > 64 {
            return Err(EnipError::CpfItemCountImplausible(count));
        }
        let mut pos = 2;
        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            if data.len() < pos + 4 {
                return Err(EnipError::CpfTruncated);
            }
            let type_id = LittleEndian::read_u16(&data[pos..pos + 2]);
            let len = LittleEndian::read_u16(&data[pos + 2..pos + 4]) as usize;
            pos += 4;
            if data.len() < pos + len {
                return Err(EnipError::CpfItemLengthMismatch { index: i, declared: len, remaining: data.len() - pos });
            }
            items.push(CpfItem { type_id, data: data[pos..pos + len].to_vec() });
            pos += len;
        }
        Ok(Cpf { items })
    }

    pub fn find(&self, type_id: u16) -> Option<&CpfItem> {
        self.items.iter().find(|i| i.type_id == type_id)
    }

    pub fn has_connected_address(&self) -> bool {
        self.find(CPF_ITEM_CONNECTED_ADDRESS)
            .map(|i| i.data.len() >= 4 && LittleEndian::read_u32(&i.data[0..4]) != 0)
            .unwrap_or(false)
    }
}

/// Builds the unconnected-message CPF body for SendRRData: a Null Address
/// item followed by an Unconnected Data item carrying the CIP message.
pub fn build_unconnected_cpf(cip_message: &[u8]) -> Cpf {
    Cpf {
        items: vec![
            CpfItem { type_id: CPF_ITEM_NULL_ADDRESS, data: vec![] },
            CpfItem { type_id: CPF_ITEM_UNCONNECTED_DATA, data: cip_message.to_vec() },
        ],
    }
}

/// Builds a SendRRData body: interface handle (0) + timeout (0) + CPF.
pub fn build_send_rr_data(cpf: &Cpf) -> Vec<u8> {
    let mut body = vec![0u8; 6];
    body.extend_from_slice(&cpf.encode());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_encap_header() {
        let header = EncapHeader {
            command: ENCAP_CMD_SEND_RR_DATA,
            length: 10,
            session_handle: 0x1234_5678,
            status: 0,
            sender_context: [1, 2, 3, 4, 5, 6, 7, 8],
            options: 0,
        };
        let encoded = header.encode();
        let decoded = EncapHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn split_frame_validates_length() {
        let body = vec![0xAA; 4];
        let frame = build_frame(ENCAP_CMD_SEND_RR_DATA, 1, [0; 8], &body);
        let (header, parsed_body) = split_frame(&frame).unwrap();
        assert_eq!(header.command, ENCAP_CMD_SEND_RR_DATA);
        assert_eq!(parsed_body, &body[..]);
    }

    #[test]
    fn cpf_round_trips_two_items() {
        let cpf = build_unconnected_cpf(&[0x4C, 0x02, 0x20, 0x6B]);
        let encoded = cpf.encode();
        let decoded = Cpf::decode(&encoded).unwrap();
        assert_eq!(decoded, cpf);
    }

    #[test]
    fn connected_address_item_requires_nonzero_id() {
        let mut cpf = Cpf::default();
        cpf.items.push(CpfItem { type_id: CPF_ITEM_CONNECTED_ADDRESS, data: vec![0, 0, 0, 0] });
        assert!(!cpf.has_connected_address());
        cpf.items[0].data = vec![1, 0, 0, 0];
        assert!(cpf.has_connected_address());
    }
}
