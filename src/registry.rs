//! Service registry: the canonical (class, service) → constraints table.
//!
//! Built once at process start and read concurrently thereafter — it never
//! mutates, so callers don't need a lock to consult it.

use std::collections::HashMap;

pub const SVC_GET_ATTRIBUTE_ALL: u8 = 0x01;
pub const SVC_SET_ATTRIBUTE_ALL: u8 = 0x02;
pub const SVC_GET_ATTRIBUTE_LIST: u8 = 0x03;
pub const SVC_SET_ATTRIBUTE_LIST: u8 = 0x04;
pub const SVC_RESET: u8 = 0x05;
pub const SVC_START: u8 = 0x06;
pub const SVC_STOP: u8 = 0x07;
pub const SVC_CREATE: u8 = 0x08;
pub const SVC_DELETE: u8 = 0x09;
pub const SVC_MULTIPLE_SERVICE: u8 = 0x0A;
pub const SVC_APPLY_ATTRIBUTES: u8 = 0x0D;
pub const SVC_GET_ATTRIBUTE_SINGLE: u8 = 0x0E;
pub const SVC_SET_ATTRIBUTE_SINGLE: u8 = 0x10;
pub const SVC_FIND_NEXT_OBJECT_INSTANCE: u8 = 0x11;
pub const SVC_ERROR_RESPONSE: u8 = 0x14;
pub const SVC_RESTORE: u8 = 0x15;
pub const SVC_SAVE: u8 = 0x16;
pub const SVC_NOOP: u8 = 0x17;
pub const SVC_GET_MEMBER: u8 = 0x18;
pub const SVC_SET_MEMBER: u8 = 0x19;
pub const SVC_INSERT_MEMBER: u8 = 0x1A;
pub const SVC_REMOVE_MEMBER: u8 = 0x1B;
pub const SVC_GROUP_SYNC: u8 = 0x1C;
pub const SVC_EXECUTE_PCCC: u8 = 0x4B;
pub const SVC_READ_TAG: u8 = 0x4C;
pub const SVC_WRITE_TAG: u8 = 0x4D;
pub const SVC_READ_MODIFY_WRITE: u8 = 0x4E;
pub const SVC_UPLOAD_TRANSFER: u8 = 0x4F;
pub const SVC_DOWNLOAD_TRANSFER: u8 = 0x50;
pub const SVC_CLEAR_FILE: u8 = 0x51;
pub const SVC_READ_TAG_FRAGMENTED: u8 = 0x52;
pub const SVC_WRITE_TAG_FRAGMENTED: u8 = 0x53;
pub const SVC_GET_INSTANCE_ATTRIBUTE_LIST: u8 = 0x55;
pub const SVC_UNCONNECTED_SEND: u8 = 0x52;
pub const SVC_GET_CONNECTION_DATA: u8 = 0x56;
pub const SVC_SEARCH_CONNECTION_DATA: u8 = 0x57;
pub const SVC_GET_CONNECTION_OWNER: u8 = 0x5A;
pub const SVC_FORWARD_OPEN: u8 = 0x54;
pub const SVC_LARGE_FORWARD_OPEN: u8 = 0x5B;
pub const SVC_FORWARD_CLOSE: u8 = 0x4E;

pub const RESPONSE_BIT: u8 = 0x80;

pub fn base_service(service: u8) -> u8 {
    service & 0x7F
}

pub fn is_response(service: u8) -> bool {
    service & RESPONSE_BIT != 0
}

/// A named predicate a service definition carries beyond the generic
/// instance/attribute/length checks — request and response shape checks
/// specific to that service's payload layout.
#[derive(Debug, Clone, Copy)]
pub struct ServiceRule {
    pub name: &'static str,
    pub check_request: fn(&[u8]) -> Result<(), String>,
    pub check_response: fn(&[u8]) -> Result<(), String>,
}

fn rule_ok_response(_: &[u8]) -> Result<(), String> {
    Ok(())
}

fn forward_open_timeout_ticks_nonzero(payload: &[u8]) -> Result<(), String> {
    match payload.get(1) {
        None => Err("Forward_Open request too short to contain timeout_ticks".to_string()),
        Some(0) => Err("Forward_Open timeout_ticks must be nonzero".to_string()),
        Some(_) => Ok(()),
    }
}

fn multiple_service_offsets_in_bounds(payload: &[u8]) -> Result<(), String> {
    if payload.len() < 2 {
        return Err("Multiple_Service_Packet payload too short for a service count".to_string());
    }
    let count = u16::from_le_bytes([payload[0], payload[1]]) as usize;
    if payload.len() < 2 + count * 2 {
        return Err(format!("Multiple_Service_Packet declares {count} offsets but payload is too short to hold them"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ServiceDef {
    pub name: &'static str,
    pub requires_instance: bool,
    pub requires_attribute: bool,
    pub min_request_len: usize,
    pub min_response_len: usize,
    pub rules: Vec<ServiceRule>,
}

pub struct Registry {
    defs: HashMap<(u16, u8), ServiceDef>,
    known: std::collections::HashSet<u8>,
}

impl Registry {
    pub fn new() -> Self {
        let mut defs = HashMap::new();
        let mut known = std::collections::HashSet::new();

        let entries: &[(u16, u8, ServiceDef)] = &[
            (0, SVC_GET_ATTRIBUTE_SINGLE, ServiceDef {
                name: "Get_Attribute_Single", requires_instance: true, requires_attribute: true,
                min_request_len: 0, min_response_len: 0, rules: vec![],
            }),
            (0, SVC_SET_ATTRIBUTE_SINGLE, ServiceDef {
                name: "Set_Attribute_Single", requires_instance: true, requires_attribute: true,
                min_request_len: 1, min_response_len: 0, rules: vec![],
            }),
            (0, SVC_GET_ATTRIBUTE_ALL, ServiceDef {
                name: "Get_Attribute_All", requires_instance: true, requires_attribute: false,
                min_request_len: 0, min_response_len: 0, rules: vec![],
            }),
            (0, SVC_RESET, ServiceDef {
                name: "Reset", requires_instance: true, requires_attribute: false,
                min_request_len: 0, min_response_len: 0, rules: vec![],
            }),
            (0, SVC_MULTIPLE_SERVICE, ServiceDef {
                name: "Multiple_Service_Packet", requires_instance: true, requires_attribute: false,
                min_request_len: 2, min_response_len: 2,
                rules: vec![ServiceRule {
                    name: "offsets_in_bounds",
                    check_request: multiple_service_offsets_in_bounds,
                    check_response: multiple_service_offsets_in_bounds,
                }],
            }),
            (0x6B, SVC_READ_TAG, ServiceDef {
                name: "Read_Tag", requires_instance: false, requires_attribute: false,
                min_request_len: 2, min_response_len: 2, rules: vec![],
            }),
            (0x6B, SVC_WRITE_TAG, ServiceDef {
                name: "Write_Tag", requires_instance: false, requires_attribute: false,
                min_request_len: 4, min_response_len: 0, rules: vec![],
            }),
            (0x6B, SVC_READ_TAG_FRAGMENTED, ServiceDef {
                name: "Read_Tag_Fragmented", requires_instance: false, requires_attribute: false,
                min_request_len: 6, min_response_len: 4, rules: vec![],
            }),
            (0x6B, SVC_WRITE_TAG_FRAGMENTED, ServiceDef {
                name: "Write_Tag_Fragmented", requires_instance: false, requires_attribute: false,
                min_request_len: 8, min_response_len: 4, rules: vec![],
            }),
            (0x06, SVC_FORWARD_OPEN, ServiceDef {
                name: "Forward_Open", requires_instance: false, requires_attribute: false,
                min_request_len: 20, min_response_len: 17,
                rules: vec![ServiceRule {
                    name: "timeout_ticks_nonzero",
                    check_request: forward_open_timeout_ticks_nonzero,
                    check_response: rule_ok_response,
                }],
            }),
            (0x06, SVC_LARGE_FORWARD_OPEN, ServiceDef {
                name: "Large_Forward_Open", requires_instance: false, requires_attribute: false,
                min_request_len: 24, min_response_len: 17,
                rules: vec![ServiceRule {
                    name: "timeout_ticks_nonzero",
                    check_request: forward_open_timeout_ticks_nonzero,
                    check_response: rule_ok_response,
                }],
            }),
            (0x06, SVC_FORWARD_CLOSE, ServiceDef {
                name: "Forward_Close", requires_instance: false, requires_attribute: false,
                min_request_len: 10, min_response_len: 10, rules: vec![],
            }),
            (0x06, SVC_UNCONNECTED_SEND, ServiceDef {
                name: "Unconnected_Send", requires_instance: false, requires_attribute: false,
                min_request_len: 4, min_response_len: 0, rules: vec![],
            }),
        ];

        for (class, service, def) in entries {
            known.insert(*service);
            defs.insert((*class, *service), def.clone());
        }

        Registry { defs, known }
    }

    /// Looks up a service definition by (class, service). Several service
    /// codes alias across object classes, so dispatch is always keyed on the
    /// pair, never on the code alone.
    pub fn lookup(&self, class: u16, service: u8) -> Option<&ServiceDef> {
        self.defs.get(&(class, base_service(service)))
    }

    pub fn is_known_service(&self, service: u8) -> bool {
        self.known.contains(&base_service(service))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_by_class_and_service_pair() {
        let reg = Registry::new();
        let def = reg.lookup(0x6B, SVC_READ_TAG).unwrap();
        assert_eq!(def.name, "Read_Tag");
        assert!(reg.lookup(0x99, SVC_READ_TAG).is_none());
    }

    #[test]
    fn response_bit_and_base_service_split_correctly() {
        assert!(is_response(0x4C | RESPONSE_BIT));
        assert_eq!(base_service(0x4C | RESPONSE_BIT), 0x4C);
    }
}
