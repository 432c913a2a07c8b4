//! Validator: structural and semantic checks on ENIP frames and CIP
//! requests/responses, producing severity-classified findings.
//!
//! Shaped after a config+rule-pipeline validator: a small config struct, a
//! registry of domain rules, and a `validate` entry point that accumulates
//! findings rather than failing fast.

use crate::codec::{CipRequest, CipResponse};
use crate::enip::{self, Cpf, EncapHeader};
use crate::registry::{self, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub code: &'static str,
    pub message: String,
    pub severity: Severity,
}

impl Finding {
    fn error(code: &'static str, message: impl Into<String>) -> Self {
        Finding { code, message: message.into(), severity: Severity::Error }
    }
    fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Finding { code, message: message.into(), severity: Severity::Warning }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireProfile {
    ClientWire,
    ServerWire,
}

pub struct Validator {
    pub strict: bool,
    pub profile: WireProfile,
    registry: Registry,
}

impl Validator {
    pub fn new(strict: bool, profile: WireProfile) -> Self {
        Validator { strict, profile, registry: Registry::new() }
    }

    pub fn findings_error(findings: &[Finding]) -> bool {
        findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn validate_enip_header(&self, header: &EncapHeader, body_len: usize) -> Vec<Finding> {
        let mut findings = Vec::new();

        let known_commands = [
            enip::ENCAP_CMD_NOP,
            enip::ENCAP_CMD_LIST_SERVICES,
            enip::ENCAP_CMD_LIST_IDENTITY,
            enip::ENCAP_CMD_LIST_INTERFACES,
            enip::ENCAP_CMD_REGISTER_SESSION,
            enip::ENCAP_CMD_UNREGISTER_SESSION,
            enip::ENCAP_CMD_SEND_RR_DATA,
            enip::ENCAP_CMD_SEND_UNIT_DATA,
        ];
        if !known_commands.contains(&header.command) {
            findings.push(Finding::error("ENIP_UNKNOWN_COMMAND", format!("unknown command 0x{:04X}", header.command)));
        }

        if header.length as usize != body_len {
            findings.push(Finding::error(
                "ENIP_LENGTH_MISMATCH",
                format!("declared length {} does not match body {}", header.length, body_len),
            ));
        }

        let session_exempt = matches!(
            header.command,
            enip::ENCAP_CMD_REGISTER_SESSION | enip::ENCAP_CMD_LIST_IDENTITY
                | enip::ENCAP_CMD_LIST_SERVICES | enip::ENCAP_CMD_LIST_INTERFACES
        );
        if !session_exempt && header.session_handle == 0 {
            findings.push(Finding::error("ENIP_MISSING_SESSION", "non-session command with session_handle=0"));
        }

        if self.strict && self.profile == WireProfile::ClientWire {
            if header.status != 0 {
                findings.push(Finding::error("ENIP_STATUS_NONZERO", "client request carries nonzero status"));
            }
            if header.sender_context == [0u8; 8] {
                findings.push(Finding::warning("ENIP_SENDER_CONTEXT_ZERO", "sender context is all zeros"));
            }
            if header.options != 0 {
                findings.push(Finding::error("ENIP_OPTIONS_NONZERO", "options field must be zero"));
            }
        }

        findings
    }

    pub fn validate_cpf(&self, cpf: &Cpf, require_connected: bool) -> Vec<Finding> {
        let mut findings = Vec::new();
        if require_connected && !cpf.has_connected_address() {
            findings.push(Finding::error("CPF_MISSING_CONNECTED_ADDRESS", "SendUnitData requires a connected-address item with nonzero id"));
        }
        findings
    }

    pub fn validate_request(&self, req: &CipRequest, class: u16) -> Vec<Finding> {
        let mut findings = Vec::new();

        if !self.registry.is_known_service(req.service) {
            findings.push(Finding::error("CIP_UNKNOWN_SERVICE", format!("unknown service code 0x{:02X}", req.service)));
        }

        if self.strict {
            if registry::is_response(req.service) {
                findings.push(Finding::error("CIP_REQUEST_HAS_RESPONSE_BIT", "request service carries the response bit"));
            }
            if registry::base_service(req.service) == registry::SVC_ERROR_RESPONSE {
                findings.push(Finding::error("CIP_REQUEST_IS_ERROR_RESPONSE", "request uses the Error_Response service code"));
            }
        }

        if !req.path.is_logical() && !req.path.is_symbolic() {
            findings.push(Finding::error("CIP_PATH_MISSING", "request carries no path"));
        }

        if req.payload.len() > 65535 {
            findings.push(Finding::error("CIP_PAYLOAD_TOO_LARGE", "payload exceeds 65535 bytes"));
        }

        if let Some(def) = self.registry.lookup(class, req.service) {
            if def.requires_instance && req.path.instance == 0 {
                findings.push(Finding::error("CIP_MISSING_INSTANCE", format!("{} requires a nonzero instance", def.name)));
            }
            if def.requires_attribute && req.path.attribute == 0 {
                findings.push(Finding::error("CIP_MISSING_ATTRIBUTE", format!("{} requires a nonzero attribute", def.name)));
            }
            if req.payload.len() < def.min_request_len {
                findings.push(Finding::error(
                    "CIP_REQUEST_TOO_SHORT",
                    format!("{} requires at least {} payload bytes, got {}", def.name, def.min_request_len, req.payload.len()),
                ));
            }
            for rule in &def.rules {
                if let Err(reason) = (rule.check_request)(&req.payload) {
                    findings.push(Finding::error("CIP_SERVICE_RULE_VIOLATION", format!("{}/{}: {reason}", def.name, rule.name)));
                }
            }
        }

        findings
    }

    pub fn validate_response(&self, resp: &CipResponse, request_service: u8, class: u16) -> Vec<Finding> {
        let mut findings = Vec::new();

        let expected = request_service | registry::RESPONSE_BIT;
        if resp.service != expected {
            findings.push(Finding::error(
                "CIP_RESPONSE_SERVICE_MISMATCH",
                format!("expected response service 0x{expected:02X}, got 0x{:02X}", resp.service),
            ));
        }

        if let Some(def) = self.registry.lookup(class, request_service) {
            if resp.status == 0 && resp.payload.len() < def.min_response_len {
                findings.push(Finding::warning(
                    "CIP_RESPONSE_TOO_SHORT",
                    format!("{} response shorter than expected minimum {}", def.name, def.min_response_len),
                ));
            }
            if resp.status == 0 {
                for rule in &def.rules {
                    if let Err(reason) = (rule.check_response)(&resp.payload) {
                        findings.push(Finding::error("CIP_SERVICE_RULE_VIOLATION", format!("{}/{}: {reason}", def.name, rule.name)));
                    }
                }
            }
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CipPath;

    #[test]
    fn flags_unknown_service_code() {
        let validator = Validator::new(false, WireProfile::ClientWire);
        let req = CipRequest { service: 0x7F, path: CipPath { class: 0x6B, instance: 1, attribute: 0, name: String::new() }, raw_path: None, payload: vec![] };
        let findings = validator.validate_request(&req, 0x6B);
        assert!(findings.iter().any(|f| f.code == "CIP_UNKNOWN_SERVICE"));
    }

    #[test]
    fn strict_mode_rejects_request_with_response_bit_set() {
        let validator = Validator::new(true, WireProfile::ClientWire);
        let req = CipRequest {
            service: registry::SVC_READ_TAG | registry::RESPONSE_BIT,
            path: CipPath { class: 0x6B, instance: 1, attribute: 0, name: String::new() },
            raw_path: None,
            payload: vec![],
        };
        let findings = validator.validate_request(&req, 0x6B);
        assert!(findings.iter().any(|f| f.code == "CIP_REQUEST_HAS_RESPONSE_BIT"));
    }

    #[test]
    fn response_service_mismatch_is_an_error() {
        let validator = Validator::new(false, WireProfile::ServerWire);
        let resp = CipResponse { service: 0xDD, path: CipPath::default(), status: 0, ext_status: vec![], payload: vec![0, 0] };
        let findings = validator.validate_response(&resp, registry::SVC_READ_TAG, 0x6B);
        assert!(findings.iter().any(|f| f.code == "CIP_RESPONSE_SERVICE_MISMATCH"));
    }

    #[test]
    fn forward_open_with_zero_timeout_ticks_violates_its_rule() {
        let validator = Validator::new(false, WireProfile::ClientWire);
        let mut payload = vec![0u8; 20];
        payload[1] = 0; // timeout_ticks
        let req = CipRequest {
            service: registry::SVC_FORWARD_OPEN,
            path: CipPath { class: 0x06, instance: 1, attribute: 0, name: String::new() },
            raw_path: None,
            payload,
        };
        let findings = validator.validate_request(&req, 0x06);
        assert!(findings.iter().any(|f| f.code == "CIP_SERVICE_RULE_VIOLATION"));
    }

    #[test]
    fn enip_header_length_mismatch_is_flagged() {
        let validator = Validator::new(false, WireProfile::ClientWire);
        let header = EncapHeader {
            command: enip::ENCAP_CMD_SEND_RR_DATA,
            length: 99,
            session_handle: 1,
            status: 0,
            sender_context: [0; 8],
            options: 0,
        };
        let findings = validator.validate_enip_header(&header, 4);
        assert!(findings.iter().any(|f| f.code == "ENIP_LENGTH_MISMATCH"));
    }
}
