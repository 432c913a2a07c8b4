//! Fixture builder: synthesizes CIP request/response pairs, wraps them in
//! ENIP/CPF, and produces a PCAP plus a JSON expectation manifest.

use crate::codec::{self, CipPath, CipRequest, CipResponse};
use crate::enip;
use crate::pcap::{Direction, FlowState, PcapWriter};
use crate::registry;
use crate::validator::{Validator, WireProfile};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone)]
pub enum FixtureError {
    #[error("request '{0}' failed validation before encoding")]
    InvalidRequest(String),
    #[error("unknown payload type: {0}")]
    UnknownPayloadType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficMode {
    ClientOnly,
    Paired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceShape {
    None,
    Payload,
    Read,
    Write,
    Fragmented,
    ForwardOpen,
    ForwardClose,
    UnconnectedSend,
    RockwellTag,
    RockwellTagFragmented,
    RockwellTemplate,
    RockwellPccc,
    FileObject,
    ModbusObject,
    SafetyReset,
}

impl ServiceShape {
    pub fn min_request_len(&self) -> usize {
        match self {
            ServiceShape::ForwardOpen => 20,
            ServiceShape::UnconnectedSend => 4,
            ServiceShape::Write => 2,
            ServiceShape::Read => 2,
            _ => 0,
        }
    }

    pub fn min_response_len(&self) -> usize {
        match self {
            ServiceShape::ForwardOpen => 17,
            ServiceShape::Read => 2,
            ServiceShape::Write => 0,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSpec {
    pub id: String,
    pub class: u16,
    pub service: u8,
    pub payload_type: String,
    #[serde(default)]
    pub params: std::collections::HashMap<String, String>,
    pub outcome: Outcome,
    #[serde(default)]
    pub traffic_mode: TrafficMode,
    pub service_shape: ServiceShape,
    #[serde(default)]
    pub include_response: bool,
}

impl Default for TrafficMode {
    fn default() -> Self {
        TrafficMode::Paired
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationPcapSpec {
    pub name: String,
    pub requests: Vec<RequestSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketExpectation {
    pub id: String,
    pub outcome: Outcome,
    pub direction: String,
    pub packet_type: String,
    pub service_shape: ServiceShape,
    pub traffic_mode: TrafficMode,
    pub expect_layers: Vec<String>,
    pub expect_enip: bool,
    pub expect_cpf: bool,
    pub expect_cip: bool,
    pub expect_cip_path: bool,
    pub expect_status: bool,
    pub expect_symbol: bool,
}

#[derive(Debug, Clone)]
pub struct ValidationPacket {
    pub bytes: Vec<u8>,
    pub expectation: PacketExpectation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub pcap: String,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub packets: Vec<PacketExpectation>,
}

impl Manifest {
    /// Serializes the manifest to the JSON sidecar format written next to
    /// the PCAP.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn synthesize_payload(spec: &RequestSpec) -> Result<Vec<u8>, FixtureError> {
    match spec.payload_type.as_str() {
        "forward_open" => Ok(vec![0u8; 20]),
        "rockwell_tag" => Ok(vec![0xC4, 0x00, 0x2A, 0x00]),
        "unconnected_send" => {
            let embedded = vec![registry::SVC_READ_TAG, 0x02, 0x20, 0x6B, 0x24, 0x01];
            Ok(codec::build_unconnected_send(&embedded, &[0x01, 0x00]))
        }
        "file_object" => Ok(vec![0u8; 8]),
        "modbus_object" => Ok(vec![0u8; 4]),
        "invalid" => Ok(vec![0xFF]),
        other => Err(FixtureError::UnknownPayloadType(other.to_string())),
    }
}

fn synthesize_response_payload(shape: &ServiceShape) -> Vec<u8> {
    match shape {
        ServiceShape::Read | ServiceShape::RockwellTag => vec![0xC4, 0x00, 0x2A, 0x00, 0x00, 0x00],
        ServiceShape::ForwardOpen => vec![0u8; 17],
        ServiceShape::Write => Vec::new(),
        _ => vec![0u8; 2],
    }
}

pub struct FixtureBuilder {
    session_handle: u32,
}

impl FixtureBuilder {
    pub fn new(session_handle: u32) -> Self {
        FixtureBuilder { session_handle }
    }

    pub fn build(&self, spec: &ValidationPcapSpec) -> Result<Vec<ValidationPacket>, FixtureError> {
        let validator = Validator::new(false, WireProfile::ClientWire);
        let mut packets = Vec::new();

        for (index, req_spec) in spec.requests.iter().enumerate() {
            let payload = synthesize_payload(req_spec)?;
            let path = CipPath { class: req_spec.class, instance: 1, attribute: 0, name: String::new() };
            let request = CipRequest { service: req_spec.service, path: path.clone(), raw_path: None, payload };

            if req_spec.outcome == Outcome::Valid {
                let findings = validator.validate_request(&request, req_spec.class);
                if Validator::findings_error(&findings) {
                    warn!(id = %req_spec.id, ?findings, "fixture request failed validation");
                    return Err(FixtureError::InvalidRequest(req_spec.id.clone()));
                }
            }

            let framing = codec::framing();
            let encoded_request = codec::encode_request(&request, framing.byte_order, framing.include_path_size);
            let mut sender_context = [0u8; 8];
            sender_context[..4].copy_from_slice(&(index as u32).to_le_bytes());
            let cpf = enip::build_unconnected_cpf(&encoded_request);
            let body = enip::build_send_rr_data(&cpf);
            let frame = enip::build_frame(enip::ENCAP_CMD_SEND_RR_DATA, self.session_handle, sender_context, &body);

            packets.push(ValidationPacket {
                bytes: frame,
                expectation: expectation_for(req_spec, "request"),
            });

            if req_spec.include_response {
                let resp_payload = synthesize_response_payload(&req_spec.service_shape);
                let response = CipResponse {
                    service: req_spec.service | registry::RESPONSE_BIT,
                    path: path.clone(),
                    status: if req_spec.outcome == Outcome::Invalid { 0x05 } else { 0 },
                    ext_status: Vec::new(),
                    payload: resp_payload,
                };
                let encoded_response = codec::encode_response(&response, framing.include_resp_reserved);
                let resp_cpf = enip::build_unconnected_cpf(&encoded_response);
                let resp_body = enip::build_send_rr_data(&resp_cpf);
                let resp_frame = enip::build_frame(enip::ENCAP_CMD_SEND_RR_DATA, self.session_handle, sender_context, &resp_body);

                packets.push(ValidationPacket {
                    bytes: resp_frame,
                    expectation: expectation_for(req_spec, "response"),
                });
            }
        }

        info!(name = %spec.name, packet_count = packets.len(), "fixture generated");
        Ok(packets)
    }

    /// Writes the fixture's packets into a PCAP byte stream alongside its
    /// manifest. Flow state is tracked per request index within the fixture.
    pub fn to_pcap_and_manifest(&self, name: &str, packets: &[ValidationPacket]) -> (Vec<u8>, Manifest) {
        let mut writer = PcapWriter::new();
        let mut flow = FlowState::new(0);
        for packet in packets {
            let direction = if packet.expectation.direction == "request" { Direction::Request } else { Direction::Response };
            writer.push_packet(&mut flow, direction, &packet.bytes);
        }
        let pcap_bytes = writer.finish();
        let manifest = Manifest {
            pcap: format!("{name}.pcap"),
            generated_at: chrono::Utc::now(),
            packets: packets.iter().map(|p| p.expectation.clone()).collect(),
        };
        (pcap_bytes, manifest)
    }
}

fn expectation_for(spec: &RequestSpec, direction: &str) -> PacketExpectation {
    let mut layers = vec!["eth".to_string(), "ip".to_string(), "tcp".to_string(), "enip".to_string()];
    if codec::framing().use_cpf {
        layers.push("cpf".to_string());
    }
    layers.push("cip".to_string());

    PacketExpectation {
        id: spec.id.clone(),
        outcome: spec.outcome,
        direction: direction.to_string(),
        packet_type: spec.payload_type.clone(),
        service_shape: spec.service_shape.clone(),
        traffic_mode: spec.traffic_mode,
        expect_layers: layers,
        expect_enip: true,
        expect_cpf: codec::framing().use_cpf,
        expect_cip: true,
        expect_cip_path: !matches!(spec.service_shape, ServiceShape::UnconnectedSend),
        expect_status: direction == "response",
        expect_symbol: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn read_tag_spec() -> ValidationPcapSpec {
        ValidationPcapSpec {
            name: "read-tag-basic".into(),
            requests: vec![RequestSpec {
                id: "req-1".into(),
                class: 0x6B,
                service: registry::SVC_READ_TAG,
                payload_type: "rockwell_tag".into(),
                params: HashMap::new(),
                outcome: Outcome::Valid,
                traffic_mode: TrafficMode::Paired,
                service_shape: ServiceShape::Read,
                include_response: true,
            }],
        }
    }

    #[test]
    fn builds_request_and_response_packets() {
        let builder = FixtureBuilder::new(0x1111_2222);
        let packets = builder.build(&read_tag_spec()).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].expectation.direction, "request");
        assert_eq!(packets[1].expectation.direction, "response");
    }

    #[test]
    fn to_pcap_and_manifest_produces_one_manifest_entry_per_packet() {
        let builder = FixtureBuilder::new(1);
        let packets = builder.build(&read_tag_spec()).unwrap();
        let (pcap_bytes, manifest) = builder.to_pcap_and_manifest("read-tag-basic", &packets);
        assert!(!pcap_bytes.is_empty());
        assert_eq!(manifest.packets.len(), packets.len());
        assert!(manifest.to_json().unwrap().contains("\"pcap\""));
    }

    #[test]
    fn unknown_payload_type_is_rejected() {
        let mut spec = read_tag_spec();
        spec.requests[0].payload_type = "bogus".into();
        let builder = FixtureBuilder::new(1);
        assert!(matches!(builder.build(&spec), Err(FixtureError::UnknownPayloadType(_))));
    }
}
