//! Packet evaluator: combines dissector output, an internal re-parse, and
//! the manifest's expectation to grade each captured packet.

use crate::fixture::{Outcome, PacketExpectation, TrafficMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct DissectorFields {
    pub fields: HashMap<String, String>,
    pub expert_messages: Vec<ExpertMessage>,
    pub malformed: bool,
}

#[derive(Debug, Clone)]
pub struct ExpertMessage {
    pub message: String,
    pub severity: ExpertSeverity,
    pub category: ExpertCategory,
}

/// Where an expert-info message falls relative to the scenario's own
/// expectations: `Expected` messages are named by the expectation itself
/// (e.g. "CIP request without a response" in client-only mode), `Transport`
/// messages come from TCP/IP framing rather than CIP content, and
/// `Protocol` is everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpertCategory {
    Expected,
    Transport,
    Protocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExpertSeverity {
    Chat,
    Note,
    Warn,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct InternalParse {
    pub has_enip: bool,
    pub has_cpf: bool,
    pub has_cip: bool,
    pub has_cip_path: bool,
    pub has_symbol: bool,
    pub status: Option<u8>,
    pub payload_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpertPolicy {
    Off,
    Balanced,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedPolicy {
    Internal,
    Either,
    Tshark,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioResult {
    pub name: String,
    pub pass: bool,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Pass,
    Fail,
    ExpectedInvalid,
}

pub const LABEL_ENIP_LENGTH_MISMATCH: &str = "INV_ENIP_LENGTH_MISMATCH";
pub const LABEL_ENIP_PARSE: &str = "INV_ENIP_PARSE";
pub const LABEL_CPF_ITEMCOUNT_IMPLAUSIBLE: &str = "INV_CPF_ITEMCOUNT_IMPLAUSIBLE";
pub const LABEL_CPF_ITEM_LENGTH_MISMATCH: &str = "INV_CPF_ITEM_LENGTH_MISMATCH";
pub const LABEL_CPF_PARSE: &str = "INV_CPF_PARSE";
pub const LABEL_CIP_PARSE: &str = "INV_CIP_PARSE";
pub const LABEL_CIP_PATHSIZE_MISMATCH: &str = "INV_CIP_PATHSIZE_MISMATCH";
pub const LABEL_CIP_PATH_MISSING: &str = "INV_CIP_PATH_MISSING";
pub const LABEL_CIP_SERVICE_DATA_SHAPE_MISMATCH: &str = "INV_CIP_SERVICE_DATA_SHAPE_MISMATCH";
pub const LABEL_CIP_STATUS_MISSING: &str = "INV_CIP_STATUS_MISSING";
pub const LABEL_CIP_RESPONSE_SERVICE_MISMATCH: &str = "INV_CIP_RESPONSE_SERVICE_MISMATCH";
pub const LABEL_TSHARK_MALFORMED: &str = "TSHARK_MALFORMED";

#[derive(Debug, Clone)]
pub struct PairingResult {
    pub request_index: Option<usize>,
    pub response_index: Option<usize>,
    pub order_ok: bool,
    pub same_session: bool,
    pub tuple_reversed: bool,
    pub service_matches: bool,
    pub status_present: bool,
}

pub struct Evaluator {
    pub malformed_policy: MalformedPolicy,
    pub expert_policy: ExpertPolicy,
}

impl Evaluator {
    pub fn new(malformed_policy: MalformedPolicy, expert_policy: ExpertPolicy) -> Self {
        Evaluator { malformed_policy, expert_policy }
    }

    pub fn evaluate(
        &self,
        expectation: &PacketExpectation,
        dissector: &DissectorFields,
        internal: &InternalParse,
        pairing: Option<&PairingResult>,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        results.push(self.layers(expectation, dissector));
        results.push(self.field_presence("enip", expectation.expect_enip, dissector, "enip", internal.has_enip));
        results.push(self.field_presence("cpf", expectation.expect_cpf, dissector, "cpf", internal.has_cpf));
        results.push(self.field_presence("cip", expectation.expect_cip, dissector, "cip", internal.has_cip));
        results.push(self.cip_path(expectation, dissector, internal));
        results.push(self.cip_status(expectation, dissector, internal));
        results.push(self.service_data(expectation, internal));
        results.push(self.malformed(expectation, dissector));
        results.push(self.experts(dissector));

        if expectation.traffic_mode != TrafficMode::ClientOnly {
            if let Some(p) = pairing {
                results.push(self.pairing(p));
            }
        }

        results
    }

    fn layers(&self, expectation: &PacketExpectation, dissector: &DissectorFields) -> ScenarioResult {
        let missing: Vec<&String> = expectation
            .expect_layers
            .iter()
            .filter(|layer| !dissector.fields.contains_key(layer.as_str()))
            .collect();
        ScenarioResult {
            name: "layers".to_string(),
            pass: missing.is_empty(),
            details: if missing.is_empty() { String::new() } else { format!("missing layers: {missing:?}") },
        }
    }

    fn field_presence(&self, name: &str, expected: bool, dissector: &DissectorFields, key: &str, internal_has: bool) -> ScenarioResult {
        let present = dissector.fields.contains_key(key) || internal_has;
        ScenarioResult {
            name: name.to_string(),
            pass: !expected || present,
            details: if !expected || present { String::new() } else { format!("{key} expected but absent") },
        }
    }

    fn cip_path(&self, expectation: &PacketExpectation, dissector: &DissectorFields, internal: &InternalParse) -> ScenarioResult {
        let present = dissector.fields.contains_key("cip.path") || internal.has_cip_path || internal.has_symbol;
        ScenarioResult {
            name: "cip_path".to_string(),
            pass: !expectation.expect_cip_path || present,
            details: if !expectation.expect_cip_path || present { String::new() } else { "expected path absent".to_string() },
        }
    }

    fn cip_status(&self, expectation: &PacketExpectation, dissector: &DissectorFields, internal: &InternalParse) -> ScenarioResult {
        let present = dissector.fields.contains_key("cip.status") || internal.status.is_some();
        ScenarioResult {
            name: "cip_status".to_string(),
            pass: !expectation.expect_status || present,
            details: if !expectation.expect_status || present { String::new() } else { "status not extractable".to_string() },
        }
    }

    fn service_data(&self, expectation: &PacketExpectation, internal: &InternalParse) -> ScenarioResult {
        let min = if expectation.direction == "request" {
            expectation.service_shape.min_request_len()
        } else {
            expectation.service_shape.min_response_len()
        };
        let pass = internal.payload_len >= min;
        ScenarioResult {
            name: "service_data".to_string(),
            pass,
            details: if pass { String::new() } else { format!("payload {} shorter than minimum {}", internal.payload_len, min) },
        }
    }

    fn malformed(&self, expectation: &PacketExpectation, dissector: &DissectorFields) -> ScenarioResult {
        let signals_malformed = match self.malformed_policy {
            MalformedPolicy::Internal => false,
            MalformedPolicy::Either => dissector.malformed,
            MalformedPolicy::Tshark => {
                dissector.malformed || dissector.expert_messages.iter().any(|e| e.severity >= ExpertSeverity::Error)
            }
        };
        let pass = match expectation.outcome {
            Outcome::Invalid => signals_malformed,
            Outcome::Valid => !signals_malformed,
        };
        ScenarioResult { name: "malformed".to_string(), pass, details: String::new() }
    }

    fn experts(&self, dissector: &DissectorFields) -> ScenarioResult {
        if self.expert_policy == ExpertPolicy::Off {
            return ScenarioResult { name: "experts".to_string(), pass: true, details: "policy off".to_string() };
        }
        let threshold = match self.expert_policy {
            ExpertPolicy::Off => unreachable!(),
            ExpertPolicy::Balanced => ExpertSeverity::Error,
            ExpertPolicy::Strict => ExpertSeverity::Warn,
        };
        let unexpected: Vec<&ExpertMessage> = dissector
            .expert_messages
            .iter()
            .filter(|e| e.category == ExpertCategory::Protocol && e.severity >= threshold)
            .collect();
        ScenarioResult {
            name: "experts".to_string(),
            pass: unexpected.is_empty(),
            details: if unexpected.is_empty() { String::new() } else { format!("{} unexpected expert message(s)", unexpected.len()) },
        }
    }

    fn pairing(&self, pairing: &PairingResult) -> ScenarioResult {
        let order_ok = match (pairing.request_index, pairing.response_index) {
            (Some(req), Some(resp)) => resp > req,
            _ => false,
        };
        let pass = order_ok == pairing.order_ok
            && pairing.same_session
            && pairing.tuple_reversed
            && pairing.service_matches
            && pairing.status_present;
        ScenarioResult { name: "pairing".to_string(), pass, details: String::new() }
    }

    /// A coarse pass/fail/expected-invalid judgment independent of the
    /// named-scenario breakdown above.
    pub fn grade(&self, expectation: &PacketExpectation, labels: &[&str]) -> Grade {
        if expectation.outcome == Outcome::Invalid {
            Grade::ExpectedInvalid
        } else if labels.is_empty() {
            Grade::Pass
        } else {
            Grade::Fail
        }
    }

    pub fn pass_category(&self, dissector: &DissectorFields) -> &'static str {
        if dissector.expert_messages.is_empty() {
            return "pass_clean";
        }
        let has_protocol = dissector.expert_messages.iter().any(|e| e.category == ExpertCategory::Protocol);
        let has_transport = dissector.expert_messages.iter().any(|e| e.category == ExpertCategory::Transport);
        if !has_protocol && !has_transport {
            "pass_with_expected_experts"
        } else if !has_protocol {
            "pass_with_transport_warnings"
        } else {
            "pass_with_warnings"
        }
    }

    /// Maps failing scenario results to the fixed Grade-A failure-label
    /// vocabulary for [`Evaluator::grade`] to consume.
    pub fn labels(&self, results: &[ScenarioResult]) -> Vec<&'static str> {
        results.iter().filter(|r| !r.pass).filter_map(|r| scenario_label(r.name.as_str())).collect()
    }
}

fn scenario_label(name: &str) -> Option<&'static str> {
    match name {
        "enip" => Some(LABEL_ENIP_PARSE),
        "cpf" => Some(LABEL_CPF_PARSE),
        "cip" => Some(LABEL_CIP_PARSE),
        "cip_path" => Some(LABEL_CIP_PATH_MISSING),
        "cip_status" => Some(LABEL_CIP_STATUS_MISSING),
        "service_data" => Some(LABEL_CIP_SERVICE_DATA_SHAPE_MISMATCH),
        "malformed" => Some(LABEL_TSHARK_MALFORMED),
        "pairing" => Some(LABEL_CIP_RESPONSE_SERVICE_MISMATCH),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::ServiceShape;

    fn expectation() -> PacketExpectation {
        PacketExpectation {
            id: "req-1".into(),
            outcome: Outcome::Valid,
            direction: "request".into(),
            packet_type: "rockwell_tag".into(),
            service_shape: ServiceShape::Read,
            traffic_mode: TrafficMode::ClientOnly,
            expect_layers: vec!["eth".into(), "ip".into(), "tcp".into(), "enip".into(), "cip".into()],
            expect_enip: true,
            expect_cpf: true,
            expect_cip: true,
            expect_cip_path: true,
            expect_status: false,
            expect_symbol: false,
        }
    }

    #[test]
    fn service_data_scenario_enforces_minimum_length() {
        let evaluator = Evaluator::new(MalformedPolicy::Tshark, ExpertPolicy::Balanced);
        let internal = InternalParse { has_enip: true, has_cpf: true, has_cip: true, has_cip_path: true, has_symbol: false, status: None, payload_len: 1 };
        let dissector = DissectorFields::default();
        let results = evaluator.evaluate(&expectation(), &dissector, &internal, None);
        let service_data = results.iter().find(|r| r.name == "service_data").unwrap();
        assert!(!service_data.pass);
    }

    #[test]
    fn grade_is_expected_invalid_when_outcome_is_invalid_regardless_of_labels() {
        let evaluator = Evaluator::new(MalformedPolicy::Tshark, ExpertPolicy::Balanced);
        let mut exp = expectation();
        exp.outcome = Outcome::Invalid;
        assert_eq!(evaluator.grade(&exp, &[]), Grade::ExpectedInvalid);
        assert_eq!(evaluator.grade(&exp, &["INV_CIP_PARSE"]), Grade::ExpectedInvalid);
    }

    #[test]
    fn grade_fails_on_any_label_for_a_valid_outcome() {
        let evaluator = Evaluator::new(MalformedPolicy::Tshark, ExpertPolicy::Balanced);
        assert_eq!(evaluator.grade(&expectation(), &[]), Grade::Pass);
        assert_eq!(evaluator.grade(&expectation(), &[LABEL_CIP_PARSE]), Grade::Fail);
    }

    #[test]
    fn labels_are_derived_from_failing_scenarios_and_feed_grade() {
        let evaluator = Evaluator::new(MalformedPolicy::Tshark, ExpertPolicy::Balanced);
        let internal = InternalParse { has_enip: true, has_cpf: true, has_cip: true, has_cip_path: true, has_symbol: false, status: None, payload_len: 1 };
        let dissector = DissectorFields::default();
        let results = evaluator.evaluate(&expectation(), &dissector, &internal, None);
        let labels = evaluator.labels(&results);
        assert_eq!(labels, vec![LABEL_CIP_SERVICE_DATA_SHAPE_MISMATCH]);
        assert_eq!(evaluator.grade(&expectation(), &labels), Grade::Fail);
    }

    #[test]
    fn pass_category_distinguishes_transport_from_protocol_warnings() {
        let evaluator = Evaluator::new(MalformedPolicy::Tshark, ExpertPolicy::Balanced);
        let clean = DissectorFields::default();
        assert_eq!(evaluator.pass_category(&clean), "pass_clean");

        let expected_only = DissectorFields {
            expert_messages: vec![ExpertMessage { message: "CIP request without a response".into(), severity: ExpertSeverity::Note, category: ExpertCategory::Expected }],
            ..Default::default()
        };
        assert_eq!(evaluator.pass_category(&expected_only), "pass_with_expected_experts");

        let transport_only = DissectorFields {
            expert_messages: vec![ExpertMessage { message: "TCP previous segment not captured".into(), severity: ExpertSeverity::Warn, category: ExpertCategory::Transport }],
            ..Default::default()
        };
        assert_eq!(evaluator.pass_category(&transport_only), "pass_with_transport_warnings");

        let protocol_warning = DissectorFields {
            expert_messages: vec![ExpertMessage { message: "malformed CIP path".into(), severity: ExpertSeverity::Warn, category: ExpertCategory::Protocol }],
            ..Default::default()
        };
        assert_eq!(evaluator.pass_category(&protocol_warning), "pass_with_warnings");
    }

    #[test]
    fn balanced_policy_fails_only_on_error_severity_unlike_strict() {
        let dissector = DissectorFields {
            expert_messages: vec![ExpertMessage { message: "unexpected warn".into(), severity: ExpertSeverity::Warn, category: ExpertCategory::Protocol }],
            ..Default::default()
        };
        let internal = InternalParse { has_enip: true, has_cpf: true, has_cip: true, has_cip_path: true, has_symbol: false, status: None, payload_len: 64 };

        let balanced = Evaluator::new(MalformedPolicy::Tshark, ExpertPolicy::Balanced);
        let results = balanced.evaluate(&expectation(), &dissector, &internal, None);
        assert!(results.iter().find(|r| r.name == "experts").unwrap().pass);

        let strict = Evaluator::new(MalformedPolicy::Tshark, ExpertPolicy::Strict);
        let results = strict.evaluate(&expectation(), &dissector, &internal, None);
        assert!(!results.iter().find(|r| r.name == "experts").unwrap().pass);
    }
}
