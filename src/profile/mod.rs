//! Profile data model: tags, assemblies, field mappings, the state machine,
//! and roles. Deserialized from a YAML file by an external loader; this
//! module owns validation of internal consistency.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("profile has no tags but personality is logix_like")]
    NoTagsForLogixLike,
    #[error("profile has no assemblies but personality is adapter")]
    NoAssembliesForAdapter,
    #[error("initial state '{0}' is not defined in the state machine")]
    UnknownInitialState(String),
    #[error("state '{from}' has a transition to undefined state '{to}'")]
    UnknownTransitionTarget { from: String, to: String },
    #[error("role '{role}' references unknown tag or field '{name}'")]
    UnknownRoleTarget { role: String, name: String },
    #[error("field mappings for assembly '{assembly}' overlap at byte {byte_offset}")]
    OverlappingFieldMapping { assembly: String, byte_offset: u32 },
    #[error("state '{state}' overrides unknown tag '{tag}'")]
    UnknownOverrideTag { state: String, tag: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    Adapter,
    LogixLike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagType {
    Bool,
    Sint,
    Int,
    Dint,
    Lreal,
    Real,
    String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub personality: Personality,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub enable_udp_io: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    #[serde(default = "default_array_length")]
    pub array_length: u32,
    pub initial_value: String,
    #[serde(default)]
    pub writable: bool,
    pub update_rule: String,
    #[serde(default)]
    pub update_params: HashMap<String, String>,
}

fn default_array_length() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: TagType,
    pub byte_offset: u32,
    #[serde(default)]
    pub bit_offset: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assembly {
    pub name: String,
    pub size_bytes: u32,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub writable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataModel {
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub assemblies: Vec<Assembly>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub to: String,
    pub condition: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEvent {
    pub name: String,
    pub trigger: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub tag_overrides: HashMap<String, String>,
    #[serde(default)]
    pub events: Vec<StateEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachine {
    pub initial: String,
    pub states: HashMap<String, State>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteEvent {
    pub trigger: String,
    pub tag: String,
    pub value: String,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub poll_interval: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub read_tags: Vec<String>,
    #[serde(default)]
    pub write_tags: Vec<String>,
    #[serde(default)]
    pub write_events: Vec<WriteEvent>,
}

fn default_batch_size() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub metadata: Metadata,
    pub data_model: DataModel,
    pub state_machine: StateMachine,
    #[serde(default)]
    pub roles: HashMap<String, Role>,
}

impl Profile {
    pub fn find_tag(&self, name: &str) -> Option<&Tag> {
        self.data_model.tags.iter().find(|t| t.name == name)
    }

    pub fn find_assembly(&self, name: &str) -> Option<&Assembly> {
        self.data_model.assemblies.iter().find(|a| a.name == name)
    }

    /// Resolves a pseudo-tag name to its owning assembly and field, for
    /// adapter personalities where roles address fields by name.
    pub fn resolve_field(&self, name: &str) -> Option<(&Assembly, &FieldMapping)> {
        self.data_model.assemblies.iter().find_map(|a| {
            a.field_mappings.iter().find(|f| f.name == name).map(|f| (a, f))
        })
    }

    pub fn writable_tags(&self) -> Vec<&str> {
        self.data_model.tags.iter().filter(|t| t.writable).map(|t| t.name.as_str()).collect()
    }

    /// Structural validation: required references resolve, durations parse,
    /// field mappings don't overlap. Returns the first violation found.
    pub fn validate(&self) -> Result<(), ProfileError> {
        match self.metadata.personality {
            Personality::LogixLike if self.data_model.tags.is_empty() => {
                return Err(ProfileError::NoTagsForLogixLike);
            }
            Personality::Adapter if self.data_model.assemblies.is_empty() => {
                return Err(ProfileError::NoAssembliesForAdapter);
            }
            _ => {}
        }

        if !self.state_machine.states.contains_key(&self.state_machine.initial) {
            return Err(ProfileError::UnknownInitialState(self.state_machine.initial.clone()));
        }

        for (state_name, state) in &self.state_machine.states {
            for t in &state.transitions {
                if !self.state_machine.states.contains_key(&t.to) {
                    return Err(ProfileError::UnknownTransitionTarget { from: state_name.clone(), to: t.to.clone() });
                }
            }
            for tag_name in state.tag_overrides.keys() {
                if self.find_tag(tag_name).is_none() && self.resolve_field(tag_name).is_none() {
                    return Err(ProfileError::UnknownOverrideTag { state: state_name.clone(), tag: tag_name.clone() });
                }
            }
        }

        for assembly in &self.data_model.assemblies {
            let mut occupied: Vec<(u32, u32, Option<u8>)> = Vec::new();
            for f in &assembly.field_mappings {
                let width = tag_type_width(f.field_type);
                for (start, end, bit) in &occupied {
                    if f.byte_offset < *end && f.byte_offset + width > *start {
                        // BOOL fields packed into the same byte at different
                        // bit offsets share a byte range without overlapping.
                        let bit_disjoint = f.field_type == TagType::Bool
                            && *start == f.byte_offset
                            && *end == f.byte_offset + width
                            && matches!((bit, f.bit_offset), (Some(a), Some(b)) if *a != b);
                        if bit_disjoint {
                            continue;
                        }
                        return Err(ProfileError::OverlappingFieldMapping {
                            assembly: assembly.name.clone(),
                            byte_offset: f.byte_offset,
                        });
                    }
                }
                occupied.push((f.byte_offset, f.byte_offset + width, f.bit_offset));
            }
        }

        for (role_name, role) in &self.roles {
            for name in role.read_tags.iter().chain(role.write_tags.iter()) {
                if self.find_tag(name).is_none() && self.resolve_field(name).is_none() {
                    return Err(ProfileError::UnknownRoleTarget { role: role_name.clone(), name: name.clone() });
                }
            }
        }

        Ok(())
    }

    /// Non-fatal consistency warnings; callers surface these but don't abort.
    pub fn consistency_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.metadata.personality == Personality::Adapter
            && !self.data_model.tags.is_empty()
            && self.data_model.assemblies.iter().all(|a| a.field_mappings.is_empty())
        {
            warnings.push("adapter profile declares tags but no assembly has field mappings".to_string());
        }
        if self.metadata.personality == Personality::LogixLike && self.data_model.tags.is_empty() {
            warnings.push("logix_like profile has no tags".to_string());
        }
        for (role_name, role) in &self.roles {
            for name in &role.write_tags {
                if let Some(tag) = self.find_tag(name) {
                    if !tag.writable {
                        warnings.push(format!("role '{role_name}' writes to read-only tag '{name}'"));
                    }
                }
            }
        }
        warnings
    }
}

fn tag_type_width(t: TagType) -> u32 {
    match t {
        TagType::Bool | TagType::Sint => 1,
        TagType::Int => 2,
        TagType::Dint | TagType::Real => 4,
        TagType::Lreal => 8,
        TagType::String => 0,
    }
}

/// Default fixed-size coercion used by a raw [`Value`] written into tag
/// storage, independent of the profile's declared type width.
pub fn parse_initial_value(tag_type: TagType, literal: &str) -> Value {
    match tag_type {
        TagType::Bool => Value::Bool(literal.parse().unwrap_or(false)),
        TagType::Sint => Value::I8(literal.parse().unwrap_or(0)),
        TagType::Int => Value::I16(literal.parse().unwrap_or(0)),
        TagType::Dint => Value::I32(literal.parse().unwrap_or(0)),
        TagType::Real => Value::F32(literal.parse().unwrap_or(0.0)),
        TagType::Lreal => Value::F64(literal.parse().unwrap_or(0.0)),
        TagType::String => Value::Str(literal.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_profile() -> Profile {
        let mut states = HashMap::new();
        states.insert("idle".to_string(), State {
            description: String::new(),
            duration: None,
            transitions: vec![],
            tag_overrides: HashMap::new(),
            events: vec![],
        });
        Profile {
            metadata: Metadata { name: "t".into(), personality: Personality::LogixLike, seed: 0, enable_udp_io: false },
            data_model: DataModel {
                tags: vec![Tag {
                    name: "Pressure".into(),
                    tag_type: TagType::Dint,
                    array_length: 1,
                    initial_value: "0".into(),
                    writable: true,
                    update_rule: "static".into(),
                    update_params: HashMap::new(),
                }],
                assemblies: vec![],
            },
            state_machine: StateMachine { initial: "idle".into(), states },
            roles: HashMap::new(),
        }
    }

    #[test]
    fn validates_minimal_profile() {
        assert!(minimal_profile().validate().is_ok());
    }

    #[test]
    fn rejects_unknown_initial_state() {
        let mut profile = minimal_profile();
        profile.state_machine.initial = "missing".to_string();
        assert_eq!(profile.validate(), Err(ProfileError::UnknownInitialState("missing".to_string())));
    }

    #[test]
    fn rejects_transition_to_undefined_state() {
        let mut profile = minimal_profile();
        profile.state_machine.states.get_mut("idle").unwrap().transitions.push(Transition {
            to: "nowhere".into(),
            condition: "once".into(),
            priority: 0,
        });
        assert!(matches!(profile.validate(), Err(ProfileError::UnknownTransitionTarget { .. })));
    }

    #[test]
    fn rejects_overlapping_field_mappings() {
        let mut profile = minimal_profile();
        profile.metadata.personality = Personality::Adapter;
        profile.data_model.assemblies.push(Assembly {
            name: "IO".into(),
            size_bytes: 8,
            writable: false,
            field_mappings: vec![
                FieldMapping { name: "a".into(), field_type: TagType::Dint, byte_offset: 0, bit_offset: None },
                FieldMapping { name: "b".into(), field_type: TagType::Int, byte_offset: 2, bit_offset: None },
            ],
        });
        assert!(matches!(profile.validate(), Err(ProfileError::OverlappingFieldMapping { .. })));
    }

    #[test]
    fn bool_field_mappings_packed_into_one_byte_at_different_bits_do_not_overlap() {
        let mut profile = minimal_profile();
        profile.metadata.personality = Personality::Adapter;
        profile.data_model.assemblies.push(Assembly {
            name: "IO".into(),
            size_bytes: 1,
            writable: false,
            field_mappings: vec![
                FieldMapping { name: "a".into(), field_type: TagType::Bool, byte_offset: 0, bit_offset: Some(0) },
                FieldMapping { name: "b".into(), field_type: TagType::Bool, byte_offset: 0, bit_offset: Some(1) },
            ],
        });
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn bool_field_mappings_at_the_same_bit_offset_still_overlap() {
        let mut profile = minimal_profile();
        profile.metadata.personality = Personality::Adapter;
        profile.data_model.assemblies.push(Assembly {
            name: "IO".into(),
            size_bytes: 1,
            writable: false,
            field_mappings: vec![
                FieldMapping { name: "a".into(), field_type: TagType::Bool, byte_offset: 0, bit_offset: Some(0) },
                FieldMapping { name: "b".into(), field_type: TagType::Bool, byte_offset: 0, bit_offset: Some(0) },
            ],
        });
        assert!(matches!(profile.validate(), Err(ProfileError::OverlappingFieldMapping { .. })));
    }
}
