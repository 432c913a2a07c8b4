//! Server engine: owns tag/assembly state, runs the state machine, and
//! resolves CIP read/write requests against it.

use super::EngineError;
use crate::profile::{self, Profile, TagType};
use crate::rules::{parse_update_rule, Condition, ConditionContext, UpdateRule};
use crate::value::Value;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct StateLogEntry {
    pub from: String,
    pub to: String,
    pub time_in_state: Duration,
    pub trigger_class: String,
}

#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub state: String,
    pub event: String,
    pub time_in_state: Duration,
}

struct ServerInner {
    profile: Profile,
    current_state: String,
    time_in_state: Duration,
    tag_values: HashMap<String, Value>,
    tag_rules: HashMap<String, UpdateRule>,
    active_overrides: HashMap<String, UpdateRule>,
    assembly_data: HashMap<String, Vec<u8>>,
    fired_events: HashSet<String>,
    parsed_transitions: HashMap<String, Vec<(i32, Condition, String)>>,
    parsed_events: HashMap<String, Vec<(profile::StateEvent, Condition)>>,
    event_log: Vec<EventLogEntry>,
    state_log: Vec<StateLogEntry>,
    rng: StdRng,
}

pub struct ServerEngine {
    inner: RwLock<ServerInner>,
}

impl ServerEngine {
    pub fn new(profile: Profile) -> Result<Self, EngineError> {
        profile.validate()?;

        let mut tag_values = HashMap::new();
        let mut tag_rules = HashMap::new();
        for tag in &profile.data_model.tags {
            tag_values.insert(tag.name.clone(), profile::parse_initial_value(tag.tag_type, &tag.initial_value));
            tag_rules.insert(tag.name.clone(), parse_update_rule(&tag.update_rule, &tag.update_params));
        }

        let mut assembly_data = HashMap::new();
        for assembly in &profile.data_model.assemblies {
            assembly_data.insert(assembly.name.clone(), vec![0u8; assembly.size_bytes as usize]);
        }

        let mut parsed_transitions = HashMap::new();
        let mut parsed_events = HashMap::new();
        for (state_name, state) in &profile.state_machine.states {
            let mut transitions: Vec<(i32, Condition, String)> = state
                .transitions
                .iter()
                .filter_map(|t| Condition::parse(&t.condition).map(|c| (t.priority, c, t.to.clone())))
                .collect();
            transitions.sort_by_key(|(priority, ..)| *priority);
            parsed_transitions.insert(state_name.clone(), transitions);

            let events: Vec<(profile::StateEvent, Condition)> = state
                .events
                .iter()
                .filter_map(|e| Condition::parse(&e.trigger).map(|c| (e.clone(), c)))
                .collect();
            parsed_events.insert(state_name.clone(), events);
        }

        let current_state = profile.state_machine.initial.clone();
        let seed = profile.metadata.seed;
        let mut inner = ServerInner {
            profile,
            current_state: current_state.clone(),
            time_in_state: Duration::ZERO,
            tag_values,
            tag_rules,
            active_overrides: HashMap::new(),
            assembly_data,
            fired_events: HashSet::new(),
            parsed_transitions,
            parsed_events,
            event_log: Vec::new(),
            state_log: Vec::new(),
            rng: seeded_rng(seed),
        };
        inner.install_state_overrides(&current_state);
        info!(state = %current_state, "server engine constructed");

        Ok(ServerEngine { inner: RwLock::new(inner) })
    }

    pub fn tick(&self, dt: Duration) {
        self.inner.write().expect("server engine lock poisoned").tick(dt);
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.inner.read().expect("server engine lock poisoned").read(name)
    }

    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<bool, EngineError> {
        self.inner.write().expect("server engine lock poisoned").write(name, bytes)
    }

    pub fn current_state(&self) -> String {
        self.inner.read().expect("server engine lock poisoned").current_state.clone()
    }

    pub fn tag_value(&self, name: &str) -> Option<Value> {
        self.inner.read().expect("server engine lock poisoned").tag_values.get(name).cloned()
    }

    pub fn event_log(&self) -> Vec<EventLogEntry> {
        self.inner.read().expect("server engine lock poisoned").event_log.clone()
    }

    pub fn state_log(&self) -> Vec<StateLogEntry> {
        self.inner.read().expect("server engine lock poisoned").state_log.clone()
    }
}

impl ServerInner {
    fn install_state_overrides(&mut self, state_name: &str) {
        self.active_overrides.clear();
        let overrides: Vec<(String, String)> = match self.profile.state_machine.states.get(state_name) {
            Some(state) => state.tag_overrides.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => return,
        };
        for (tag_name, rule_str) in overrides {
            let params = HashMap::new();
            let mut rule = parse_update_rule(&rule_str, &params);
            if let UpdateRule::Static { value: Some(v) } = &rule {
                self.tag_values.insert(tag_name.clone(), v.clone());
            }
            if let UpdateRule::Static { value: None } = &mut rule {
                // bare "static:V" form — reparse the literal after the colon
                if let Some((_, lit)) = rule_str.split_once(':') {
                    let v = Value::parse(lit);
                    self.tag_values.insert(tag_name.clone(), v.clone());
                    rule = UpdateRule::Static { value: Some(v) };
                }
            }
            self.active_overrides.insert(tag_name, rule);
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        if let Some(tag) = self.profile.find_tag(name) {
            let value = self.tag_values.get(name).cloned().unwrap_or(Value::I32(0));
            return Ok(encode_typed(tag.tag_type, &value));
        }
        if let Some(bytes) = self.assembly_data.get(name) {
            return Ok(bytes.clone());
        }
        Err(EngineError::UnknownName(name.to_string()))
    }

    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<bool, EngineError> {
        if let Some(tag) = self.profile.find_tag(name).cloned() {
            if !tag.writable {
                return Ok(false);
            }
            let value = decode_typed(tag.tag_type, bytes)
                .ok_or_else(|| EngineError::InvalidValue { tag: name.to_string(), reason: "length mismatch for tag type".to_string() })?;
            self.tag_values.insert(name.to_string(), value);
            return Ok(true);
        }
        if let Some(assembly) = self.profile.find_assembly(name).cloned() {
            if !assembly.writable {
                return Ok(false);
            }
            let data = self.assembly_data.entry(name.to_string()).or_insert_with(|| vec![0u8; assembly.size_bytes as usize]);
            let n = bytes.len().min(data.len());
            data[..n].copy_from_slice(&bytes[..n]);
            return Ok(true);
        }
        Err(EngineError::UnknownName(name.to_string()))
    }

    fn tick(&mut self, dt: Duration) {
        self.time_in_state += dt;

        let names: Vec<String> = self.tag_values.keys().cloned().collect();
        for name in names {
            let current = self.tag_values.get(&name).cloned().unwrap_or(Value::I32(0));
            let stepped = if let Some(rule) = self.active_overrides.get_mut(&name) {
                rule.step(&current, dt, &mut self.rng)
            } else if let Some(rule) = self.tag_rules.get_mut(&name) {
                rule.step(&current, dt, &mut self.rng)
            } else {
                current
            };
            self.tag_values.insert(name, stepped);
        }

        let state_name = self.current_state.clone();

        // Events own their condition's mutable state and actions can mutate
        // `self` freely (set_tag, trigger_transition), so the state's event
        // list is taken out of the map for the duration of evaluation.
        let mut events = self.parsed_events.remove(&state_name).unwrap_or_default();
        for (event, condition) in events.iter_mut() {
            if self.fired_events.contains(&event.name) {
                continue;
            }
            let fires = {
                let ctx = ConditionContext {
                    time_in_state: self.time_in_state,
                    tag_values: &self.tag_values,
                    fired_events: &self.fired_events,
                };
                condition.evaluate(&ctx, &mut self.rng)
            };
            if fires {
                self.fired_events.insert(event.name.clone());
                debug!(state = %state_name, event = %event.name, "event fired");
                self.event_log.push(EventLogEntry {
                    state: state_name.clone(),
                    event: event.name.clone(),
                    time_in_state: self.time_in_state,
                });
                let actions = event.actions.clone();
                self.apply_actions(&actions);
            }
        }
        self.parsed_events.insert(state_name.clone(), events);

        let mut transitions = self.parsed_transitions.remove(&state_name).unwrap_or_default();
        let mut target = None;
        for (_, condition, to) in transitions.iter_mut() {
            let ctx = ConditionContext {
                time_in_state: self.time_in_state,
                tag_values: &self.tag_values,
                fired_events: &self.fired_events,
            };
            if condition.evaluate(&ctx, &mut self.rng) {
                target = Some(to.clone());
                break;
            }
        }
        self.parsed_transitions.insert(state_name, transitions);

        if let Some(to) = target {
            self.transition_to(&to, "condition");
        }
    }

    fn apply_actions(&mut self, actions: &[profile::Action]) {
        for action in actions {
            match action.action_type.as_str() {
                "set_tag" => {
                    if let (Some(target), Some(value)) = (&action.target, &action.value) {
                        let resolved = self.resolve_action_value(value);
                        self.tag_values.insert(target.clone(), resolved);
                    }
                }
                "log" => {
                    if let Some(value) = &action.value {
                        debug!(message = %value, "state machine log action");
                    }
                }
                "trigger_transition" => {
                    if let Some(target) = &action.target {
                        let to = target.clone();
                        self.transition_to(&to, "action");
                        return;
                    }
                }
                other => warn!(action = other, "unknown action type"),
            }
        }
    }

    fn resolve_action_value(&mut self, value: &str) -> Value {
        if let Some(rest) = value.strip_prefix("random:") {
            if let Some((min_s, max_s)) = rest.split_once(':') {
                if let (Ok(min), Ok(max)) = (min_s.parse::<f64>(), max_s.parse::<f64>()) {
                    let r: f64 = rand::Rng::gen_range(&mut self.rng, 0.0..1.0);
                    return Value::F64(min + r * (max - min));
                }
            }
        }
        if let Some(other_tag) = value.strip_prefix("tag:") {
            if let Some(v) = self.tag_values.get(other_tag) {
                return v.clone();
            }
        }
        Value::parse(value)
    }

    fn transition_to(&mut self, to: &str, trigger_class: &str) {
        if !self.profile.state_machine.states.contains_key(to) {
            warn!(target = to, "ignoring transition to undefined state");
            return;
        }
        self.state_log.push(StateLogEntry {
            from: self.current_state.clone(),
            to: to.to_string(),
            time_in_state: self.time_in_state,
            trigger_class: trigger_class.to_string(),
        });
        info!(from = %self.current_state, to, "state transition");
        self.fired_events.clear();
        if let Some(events) = self.parsed_events.get_mut(to) {
            for (_, condition) in events.iter_mut() {
                condition.reset();
            }
        }
        if let Some(transitions) = self.parsed_transitions.get_mut(to) {
            for (_, condition, _) in transitions.iter_mut() {
                condition.reset();
            }
        }
        self.current_state = to.to_string();
        self.time_in_state = Duration::ZERO;
        self.install_state_overrides(to);
    }
}

fn encode_typed(tag_type: TagType, value: &Value) -> Vec<u8> {
    match tag_type {
        TagType::Bool => vec![if value.as_bool().unwrap_or(false) { 1 } else { 0 }],
        TagType::Sint => vec![value.as_f64().unwrap_or(0.0) as i8 as u8],
        TagType::Int => (value.as_f64().unwrap_or(0.0) as i16).to_le_bytes().to_vec(),
        TagType::Dint => (value.as_f64().unwrap_or(0.0) as i32).to_le_bytes().to_vec(),
        TagType::Real => (value.as_f64().unwrap_or(0.0) as f32).to_le_bytes().to_vec(),
        TagType::Lreal => value.as_f64().unwrap_or(0.0).to_le_bytes().to_vec(),
        TagType::String => value.as_str().unwrap_or("").as_bytes().to_vec(),
    }
}

fn decode_typed(tag_type: TagType, bytes: &[u8]) -> Option<Value> {
    match tag_type {
        TagType::Bool => bytes.first().map(|b| Value::Bool(*b != 0)),
        TagType::Sint => bytes.first().map(|b| Value::I8(*b as i8)),
        TagType::Int => (bytes.len() >= 2).then(|| Value::I16(i16::from_le_bytes([bytes[0], bytes[1]]))),
        TagType::Dint => (bytes.len() >= 4).then(|| Value::I32(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))),
        TagType::Real => (bytes.len() >= 4).then(|| Value::F32(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))),
        TagType::Lreal => (bytes.len() >= 8).then(|| {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&bytes[..8]);
            Value::F64(f64::from_le_bytes(arr))
        }),
        TagType::String => Some(Value::Str(String::from_utf8_lossy(bytes).into_owned())),
    }
}

fn seeded_rng(seed: u64) -> StdRng {
    if seed == 0 {
        StdRng::from_entropy()
    } else {
        StdRng::seed_from_u64(seed)
    }
}
