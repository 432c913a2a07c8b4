//! Client engine: read-batch cycling and scheduled-write triggers driven by
//! a role definition and observed server state.

use crate::profile::{Profile, Role, TagType};
use crate::value::Value;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub tag: String,
    pub tag_type: Option<TagType>,
    pub value: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    pub batches_served: u64,
    pub writes_scheduled: u64,
}

struct ClientInner {
    role: Role,
    tag_types: HashMap<String, TagType>,
    server_state: String,
    batch_idx: usize,
    pending_writes: Vec<WriteRequest>,
    write_event_timers: HashMap<usize, Duration>,
    write_event_fired: HashMap<usize, bool>,
    state_writes_fired: HashMap<String, HashMap<usize, bool>>,
    stats: ClientStats,
    rng: StdRng,
}

pub struct ClientEngine {
    inner: RwLock<ClientInner>,
}

impl ClientEngine {
    pub fn new(profile: &Profile, role: Role) -> Self {
        let rng = if profile.metadata.seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(profile.metadata.seed)
        };
        let tag_types = profile.data_model.tags.iter().map(|t| (t.name.clone(), t.tag_type)).collect();
        ClientEngine {
            inner: RwLock::new(ClientInner {
                role,
                tag_types,
                server_state: String::new(),
                batch_idx: 0,
                pending_writes: Vec::new(),
                write_event_timers: HashMap::new(),
                write_event_fired: HashMap::new(),
                state_writes_fired: HashMap::new(),
                stats: ClientStats::default(),
                rng,
            }),
        }
    }

    pub fn get_next_read_batch(&self) -> Vec<String> {
        let mut inner = self.inner.write().expect("client engine lock poisoned");
        let tags = &inner.role.read_tags;
        if tags.is_empty() {
            return Vec::new();
        }
        let batch_size = inner.role.batch_size.min(tags.len());
        let start = inner.batch_idx;
        let batch: Vec<String> = (0..batch_size).map(|i| tags[(start + i) % tags.len()].clone()).collect();
        inner.batch_idx = (start + batch_size) % tags.len();
        inner.stats.batches_served += 1;
        batch
    }

    pub fn update_server_state(&self, state: &str) {
        let mut inner = self.inner.write().expect("client engine lock poisoned");
        if inner.server_state != state {
            inner.state_writes_fired.insert(state.to_string(), HashMap::new());
            inner.server_state = state.to_string();
        }
    }

    pub fn tick(&self, dt: Duration) {
        let mut inner = self.inner.write().expect("client engine lock poisoned");
        let write_events = inner.role.write_events.clone();
        let current_state = inner.server_state.clone();

        for (idx, event) in write_events.iter().enumerate() {
            let fires = if let Some(state_name) = event.trigger.strip_prefix("state:") {
                if state_name != current_state {
                    false
                } else if event.condition.is_some() {
                    !*inner.write_event_fired.get(&idx).unwrap_or(&false)
                } else {
                    let map = inner.state_writes_fired.entry(current_state.clone()).or_default();
                    !*map.get(&idx).unwrap_or(&false)
                }
            } else if let Some(dur_str) = event.trigger.strip_prefix("timer:") {
                let duration = parse_duration(dur_str);
                let acc = inner.write_event_timers.entry(idx).or_insert(Duration::ZERO);
                *acc += dt;
                if *acc >= duration && !*inner.write_event_fired.get(&idx).unwrap_or(&false) {
                    *inner.write_event_timers.get_mut(&idx).unwrap() = Duration::ZERO;
                    true
                } else {
                    false
                }
            } else if let Some(p_str) = event.trigger.strip_prefix("random:") {
                let p: f64 = p_str.parse().unwrap_or(0.0);
                inner.rng.gen_bool(p.clamp(0.0, 1.0))
            } else {
                false
            };

            if fires {
                if event.trigger.starts_with("state:") {
                    if event.condition.is_some() {
                        inner.write_event_fired.insert(idx, true);
                    } else {
                        inner.state_writes_fired.entry(current_state.clone()).or_default().insert(idx, true);
                    }
                } else if event.trigger.starts_with("timer:") {
                    inner.write_event_fired.insert(idx, true);
                }

                let value = resolve_write_value(&event.value, &mut inner.rng);
                let tag_type = inner.tag_types.get(&event.tag).copied();
                debug!(tag = %event.tag, "write event fired");
                inner.pending_writes.push(WriteRequest { tag: event.tag.clone(), tag_type, value });
                inner.stats.writes_scheduled += 1;
            }
        }
    }

    pub fn get_pending_writes(&self) -> Vec<WriteRequest> {
        let mut inner = self.inner.write().expect("client engine lock poisoned");
        std::mem::take(&mut inner.pending_writes)
    }

    pub fn can_write(&self, name: &str) -> bool {
        self.inner.read().expect("client engine lock poisoned").role.write_tags.iter().any(|t| t == name)
    }

    pub fn schedule_write(&self, name: &str, value: Value) -> bool {
        if !self.can_write(name) {
            return false;
        }
        let mut inner = self.inner.write().expect("client engine lock poisoned");
        let tag_type = inner.tag_types.get(name).copied();
        inner.pending_writes.push(WriteRequest { tag: name.to_string(), tag_type, value });
        inner.stats.writes_scheduled += 1;
        true
    }

    pub fn stats(&self) -> ClientStats {
        self.inner.read().expect("client engine lock poisoned").stats.clone()
    }
}

fn resolve_write_value(spec: &str, rng: &mut StdRng) -> Value {
    if let Some(rest) = spec.strip_prefix("random:") {
        if let Some((min_s, max_s)) = rest.split_once(':') {
            if let (Ok(min), Ok(max)) = (min_s.parse::<f64>(), max_s.parse::<f64>()) {
                let r: f64 = rng.gen_range(0.0..1.0);
                return Value::F64(min + r * (max - min));
            }
        }
    }
    Value::parse(spec)
}

fn parse_duration(s: &str) -> Duration {
    if let Some(rest) = s.strip_suffix("ms") {
        return rest.parse().map(Duration::from_millis).unwrap_or(Duration::ZERO);
    }
    if let Some(rest) = s.strip_suffix('s') {
        return rest.parse::<f64>().map(Duration::from_secs_f64).unwrap_or(Duration::ZERO);
    }
    Duration::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::WriteEvent;

    fn role_with_batches() -> Role {
        Role {
            poll_interval: "1s".into(),
            batch_size: 2,
            read_tags: vec!["A".into(), "B".into(), "C".into()],
            write_tags: vec!["A".into()],
            write_events: vec![],
        }
    }

    #[test]
    fn read_batch_wraps_around_the_tag_list() {
        let engine = ClientEngine::new(&dummy_profile(), role_with_batches());
        assert_eq!(engine.get_next_read_batch(), vec!["A", "B"]);
        assert_eq!(engine.get_next_read_batch(), vec!["C", "A"]);
        assert_eq!(engine.get_next_read_batch(), vec!["B", "C"]);
    }

    #[test]
    fn timer_write_event_fires_once_past_duration() {
        let mut role = role_with_batches();
        role.write_events.push(WriteEvent { trigger: "timer:2s".into(), tag: "A".into(), value: "5".into(), condition: None });
        let engine = ClientEngine::new(&dummy_profile(), role);
        engine.tick(Duration::from_secs(1));
        assert!(engine.get_pending_writes().is_empty());
        engine.tick(Duration::from_secs(1));
        let writes = engine.get_pending_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].tag, "A");
    }

    #[test]
    fn schedule_write_respects_can_write() {
        let engine = ClientEngine::new(&dummy_profile(), role_with_batches());
        assert!(engine.schedule_write("A", Value::I32(1)));
        assert!(!engine.schedule_write("B", Value::I32(1)));
    }

    fn dummy_profile() -> Profile {
        use crate::profile::*;
        use std::collections::HashMap as Map;
        let mut states = Map::new();
        states.insert("s".to_string(), State {
            description: String::new(),
            duration: None,
            transitions: vec![],
            tag_overrides: Map::new(),
            events: vec![],
        });
        Profile {
            metadata: Metadata { name: "t".into(), personality: Personality::LogixLike, seed: 0, enable_udp_io: false },
            data_model: DataModel {
                tags: vec![Tag {
                    name: "A".into(),
                    tag_type: TagType::Dint,
                    array_length: 1,
                    initial_value: "0".into(),
                    writable: true,
                    update_rule: "static".into(),
                    update_params: Map::new(),
                }],
                assemblies: vec![],
            },
            state_machine: StateMachine { initial: "s".into(), states },
            roles: Map::new(),
        }
    }
}
