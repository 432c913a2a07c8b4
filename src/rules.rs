//! Update-rule and condition language.
//!
//! Update rules step a tag's value forward by `dt` each tick. Conditions
//! gate transitions and events. Both are parsed from the small string
//! grammars profiles use (`counter{increment,interval}`, `timer:5s`, ...)
//! into tagged variants that own whatever private accumulator state they
//! need, so stepping by five 100ms ticks behaves the same as one 500ms tick.

use crate::value::Value;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ConditionContext<'a> {
    pub time_in_state: Duration,
    pub tag_values: &'a HashMap<String, Value>,
    pub fired_events: &'a std::collections::HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TagOperand {
    Literal(Value),
    Tag(String),
}

#[derive(Debug, Clone)]
pub enum Condition {
    Once { fired: bool },
    Timer { duration: Duration },
    Tag { name: String, op: CompareOp, rhs: TagOperand },
    Random { probability: f64 },
    Event { name: String },
    Always,
}

impl Condition {
    /// Parses the small condition grammar. Unparseable input becomes a
    /// permanently-false condition rather than an error, matching the
    /// profile layer's tolerance for malformed strings.
    pub fn parse(s: &str) -> Option<Condition> {
        if s == "once" {
            return Some(Condition::Once { fired: false });
        }
        if let Some(rest) = s.strip_prefix("timer:") {
            let secs: f64 = parse_duration_secs(rest)?;
            return Some(Condition::Timer { duration: Duration::from_secs_f64(secs) });
        }
        if let Some(rest) = s.strip_prefix("random:") {
            let p: f64 = rest.parse().ok()?;
            return Some(Condition::Random { probability: p });
        }
        if let Some(rest) = s.strip_prefix("event:") {
            return Some(Condition::Event { name: rest.to_string() });
        }
        if let Some(rest) = s.strip_prefix("tag:") {
            return parse_tag_condition(rest);
        }
        if s.starts_with("state:") {
            // Handled by the surrounding engine layer as an edge trigger;
            // as a bare condition it's treated as always-true.
            return Some(Condition::Always);
        }
        None
    }

    pub fn evaluate(&mut self, ctx: &ConditionContext, rng: &mut StdRng) -> bool {
        match self {
            Condition::Once { fired } => {
                if *fired {
                    false
                } else {
                    *fired = true;
                    true
                }
            }
            Condition::Timer { duration } => ctx.time_in_state >= *duration,
            Condition::Tag { name, op, rhs } => {
                let lhs = match ctx.tag_values.get(name) {
                    Some(v) => v,
                    None => return false,
                };
                let rhs_value = match rhs {
                    TagOperand::Literal(v) => v.clone(),
                    TagOperand::Tag(n) => match ctx.tag_values.get(n) {
                        Some(v) => v.clone(),
                        None => return false,
                    },
                };
                compare(lhs, op, &rhs_value)
            }
            Condition::Random { probability } => rng.gen_bool((*probability).clamp(0.0, 1.0)),
            Condition::Event { name } => ctx.fired_events.contains(name),
            Condition::Always => true,
        }
    }

    pub fn reset(&mut self) {
        if let Condition::Once { fired } = self {
            *fired = false;
        }
    }
}

fn compare(lhs: &Value, op: &CompareOp, rhs: &Value) -> bool {
    if matches!(op, CompareOp::Eq | CompareOp::Ne) {
        if let (Value::Bool(a), Value::Bool(b)) = (lhs, rhs) {
            return if *op == CompareOp::Eq { a == b } else { a != b };
        }
    }
    let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else { return false };
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}

fn parse_tag_condition(rest: &str) -> Option<Condition> {
    let parts: Vec<&str> = rest.splitn(3, ' ').collect();
    if parts.len() != 3 {
        return None;
    }
    let name = parts[0].to_string();
    let op = CompareOp::parse(parts[1])?;
    let rhs = if let Some(other) = parts[2].strip_prefix("tag:") {
        TagOperand::Tag(other.to_string())
    } else {
        TagOperand::Literal(Value::parse(parts[2]))
    };
    Some(Condition::Tag { name, op, rhs })
}

fn parse_duration_secs(s: &str) -> Option<f64> {
    if let Some(rest) = s.strip_suffix("ms") {
        return rest.parse::<f64>().ok().map(|v| v / 1000.0);
    }
    if let Some(rest) = s.strip_suffix('s') {
        return rest.parse().ok();
    }
    s.parse().ok()
}

#[derive(Debug, Clone)]
pub enum UpdateRule {
    Static { value: Option<Value> },
    Counter { increment: f64, interval: Duration, accumulated: Duration },
    Ramp { min: f64, max: f64, rate: f64, direction: f64 },
    Sine { amplitude: f64, offset: f64, period: Duration, phase: f64 },
    Toggle { interval: Duration, accumulated: Duration },
    Latch { held: Option<Value> },
    Random { min: f64, max: f64 },
}

impl UpdateRule {
    pub fn step(&mut self, current: &Value, dt: Duration, rng: &mut StdRng) -> Value {
        match self {
            UpdateRule::Static { value } => value.clone().unwrap_or_else(|| current.clone()),
            UpdateRule::Counter { increment, interval, accumulated } => {
                *accumulated += dt;
                let ticks = (accumulated.as_secs_f64() / interval.as_secs_f64()).floor();
                if ticks >= 1.0 {
                    let consumed = Duration::from_secs_f64(ticks * interval.as_secs_f64());
                    *accumulated = accumulated.saturating_sub(consumed);
                    let base = current.as_f64().unwrap_or(0.0);
                    Value::F64(base + ticks * *increment)
                } else {
                    current.clone()
                }
            }
            UpdateRule::Ramp { min, max, rate, direction } => {
                let base = current.as_f64().unwrap_or(*min);
                let mut next = base + *rate * dt.as_secs_f64() * *direction;
                if next >= *max {
                    next = *max;
                    *direction = -1.0;
                } else if next <= *min {
                    next = *min;
                    *direction = 1.0;
                }
                Value::F64(next)
            }
            UpdateRule::Sine { amplitude, offset, period, phase } => {
                let two_pi = std::f64::consts::TAU;
                *phase = (*phase + two_pi * dt.as_secs_f64() / period.as_secs_f64()) % two_pi;
                Value::F64(*offset + *amplitude * phase.sin())
            }
            UpdateRule::Toggle { interval, accumulated } => {
                *accumulated += dt;
                if *accumulated >= *interval {
                    *accumulated -= *interval;
                    let cur = current.as_bool().unwrap_or(false);
                    Value::Bool(!cur)
                } else {
                    current.clone()
                }
            }
            UpdateRule::Latch { held } => held.clone().unwrap_or_else(|| current.clone()),
            UpdateRule::Random { min, max } => {
                let r: f64 = rng.gen_range(0.0..1.0);
                Value::F64(*min + r * (*max - *min))
            }
        }
    }

    pub fn set_latch(&mut self, value: Value) {
        if let UpdateRule::Latch { held } = self {
            *held = Some(value);
        }
    }

    pub fn clear_latch(&mut self) {
        if let UpdateRule::Latch { held } = self {
            *held = None;
        }
    }
}

/// Parses the `name{param=val,...}` grammar profiles use for
/// `update_rule`/`update_params` into a live [`UpdateRule`]. Unrecognized
/// rule names fall back to `static`, leaving the tag's initial value alone.
pub fn parse_update_rule(name: &str, params: &HashMap<String, String>) -> UpdateRule {
    let f = |key: &str, default: f64| params.get(key).and_then(|v| v.parse().ok()).unwrap_or(default);
    let dur = |key: &str, default_ms: u64| {
        params
            .get(key)
            .and_then(|v| parse_duration_secs(v))
            .map(Duration::from_secs_f64)
            .unwrap_or_else(|| Duration::from_millis(default_ms))
    };

    match name {
        "counter" => UpdateRule::Counter {
            increment: f("increment", 1.0),
            interval: dur("interval", 1000),
            accumulated: Duration::ZERO,
        },
        "ramp" => UpdateRule::Ramp {
            min: f("min", 0.0),
            max: f("max", 100.0),
            rate: f("rate", 1.0),
            direction: 1.0,
        },
        "sine" => UpdateRule::Sine {
            amplitude: f("amplitude", 1.0),
            offset: f("offset", 0.0),
            period: dur("period", 1000),
            phase: 0.0,
        },
        "toggle" => UpdateRule::Toggle { interval: dur("interval", 1000), accumulated: Duration::ZERO },
        "latch" => UpdateRule::Latch { held: None },
        "random" => UpdateRule::Random { min: f("min", 0.0), max: f("max", 1.0) },
        "static" => UpdateRule::Static { value: params.get("value").map(|v| Value::parse(v)) },
        _ => UpdateRule::Static { value: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn counter_rule_preserves_fractional_interval_remainder() {
        let mut rule = UpdateRule::Counter {
            increment: 1.0,
            interval: Duration::from_millis(500),
            accumulated: Duration::ZERO,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut value = Value::F64(0.0);
        for _ in 0..5 {
            value = rule.step(&value, Duration::from_millis(100), &mut rng);
        }
        assert_eq!(value, Value::F64(1.0));
    }

    #[test]
    fn ramp_rule_inverts_direction_at_bounds() {
        let mut rule = UpdateRule::Ramp { min: 0.0, max: 10.0, rate: 5.0, direction: 1.0 };
        let mut rng = StdRng::seed_from_u64(1);
        let mut value = Value::F64(8.0);
        value = rule.step(&value, Duration::from_secs(1), &mut rng); // -> 10, clamps & flips
        assert_eq!(value, Value::F64(10.0));
        value = rule.step(&value, Duration::from_secs(1), &mut rng);
        assert_eq!(value, Value::F64(5.0));
    }

    #[test]
    fn once_condition_fires_exactly_once_until_reset() {
        let mut cond = Condition::Once { fired: false };
        let tags = HashMap::new();
        let fired = std::collections::HashSet::new();
        let ctx = ConditionContext { time_in_state: Duration::ZERO, tag_values: &tags, fired_events: &fired };
        let mut rng = StdRng::seed_from_u64(1);
        assert!(cond.evaluate(&ctx, &mut rng));
        assert!(!cond.evaluate(&ctx, &mut rng));
        cond.reset();
        assert!(cond.evaluate(&ctx, &mut rng));
    }

    #[test]
    fn timer_condition_fires_at_or_after_duration() {
        let mut cond = Condition::parse("timer:2s").unwrap();
        let tags = HashMap::new();
        let fired = std::collections::HashSet::new();
        let mut rng = StdRng::seed_from_u64(1);
        let ctx_before = ConditionContext { time_in_state: Duration::from_secs(1), tag_values: &tags, fired_events: &fired };
        assert!(!cond.evaluate(&ctx_before, &mut rng));
        let ctx_after = ConditionContext { time_in_state: Duration::from_secs(2), tag_values: &tags, fired_events: &fired };
        assert!(cond.evaluate(&ctx_after, &mut rng));
    }

    #[test]
    fn tag_condition_compares_numeric_values_through_f64() {
        let mut cond = Condition::parse("tag:Pressure >= 100").unwrap();
        let mut tags = HashMap::new();
        tags.insert("Pressure".to_string(), Value::I32(150));
        let fired = std::collections::HashSet::new();
        let ctx = ConditionContext { time_in_state: Duration::ZERO, tag_values: &tags, fired_events: &fired };
        let mut rng = StdRng::seed_from_u64(1);
        assert!(cond.evaluate(&ctx, &mut rng));
    }
}
