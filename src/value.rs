//! Dynamic tag value representation.
//!
//! Tags, field mappings, and update rules all pass values around without
//! knowing ahead of time whether they are looking at a bool, an integer
//! width, a float, or a string. Rather than threading `Box<dyn Any>` through
//! the engine, every value that crosses a tag boundary is one of these.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::I8(n) => Some(*n != 0),
            Value::I16(n) => Some(*n != 0),
            Value::I32(n) => Some(*n != 0),
            Value::I64(n) => Some(*n != 0),
            _ => None,
        }
    }

    /// Coerces through f64 for any numeric variant; used by numeric
    /// comparisons in the condition language where exact width doesn't matter.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::I8(n) => Some(*n as f64),
            Value::I16(n) => Some(*n as f64),
            Value::I32(n) => Some(*n as f64),
            Value::I64(n) => Some(*n as f64),
            Value::F32(n) => Some(*n as f64),
            Value::F64(n) => Some(*n),
            Value::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Parses a literal the way update-rule params and condition operands
    /// are written in a profile: `true`/`false`, then int, then float, then
    /// a bare string as fallback.
    pub fn parse(s: &str) -> Value {
        if let Ok(b) = s.parse::<bool>() {
            return Value::Bool(b);
        }
        if let Ok(n) = s.parse::<i64>() {
            return Value::I32(n as i32);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Value::F64(f);
        }
        Value::Str(s.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::I8(n) => write!(f, "{n}"),
            Value::I16(n) => write!(f, "{n}"),
            Value::I32(n) => write!(f, "{n}"),
            Value::I64(n) => write!(f, "{n}"),
            Value::F32(n) => write!(f, "{n}"),
            Value::F64(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_numeric_variants_to_f64() {
        assert_eq!(Value::I32(4).as_f64(), Some(4.0));
        assert_eq!(Value::F32(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::Str("x".into()).as_f64(), None);
    }

    #[test]
    fn parses_literals_in_priority_order() {
        assert_eq!(Value::parse("true"), Value::Bool(true));
        assert_eq!(Value::parse("42"), Value::I32(42));
        assert_eq!(Value::parse("3.5"), Value::F64(3.5));
        assert_eq!(Value::parse("hello"), Value::Str("hello".into()));
    }
}
