//! A minimal, dynamically-typed argument representation.
//!
//! The wire codec that turns these into D-Bus marshalled bytes is an external
//! collaborator (out of scope for this crate — see the crate-level docs); what
//! lives here is just the `Value` shape that property getters/setters, method
//! handlers and signal emitters exchange with the dispatch pipeline.

use std::collections::BTreeMap;

use crate::strings::{Path, Signature};

/// A dynamically-typed D-Bus value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    Bool(bool),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Double(f64),
    Str(String),
    ObjectPath(String),
    Signature(String),
    Array(Vec<Value>),
    /// A `a{sv}`-shaped dictionary, the common case for property maps.
    Dict(BTreeMap<String, Value>),
    Struct(Vec<Value>),
    Variant(Box<Value>),
}

impl Value {
    /// The D-Bus type signature of this value, mirroring the real codec's
    /// `Arg::signature()` closely enough to document the intent without
    /// implementing full marshalling.
    pub fn signature(&self) -> Signature<'static> {
        let s = match self {
            Value::Byte(_) => "y",
            Value::Bool(_) => "b",
            Value::I16(_) => "n",
            Value::U16(_) => "q",
            Value::I32(_) => "i",
            Value::U32(_) => "u",
            Value::I64(_) => "x",
            Value::U64(_) => "t",
            Value::Double(_) => "d",
            Value::Str(_) => "s",
            Value::ObjectPath(_) => "o",
            Value::Signature(_) => "g",
            Value::Array(_) => "av",
            Value::Dict(_) => "a{sv}",
            Value::Struct(_) => "r",
            Value::Variant(_) => "v",
        };
        Signature::new(s).expect("builtin signatures are always valid")
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::ObjectPath(s) | Value::Signature(s) => Some(s),
            Value::Variant(v) => v.as_str(),
            _ => None,
        }
    }

    pub fn as_object_path(&self) -> Option<Path<'static>> {
        match self {
            Value::ObjectPath(s) => Path::new(s.clone()).ok(),
            Value::Variant(v) => v.as_object_path(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(*v as i64),
            Value::I16(v) => Some(*v as i64),
            Value::U16(v) => Some(*v as i64),
            Value::I32(v) => Some(*v as i64),
            Value::U32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            Value::U64(v) => Some(*v as i64),
            Value::Variant(v) => v.as_i64(),
            _ => None,
        }
    }

    /// Wraps this value in a `Variant`, as property getters and `Get`
    /// replies do.
    pub fn into_variant(self) -> Value {
        Value::Variant(Box::new(self))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value { Value::Str(s.to_string()) }
}

impl From<String> for Value {
    fn from(s: String) -> Value { Value::Str(s) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value { Value::Bool(b) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value { Value::I32(v) }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value { Value::U32(v) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signatures() {
        assert_eq!(Value::I32(42).signature().as_str(), "i");
        assert_eq!(Value::Str("x".into()).signature().as_str(), "s");
        assert_eq!(Value::I32(7).into_variant().signature().as_str(), "v");
    }

    #[test]
    fn variant_unwraps() {
        let v = Value::Str("hi".into()).into_variant();
        assert_eq!(v.as_str(), Some("hi"));
    }
}
