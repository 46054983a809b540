//! Opaque payload type shared by transaction info, step return values, and
//! exception details.
//!
//! FATE never interprets these bytes — it only stores and returns them — so
//! a small closed enum is enough; it exists only to give callers a typed
//! alternative to raw `Vec<u8>` without pulling in a general JSON value type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An opaque value attached to a transaction: a [`TxInfoKey`](crate::TxInfoKey)
/// entry, a step's [`return_value`](crate::Step::return_value), or an
/// [`Error::CallFailed`](crate::error::StepError) detail payload.
///
/// Different variants are never equal to each other, and there is no
/// implicit coercion between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// A UTF-8 string.
    String(String),
    /// A 64-bit signed integer.
    Int(i64),
    /// Arbitrary binary data, distinct from `String`.
    Bytes(Vec<u8>),
    /// A string-keyed map of values, for structured payloads.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// The type name, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::String(_) => "String",
            Value::Int(_) => "Int",
            Value::Bytes(_) => "Bytes",
            Value::Map(_) => "Map",
        }
    }

    /// Borrow as a string, if this is a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}
