//! Typed accessors over untyped YAML nodes.
//!
//! Every accessor fails with [`GeneratorError::TypeMismatch`] when the node
//! has an unexpected shape. Nothing is coerced or defaulted: a wrong type in
//! the input is an authoring mistake that has to be fixed at the source.

use serde_yaml::{Mapping, Value};

use crate::error::{GeneratorError, Result};

/// Short name of the node kind, used in error messages.
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn mismatch(expected: &'static str, value: &Value) -> GeneratorError {
    GeneratorError::TypeMismatch {
        expected,
        found: kind(value),
    }
}

pub fn as_str(value: &Value) -> Result<&str> {
    value.as_str().ok_or_else(|| mismatch("string", value))
}

pub fn as_string(value: &Value) -> Result<String> {
    as_str(value).map(str::to_string)
}

pub fn as_int(value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| mismatch("integer", value))
}

pub fn as_bool(value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| mismatch("boolean", value))
}

pub fn as_sequence(value: &Value) -> Result<&[Value]> {
    value
        .as_sequence()
        .map(Vec::as_slice)
        .ok_or_else(|| mismatch("sequence", value))
}

pub fn as_string_array(value: &Value) -> Result<Vec<String>> {
    as_sequence(value)?.iter().map(as_string).collect()
}

pub fn as_mapping(value: &Value) -> Result<&Mapping> {
    value.as_mapping().ok_or_else(|| mismatch("mapping", value))
}

/// Renders a scalar leaf (string, number or boolean) as text.
///
/// Used for free-form leaves such as resource quantities (`cpu: 4`), where
/// the target format takes the literal as written.
pub fn scalar_to_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(mismatch("scalar", other)),
    }
}

/// Iterates a mapping as `(key, value)` pairs with string keys, in document order.
pub fn entries(mapping: &Mapping) -> Result<Vec<(&str, &Value)>> {
    mapping
        .iter()
        .map(|(key, value)| Ok((as_str(key)?, value)))
        .collect()
}
