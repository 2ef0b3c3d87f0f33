use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// The scalar shapes a ledger row can store. DateTime is unix epoch
/// milliseconds, matching the store's timestamp columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(i64),
}

impl FieldValue {
    pub fn variable_type(&self) -> VariableType {
        match self {
            FieldValue::Null => VariableType::Null,
            FieldValue::Bool(_) => VariableType::Bool,
            FieldValue::Int(_) => VariableType::Int,
            FieldValue::Float(_) => VariableType::Float,
            FieldValue::Text(_) => VariableType::Text,
            FieldValue::DateTime(_) => VariableType::DateTime,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

/// Stable type tag stored alongside the encoded bytes. The string forms are a
/// storage contract; changing them orphans existing rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Null,
    Bool,
    Int,
    Float,
    Text,
    DateTime,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::Null => "null",
            VariableType::Bool => "bool",
            VariableType::Int => "int",
            VariableType::Float => "float",
            VariableType::Text => "text",
            VariableType::DateTime => "datetime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "null" => Some(VariableType::Null),
            "bool" => Some(VariableType::Bool),
            "int" => Some(VariableType::Int),
            "float" => Some(VariableType::Float),
            "text" => Some(VariableType::Text),
            "datetime" => Some(VariableType::DateTime),
            _ => None,
        }
    }
}

/// A tagged (type, bytes) pair ready for ledger storage.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedVariable {
    pub value_type: VariableType,
    pub data: Vec<u8>,
}

/// Encodes a value into its tagged stored form. Deterministic: the same value
/// always produces the same bytes.
pub fn encode_variable(value: &FieldValue) -> Result<EncodedVariable, LedgerError> {
    let data = match value {
        FieldValue::Null => Vec::new(),
        FieldValue::Bool(v) => rmp_serde::to_vec(v)?,
        FieldValue::Int(v) => rmp_serde::to_vec(v)?,
        FieldValue::Float(v) => rmp_serde::to_vec(v)?,
        FieldValue::Text(v) => rmp_serde::to_vec(v)?,
        FieldValue::DateTime(v) => rmp_serde::to_vec(v)?,
    };
    Ok(EncodedVariable {
        value_type: value.variable_type(),
        data,
    })
}

/// Restores a value from its tagged stored form.
pub fn decode_variable(encoded: &EncodedVariable) -> Result<FieldValue, LedgerError> {
    let value = match encoded.value_type {
        VariableType::Null => FieldValue::Null,
        VariableType::Bool => FieldValue::Bool(rmp_serde::from_slice(&encoded.data)?),
        VariableType::Int => FieldValue::Int(rmp_serde::from_slice(&encoded.data)?),
        VariableType::Float => FieldValue::Float(rmp_serde::from_slice(&encoded.data)?),
        VariableType::Text => FieldValue::Text(rmp_serde::from_slice(&encoded.data)?),
        VariableType::DateTime => FieldValue::DateTime(rmp_serde::from_slice(&encoded.data)?),
    };
    Ok(value)
}
