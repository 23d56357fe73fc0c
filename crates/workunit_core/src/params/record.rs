//! Structured-record and serde-driven parameter sources.

use super::{ParameterValue, Parameters};
use crate::context::SqlValue;
use log::warn;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors raised while turning a serializable value into parameters.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("value cannot be serialized into parameters: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("integer parameter `{name}` does not fit into a 64-bit signed value")]
    IntegerOverflow { name: String },
}

/// Capability for records that enumerate their own members.
///
/// Members are returned in declaration order as `(name, value)` pairs.
pub trait ParameterRecord {
    fn parameters(&self) -> Vec<(&'static str, ParameterValue)>;
}

impl Parameters {
    /// Binds a record through its `ParameterRecord` members.
    pub fn from_record<R: ParameterRecord + ?Sized>(record: &R) -> Self {
        Self::Named(
            record
                .parameters()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }

    /// Derives parameters from the serialized shape of `value`.
    ///
    /// - unit / `None` -> no parameters
    /// - sequence -> positional parameters
    /// - struct or map -> named parameters, in serialization order
    /// - bare scalar -> no parameters (it has no members)
    ///
    /// Nested sequences and maps inside members are bound as JSON text.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, BindError> {
        match serde_json::to_value(value)? {
            JsonValue::Null => Ok(Self::None),
            JsonValue::Array(items) => {
                let values = items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| json_to_parameter(&format!("@{index}"), item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Positional(values))
            }
            JsonValue::Object(members) => {
                let members = members
                    .into_iter()
                    .map(|(name, item)| {
                        let value = json_to_parameter(&name, item)?;
                        Ok((name, value))
                    })
                    .collect::<Result<Vec<_>, BindError>>()?;
                Ok(Self::Named(members))
            }
            scalar => {
                warn!(
                    "event=params_bind module=params status=ignored reason=scalar_without_members kind={}",
                    json_kind(&scalar)
                );
                Ok(Self::None)
            }
        }
    }
}

fn json_to_parameter(name: &str, value: JsonValue) -> Result<ParameterValue, BindError> {
    let sql = match value {
        JsonValue::Null => return Ok(ParameterValue::null()),
        JsonValue::Bool(flag) => SqlValue::Integer(i64::from(flag)),
        JsonValue::Number(number) => {
            if let Some(integer) = number.as_i64() {
                SqlValue::Integer(integer)
            } else if number.is_u64() {
                return Err(BindError::IntegerOverflow {
                    name: name.to_string(),
                });
            } else {
                SqlValue::Real(number.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(text) => SqlValue::Text(text),
        nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
            SqlValue::Text(serde_json::to_string(&nested)?)
        }
    };
    Ok(sql.into())
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
