//! Schema-driven decoding of raw log entries.
//!
//! Decoding is pure: one raw entry plus one schema in, one payload out.
//! A failure affects only the entry being decoded; callers skip and
//! continue with siblings from the same poll batch.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::chain::RawLogEntry;
use crate::events::schema::{FieldFormat, FieldSource, FieldType, JsonSchema};
use crate::events::Payload;

/// Why one entry failed to decode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("event '{event}': field '{field}' has no source value")]
    MissingField { event: String, field: String },

    #[error("field '{field}': cannot coerce {value} to {expected}")]
    Coercion {
        field: String,
        expected: &'static str,
        value: String,
    },

    /// Value outside a closed `enum` set. Never silently coerced.
    #[error("field '{field}': value {value} outside the permitted set")]
    EnumViolation { field: String, value: String },
}

/// Decode one raw entry through a schema.
///
/// Fields absent from the schema are omitted from the payload; the schema is
/// an allow-list over the raw arguments.
pub fn decode(raw: &RawLogEntry, schema: &JsonSchema) -> Result<Payload, DecodeError> {
    let mut payload = Payload::new();
    for (name, def) in schema.fields() {
        let sourced = resolve_source(raw, name, def.field_source()).ok_or_else(|| {
            DecodeError::MissingField {
                event: raw.event.clone(),
                field: name.to_string(),
            }
        })?;

        let formatted = match def.field_format() {
            Some(format) => apply_format(format, sourced).map_err(|value| {
                DecodeError::Coercion {
                    field: name.to_string(),
                    expected: format.as_str(),
                    value,
                }
            })?,
            None => sourced,
        };

        let coerced = coerce(formatted, def.field_type(), def.items_type()).map_err(
            |(expected, value)| DecodeError::Coercion {
                field: name.to_string(),
                expected,
                value,
            },
        )?;

        if let Some(permitted) = def.permitted() {
            if !permitted.contains(&coerced) {
                return Err(DecodeError::EnumViolation {
                    field: name.to_string(),
                    value: coerced.to_string(),
                });
            }
        }

        payload.insert(name.to_string(), coerced);
    }
    Ok(payload)
}

fn resolve_source(raw: &RawLogEntry, name: &str, source: Option<&FieldSource>) -> Option<Value> {
    match source {
        None => raw.args.get(name).cloned(),
        Some(FieldSource::Key(key)) => raw.args.get(key).cloned(),
        Some(FieldSource::Extract(f)) => f(raw),
    }
}

fn apply_format(format: FieldFormat, value: Value) -> Result<Value, String> {
    match format {
        FieldFormat::Uuid => {
            let as_int = match &value {
                Value::Number(n) => n.as_u64().map(u128::from),
                Value::String(s) => s.parse::<u128>().ok(),
                _ => None,
            };
            match as_int {
                Some(n) => Ok(Value::from(Uuid::from_u128(n).to_string())),
                None => Err(value.to_string()),
            }
        }
        FieldFormat::EthAddr => {
            let Value::String(s) = &value else {
                return Err(value.to_string());
            };
            let digits = s.strip_prefix("0x").unwrap_or(s);
            if digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
                Ok(value)
            } else {
                Err(value.to_string())
            }
        }
    }
}

fn coerce(
    value: Value,
    kind: FieldType,
    items: Option<FieldType>,
) -> Result<Value, (&'static str, String)> {
    match kind {
        FieldType::Array => {
            let Value::Array(elements) = value else {
                return Err(("array", value.to_string()));
            };
            match items {
                Some(item_type) => elements
                    .into_iter()
                    .map(|e| coerce_scalar(e, item_type))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                None => Ok(Value::Array(elements)),
            }
        }
        scalar => coerce_scalar(value, scalar),
    }
}

fn coerce_scalar(value: Value, kind: FieldType) -> Result<Value, (&'static str, String)> {
    match kind {
        FieldType::String => match value {
            Value::String(_) => Ok(value),
            Value::Number(n) => Ok(Value::from(n.to_string())),
            Value::Bool(b) => Ok(Value::from(b.to_string())),
            other => Err(("string", other.to_string())),
        },
        FieldType::Integer => match &value {
            Value::Number(n) if n.is_u64() || n.is_i64() => Ok(value),
            Value::String(s) => s
                .parse::<u64>()
                .map(Value::from)
                .or_else(|_| s.parse::<i64>().map(Value::from))
                .map_err(|_| ("integer", value.to_string())),
            _ => Err(("integer", value.to_string())),
        },
        FieldType::Number => match &value {
            Value::Number(_) => Ok(value),
            Value::String(s) => s
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| ("number", value.to_string())),
            _ => Err(("number", value.to_string())),
        },
        FieldType::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::Number(n) => Ok(Value::Bool(n.as_f64() != Some(0.0))),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(("boolean", value.to_string())),
        },
        FieldType::Array => Err(("array", value.to_string())),
    }
}
