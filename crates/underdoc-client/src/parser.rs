use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use tracing::debug;

use underdoc_core::error::{Result, UnderdocError};
use underdoc_core::result::{ExtractionResult, FieldValue};
use underdoc_core::schema::{ExtractionSchema, FieldType};
use underdoc_core::transport::RawResponse;

use crate::envelope::{Envelope, LEGACY_RESULT_KEY, RESULT_KEY};

/// Validates terminal payloads against an [`ExtractionSchema`].
#[derive(Debug, Clone)]
pub struct ResultParser {
    schema: ExtractionSchema,
}

impl ResultParser {
    pub fn new(schema: ExtractionSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &ExtractionSchema {
        &self.schema
    }

    pub fn parse(&self, raw: &RawResponse) -> Result<ExtractionResult> {
        let envelope = Envelope::read(raw)?;

        let body = match raw.get(RESULT_KEY).or_else(|| raw.get(LEGACY_RESULT_KEY)) {
            Some(Value::Object(body)) => body,
            Some(other) => {
                return Err(UnderdocError::schema(
                    RESULT_KEY,
                    format!("expected object, got {}", kind_of(other)),
                ))
            }
            None => {
                return Err(UnderdocError::schema(
                    RESULT_KEY,
                    "terminal payload carries no result",
                ))
            }
        };

        let confidence = parse_confidence(raw.get("confidence"))?;
        let (fields, extra) = validate_object(&self.schema, body, "")?;

        debug!(
            job_id = ?envelope.job_id,
            fields = fields.len(),
            extra = extra.len(),
            "Parsed extraction result"
        );

        Ok(ExtractionResult::new(envelope.job_id, fields, confidence, extra))
    }
}

fn validate_object(
    schema: &ExtractionSchema,
    object: &Map<String, Value>,
    path: &str,
) -> Result<(BTreeMap<String, FieldValue>, Map<String, Value>)> {
    let mut fields = BTreeMap::new();

    for spec in &schema.fields {
        let field_path = join_path(path, &spec.name);
        match object.get(&spec.name) {
            None if spec.required => {
                return Err(UnderdocError::schema(field_path, "required field is missing"))
            }
            Some(Value::Null) if spec.required => {
                return Err(UnderdocError::schema(field_path, "required field is null"))
            }
            None | Some(Value::Null) => {}
            Some(value) => {
                let converted = convert(&spec.field_type, value, &field_path)?;
                fields.insert(spec.name.clone(), converted);
            }
        }
    }

    let extra = object
        .iter()
        .filter(|(key, _)| schema.field(key).is_none())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok((fields, extra))
}

fn convert(field_type: &FieldType, value: &Value, path: &str) -> Result<FieldValue> {
    match field_type {
        FieldType::Text => value
            .as_str()
            .map(|s| FieldValue::Text(s.to_string()))
            .ok_or_else(|| mismatch(field_type, value, path)),
        FieldType::Number => parse_number(value)
            .map(FieldValue::Number)
            .ok_or_else(|| mismatch(field_type, value, path)),
        FieldType::Boolean => value
            .as_bool()
            .map(FieldValue::Boolean)
            .ok_or_else(|| mismatch(field_type, value, path)),
        FieldType::Date => {
            let s = value
                .as_str()
                .ok_or_else(|| mismatch(field_type, value, path))?;
            parse_date(s).map(FieldValue::Date).ok_or_else(|| {
                UnderdocError::schema(path, format!("expected ISO 8601 date, got {s:?}"))
            })
        }
        FieldType::Object(schema) => {
            let object = value
                .as_object()
                .ok_or_else(|| mismatch(field_type, value, path))?;
            let (mut fields, extra) = validate_object(schema, object, path)?;
            fields.extend(extra.into_iter().map(|(k, v)| (k, FieldValue::Raw(v))));
            Ok(FieldValue::Object(fields))
        }
        FieldType::Array { items } => {
            let elements = value
                .as_array()
                .ok_or_else(|| mismatch(field_type, value, path))?;
            elements
                .iter()
                .enumerate()
                .map(|(i, element)| convert(items, element, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>>>()
                .map(FieldValue::Array)
        }
        FieldType::Any => Ok(FieldValue::Raw(value.clone())),
    }
}

/// JSON numbers, or strings in plain decimal notation (`-12`, `123.45`).
/// Grouping separators, comma decimals, exponents and values beyond the
/// range of `f64` are rejected.
pub fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if is_plain_decimal(s) => s.parse().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn is_plain_decimal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let (int, frac) = match digits.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (digits, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    all_digits(int) && frac.map_or(true, all_digits)
}

/// `YYYY-MM-DD`, or an RFC 3339 timestamp reduced to its calendar date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let bytes = s.as_bytes();
    if bytes.len() == 10 {
        let shaped = bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
        if !shaped {
            return None;
        }
        return NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

fn parse_confidence(value: Option<&Value>) -> Result<Option<f64>> {
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    match parse_number(value) {
        Some(c) if (0.0..=1.0).contains(&c) => Ok(Some(c)),
        Some(c) => Err(UnderdocError::schema(
            "confidence",
            format!("expected value in [0, 1], got {c}"),
        )),
        None => Err(UnderdocError::schema(
            "confidence",
            format!("expected number, got {}", kind_of(value)),
        )),
    }
}

fn mismatch(expected: &FieldType, value: &Value, path: &str) -> UnderdocError {
    UnderdocError::schema(
        path,
        format!("expected {}, got {}", expected.name(), describe(value)),
    )
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("text {s:?}"),
        Value::Number(n) => format!("number {n}"),
        other => kind_of(other).to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}
