use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::job::JobId;

/// A validated field value. Dates serialize as `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
    Object(BTreeMap<String, FieldValue>),
    Array(Vec<FieldValue>),
    /// Unvalidated value: an `any` field or an unknown nested key.
    Raw(serde_json::Value),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a key of an object value.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.as_object().and_then(|map| map.get(key))
    }
}

/// Schema-validated outcome of one extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    job_id: Option<JobId>,
    fields: BTreeMap<String, FieldValue>,
    confidence: Option<f64>,
    extra: serde_json::Map<String, serde_json::Value>,
}

impl ExtractionResult {
    pub fn new(
        job_id: Option<JobId>,
        fields: BTreeMap<String, FieldValue>,
        confidence: Option<f64>,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            job_id,
            fields,
            confidence,
            extra,
        }
    }

    /// Job that produced the result; `None` when the service answered inline
    /// without assigning one.
    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_text)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(FieldValue::as_number)
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        self.field(name).and_then(FieldValue::as_date)
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    /// Top-level fields the schema does not know about, kept verbatim.
    pub fn extra(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.extra
    }
}
