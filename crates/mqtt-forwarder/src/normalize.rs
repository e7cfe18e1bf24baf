// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload normalization.
//!
//! Raw message bodies are classified once into a [`Payload`]:
//!
//! - a JSON object is a multi-field record, every value is coerced to a float
//!   when it parses as one (booleans count as 1 and 0) and kept as text otherwise
//! - anything else is a single reading stored in the `value` field, kept as
//!   text for measurements in the stringify set
//!
//! Coercion never fails: text that is not a float stays text.

use std::collections::HashSet;
use std::fmt;

/// Field name used for scalar payloads.
pub const SCALAR_FIELD: &str = "value";

/// Parse text as an IEEE-754 double, ignoring surrounding whitespace.
pub fn try_parse_float(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

/// A message body classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Single reading, as decoded text.
    Scalar(String),
    /// Key-value record, values rendered as text.
    Object(Vec<(String, String)>),
}

impl Payload {
    /// Classify a raw message body.
    ///
    /// JSON `null` members are dropped. Booleans become `1`/`0` so they are
    /// stored as numbers. Other non-string members keep their JSON text.
    pub fn parse(raw: &[u8]) -> Self {
        match serde_json::from_slice::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => Payload::Object(
                map.into_iter()
                    .filter_map(|(key, value)| match value {
                        serde_json::Value::Null => None,
                        serde_json::Value::String(s) => Some((key, s)),
                        serde_json::Value::Bool(b) => {
                            Some((key, if b { "1" } else { "0" }.to_string()))
                        }
                        other => Some((key, other.to_string())),
                    })
                    .collect(),
            ),
            _ => Payload::Scalar(String::from_utf8_lossy(raw).into_owned()),
        }
    }

    /// Raw text of a scalar payload, used for change detection.
    pub fn scalar(&self) -> Option<&str> {
        match self {
            Payload::Scalar(text) => Some(text),
            Payload::Object(_) => None,
        }
    }

    /// Check if this is an object payload.
    pub fn is_object(&self) -> bool {
        matches!(self, Payload::Object(_))
    }
}

/// A value that can be stored in a time-series field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 text.
    Text(String),
}

impl FieldValue {
    /// Coerce text to a float, falling back to the text itself.
    pub fn coerce(text: String) -> Self {
        match try_parse_float(&text) {
            Some(v) => FieldValue::Float(v),
            None => FieldValue::Text(text),
        }
    }

    /// Numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    /// Text value, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Float(_) => None,
            FieldValue::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Typed fields of one measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub measurement: String,
    pub fields: Vec<(String, FieldValue)>,
}

impl NormalizedRecord {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Check if the record carries no field.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Converts payloads into typed records.
#[derive(Debug, Clone, Default)]
pub struct PayloadNormalizer {
    stringify: HashSet<String>,
}

impl PayloadNormalizer {
    /// Create a normalizer with the measurements that must stay text.
    pub fn new<I, S>(stringify: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stringify: stringify.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if a measurement is always stored as text.
    pub fn is_stringified(&self, measurement: &str) -> bool {
        self.stringify.contains(measurement)
    }

    /// Parse and normalize a raw body in one go.
    pub fn normalize(&self, measurement: &str, raw: &[u8]) -> NormalizedRecord {
        self.normalize_payload(measurement, Payload::parse(raw))
    }

    /// Normalize an already classified payload.
    pub fn normalize_payload(&self, measurement: &str, payload: Payload) -> NormalizedRecord {
        let fields = match payload {
            Payload::Object(members) => members
                .into_iter()
                .map(|(key, text)| (key, FieldValue::coerce(text)))
                .collect(),
            Payload::Scalar(text) => {
                let value = if self.is_stringified(measurement) {
                    FieldValue::Text(text)
                } else {
                    FieldValue::coerce(text)
                };
                vec![(SCALAR_FIELD.to_string(), value)]
            }
        };

        NormalizedRecord {
            measurement: measurement.to_string(),
            fields,
        }
    }
}
