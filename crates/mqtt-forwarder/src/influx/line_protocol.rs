// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Line Protocol writer.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2="text" [timestamp_ns]
//! ```
//!
//! See: <https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/>

use crate::normalize::FieldValue;

/// Format a field value for Line Protocol.
///
/// Returns `None` for non-finite floats, which InfluxDB cannot store.
/// Line breaks in text are written as `\n` / `\r` escapes.
pub fn encode_field_value(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Float(v) if v.is_finite() => Some(format!("{}", v)),
        FieldValue::Float(_) => None,
        FieldValue::Text(s) => {
            let escaped = escape_line_breaks(&s.replace('\\', "\\\\").replace('"', "\\\""));
            Some(format!("\"{}\"", escaped))
        }
    }
}

/// Line Protocol writer.
///
/// Accumulates points and hands them out as lines on flush.
#[derive(Debug, Default)]
pub struct LineProtocolWriter {
    buffer: Vec<String>,
}

impl LineProtocolWriter {
    /// Create a new empty writer.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Write a single point.
    ///
    /// Tags are sorted by key and tags with an empty value are left out.
    /// Fields keep their order; fields that cannot be encoded are skipped.
    /// Without a timestamp the server assigns its own arrival time.
    ///
    /// Returns `false`, writing nothing, when no field is left.
    pub fn write_point<'a, T, F>(
        &mut self,
        measurement: &str,
        tags: T,
        fields: F,
        timestamp_ns: Option<u64>,
    ) -> bool
    where
        T: IntoIterator<Item = (&'a str, &'a str)>,
        F: IntoIterator<Item = (&'a str, &'a FieldValue)>,
    {
        let encoded: Vec<String> = fields
            .into_iter()
            .filter_map(|(key, value)| {
                encode_field_value(value).map(|v| format!("{}={}", escape_key(key), v))
            })
            .collect();
        if encoded.is_empty() {
            return false;
        }

        let mut line = escape_measurement(measurement);

        let mut sorted_tags: Vec<_> = tags.into_iter().filter(|(_, v)| !v.is_empty()).collect();
        sorted_tags.sort_by_key(|(k, _)| *k);
        for (key, value) in sorted_tags {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        line.push_str(&encoded.join(","));

        if let Some(ts) = timestamp_ns {
            line.push(' ');
            line.push_str(&ts.to_string());
        }

        self.buffer.push(line);
        true
    }

    /// Flush the buffer, returning all accumulated lines.
    pub fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.buffer)
    }

    /// Get the current number of buffered lines.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Escape measurement name: commas and spaces.
fn escape_measurement(s: &str) -> String {
    escape_line_breaks(&s.replace(',', "\\,").replace(' ', "\\ "))
}

/// Escape tag keys, tag values and field keys: commas, equals signs and spaces.
fn escape_key(s: &str) -> String {
    escape_line_breaks(
        &s.replace(',', "\\,")
            .replace('=', "\\=")
            .replace(' ', "\\ "),
    )
}

/// A raw line break would end the point early.
fn escape_line_breaks(s: &str) -> String {
    s.replace('\n', "\\n").replace('\r', "\\r")
}
