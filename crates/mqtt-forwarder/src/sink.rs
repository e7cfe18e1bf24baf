// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sink abstraction
//!
//! A sink persists normalized records. Implementations:
//!
//! - `InfluxStore` -- InfluxDB 1.x over HTTP

use crate::normalize::NormalizedRecord;
use std::collections::BTreeMap;
use thiserror::Error;

/// Tag set attached to a record, ordered by key.
pub type Tags = BTreeMap<String, String>;

/// Errors returned by a sink for a single record.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transient write error: {0}")]
    TransientWrite(String),

    #[error("write rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("record for measurement '{0}' has no storable field")]
    NoFields(String),
}

/// Persistence target for normalized records.
///
/// Calls come from the single routing worker, one record at a time. A slow
/// sink delays later messages, so implementations must bound their I/O.
pub trait Sink: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Persist one record.
    fn store(
        &self,
        tags: &Tags,
        measurement: &str,
        record: &NormalizedRecord,
    ) -> Result<(), SinkError>;
}
