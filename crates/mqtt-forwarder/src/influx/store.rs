// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB 1.x HTTP store.

use super::line_protocol::LineProtocolWriter;
use crate::config::InfluxConfig;
use crate::normalize::NormalizedRecord;
use crate::sink::{Sink, SinkError, Tags};
use reqwest::blocking::{Client, RequestBuilder};
use std::time::Duration;

/// Writes records to an InfluxDB 1.x database, one point per request.
///
/// Every request is bounded by the configured timeout so a dead server
/// cannot stall the router for longer than that.
pub struct InfluxStore {
    name: String,
    client: Client,
    base_url: String,
    database: String,
    credentials: Option<(String, String)>,
}

impl InfluxStore {
    /// Create a store without touching the server.
    pub fn new(config: &InfluxConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SinkError::TransientWrite(e.to_string()))?;

        let credentials = match (&config.user, &config.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        };

        Ok(Self {
            name: format!("influx://{}:{}/{}", config.host, config.port, config.database),
            client,
            base_url: config.base_url(),
            database: config.database.clone(),
            credentials,
        })
    }

    /// Create a store and make sure its database exists.
    pub fn connect(config: &InfluxConfig) -> Result<Self, SinkError> {
        let store = Self::new(config)?;
        store.create_database()?;
        tracing::info!("Connected to InfluxDB at {}", store.base_url);
        Ok(store)
    }

    /// Issue `CREATE DATABASE`, a no-op when it already exists.
    pub fn create_database(&self) -> Result<(), SinkError> {
        let query = format!("CREATE DATABASE \"{}\"", self.database.replace('"', "\\\""));
        let request = self
            .client
            .post(format!("{}/query", self.base_url))
            .form(&[("q", query.as_str())]);
        self.execute(request)
    }

    /// Database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Write pre-encoded Line Protocol.
    pub fn write_lines(&self, body: String) -> Result<(), SinkError> {
        let request = self
            .client
            .post(format!("{}/write", self.base_url))
            .query(&[("db", self.database.as_str())])
            .body(body);
        self.execute(request)
    }

    fn execute(&self, request: RequestBuilder) -> Result<(), SinkError> {
        let request = match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        };

        let response = request
            .send()
            .map_err(|e| SinkError::TransientWrite(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Rejected {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            })
        }
    }
}

impl Sink for InfluxStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn store(
        &self,
        tags: &Tags,
        measurement: &str,
        record: &NormalizedRecord,
    ) -> Result<(), SinkError> {
        let mut writer = LineProtocolWriter::new();
        let written = writer.write_point(
            measurement,
            tags.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            record.fields.iter().map(|(k, v)| (k.as_str(), v)),
            None,
        );
        if !written {
            return Err(SinkError::NoFields(measurement.to_string()));
        }

        let body = writer.flush().join("\n");
        tracing::debug!("Writing InfluxDB point: {}", body);
        self.write_lines(body)
    }
}

impl std::fmt::Debug for InfluxStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxStore")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}
