// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Forwarder configuration.
//!
//! Loaded once from YAML at startup and validated before any connection is
//! opened. Node patterns are compiled during validation so a broken rule is
//! reported at load time, not at the first message.

use crate::pattern::{self, PatternError, PatternResolver};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid node pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level forwarder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Log at debug level by default.
    #[serde(default)]
    pub verbose: bool,

    /// MQTT broker settings.
    pub mqtt: MqttConfig,

    /// InfluxDB settings.
    pub influx: InfluxConfig,

    /// Nodes to subscribe to, with their topic patterns.
    pub nodes: Vec<NodeConfig>,

    /// Measurements whose scalar values are always stored as text.
    #[serde(default)]
    pub stringify_values_for_measurements: Vec<String>,
}

/// MQTT broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Inbound messages buffered between the MQTT loop and the router.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// InfluxDB 1.x connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub host: String,

    #[serde(default = "default_influx_port")]
    pub port: u16,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    pub database: String,

    /// Use HTTPS.
    #[serde(default)]
    pub ssl: bool,

    /// Upper bound for every HTTP request, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// A node and its topic pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name, also the first topic segment.
    pub name: String,

    /// Regex template; `token_pattern` stands for one topic segment.
    pub regex: String,
}

impl NodeConfig {
    /// Create a node definition.
    pub fn new(name: impl Into<String>, regex: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regex: regex.into(),
        }
    }
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_influx_port() -> u16 {
    8086
}

fn default_client_id() -> String {
    "mqtt-forwarder".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_timeout_ms() -> u64 {
    5000
}

impl MqttConfig {
    /// Broker settings with defaults.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_mqtt_port(),
            user: None,
            password: None,
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            queue_capacity: default_queue_capacity(),
        }
    }

    /// Credentials, only when both user and password are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.user, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

impl InfluxConfig {
    /// Database settings with defaults.
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_influx_port(),
            user: None,
            password: None,
            database: database.into(),
            ssl: false,
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Base URL of the HTTP API.
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl ForwarderConfig {
    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.is_empty() {
            return Err(ConfigError::Invalid("mqtt.host is empty".into()));
        }
        if self.mqtt.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.queue_capacity must be greater than 0".into(),
            ));
        }
        if self.influx.host.is_empty() {
            return Err(ConfigError::Invalid("influx.host is empty".into()));
        }
        if self.influx.database.is_empty() {
            return Err(ConfigError::Invalid("influx.database is empty".into()));
        }
        if self.nodes.is_empty() {
            return Err(ConfigError::Invalid("No nodes configured".into()));
        }

        let mut seen = HashSet::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if !pattern::is_token(&node.name) {
                return Err(ConfigError::Invalid(format!(
                    "Node {} has invalid name '{}' (expected a single topic segment)",
                    i, node.name
                )));
            }
            if !seen.insert(node.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Node '{}' is configured more than once",
                    node.name
                )));
            }
        }

        self.resolver()?;
        Ok(())
    }

    /// Compile the node table.
    pub fn resolver(&self) -> Result<PatternResolver, ConfigError> {
        Ok(PatternResolver::new(&self.nodes)?)
    }

    /// Example configuration, as written by `gen-config`.
    pub fn example() -> Self {
        let mut mqtt = MqttConfig::new("localhost");
        mqtt.user = Some("forwarder".into());
        mqtt.password = Some("changeme".into());

        let mut influx = InfluxConfig::new("localhost", "sensors");
        influx.user = Some("admin".into());
        influx.password = Some("changeme".into());

        Self {
            verbose: false,
            mqtt,
            influx,
            nodes: vec![
                NodeConfig::new(
                    "kitchen",
                    "(?P<node_name>kitchen)/(?P<measurement_name>token_pattern)/(?P<room>token_pattern)",
                ),
                NodeConfig::new(
                    "weather",
                    "(?P<node_name>weather)/(?P<measurement_name>token_pattern)",
                ),
            ],
            stringify_values_for_measurements: vec!["status".into()],
        }
    }
}
