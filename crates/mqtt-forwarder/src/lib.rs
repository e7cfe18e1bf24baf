// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT to InfluxDB telemetry forwarder
//!
//! Routes topic-addressed sensor messages to time-series sinks.
//!
//! # Pipeline
//!
//! ```text
//! MQTT publish (topic, payload)
//!   --> PatternResolver   {node, measurement, tags}
//!   --> PayloadNormalizer {field: float | text}
//!   --> ChangeCache       (drop exact scalar repeats)
//!   --> Dispatcher        --> Sink, Sink, ...
//! ```
//!
//! # Features
//!
//! - **Per-node topic patterns**: each node owns a regex template whose
//!   named groups yield the measurement name and tags
//! - **Payload coercion**: JSON objects become multi-field records, anything
//!   else is a single `value` field, numeric when it parses as a float
//! - **Change suppression**: repeated scalar readings are not re-written
//! - **Fan-out**: a sink failure never blocks delivery to the other sinks
//!
//! # Configuration File
//!
//! ```yaml
//! mqtt:
//!   host: localhost
//! influx:
//!   host: localhost
//!   user: admin
//!   password: admin
//!   database: sensors
//! nodes:
//!   - name: kitchen
//!     regex: "(?P<node_name>kitchen)/(?P<measurement_name>token_pattern)/(?P<room>token_pattern)"
//! stringify_values_for_measurements:
//!   - status
//! ```

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod influx;
pub mod mqtt;
pub mod normalize;
pub mod pattern;
pub mod router;
pub mod sink;

pub use cache::ChangeCache;
pub use config::{ConfigError, ForwarderConfig, InfluxConfig, MqttConfig, NodeConfig};
pub use dispatch::{DispatchReport, Dispatcher, DispatcherBuilder};
pub use influx::{InfluxStore, LineProtocolWriter};
pub use mqtt::{MqttError, MqttSource};
pub use normalize::{try_parse_float, FieldValue, NormalizedRecord, Payload, PayloadNormalizer};
pub use pattern::{PatternError, PatternResolver, ResolveError, ResolvedTopic};
pub use router::{InboundMessage, RouteOutcome, Router, RouterStats, RouterStatsSnapshot};
pub use sink::{Sink, SinkError, Tags};
