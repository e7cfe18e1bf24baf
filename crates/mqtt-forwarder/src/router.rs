// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core router implementation.
//!
//! The Router takes one inbound message at a time through
//! resolve -> normalize -> change check -> dispatch. Messages are
//! independent: nothing is retried and partial delivery is accepted.

use crate::cache::ChangeCache;
use crate::config::{ConfigError, ForwarderConfig};
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::normalize::{Payload, PayloadNormalizer};
use crate::pattern::{PatternResolver, ResolveError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::mpsc;

/// Message handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Dispatched to the sinks.
    Forwarded {
        measurement: String,
        report: DispatchReport,
    },
    /// Scalar value identical to the last forwarded one.
    Suppressed { measurement: String },
    /// Payload produced no field.
    Empty { measurement: String },
    /// Topic could not be resolved.
    Unresolved(ResolveError),
}

impl RouteOutcome {
    /// Check if the message reached the dispatcher.
    pub fn is_forwarded(&self) -> bool {
        matches!(self, RouteOutcome::Forwarded { .. })
    }
}

/// Router statistics.
#[derive(Debug)]
pub struct RouterStats {
    /// Messages handed to the router.
    pub received: AtomicU64,

    /// Messages dispatched.
    pub forwarded: AtomicU64,

    /// Scalar repeats dropped by the change cache.
    pub suppressed: AtomicU64,

    /// Messages dropped because the topic did not resolve.
    pub unresolved: AtomicU64,

    /// Messages dropped because the payload had no field.
    pub empty: AtomicU64,

    /// Failed sink deliveries (one message can count several times).
    pub sink_failures: AtomicU64,

    /// Creation time.
    pub created: Instant,
}

impl RouterStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            unresolved: AtomicU64::new(0),
            empty: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

impl Default for RouterStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of router statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterStatsSnapshot {
    pub received: u64,
    pub forwarded: u64,
    pub suppressed: u64,
    pub unresolved: u64,
    pub empty: u64,
    pub sink_failures: u64,
    pub uptime_secs: u64,
}

impl RouterStatsSnapshot {
    /// Calculate received messages per second.
    pub fn messages_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.received as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}

/// Topic-routing and normalization pipeline.
#[derive(Debug)]
pub struct Router {
    resolver: PatternResolver,
    normalizer: PayloadNormalizer,
    cache: ChangeCache,
    dispatcher: Dispatcher,
    stats: Arc<RouterStats>,
}

impl Router {
    /// Assemble a router from its parts.
    pub fn new(
        resolver: PatternResolver,
        normalizer: PayloadNormalizer,
        cache: ChangeCache,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            resolver,
            normalizer,
            cache,
            dispatcher,
            stats: Arc::new(RouterStats::new()),
        }
    }

    /// Build a router from configuration, with an empty change cache.
    pub fn from_config(config: &ForwarderConfig, dispatcher: Dispatcher) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.resolver()?,
            PayloadNormalizer::new(config.stringify_values_for_measurements.iter().cloned()),
            ChangeCache::new(),
            dispatcher,
        ))
    }

    /// Route one message.
    pub fn handle(&self, topic: &str, payload: &[u8]) -> RouteOutcome {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Received message for topic {} ({} bytes)", topic, payload.len());

        let resolved = match self.resolver.resolve(topic) {
            Ok(r) => r,
            Err(err) => {
                self.stats.unresolved.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Dropping message: {}", err);
                return RouteOutcome::Unresolved(err);
            }
        };
        let measurement = resolved.measurement_name;

        let payload = Payload::parse(payload);
        if let Some(raw) = payload.scalar() {
            if !self.cache.should_forward(&measurement, raw) {
                self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Value did not change for {}, skipping", measurement);
                return RouteOutcome::Suppressed { measurement };
            }
        }

        let record = self.normalizer.normalize_payload(&measurement, payload);
        if record.is_empty() {
            self.stats.empty.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Payload on topic {} produced no fields, dropping", topic);
            return RouteOutcome::Empty { measurement };
        }

        tracing::debug!(
            "Forwarding {} (node {}, tags {:?}): {:?}",
            measurement,
            resolved.node_name,
            resolved.tags,
            record.fields
        );
        let report = self.dispatcher.dispatch(&resolved.tags, &measurement, &record);

        self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
        self.stats
            .sink_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);

        RouteOutcome::Forwarded { measurement, report }
    }

    /// Route an owned message.
    pub fn handle_message(&self, msg: &InboundMessage) -> RouteOutcome {
        self.handle(&msg.topic, &msg.payload)
    }

    /// Get the topic resolver.
    pub fn resolver(&self) -> &PatternResolver {
        &self.resolver
    }

    /// Get the change cache.
    pub fn cache(&self) -> &ChangeCache {
        &self.cache
    }

    /// Get the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Get shared statistics.
    pub fn stats(&self) -> Arc<RouterStats> {
        Arc::clone(&self.stats)
    }
}

/// Run the router on a dedicated thread, draining `rx` until it closes.
///
/// Messages are handled strictly one after another, so sink calls never run
/// concurrently and never block the transport's event loop.
pub fn spawn_worker(
    router: Arc<Router>,
    mut rx: mpsc::Receiver<InboundMessage>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("forwarder-router".into())
        .spawn(move || {
            while let Some(msg) = rx.blocking_recv() {
                router.handle_message(&msg);
            }
            tracing::debug!("Inbound queue closed, router worker exiting");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::normalize::{FieldValue, NormalizedRecord};
    use crate::sink::{Sink, SinkError, Tags};
    use std::sync::Mutex;

    type Stored = Arc<Mutex<Vec<(Tags, String, NormalizedRecord)>>>;

    struct MemorySink {
        stored: Stored,
    }

    impl Sink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        fn store(
            &self,
            tags: &Tags,
            measurement: &str,
            record: &NormalizedRecord,
        ) -> Result<(), SinkError> {
            self.stored
                .lock()
                .unwrap()
                .push((tags.clone(), measurement.to_string(), record.clone()));
            Ok(())
        }
    }

    fn test_router(stringify: &[&str]) -> (Router, Stored) {
        let stored: Stored = Arc::new(Mutex::new(Vec::new()));
        let resolver = PatternResolver::new(&[NodeConfig::new(
            "kitchen",
            "(?P<node_name>kitchen)/(?P<measurement_name>token_pattern)/(?P<room>token_pattern)",
        )])
        .expect("compile");
        let dispatcher = Dispatcher::builder()
            .register(Arc::new(MemorySink {
                stored: Arc::clone(&stored),
            }))
            .build();
        let router = Router::new(
            resolver,
            PayloadNormalizer::new(stringify.iter().copied()),
            ChangeCache::new(),
            dispatcher,
        );
        (router, stored)
    }

    #[test]
    fn test_handle_forwards_resolved_message() {
        let (router, stored) = test_router(&[]);

        let outcome = router.handle("kitchen/temperature/room1", b"21.5");
        assert!(outcome.is_forwarded());

        let stored = stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        let (tags, measurement, record) = &stored[0];
        assert_eq!(measurement, "temperature");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags["room"], "room1");
        assert_eq!(record.field("value"), Some(&FieldValue::Float(21.5)));
    }

    #[test]
    fn test_handle_unresolved_is_dropped() {
        let (router, stored) = test_router(&[]);

        assert!(matches!(
            router.handle("/bad", b"1"),
            RouteOutcome::Unresolved(ResolveError::MalformedTopic(_))
        ));
        assert!(matches!(
            router.handle("garage/temperature/r", b"1"),
            RouteOutcome::Unresolved(ResolveError::UnknownNode { .. })
        ));
        assert!(matches!(
            router.handle("kitchen/temperature", b"1"),
            RouteOutcome::Unresolved(ResolveError::MeasurementExtractionFailed(_))
        ));

        assert!(stored.lock().unwrap().is_empty());
        assert_eq!(router.stats().snapshot().unresolved, 3);
        // Failed resolution never touches the cache.
        assert!(router.cache().is_empty());
    }

    #[test]
    fn test_scalar_repeat_suppressed() {
        let (router, stored) = test_router(&[]);

        assert!(router.handle("kitchen/temperature/room1", b"21.5").is_forwarded());
        assert_eq!(
            router.handle("kitchen/temperature/room1", b"21.5"),
            RouteOutcome::Suppressed {
                measurement: "temperature".into()
            }
        );
        assert!(router.handle("kitchen/temperature/room1", b"22").is_forwarded());

        assert_eq!(stored.lock().unwrap().len(), 2);
        let snapshot = router.stats().snapshot();
        assert_eq!(snapshot.received, 3);
        assert_eq!(snapshot.forwarded, 2);
        assert_eq!(snapshot.suppressed, 1);
    }

    #[test]
    fn test_cache_is_keyed_by_measurement_only() {
        let (router, _) = test_router(&[]);

        assert!(router.handle("kitchen/temperature/room1", b"20").is_forwarded());
        // Same measurement from another room with the same value is a repeat.
        assert!(!router.handle("kitchen/temperature/room2", b"20").is_forwarded());
    }

    #[test]
    fn test_object_payload_never_suppressed() {
        let (router, stored) = test_router(&[]);
        let body = br#"{"temp": "21.5", "status": "ok"}"#;

        for _ in 0..3 {
            assert!(router.handle("kitchen/climate/room1", body).is_forwarded());
        }

        assert_eq!(stored.lock().unwrap().len(), 3);
        assert!(router.cache().last_value("climate").is_none());
    }

    #[test]
    fn test_stringified_measurement() {
        let (router, stored) = test_router(&["status"]);

        router.handle("kitchen/status/room1", b"42");

        let stored = stored.lock().unwrap();
        assert_eq!(
            stored[0].2.field("value"),
            Some(&FieldValue::Text("42".into()))
        );
    }

    #[test]
    fn test_empty_object_dropped() {
        let (router, stored) = test_router(&[]);

        assert_eq!(
            router.handle("kitchen/climate/room1", b"{}"),
            RouteOutcome::Empty {
                measurement: "climate".into()
            }
        );
        assert!(stored.lock().unwrap().is_empty());
        assert_eq!(router.stats().snapshot().empty, 1);
    }

    #[test]
    fn test_stats_snapshot_rate() {
        let snapshot = RouterStatsSnapshot {
            received: 100,
            forwarded: 90,
            suppressed: 10,
            unresolved: 0,
            empty: 0,
            sink_failures: 0,
            uptime_secs: 10,
        };
        assert!((snapshot.messages_per_second() - 10.0).abs() < f64::EPSILON);

        let fresh = RouterStats::new().snapshot();
        assert_eq!(fresh.messages_per_second(), 0.0);
    }

    #[test]
    fn test_worker_drains_queue() {
        let (router, stored) = test_router(&[]);
        let router = Arc::new(router);
        let (tx, rx) = mpsc::channel(8);

        let handle = spawn_worker(Arc::clone(&router), rx).expect("spawn");
        tx.blocking_send(InboundMessage::new("kitchen/temperature/room1", "1"))
            .expect("send");
        tx.blocking_send(InboundMessage::new("kitchen/humidity/room1", "40"))
            .expect("send");
        drop(tx);
        handle.join().expect("join");

        assert_eq!(stored.lock().unwrap().len(), 2);
        assert_eq!(router.stats().snapshot().forwarded, 2);
    }
}
