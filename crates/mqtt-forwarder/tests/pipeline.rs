// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end routing through configuration, router and sinks.

use mqtt_forwarder::{
    Dispatcher, FieldValue, ForwarderConfig, NormalizedRecord, ResolveError, RouteOutcome,
    Router, Sink, SinkError, Tags,
};
use std::sync::{Arc, Mutex};

const CONFIG_YAML: &str = r#"
mqtt:
  host: localhost
influx:
  host: localhost
  database: telemetry
nodes:
  - name: kitchen
    regex: "(?P<node_name>kitchen)/(?P<measurement_name>token_pattern)/(?P<room>token_pattern)"
  - name: garden
    regex: "garden/(?P<zone>token_pattern)/(?P<measurement_name>token_pattern)"
stringify_values_for_measurements:
  - status
"#;

#[derive(Debug, Clone, PartialEq)]
struct Delivery {
    tags: Tags,
    measurement: String,
    fields: Vec<(String, FieldValue)>,
}

#[derive(Default)]
struct CollectingSink {
    deliveries: Mutex<Vec<Delivery>>,
}

impl CollectingSink {
    fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

impl Sink for CollectingSink {
    fn name(&self) -> &str {
        "collecting"
    }

    fn store(
        &self,
        tags: &Tags,
        measurement: &str,
        record: &NormalizedRecord,
    ) -> Result<(), SinkError> {
        self.deliveries.lock().unwrap().push(Delivery {
            tags: tags.clone(),
            measurement: measurement.to_string(),
            fields: record.fields.clone(),
        });
        Ok(())
    }
}

struct UnreachableSink;

impl Sink for UnreachableSink {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn store(&self, _: &Tags, _: &str, _: &NormalizedRecord) -> Result<(), SinkError> {
        Err(SinkError::TransientWrite("connection refused".into()))
    }
}

fn router_with(sinks: Vec<Arc<dyn Sink>>) -> Router {
    let config = ForwarderConfig::from_yaml(CONFIG_YAML).expect("valid config");
    let dispatcher = sinks
        .into_iter()
        .fold(Dispatcher::builder(), |b, s| b.register(s))
        .build();
    Router::from_config(&config, dispatcher).expect("router")
}

#[test]
fn test_tags_exclude_node_and_measurement_groups() {
    let sink = Arc::new(CollectingSink::default());
    let router = router_with(vec![sink.clone() as Arc<dyn Sink>]);

    router.handle("kitchen/temperature/room1", b"21.5");
    router.handle("garden/north/moisture", b"0.31");

    let deliveries = sink.deliveries();
    assert_eq!(deliveries.len(), 2);

    assert_eq!(deliveries[0].measurement, "temperature");
    assert_eq!(
        deliveries[0].tags,
        Tags::from([("room".to_string(), "room1".to_string())])
    );

    assert_eq!(deliveries[1].measurement, "moisture");
    assert_eq!(
        deliveries[1].tags,
        Tags::from([("zone".to_string(), "north".to_string())])
    );
}

#[test]
fn test_object_and_scalar_payloads() {
    let sink = Arc::new(CollectingSink::default());
    let router = router_with(vec![sink.clone() as Arc<dyn Sink>]);

    router.handle("kitchen/climate/room1", br#"{"temp": "21.5", "status": "ok"}"#);
    router.handle("kitchen/counter/room1", b"42");
    router.handle("kitchen/status/room1", b"42");

    let deliveries = sink.deliveries();
    assert_eq!(deliveries.len(), 3);

    let climate = &deliveries[0].fields;
    assert!(climate.contains(&("temp".to_string(), FieldValue::Float(21.5))));
    assert!(climate.contains(&("status".to_string(), FieldValue::Text("ok".into()))));

    assert_eq!(
        deliveries[1].fields,
        vec![("value".to_string(), FieldValue::Float(42.0))]
    );
    assert_eq!(
        deliveries[2].fields,
        vec![("value".to_string(), FieldValue::Text("42".into()))]
    );
}

#[test]
fn test_duplicate_scalar_dispatched_once() {
    let sink = Arc::new(CollectingSink::default());
    let router = router_with(vec![sink.clone() as Arc<dyn Sink>]);

    router.handle("kitchen/temperature/room1", b"21.5");
    router.handle("kitchen/temperature/room1", b"21.5");
    assert_eq!(sink.deliveries().len(), 1);

    router.handle("kitchen/temperature/room1", b"21.50");
    assert_eq!(sink.deliveries().len(), 2);

    let body = br#"{"temp": 21.5}"#;
    router.handle("kitchen/climate/room1", body);
    router.handle("kitchen/climate/room1", body);
    assert_eq!(sink.deliveries().len(), 4);
}

#[test]
fn test_failing_sink_does_not_starve_next_sink() {
    let sink = Arc::new(CollectingSink::default());
    let broken: Arc<dyn Sink> = Arc::new(UnreachableSink);
    let router = router_with(vec![broken, sink.clone() as Arc<dyn Sink>]);

    let outcome = router.handle("kitchen/temperature/room1", b"19");

    match outcome {
        RouteOutcome::Forwarded { report, .. } => {
            assert_eq!(report.delivered, 1);
            assert_eq!(report.failed, 1);
        }
        other => panic!("expected Forwarded, got {:?}", other),
    }
    assert_eq!(sink.deliveries().len(), 1);
    assert_eq!(router.stats().snapshot().sink_failures, 1);

    // The stream keeps flowing after a failure.
    assert!(router.handle("kitchen/temperature/room1", b"20").is_forwarded());
    assert_eq!(sink.deliveries().len(), 2);
}

#[test]
fn test_unresolvable_topics_never_reach_sinks() {
    let sink = Arc::new(CollectingSink::default());
    let router = router_with(vec![sink.clone() as Arc<dyn Sink>]);

    let cases = [
        ("/kitchen/temperature/room1", "malformed"),
        ("$SYS/broker/uptime", "malformed"),
        ("cellar/temperature/room1", "unknown"),
        ("kitchen", "extraction"),
        ("garden/north", "extraction"),
    ];

    for (topic, expected) in cases {
        let outcome = router.handle(topic, b"1");
        let kind = match outcome {
            RouteOutcome::Unresolved(ResolveError::MalformedTopic(_)) => "malformed",
            RouteOutcome::Unresolved(ResolveError::UnknownNode { .. }) => "unknown",
            RouteOutcome::Unresolved(ResolveError::MeasurementExtractionFailed(_)) => "extraction",
            other => panic!("{}: unexpected outcome {:?}", topic, other),
        };
        assert_eq!(kind, expected, "topic {}", topic);
    }

    assert!(sink.deliveries().is_empty());
}

#[test]
fn test_subscriptions_cover_every_node() {
    let router = router_with(Vec::new());
    assert_eq!(
        router.resolver().subscriptions(),
        vec!["kitchen/#", "garden/#"]
    );
}
