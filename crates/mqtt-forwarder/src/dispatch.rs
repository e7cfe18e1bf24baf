// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fan-out of records to the registered sinks.
//!
//! Sinks are registered on a [`DispatcherBuilder`] at startup. Building
//! freezes the list: a [`Dispatcher`] has no way to add or remove sinks, so
//! message processing never sees a partially built list.

use crate::normalize::NormalizedRecord;
use crate::sink::{Sink, Tags};
use std::sync::Arc;

/// Append-only sink registration.
#[derive(Default)]
pub struct DispatcherBuilder {
    sinks: Vec<Arc<dyn Sink>>,
}

impl DispatcherBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink. Delivery follows registration order.
    pub fn register(mut self, sink: Arc<dyn Sink>) -> Self {
        tracing::debug!("Registered sink '{}'", sink.name());
        self.sinks.push(sink);
        self
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Check if no sink is registered.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Freeze the sink list.
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            sinks: self.sinks.into(),
        }
    }
}

/// Result of delivering one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Delivers records to every sink, in registration order.
#[derive(Clone)]
pub struct Dispatcher {
    sinks: Arc<[Arc<dyn Sink>]>,
}

impl Dispatcher {
    /// Start registering sinks.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Deliver a record to every sink.
    ///
    /// A failing sink is logged and skipped; the remaining sinks still
    /// receive the record. Nothing is retried.
    pub fn dispatch(&self, tags: &Tags, measurement: &str, record: &NormalizedRecord) -> DispatchReport {
        let mut report = DispatchReport::default();

        for sink in self.sinks.iter() {
            match sink.store(tags, measurement, record) {
                Ok(()) => {
                    report.delivered += 1;
                    tracing::trace!("Sink '{}' stored {}", sink.name(), measurement);
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(
                        "Sink '{}' failed to store {}: {}",
                        sink.name(),
                        measurement,
                        err
                    );
                }
            }
        }

        report
    }

    /// Names of the registered sinks.
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Check if no sink is registered.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sinks", &self.sink_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::FieldValue;
    use crate::sink::SinkError;
    use std::sync::Mutex;

    struct RecordingSink {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Sink for RecordingSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn store(
            &self,
            _tags: &Tags,
            measurement: &str,
            _record: &NormalizedRecord,
        ) -> Result<(), SinkError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, measurement));
            if self.fail {
                Err(SinkError::TransientWrite("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    fn sink(name: &str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn Sink> {
        Arc::new(RecordingSink {
            name: name.to_string(),
            log: Arc::clone(log),
            fail,
        })
    }

    fn record() -> NormalizedRecord {
        NormalizedRecord {
            measurement: "temperature".into(),
            fields: vec![("value".into(), FieldValue::Float(21.5))],
        }
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::builder()
            .register(sink("first", &log, false))
            .register(sink("second", &log, false))
            .build();

        let report = dispatcher.dispatch(&Tags::new(), "temperature", &record());

        assert_eq!(report, DispatchReport { delivered: 2, failed: 0 });
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:temperature", "second:temperature"]
        );
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::builder()
            .register(sink("broken", &log, true))
            .register(sink("healthy", &log, false))
            .build();

        let report = dispatcher.dispatch(&Tags::new(), "temperature", &record());

        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_dispatcher() {
        let dispatcher = DispatcherBuilder::new().build();
        assert!(dispatcher.is_empty());
        assert_eq!(
            dispatcher.dispatch(&Tags::new(), "temperature", &record()),
            DispatchReport::default()
        );
    }

    #[test]
    fn test_clones_share_sinks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::builder().register(sink("a", &log, false)).build();
        let clone = dispatcher.clone();

        assert_eq!(clone.sink_names(), vec!["a"]);
        assert_eq!(format!("{:?}", clone), "Dispatcher { sinks: [\"a\"] }");
    }
}
