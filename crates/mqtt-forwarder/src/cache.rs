// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Change detection for scalar readings.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Last forwarded raw scalar value per measurement.
///
/// Only exact repeats are suppressed: `"21.50"` after `"21.5"` is a change.
/// Entries live as long as the cache; the key space is the configured
/// measurement names.
#[derive(Debug, Default)]
pub struct ChangeCache {
    last: Mutex<HashMap<String, String>>,
}

impl ChangeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a scalar reading must be forwarded.
    ///
    /// Returns `false` when `raw` equals the last forwarded value of the
    /// measurement. Otherwise records `raw` and returns `true`. The check and
    /// the update happen under one lock.
    pub fn should_forward(&self, measurement: &str, raw: &str) -> bool {
        let mut last = self.lock();
        match last.get_mut(measurement) {
            Some(previous) if previous == raw => false,
            Some(previous) => {
                raw.clone_into(previous);
                true
            }
            None => {
                last.insert(measurement.to_string(), raw.to_string());
                true
            }
        }
    }

    /// Last forwarded value of a measurement.
    pub fn last_value(&self, measurement: &str) -> Option<String> {
        self.lock().get(measurement).cloned()
    }

    /// Number of tracked measurements.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if no measurement has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the map half-written.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
