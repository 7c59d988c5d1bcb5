use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub const CACHE_HIT: &str = "cache_hit";
pub const CACHE_MISS: &str = "cache_miss";
pub const IMAGE_DELIVERED_BYTES: &str = "image_delivered_bytes";
pub const IMAGE_RECEIVED_BYTES: &str = "image_received_bytes";

/// Counter sink. Implementations must be cheap to call from request paths.
pub trait Metrics: Send + Sync {
    fn increment_by(&self, name: &str, value: u64, labels: &[(&str, &str)]);

    fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_by(name, 1, labels);
    }
}

pub type DynMetrics = Arc<dyn Metrics>;

/// Emits every increment as a `tracing` event under the `metrics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl Metrics for TracingMetrics {
    fn increment_by(&self, name: &str, value: u64, labels: &[(&str, &str)]) {
        debug!(target: "metrics", counter = name, value, labels = ?labels);
    }
}

/// Accumulates counters in memory, ignoring labels.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .map(|counters| counters.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Metrics for InMemoryMetrics {
    fn increment_by(&self, name: &str, value: u64, _labels: &[(&str, &str)]) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name.to_string()).or_default() += value;
        }
    }
}
