//! In-memory counters and duration aggregates, surfaced to external collectors.
//!
//! Modeled on `fc-router::metrics::PoolMetricsCollector`'s sliding-sample
//! approach: atomic counters for the hot path, a bounded ring buffer of duration
//! samples for averages, and a brief read lock only when a snapshot is taken.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;

/// A point-in-time view of a named metric group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, i64>,
    pub average_durations: HashMap<String, Duration>,
}

/// The contract the pipeline and processors consume for metrics collection.
/// External collectors (Prometheus, StatsD, ...) are expected to poll
/// `snapshot()` or receive forwarded calls; this crate ships only the
/// in-memory reference implementation below.
pub trait MetricsCollector: Send + Sync {
    fn increment(&self, name: &str, n: u64);
    fn record_duration(&self, name: &str, duration: Duration);
    fn record_value(&self, name: &str, v: i64);
    fn snapshot(&self) -> MetricSnapshot;
}

const MAX_DURATION_SAMPLES: usize = 2048;

struct DurationSamples {
    samples: RwLock<VecDeque<u64>>,
}

impl DurationSamples {
    fn new() -> Self {
        Self { samples: RwLock::new(VecDeque::with_capacity(64)) }
    }

    fn push(&self, millis: u64) {
        let mut samples = self.samples.write();
        samples.push_back(millis);
        while samples.len() > MAX_DURATION_SAMPLES {
            samples.pop_front();
        }
    }

    fn average(&self) -> Duration {
        let samples = self.samples.read();
        if samples.is_empty() {
            return Duration::ZERO;
        }
        let sum: u64 = samples.iter().sum();
        Duration::from_millis(sum / samples.len() as u64)
    }
}

/// Reference `MetricsCollector` implementation: lock-free counters on the hot
/// path, a per-name ring buffer of duration samples for averages, and a thin
/// forwarding layer into the `metrics` crate's global recorder so a process
/// wired up with `metrics-exporter-prometheus` gets the same counters without
/// a second instrumentation pass, mirroring how `fc-router::router_metrics`
/// forwards pool samples into Prometheus gauges/counters.
#[derive(Default)]
pub struct InMemoryMetricsCollector {
    counters: DashMap<String, AtomicU64>,
    gauges: DashMap<String, AtomicI64>,
    durations: DashMap<String, DurationSamples>,
}

impl InMemoryMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_counter(&self, name: &str) -> u64 {
        self.counters.get(name).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn get_average_duration(&self, name: &str) -> Duration {
        self.durations.get(name).map(|d| d.average()).unwrap_or(Duration::ZERO)
    }
}

impl MetricsCollector for InMemoryMetricsCollector {
    fn increment(&self, name: &str, n: u64) {
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(n, Ordering::Relaxed);
        metrics::counter!(name.to_string()).increment(n);
    }

    fn record_duration(&self, name: &str, duration: Duration) {
        self.durations
            .entry(name.to_string())
            .or_insert_with(DurationSamples::new)
            .push(duration.as_millis() as u64);
        metrics::histogram!(name.to_string()).record(duration.as_secs_f64());
    }

    fn record_value(&self, name: &str, v: i64) {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(v, Ordering::Relaxed);
        metrics::gauge!(name.to_string()).set(v as f64);
    }

    fn snapshot(&self) -> MetricSnapshot {
        let counters = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();
        let gauges = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();
        let average_durations = self
            .durations
            .iter()
            .map(|e| (e.key().clone(), e.value().average()))
            .collect();

        MetricSnapshot { counters, gauges, average_durations }
    }
}

/// Per-processor metrics exposed on `CommandProcessor`/`QueryProcessor`/`EventBus`.
#[derive(Debug, Clone, Default)]
pub struct ProcessorMetrics {
    pub processed_count: u64,
    pub failed_count: u64,
    pub average_duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let collector = InMemoryMetricsCollector::new();
        collector.increment("messages.Foo.started", 1);
        collector.increment("messages.Foo.started", 2);
        assert_eq!(collector.get_counter("messages.Foo.started"), 3);
    }

    #[test]
    fn durations_average_over_samples() {
        let collector = InMemoryMetricsCollector::new();
        collector.record_duration("messages.Foo.duration", Duration::from_millis(100));
        collector.record_duration("messages.Foo.duration", Duration::from_millis(300));
        assert_eq!(collector.get_average_duration("messages.Foo.duration"), Duration::from_millis(200));
    }

    #[test]
    fn snapshot_reflects_all_recorded_metrics() {
        let collector = InMemoryMetricsCollector::new();
        collector.increment("a", 5);
        collector.record_value("b", -3);
        collector.record_duration("c", Duration::from_millis(10));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.counters.get("a"), Some(&5));
        assert_eq!(snapshot.gauges.get("b"), Some(&-3));
        assert_eq!(snapshot.average_durations.get("c"), Some(&Duration::from_millis(10)));
    }
}
