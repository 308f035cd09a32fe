//! Reconciliation metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

/// Monotonic counter
#[derive(Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
    name: String,
}

impl Counter {
    pub fn new(name: &str) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
            name: name.to_string(),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Point-in-time value
#[derive(Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicU64>,
    name: String,
}

impl Gauge {
    pub fn new(name: &str) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
            name: name.to_string(),
        }
    }

    pub fn set(&self, val: u64) {
        self.value.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Sliding window of samples; the oldest sample is dropped once full.
#[derive(Clone)]
pub struct Histogram {
    samples: Arc<parking_lot::Mutex<VecDeque<f64>>>,
    name: String,
    max_samples: usize,
}

impl Histogram {
    pub fn new(name: &str) -> Self {
        Self::with_capacity(name, 1024)
    }

    pub fn with_capacity(name: &str, max_samples: usize) -> Self {
        Self {
            samples: Arc::new(parking_lot::Mutex::new(VecDeque::with_capacity(max_samples))),
            name: name.to_string(),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&self, value: f64) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.max_samples {
            samples.pop_front();
        }
        samples.push_back(value);
    }

    pub fn percentile(&self, p: f64) -> f64 {
        let mut sorted: Vec<f64> = self.samples.lock().iter().copied().collect();
        if sorted.is_empty() {
            return 0.0;
        }
        sorted.sort_by(f64::total_cmp);
        let idx = ((sorted.len() as f64) * p / 100.0) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn mean(&self) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Counters shared by the IPVS facade and the ticker
#[derive(Clone)]
pub struct ReconcileMetrics {
    pub commands_issued: Counter,
    pub commands_failed: Counter,
    pub passes_completed: Counter,
    pub monitored_clusters: Gauge,
    pub pass_duration_ms: Histogram,
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self {
            commands_issued: Counter::new("ipvs_commands_issued_total"),
            commands_failed: Counter::new("ipvs_commands_failed_total"),
            passes_completed: Counter::new("monitor_passes_total"),
            monitored_clusters: Gauge::new("monitored_clusters"),
            pass_duration_ms: Histogram::new("monitor_pass_duration_ms"),
        }
    }
}

impl ReconcileMetrics {
    pub fn record_pass(&self, elapsed: Duration) {
        self.passes_completed.inc();
        self.pass_duration_ms.record(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_issued: self.commands_issued.get(),
            commands_failed: self.commands_failed.get(),
            passes_completed: self.passes_completed.get(),
            monitored_clusters: self.monitored_clusters.get(),
            pass_duration_p99_ms: self.pass_duration_ms.percentile(99.0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub commands_issued: u64,
    pub commands_failed: u64,
    pub passes_completed: u64,
    pub monitored_clusters: u64,
    pub pass_duration_p99_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter");
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);
        assert_eq!(counter.name(), "test_counter");
    }

    #[test]
    fn test_histogram_window_drops_oldest() {
        let hist = Histogram::with_capacity("window", 3);
        for v in [100.0, 1.0, 2.0, 3.0] {
            hist.record(v);
        }

        assert!((hist.mean() - 2.0).abs() < 0.001);
        assert!((hist.percentile(100.0) - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_snapshot_reflects_passes() {
        let metrics = ReconcileMetrics::default();
        metrics.record_pass(Duration::from_millis(5));
        metrics.commands_issued.inc();
        metrics.monitored_clusters.set(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.passes_completed, 1);
        assert_eq!(snapshot.commands_issued, 1);
        assert_eq!(snapshot.monitored_clusters, 2);
        assert!((snapshot.pass_duration_p99_ms - 5.0).abs() < 0.001);
    }
}
