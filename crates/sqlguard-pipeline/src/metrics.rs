//! Per-worker counters (spec §5: "No global mutable counters on the hot
//! path: metrics are per-worker and aggregated at scrape time").
//!
//! Each worker owns a [`WorkerMetrics`] updated with plain atomics — no
//! lock, no contention between workers. [`PipelineMetrics`] holds one per
//! worker and sums them on demand; behind the `metrics` feature that sum is
//! also exported through a `prometheus::Registry`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters owned by a single worker, updated only from that worker's task.
#[derive(Default)]
pub struct WorkerMetrics {
    pub events_processed: AtomicU64,
    pub events_failed: AtomicU64,
    pub events_dead_lettered: AtomicU64,
    pub queue_depth: AtomicU64,
}

impl WorkerMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.events_dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth as u64, Ordering::Relaxed);
    }
}

/// Snapshot of a `WorkerMetrics` set, summed across all workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineMetricsSnapshot {
    pub events_processed: u64,
    pub events_failed: u64,
    pub events_dead_lettered: u64,
    pub queue_depth: u64,
}

/// Owns one [`WorkerMetrics`] per worker and aggregates at scrape time.
pub struct PipelineMetrics {
    workers: Vec<std::sync::Arc<WorkerMetrics>>,
}

impl PipelineMetrics {
    #[must_use]
    pub fn new(worker_count: usize) -> Self {
        Self { workers: (0..worker_count).map(|_| std::sync::Arc::new(WorkerMetrics::new())).collect() }
    }

    #[must_use]
    pub fn worker(&self, index: usize) -> std::sync::Arc<WorkerMetrics> {
        std::sync::Arc::clone(&self.workers[index])
    }

    #[must_use]
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        let mut snapshot = PipelineMetricsSnapshot::default();
        for worker in &self.workers {
            snapshot.events_processed += worker.events_processed.load(Ordering::Relaxed);
            snapshot.events_failed += worker.events_failed.load(Ordering::Relaxed);
            snapshot.events_dead_lettered += worker.events_dead_lettered.load(Ordering::Relaxed);
            snapshot.queue_depth += worker.queue_depth.load(Ordering::Relaxed);
        }
        snapshot
    }
}

#[cfg(feature = "metrics")]
pub mod prometheus_export {
    use prometheus::{IntGauge, Registry};

    use super::PipelineMetrics;

    /// Registers gauges on `registry` and updates them from `metrics` on
    /// every call — intended to be invoked from the scrape handler, not on
    /// the processing hot path.
    pub struct PrometheusExporter {
        events_processed: IntGauge,
        events_failed: IntGauge,
        events_dead_lettered: IntGauge,
        queue_depth: IntGauge,
    }

    impl PrometheusExporter {
        pub fn register(registry: &Registry) -> prometheus::Result<Self> {
            let events_processed = IntGauge::new("sqlguard_pipeline_events_processed_total", "Total audit events processed")?;
            registry.register(Box::new(events_processed.clone()))?;
            let events_failed = IntGauge::new("sqlguard_pipeline_events_failed_total", "Total audit events that failed checker processing")?;
            registry.register(Box::new(events_failed.clone()))?;
            let events_dead_lettered = IntGauge::new("sqlguard_pipeline_events_dead_lettered_total", "Total audit events sent to the dead-letter queue")?;
            registry.register(Box::new(events_dead_lettered.clone()))?;
            let queue_depth = IntGauge::new("sqlguard_pipeline_queue_depth", "Current backpressure queue depth")?;
            registry.register(Box::new(queue_depth.clone()))?;
            Ok(Self { events_processed, events_failed, events_dead_lettered, queue_depth })
        }

        pub fn sync_from(&self, metrics: &PipelineMetrics) {
            let snapshot = metrics.snapshot();
            self.events_processed.set(snapshot.events_processed as i64);
            self.events_failed.set(snapshot.events_failed as i64);
            self.events_dead_lettered.set(snapshot.events_dead_lettered as i64);
            self.queue_depth.set(snapshot.queue_depth as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_sums_across_workers() {
        let metrics = PipelineMetrics::new(2);
        metrics.worker(0).record_processed();
        metrics.worker(0).record_processed();
        metrics.worker(1).record_processed();
        metrics.worker(1).record_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_processed, 3);
        assert_eq!(snapshot.events_failed, 1);
    }

    #[test]
    fn queue_depth_reflects_last_set_value_per_worker() {
        let metrics = PipelineMetrics::new(1);
        metrics.worker(0).set_queue_depth(42);
        assert_eq!(metrics.snapshot().queue_depth, 42);
    }
}
