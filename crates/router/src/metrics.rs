//! Router and consumer counters

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for the dispatch loop
#[derive(Debug, Default)]
pub struct RouterMetrics {
    /// Completed dispatch cycles
    cycles: AtomicU64,
    /// Batches drained from the ingress queue
    input_batches: AtomicU64,
    /// Measurements drained from the ingress queue
    input_measurements: AtomicU64,
    /// Measurements copied into consumer buffers (one per destination)
    output_measurements: AtomicU64,
    /// Dispatch runs requested early because the backlog was too large
    eager_wakes: AtomicU64,
    /// Flushes forced by a full accumulation buffer
    early_flushes: AtomicU64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the cycle counter, returning the new total
    pub fn inc_cycles(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn add_input(&self, batches: u64, measurements: u64) {
        self.input_batches.fetch_add(batches, Ordering::Relaxed);
        self.input_measurements
            .fetch_add(measurements, Ordering::Relaxed);
    }

    pub fn input_batches(&self) -> u64 {
        self.input_batches.load(Ordering::Relaxed)
    }

    pub fn input_measurements(&self) -> u64 {
        self.input_measurements.load(Ordering::Relaxed)
    }

    pub fn add_output(&self, measurements: u64) {
        self.output_measurements
            .fetch_add(measurements, Ordering::Relaxed);
    }

    pub fn output_measurements(&self) -> u64 {
        self.output_measurements.load(Ordering::Relaxed)
    }

    pub fn inc_eager_wakes(&self) {
        self.eager_wakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn eager_wakes(&self) -> u64 {
        self.eager_wakes.load(Ordering::Relaxed)
    }

    pub fn inc_early_flushes(&self) {
        self.early_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn early_flushes(&self) -> u64 {
        self.early_flushes.load(Ordering::Relaxed)
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> RouterMetricsSnapshot {
        RouterMetricsSnapshot {
            cycles: self.cycles(),
            input_batches: self.input_batches(),
            input_measurements: self.input_measurements(),
            output_measurements: self.output_measurements(),
            eager_wakes: self.eager_wakes(),
            early_flushes: self.early_flushes(),
        }
    }
}

/// Snapshot of router metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterMetricsSnapshot {
    pub cycles: u64,
    pub input_batches: u64,
    pub input_measurements: u64,
    pub output_measurements: u64,
    pub eager_wakes: u64,
    pub early_flushes: u64,
}

/// Status line raised through the status callback
impl fmt::Display for RouterMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Routing cycles: {}, input batches: {}, input measurements: {}, output measurements: {}",
            self.cycles, self.input_batches, self.input_measurements, self.output_measurements
        )
    }
}

/// Metrics for a single consumer
#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    /// Batches waiting in the delivery queue
    queue_len: AtomicUsize,
    /// Total batches queued for delivery
    queued_batches: AtomicU64,
    /// Total batches delivered
    delivered_batches: AtomicU64,
    /// Total measurements delivered
    delivered_measurements: AtomicU64,
    /// Total delivery failures
    failure_count: AtomicU64,
    /// Batches thrown away after the consumer was removed
    discarded_count: AtomicU64,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn queued_batches(&self) -> u64 {
        self.queued_batches.load(Ordering::Relaxed)
    }

    pub fn inc_queued_batches(&self) {
        self.queued_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered_batches(&self) -> u64 {
        self.delivered_batches.load(Ordering::Relaxed)
    }

    pub fn delivered_measurements(&self) -> u64 {
        self.delivered_measurements.load(Ordering::Relaxed)
    }

    /// Record one delivered batch of `measurements` items
    pub fn record_delivery(&self, measurements: usize) {
        self.delivered_batches.fetch_add(1, Ordering::Relaxed);
        self.delivered_measurements
            .fetch_add(measurements as u64, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn discarded_count(&self) -> u64 {
        self.discarded_count.load(Ordering::Relaxed)
    }

    pub fn inc_discarded_count(&self) {
        self.discarded_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> ConsumerMetricsSnapshot {
        ConsumerMetricsSnapshot {
            queue_len: self.queue_len(),
            queued_batches: self.queued_batches(),
            delivered_batches: self.delivered_batches(),
            delivered_measurements: self.delivered_measurements(),
            failure_count: self.failure_count(),
            discarded_count: self.discarded_count(),
        }
    }
}

/// Snapshot of consumer metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerMetricsSnapshot {
    pub queue_len: usize,
    pub queued_batches: u64,
    pub delivered_batches: u64,
    pub delivered_measurements: u64,
    pub failure_count: u64,
    pub discarded_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line() {
        let metrics = RouterMetrics::new();
        assert_eq!(metrics.inc_cycles(), 1);
        assert_eq!(metrics.inc_cycles(), 2);
        metrics.add_input(3, 30);
        metrics.add_output(45);

        let line = metrics.snapshot().to_string();
        assert_eq!(
            line,
            "Routing cycles: 2, input batches: 3, input measurements: 30, output measurements: 45"
        );
    }

    #[test]
    fn test_consumer_delivery_counts() {
        let metrics = ConsumerMetrics::new();
        metrics.inc_queued_batches();
        metrics.inc_queued_batches();
        metrics.record_delivery(7);
        metrics.inc_failure_count();

        let snap = metrics.snapshot();
        assert_eq!(snap.queued_batches, 2);
        assert_eq!(snap.delivered_batches, 1);
        assert_eq!(snap.delivered_measurements, 7);
        assert_eq!(snap.failure_count, 1);
        assert_eq!(snap.discarded_count, 0);
    }
}
