//! Run statistics.

use std::time::Duration;

use observability::RoutingStatsAggregator;
use router::{ConsumerMetricsSnapshot, RouterMetricsSnapshot};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Configured run duration elapsed
    DurationElapsed,
    /// Ctrl+C or SIGTERM
    Shutdown,
}

/// Statistics from a routing session
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Wall-clock duration including dispose
    pub duration: Duration,

    pub stop_reason: StopReason,

    /// Topology version at shutdown
    pub topology_version: u64,

    /// Signals with at least one subscriber
    pub routes: usize,

    /// Producers attached before dispose
    pub producers: usize,

    /// Routing table counters after the final flush
    pub router: RouterMetricsSnapshot,

    /// Per-consumer counters, keyed by consumer id
    pub consumers: Vec<(String, ConsumerMetricsSnapshot)>,

    /// Sampled throughput and backlog
    pub routing: RoutingStatsAggregator,
}

impl RunStats {
    /// Input measurements per second over the whole run
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.router.input_measurements as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Average number of consumer copies per input measurement
    pub fn fan_out(&self) -> f64 {
        if self.router.input_measurements > 0 {
            self.router.output_measurements as f64 / self.router.input_measurements as f64
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Routing Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Stopped by: {:?}", self.stop_reason);
        println!("   ├─ Topology version: {}", self.topology_version);
        println!("   ├─ Routes: {}", self.routes);
        println!("   ├─ Producers: {}", self.producers);
        println!("   └─ Consumers: {}", self.consumers.len());

        let router = &self.router;
        println!("\n📈 Routing Table");
        println!("   ├─ Cycles: {}", router.cycles);
        println!("   ├─ Input batches: {}", router.input_batches);
        println!("   ├─ Input measurements: {}", router.input_measurements);
        println!("   ├─ Output measurements: {}", router.output_measurements);
        println!("   ├─ Fan-out: {:.2}", self.fan_out());
        println!("   ├─ Throughput: {:.2} measurements/s", self.throughput());
        println!("   ├─ Eager wakes: {}", router.eager_wakes);
        println!("   └─ Early flushes: {}", router.early_flushes);

        let summary = self.routing.summary();
        println!("\n⏱️  Samples ({})", summary.samples);
        println!("   ├─ Input rate (/s): {}", summary.input_rate);
        println!("   ├─ Output rate (/s): {}", summary.output_rate);
        println!("   └─ Pending: {}", summary.pending);

        if !self.consumers.is_empty() {
            println!("\n📤 Consumers");
            for (i, (id, metrics)) in self.consumers.iter().enumerate() {
                let prefix = if i == self.consumers.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                println!(
                    "   {} {}: {} batches, {} measurements, {} failures, {} discarded",
                    prefix,
                    id,
                    metrics.delivered_batches,
                    metrics.delivered_measurements,
                    metrics.failure_count,
                    metrics.discarded_count
                );
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(input: u64, output: u64, secs: u64) -> RunStats {
        RunStats {
            duration: Duration::from_secs(secs),
            stop_reason: StopReason::Shutdown,
            topology_version: 1,
            routes: 2,
            producers: 1,
            router: RouterMetricsSnapshot {
                input_measurements: input,
                output_measurements: output,
                ..Default::default()
            },
            consumers: Vec::new(),
            routing: RoutingStatsAggregator::new(),
        }
    }

    #[test]
    fn test_throughput_and_fan_out() {
        let s = stats(100, 250, 4);
        assert!((s.throughput() - 25.0).abs() < 1e-10);
        assert!((s.fan_out() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_empty_run() {
        let s = stats(0, 0, 0);
        assert_eq!(s.throughput(), 0.0);
        assert_eq!(s.fan_out(), 0.0);
    }
}
