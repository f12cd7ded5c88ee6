//! Dispatch loop - drains the ingress queue and fans measurements out
//! to consumer accumulation buffers

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use contracts::{Measurement, RouterSettings};
use tracing::{debug, trace};

use crate::diagnostics::DiagnosticsHandle;
use crate::error::RouterError;
use crate::global_cache::GlobalCache;
use crate::local_cache::Ingress;
use crate::metrics::RouterMetrics;
use crate::scheduled::{RunReason, Work, WorkerHandle};

/// State of the dispatch worker
pub(crate) struct DispatchWork {
    cache: Arc<ArcSwap<GlobalCache>>,
    ingress: Arc<Ingress>,
    metrics: Arc<RouterMetrics>,
    diagnostics: DiagnosticsHandle,
    latency: Duration,
    flush_threshold: usize,
    status_interval: u64,
    /// One accumulation buffer per consumer slot of the current snapshot.
    /// Always empty between cycles.
    buffers: Vec<Vec<Measurement>>,
}

impl DispatchWork {
    pub(crate) fn new(
        settings: &RouterSettings,
        cache: Arc<ArcSwap<GlobalCache>>,
        ingress: Arc<Ingress>,
        metrics: Arc<RouterMetrics>,
        diagnostics: DiagnosticsHandle,
    ) -> Self {
        Self {
            cache,
            ingress,
            metrics,
            diagnostics,
            latency: Duration::from_millis(settings.dispatch_latency_ms),
            flush_threshold: settings.flush_threshold,
            status_interval: settings.status_interval_cycles.max(1),
            buffers: Vec::new(),
        }
    }

    /// One dispatch cycle
    fn cycle(&mut self) {
        let cycle = self.metrics.inc_cycles();
        if cycle % self.status_interval == 0 {
            self.diagnostics.status(&self.metrics.snapshot().to_string());
        }

        // Consistency boundary: one snapshot for the whole cycle
        let cache = self.cache.load_full();
        self.buffers.resize_with(cache.consumers().len(), Vec::new);

        let mut guard = FlushGuard {
            cache: &cache,
            buffers: &mut self.buffers,
        };

        let mut batches = 0usize;
        let mut input = 0usize;
        let mut output = 0usize;

        while let Some(batch) = self.ingress.pop() {
            batches += 1;
            input += batch.len();

            for measurement in batch {
                let destinations = cache.destinations(&measurement.signal_id);
                let Some((&last, rest)) = destinations.split_last() else {
                    continue;
                };
                output += destinations.len();

                let mut full = false;
                for &slot in rest {
                    let buffer = &mut guard.buffers[slot];
                    buffer.push(measurement.clone());
                    full |= buffer.len() >= self.flush_threshold;
                }
                let buffer = &mut guard.buffers[last];
                buffer.push(measurement);
                full |= buffer.len() >= self.flush_threshold;

                if full {
                    guard.flush_all();
                    self.metrics.inc_early_flushes();
                }
            }
        }

        // Final flush
        drop(guard);

        if batches > 0 {
            trace!(cycle, batches, input, output, version = cache.version(), "Dispatch cycle");
        }
        self.metrics.add_input(batches as u64, input as u64);
        self.metrics.add_output(output as u64);
        observability::metrics::record_dispatch_cycle(batches, input, output);
        observability::metrics::record_pending(self.ingress.pending());
    }
}

impl Work for DispatchWork {
    async fn run(&mut self, reason: RunReason, handle: &WorkerHandle) -> Result<(), RouterError> {
        match reason {
            RunReason::Scheduled => {
                handle.start_after(self.latency);
                self.cycle();
            }
            RunReason::Disposing => {
                self.cycle();
                debug!(cycles = self.metrics.cycles(), "Dispatch loop stopped");
                self.diagnostics.exception(&RouterError::Disposing);
            }
        }
        Ok(())
    }
}

/// Flushes every consumer when dropped, so a cycle that unwinds still
/// hands off what it already accumulated
struct FlushGuard<'a> {
    cache: &'a GlobalCache,
    buffers: &'a mut Vec<Vec<Measurement>>,
}

impl FlushGuard<'_> {
    fn flush_all(&mut self) {
        for (consumer, buffer) in self.cache.consumers().iter().zip(self.buffers.iter_mut()) {
            consumer.flush(buffer);
        }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.flush_all();
    }
}
