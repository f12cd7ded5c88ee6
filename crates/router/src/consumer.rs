//! Consumer - one sink with its own delivery queue and worker

use std::collections::HashSet;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::{AdapterId, Measurement, MeasurementSink, SignalId};
use crossbeam::queue::SegQueue;
use tokio::runtime::Handle;
use tracing::{debug, error, instrument, trace};

use crate::diagnostics::DiagnosticsHandle;
use crate::error::RouterError;
use crate::metrics::ConsumerMetrics;
use crate::scheduled::{RunReason, ScheduledWorker, Work, WorkerHandle};

type BatchQueue = SegQueue<Vec<Measurement>>;

/// A registered consumer
///
/// Dispatch hands finished batches to `flush`; the consumer's own worker
/// delivers them to the sink one by one. A slow sink only grows its own
/// queue.
pub struct Consumer {
    id: AdapterId,
    /// `None` = broadcast
    input_signals: Option<Vec<SignalId>>,
    queue: Arc<BatchQueue>,
    retired: Arc<AtomicBool>,
    metrics: Arc<ConsumerMetrics>,
    worker: ScheduledWorker,
}

impl Consumer {
    /// Spawn the delivery worker for `sink`
    pub fn spawn<S: MeasurementSink + Send + 'static>(
        sink: S,
        runtime: &Handle,
        diagnostics: DiagnosticsHandle,
    ) -> Arc<Self> {
        let id = AdapterId::from(sink.name());
        let input_signals = sink.input_signals().map(dedup_signals);
        let queue = Arc::new(BatchQueue::new());
        let retired = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(ConsumerMetrics::new());

        let work = ConsumerWork {
            id: id.clone(),
            sink,
            queue: Arc::clone(&queue),
            retired: Arc::clone(&retired),
            metrics: Arc::clone(&metrics),
        };
        let worker = ScheduledWorker::spawn(runtime, format!("consumer:{id}"), work, diagnostics);

        debug!(consumer = %id, broadcast = input_signals.is_none(), "Consumer spawned");

        Arc::new(Self {
            id,
            input_signals,
            queue,
            retired,
            metrics,
            worker,
        })
    }

    pub fn id(&self) -> &AdapterId {
        &self.id
    }

    /// Subscribed signals, `None` for a broadcast consumer
    pub fn input_signals(&self) -> Option<&[SignalId]> {
        self.input_signals.as_deref()
    }

    pub fn is_broadcast(&self) -> bool {
        self.input_signals.is_none()
    }

    pub fn metrics(&self) -> &Arc<ConsumerMetrics> {
        &self.metrics
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Move an accumulation buffer into the delivery queue
    ///
    /// Leaves `buffer` empty. Empty buffers are ignored; buffers for a
    /// retired consumer are discarded.
    pub fn flush(&self, buffer: &mut Vec<Measurement>) {
        if buffer.is_empty() {
            return;
        }
        if self.is_retired() {
            buffer.clear();
            self.metrics.inc_discarded_count();
            return;
        }

        let batch = mem::take(buffer);
        trace!(consumer = %self.id, measurements = batch.len(), "Batch queued");
        self.queue.push(batch);
        self.metrics.inc_queued_batches();
        self.metrics.set_queue_len(self.queue.len());
        self.worker.start();
    }

    /// Stop delivering; later and still-queued batches are discarded
    pub fn retire(&self) {
        if !self.retired.swap(true, Ordering::SeqCst) {
            debug!(consumer = %self.id, "Consumer retired");
        }
        self.worker.stop();
    }

    /// Stop the worker after it drains the queue and closes the sink
    #[instrument(name = "consumer_shutdown", skip(self), fields(consumer = %self.id))]
    pub async fn shutdown(&self) {
        self.worker.dispose().await;
    }

    /// True once a stopped consumer has closed its sink and its worker exited
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Stop the worker without waiting
    pub(crate) fn stop(&self) {
        self.worker.stop();
    }
}

fn dedup_signals(signals: Vec<SignalId>) -> Vec<SignalId> {
    let mut seen = HashSet::with_capacity(signals.len());
    signals
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Delivery loop state, owned by the consumer's worker
struct ConsumerWork<S> {
    id: AdapterId,
    sink: S,
    queue: Arc<BatchQueue>,
    retired: Arc<AtomicBool>,
    metrics: Arc<ConsumerMetrics>,
}

impl<S: MeasurementSink + Send> ConsumerWork<S> {
    /// Deliver queued batches in FIFO order
    ///
    /// Stops at the first failure; the failed batch is dropped and the rest
    /// stays queued for the next run.
    async fn drain(&mut self, handle: &WorkerHandle) -> Result<(), RouterError> {
        while let Some(batch) = self.queue.pop() {
            self.metrics.set_queue_len(self.queue.len());

            if self.retired.load(Ordering::Acquire) {
                self.metrics.inc_discarded_count();
                continue;
            }

            match self.sink.deliver(&batch).await {
                Ok(()) => {
                    self.metrics.record_delivery(batch.len());
                    observability::metrics::record_batch_delivered(&self.id, batch.len());
                }
                Err(e) => {
                    self.metrics.inc_failure_count();
                    error!(
                        consumer = %self.id,
                        measurements = batch.len(),
                        error = %e,
                        "Delivery failed"
                    );
                    if !self.queue.is_empty() {
                        handle.start();
                    }
                    return Err(RouterError::delivery(self.id.as_str(), e));
                }
            }
        }
        Ok(())
    }
}

impl<S: MeasurementSink + Send> Work for ConsumerWork<S> {
    async fn run(&mut self, reason: RunReason, handle: &WorkerHandle) -> Result<(), RouterError> {
        match reason {
            RunReason::Scheduled => self.drain(handle).await,
            RunReason::Disposing => {
                // Keep delivering what is left, then close
                let mut result = Ok(());
                while !self.queue.is_empty() {
                    if let Err(e) = self.drain(handle).await {
                        result = Err(e);
                    }
                }
                if let Err(e) = self.sink.close().await {
                    error!(consumer = %self.id, error = %e, "Close failed on shutdown");
                    return Err(RouterError::delivery(self.id.as_str(), e));
                }
                debug!(consumer = %self.id, "Consumer worker stopped");
                result
            }
        }
    }
}
