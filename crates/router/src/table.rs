//! RoutingTable - owns the topology, the dispatch worker and every consumer

use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use contracts::{AdapterId, Measurement, RouterSettings};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::consumer::Consumer;
use crate::diagnostics::{Diagnostics, DiagnosticsHandle, ExceptionCallback, StatusCallback};
use crate::dispatch::DispatchWork;
use crate::error::RouterError;
use crate::global_cache::GlobalCache;
use crate::local_cache::{Ingress, LocalCache, ProducerEntry};
use crate::metrics::{ConsumerMetricsSnapshot, RouterMetrics, RouterMetricsSnapshot};
use crate::patch::TopologyPatch;
use crate::scheduled::ScheduledWorker;

/// High-fan-out measurement router
///
/// Producers push batches into a shared lock-free queue. A single dispatch
/// worker drains it every `dispatch_latency_ms` (or earlier when the backlog
/// grows past `max_pending_before_eager_wake`) and copies each measurement
/// into the buffers of the consumers subscribed to its signal. Each consumer
/// delivers on its own worker.
///
/// Must be created inside a Tokio runtime. Every worker is spawned on that
/// runtime, so `patch`, `inject` and the producers may run on any thread.
pub struct RoutingTable {
    settings: RouterSettings,
    runtime: Handle,
    cache: Arc<ArcSwap<GlobalCache>>,
    ingress: Arc<Ingress>,
    metrics: Arc<RouterMetrics>,
    diagnostics: DiagnosticsHandle,
    dispatcher: ScheduledWorker,
    /// Producer-less cache behind `inject`
    injector: Arc<LocalCache>,
    /// Registered producers; the lock also serializes patches
    producers: Mutex<HashMap<AdapterId, ProducerEntry>>,
    /// Removed consumers still winding down
    retired: Mutex<Vec<Arc<Consumer>>>,
    disposed: AtomicBool,
}

impl RoutingTable {
    /// Create a routing table and start its dispatch timer
    ///
    /// # Errors
    /// `InvalidConfig` when a setting is out of range (latency outside
    /// [1, 500] ms, zero thresholds); `NoRuntime` outside Tokio.
    #[instrument(name = "routing_table_new", skip(settings), fields(latency_ms = settings.dispatch_latency_ms))]
    pub fn new(settings: RouterSettings) -> Result<Self, RouterError> {
        settings
            .validate()
            .map_err(|e| RouterError::invalid_config(e.to_string()))?;
        let runtime = Handle::try_current().map_err(|_| RouterError::NoRuntime)?;

        let ingress = Arc::new(Ingress::new(settings.max_pending_before_eager_wake));
        let cache = Arc::new(ArcSwap::from_pointee(GlobalCache::empty()));
        let metrics = Arc::new(RouterMetrics::new());
        let diagnostics = DiagnosticsHandle::default();

        let work = DispatchWork::new(
            &settings,
            Arc::clone(&cache),
            Arc::clone(&ingress),
            Arc::clone(&metrics),
            diagnostics.clone(),
        );
        let dispatcher = ScheduledWorker::spawn(&runtime, "dispatch", work, diagnostics.clone());
        dispatcher.start_after(Duration::from_millis(settings.dispatch_latency_ms));

        let injector = Arc::new(LocalCache::new(
            None,
            Arc::clone(&ingress),
            dispatcher.handle(),
            Arc::clone(&metrics),
        ));

        info!(
            latency_ms = settings.dispatch_latency_ms,
            max_pending = settings.max_pending_before_eager_wake,
            flush_threshold = settings.flush_threshold,
            "Routing table created"
        );

        Ok(Self {
            settings,
            runtime,
            cache,
            ingress,
            metrics,
            diagnostics,
            dispatcher,
            injector,
            producers: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        })
    }

    /// Create with default settings and the given dispatch latency
    pub fn with_latency(dispatch_latency_ms: u64) -> Result<Self, RouterError> {
        Self::new(RouterSettings::with_latency(dispatch_latency_ms))
    }

    /// Register the status and exception callbacks
    ///
    /// Replaces the defaults, which log through `tracing`. Takes effect for
    /// workers that are already running.
    pub fn initialize(&self, on_status: StatusCallback, on_exception: ExceptionCallback) {
        self.diagnostics
            .replace(Diagnostics::new(on_status, on_exception));
    }

    /// Apply a topology change and return the new version
    ///
    /// Duplicate ids are rejected before anything changes. Removing an
    /// unknown id only logs a warning. A removed consumer gets no delivery
    /// that starts after this returns.
    #[instrument(name = "routing_table_patch", skip(self, patch), fields(patch = ?patch))]
    pub fn patch(&self, patch: TopologyPatch) -> Result<u64, RouterError> {
        let mut producers = self.producers.lock();
        if self.is_disposed() {
            return Err(RouterError::Disposed);
        }

        let current = self.cache.load_full();
        Self::check_duplicates(&producers, &current, &patch)?;

        let TopologyPatch {
            added_producers,
            removed_producers,
            added_consumers,
            removed_consumers,
        } = patch;

        for id in &removed_producers {
            match producers.remove(id) {
                Some(entry) => {
                    entry.detach();
                    debug!(producer = %id, "Producer removed");
                }
                None => warn!(producer = %id, "Removing unknown producer, ignored"),
            }
        }

        for source in added_producers {
            let id = source.source_id().clone();
            let cache = Arc::new(LocalCache::new(
                Some(id.clone()),
                Arc::clone(&self.ingress),
                self.dispatcher.handle(),
                Arc::clone(&self.metrics),
            ));
            producers.insert(id.clone(), ProducerEntry::attach(source, cache));
            debug!(producer = %id, "Producer added");
        }

        let removed: HashSet<&AdapterId> = removed_consumers.iter().collect();
        let mut retired = Vec::with_capacity(removed.len());
        for id in &removed {
            match current.consumer(id) {
                Some(consumer) => retired.push(Arc::clone(consumer)),
                None => warn!(consumer = %id, "Removing unknown consumer, ignored"),
            }
        }

        let mut consumers: Vec<Arc<Consumer>> = current
            .consumers()
            .iter()
            .filter(|c| !removed.contains(c.id()))
            .cloned()
            .collect();
        for pending in added_consumers {
            consumers.push(pending.spawn(&self.runtime, self.diagnostics.clone()));
        }

        let version = current.version() + 1;
        let next = GlobalCache::build(consumers, version);
        let route_count = next.route_count();
        let consumer_count = next.consumers().len();
        self.cache.store(Arc::new(next));

        for consumer in &retired {
            consumer.retire();
        }
        {
            // Consumers that already closed their sink need no shutdown
            let mut winding_down = self.retired.lock();
            winding_down.retain(|c| !c.is_finished());
            winding_down.extend(retired);
        }

        observability::metrics::record_topology(version, route_count, consumer_count, producers.len());
        info!(
            version,
            routes = route_count,
            consumers = consumer_count,
            producers = producers.len(),
            "Topology updated"
        );

        Ok(version)
    }

    fn check_duplicates(
        producers: &HashMap<AdapterId, ProducerEntry>,
        current: &GlobalCache,
        patch: &TopologyPatch,
    ) -> Result<(), RouterError> {
        // An id removed by the same patch may be added again
        let mut seen: HashSet<&AdapterId> = HashSet::new();
        for source in &patch.added_producers {
            let id = source.source_id();
            let registered = producers.contains_key(id) && !patch.removed_producers.contains(id);
            if registered || !seen.insert(id) {
                return Err(RouterError::duplicate_adapter(id.as_str()));
            }
        }

        let mut seen: HashSet<&AdapterId> = HashSet::new();
        for pending in &patch.added_consumers {
            let id = &pending.id;
            let registered =
                current.contains_consumer(id) && !patch.removed_consumers.contains(id);
            if registered || !seen.insert(id) {
                return Err(RouterError::duplicate_adapter(id.as_str()));
            }
        }

        Ok(())
    }

    /// Route a batch without a registered producer
    pub fn inject(&self, batch: Vec<Measurement>) {
        self.injector.route(batch);
    }

    /// Number of distinct explicitly subscribed signals
    pub fn route_count(&self) -> usize {
        self.cache.load().route_count()
    }

    /// Topology version; 0 before the first patch
    pub fn version(&self) -> u64 {
        self.cache.load().version()
    }

    pub fn consumer_count(&self) -> usize {
        self.cache.load().consumers().len()
    }

    pub fn producer_count(&self) -> usize {
        self.producers.lock().len()
    }

    /// Removed consumers whose worker has not exited yet
    pub fn retired_count(&self) -> usize {
        let mut retired = self.retired.lock();
        retired.retain(|c| !c.is_finished());
        retired.len()
    }

    /// Measurements waiting in the ingress queue
    pub fn pending_measurements(&self) -> usize {
        self.ingress.pending()
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Get dispatch counters
    pub fn metrics(&self) -> RouterMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Get metrics for all current consumers
    pub fn consumer_metrics(&self) -> Vec<(String, ConsumerMetricsSnapshot)> {
        self.cache
            .load()
            .consumers()
            .iter()
            .map(|c| (c.id().to_string(), c.metrics().snapshot()))
            .collect()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Shut down gracefully
    ///
    /// Detaches producers, runs a final dispatch cycle, then lets every
    /// consumer drain its queue and close its sink. Calling it again is a
    /// no-op.
    #[instrument(name = "routing_table_dispose", skip(self))]
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let entries: Vec<ProducerEntry> = self.producers.lock().drain().map(|(_, e)| e).collect();
        for entry in &entries {
            entry.detach();
        }
        self.injector.disable();

        self.dispatcher.dispose().await;

        let cache = self.cache.load_full();
        for consumer in cache.consumers() {
            consumer.shutdown().await;
        }
        let retired = mem::take(&mut *self.retired.lock());
        for consumer in retired {
            consumer.shutdown().await;
        }

        let snapshot = self.metrics.snapshot();
        info!(
            cycles = snapshot.cycles,
            input_measurements = snapshot.input_measurements,
            output_measurements = snapshot.output_measurements,
            "Routing table disposed"
        );
    }
}

impl Drop for RoutingTable {
    fn drop(&mut self) {
        if self.is_disposed() {
            return;
        }
        for entry in self.producers.get_mut().values() {
            entry.detach();
        }
        self.injector.disable();
        self.dispatcher.stop();
        for consumer in self.cache.load().consumers() {
            consumer.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::CountingSink;
    use crate::sources::{MockMeasurementSource, MockSourceConfig};
    use contracts::{MeasurementSource, SignalId};
    use tokio::time::sleep;

    fn batch(signal: &str, n: usize) -> Vec<Measurement> {
        (0..n)
            .map(|i| Measurement::new(signal, i as f64, i as f64))
            .collect()
    }

    fn signals(s: &[&str]) -> Option<Vec<SignalId>> {
        Some(s.iter().map(|x| SignalId::from(*x)).collect())
    }

    #[tokio::test]
    async fn test_latency_range() {
        assert!(RoutingTable::with_latency(1).is_ok());
        assert!(RoutingTable::with_latency(500).is_ok());
        assert!(matches!(
            RoutingTable::with_latency(0),
            Err(RouterError::InvalidConfig { .. })
        ));
        assert!(matches!(
            RoutingTable::with_latency(501),
            Err(RouterError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(
            RoutingTable::with_latency(10),
            Err(RouterError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn test_fan_out_scenario() {
        let table = RoutingTable::with_latency(10).unwrap();
        let (a1, log1) = CountingSink::new("a1", signals(&["A"]));
        let (a2, log2) = CountingSink::new("a2", signals(&["A"]));
        let (all, log3) = CountingSink::new("all", None);

        let version = table
            .patch(TopologyPatch::new().add_consumer(a1).add_consumer(a2).add_consumer(all))
            .unwrap();
        assert_eq!(version, 1);
        assert_eq!(table.route_count(), 1);

        table.inject(batch("A", 5));
        table.inject(batch("B", 3));
        sleep(Duration::from_millis(100)).await;

        assert_eq!(log1.total(), 5);
        assert_eq!(log2.total(), 5);
        assert_eq!(log3.total(), 8);
        assert_eq!(log3.count_for("B"), 3);

        table.dispose().await;
        assert_eq!(log1.close_count(), 1);
        assert_eq!(log3.close_count(), 1);
    }

    #[tokio::test]
    async fn test_large_batch_split_by_cap() {
        let table = RoutingTable::with_latency(10).unwrap();
        let (sink, log) = CountingSink::new("c", signals(&["A"]));
        table.patch(TopologyPatch::new().add_consumer(sink)).unwrap();

        table.inject(batch("A", 1500));
        sleep(Duration::from_millis(100)).await;

        let sizes: Vec<usize> = log.batches().iter().map(Vec::len).collect();
        assert!(sizes.len() >= 2, "sizes: {sizes:?}");
        assert!(sizes.iter().all(|s| *s <= 1000));
        assert_eq!(sizes.iter().sum::<usize>(), 1500);
        // Above the eager-wake threshold
        assert!(table.metrics().eager_wakes >= 1);

        table.dispose().await;
    }

    #[tokio::test]
    async fn test_removed_consumer_stops_receiving() {
        let table = RoutingTable::with_latency(10).unwrap();
        let (keep, keep_log) = CountingSink::new("keep", signals(&["A"]));
        let (gone, gone_log) = CountingSink::new("gone", signals(&["A"]));
        table
            .patch(TopologyPatch::new().add_consumer(keep).add_consumer(gone))
            .unwrap();

        table.inject(batch("A", 4));
        sleep(Duration::from_millis(60)).await;
        assert_eq!(gone_log.total(), 4);

        let version = table
            .patch(TopologyPatch::new().remove_consumer("gone"))
            .unwrap();
        assert_eq!(version, 2);
        assert_eq!(table.consumer_count(), 1);

        table.inject(batch("A", 6));
        sleep(Duration::from_millis(60)).await;

        assert_eq!(gone_log.total(), 4);
        assert_eq!(keep_log.total(), 10);

        table.dispose().await;
        // Retired sinks are still closed once
        assert_eq!(gone_log.close_count(), 1);
    }

    #[tokio::test]
    async fn test_retired_consumers_are_released() {
        let table = RoutingTable::with_latency(5).unwrap();
        let mut logs = Vec::new();
        for round in 0..5 {
            let (sink, log) = CountingSink::new(format!("churn{round}"), None);
            logs.push(log);
            table.patch(TopologyPatch::new().add_consumer(sink)).unwrap();
            table.inject(batch("A", 2));
            sleep(Duration::from_millis(20)).await;
            table
                .patch(TopologyPatch::new().remove_consumer(format!("churn{round}")))
                .unwrap();
        }

        sleep(Duration::from_millis(50)).await;
        assert_eq!(table.retired_count(), 0);
        // Each retired sink closed exactly once, before dispose
        assert!(logs.iter().all(|log| log.close_count() == 1));

        table.dispose().await;
        assert!(logs.iter().all(|log| log.close_count() == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_patch_from_plain_thread() {
        let table = Arc::new(RoutingTable::with_latency(5).unwrap());
        let (sink, log) = CountingSink::new("threaded", None);

        let patched = {
            let table = Arc::clone(&table);
            std::thread::spawn(move || {
                let version = table.patch(TopologyPatch::new().add_consumer(sink));
                table.inject(batch("A", 3));
                version
            })
            .join()
            .unwrap()
        };
        assert_eq!(patched.unwrap(), 1);

        sleep(Duration::from_millis(60)).await;
        assert_eq!(log.total(), 3);

        table.dispose().await;
        assert_eq!(log.close_count(), 1);
    }

    #[tokio::test]
    async fn test_added_consumer_sees_only_later_measurements() {
        let table = RoutingTable::with_latency(10).unwrap();
        let (first, first_log) = CountingSink::new("first", None);
        table.patch(TopologyPatch::new().add_consumer(first)).unwrap();

        table.inject(batch("A", 3));
        sleep(Duration::from_millis(60)).await;

        let (late, late_log) = CountingSink::new("late", None);
        table.patch(TopologyPatch::new().add_consumer(late)).unwrap();
        table.inject(batch("A", 2));
        sleep(Duration::from_millis(60)).await;

        assert_eq!(first_log.total(), 5);
        assert_eq!(late_log.total(), 2);

        table.dispose().await;
    }

    #[tokio::test]
    async fn test_duplicate_rejected_before_apply() {
        let table = RoutingTable::with_latency(10).unwrap();
        let (c1, _) = CountingSink::new("c1", None);
        table.patch(TopologyPatch::new().add_consumer(c1)).unwrap();

        let (dup, _) = CountingSink::new("c1", None);
        let (fresh, _) = CountingSink::new("c2", None);
        let result = table.patch(TopologyPatch::new().add_consumer(fresh).add_consumer(dup));
        assert!(matches!(result, Err(RouterError::DuplicateAdapter { .. })));
        // Nothing applied
        assert_eq!(table.version(), 1);
        assert_eq!(table.consumer_count(), 1);

        // Replacing in one patch is allowed
        let (again, _) = CountingSink::new("c1", None);
        let version = table
            .patch(TopologyPatch::new().remove_consumer("c1").add_consumer(again))
            .unwrap();
        assert_eq!(version, 2);
        assert_eq!(table.consumer_count(), 1);

        table.dispose().await;
    }

    #[tokio::test]
    async fn test_unknown_removal_ignored() {
        let table = RoutingTable::with_latency(10).unwrap();
        let version = table
            .patch(
                TopologyPatch::new()
                    .remove_consumer("nobody")
                    .remove_producer("nothing"),
            )
            .unwrap();
        assert_eq!(version, 1);
        table.dispose().await;
    }

    #[tokio::test]
    async fn test_producer_lifecycle() {
        let table = RoutingTable::with_latency(5).unwrap();
        let (sink, log) = CountingSink::new("c", signals(&["P"]));
        let source = Arc::new(MockMeasurementSource::new(
            "pmu",
            MockSourceConfig {
                signals: vec!["P".into()],
                rate_hz: 200.0,
                batch_size: 2,
            },
        )
        .unwrap());

        table
            .patch(
                TopologyPatch::new()
                    .add_producer(Arc::clone(&source) as Arc<dyn MeasurementSource>)
                    .add_consumer(sink),
            )
            .unwrap();
        assert!(source.is_subscribed());
        assert_eq!(table.producer_count(), 1);

        sleep(Duration::from_millis(80)).await;
        assert!(log.total() > 0);

        table
            .patch(TopologyPatch::new().remove_producer("pmu"))
            .unwrap();
        assert!(!source.is_subscribed());
        assert_eq!(table.producer_count(), 0);

        sleep(Duration::from_millis(40)).await;
        let settled = log.total();
        sleep(Duration::from_millis(40)).await;
        assert_eq!(log.total(), settled);

        table.dispose().await;
    }

    #[tokio::test]
    async fn test_dispose_reports_and_flushes() {
        let table = RoutingTable::with_latency(500).unwrap();
        let events = Arc::new(Mutex::new(Vec::<String>::new()));
        let e = Arc::clone(&events);
        table.initialize(
            Arc::new(|_| {}),
            Arc::new(move |err| e.lock().push(err.to_string())),
        );

        let (sink, log) = CountingSink::new("c", None);
        table.patch(TopologyPatch::new().add_consumer(sink)).unwrap();
        table.inject(batch("A", 7));

        // Final cycle delivers before the 500 ms tick
        table.dispose().await;
        assert_eq!(log.total(), 7);
        assert_eq!(log.close_count(), 1);
        assert_eq!(events.lock().as_slice(), ["routing table disposing"]);

        // Idempotent, and later calls are rejected or ignored
        table.dispose().await;
        assert!(matches!(
            table.patch(TopologyPatch::new()),
            Err(RouterError::Disposed)
        ));
        table.inject(batch("A", 1));
        assert_eq!(table.pending_measurements(), 0);
    }

    #[tokio::test]
    async fn test_consumer_metrics_listed() {
        let table = RoutingTable::with_latency(10).unwrap();
        let (sink, _log) = CountingSink::new("c", None);
        table.patch(TopologyPatch::new().add_consumer(sink)).unwrap();
        table.inject(batch("A", 3));
        sleep(Duration::from_millis(60)).await;

        let metrics = table.consumer_metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].0, "c");
        assert_eq!(metrics[0].1.delivered_measurements, 3);
        assert!(table.metrics().cycles > 0);

        table.dispose().await;
    }
}
