//! TopologyPatch - one batch of producer and consumer changes

use std::fmt;
use std::sync::Arc;

use contracts::{
    AdapterId, ConsumerConfig, ContractError, MeasurementSink, MeasurementSource, RouterBlueprint,
    SignalId, SinkType,
};
use tokio::runtime::Handle;
use tracing::instrument;

use crate::consumer::Consumer;
use crate::diagnostics::DiagnosticsHandle;
use crate::error::RouterError;
use crate::sinks::{FileSink, LogSink};
use crate::sources::MockMeasurementSource;

type SpawnConsumer = Box<dyn FnOnce(&Handle, DiagnosticsHandle) -> Arc<Consumer> + Send>;

/// A consumer whose worker is spawned when the patch is applied
pub(crate) struct PendingConsumer {
    pub(crate) id: AdapterId,
    spawn: SpawnConsumer,
}

impl PendingConsumer {
    pub(crate) fn spawn(self, runtime: &Handle, diagnostics: DiagnosticsHandle) -> Arc<Consumer> {
        (self.spawn)(runtime, diagnostics)
    }
}

/// Changes applied atomically by `RoutingTable::patch`
///
/// ```ignore
/// let (sink, log) = CountingSink::new("historian", Some(vec!["freq".into()]));
/// let patch = TopologyPatch::new()
///     .add_producer(Arc::new(MockMeasurementSource::new("pmu", config)?))
///     .add_consumer(sink);
/// table.patch(patch)?;
/// ```
#[derive(Default)]
pub struct TopologyPatch {
    pub(crate) added_producers: Vec<Arc<dyn MeasurementSource>>,
    pub(crate) removed_producers: Vec<AdapterId>,
    pub(crate) added_consumers: Vec<PendingConsumer>,
    pub(crate) removed_consumers: Vec<AdapterId>,
}

impl TopologyPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register and subscribe a producer
    pub fn add_producer(mut self, source: Arc<dyn MeasurementSource>) -> Self {
        self.added_producers.push(source);
        self
    }

    /// Unsubscribe and forget a producer
    pub fn remove_producer(mut self, id: impl Into<AdapterId>) -> Self {
        self.removed_producers.push(id.into());
        self
    }

    /// Register a consumer; its worker starts when the patch is applied
    pub fn add_consumer<S: MeasurementSink + Send + 'static>(mut self, sink: S) -> Self {
        let id = AdapterId::from(sink.name());
        self.added_consumers.push(PendingConsumer {
            id,
            spawn: Box::new(move |runtime, diagnostics| {
                Consumer::spawn(sink, runtime, diagnostics)
            }),
        });
        self
    }

    /// Retire a consumer
    pub fn remove_consumer(mut self, id: impl Into<AdapterId>) -> Self {
        self.removed_consumers.push(id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.added_producers.is_empty()
            && self.removed_producers.is_empty()
            && self.added_consumers.is_empty()
            && self.removed_consumers.is_empty()
    }

    /// Build the initial topology described by a blueprint
    ///
    /// Producers become mock sources; consumers become log or file sinks.
    #[instrument(
        name = "topology_patch_from_blueprint",
        skip(blueprint),
        fields(producers = blueprint.producers.len(), consumers = blueprint.consumers.len())
    )]
    pub fn from_blueprint(blueprint: &RouterBlueprint) -> Result<Self, RouterError> {
        let mut patch = Self::new();

        for producer in &blueprint.producers {
            let source = MockMeasurementSource::from_config(producer)?;
            patch = patch.add_producer(Arc::new(source));
        }

        for consumer in &blueprint.consumers {
            patch = add_configured_consumer(patch, consumer)?;
        }

        Ok(patch)
    }
}

fn add_configured_consumer(
    patch: TopologyPatch,
    config: &ConsumerConfig,
) -> Result<TopologyPatch, RouterError> {
    let signals: Option<Vec<SignalId>> = config.signals.clone();

    match config.sink_type {
        SinkType::Log => Ok(patch.add_consumer(LogSink::new(&config.name, signals))),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, signals, &config.params)
                .map_err(|e| ContractError::sink_connection(&config.name, e.to_string()))?;
            Ok(patch.add_consumer(sink))
        }
    }
}

impl fmt::Debug for TopologyPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let added_producers: Vec<&AdapterId> =
            self.added_producers.iter().map(|p| p.source_id()).collect();
        let added_consumers: Vec<&AdapterId> =
            self.added_consumers.iter().map(|c| &c.id).collect();

        f.debug_struct("TopologyPatch")
            .field("added_producers", &added_producers)
            .field("removed_producers", &self.removed_producers)
            .field("added_consumers", &added_consumers)
            .field("removed_consumers", &self.removed_consumers)
            .finish()
    }
}
