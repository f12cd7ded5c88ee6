//! Session orchestrator - wires configuration, routing table and sampling.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::RouterBlueprint;
use observability::RoutingStatsAggregator;
use router::{ExceptionCallback, RouterError, RoutingTable, StatusCallback, TopologyPatch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::stats::{RunStats, StopReason};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The routing blueprint
    pub blueprint: RouterBlueprint,

    /// Run duration (None = until shutdown)
    pub duration: Option<Duration>,

    /// Interval between statistics samples
    pub stats_interval: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// One routing table run from startup to dispose
pub struct Session {
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Run until the configured duration elapses or `shutdown` resolves
    ///
    /// The routing table is always disposed before returning, so every
    /// sink is flushed and closed.
    pub async fn run<F>(self, shutdown: F) -> Result<RunStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let table = RoutingTable::new(blueprint.router.clone())
            .context("Failed to create routing table")?;
        table.initialize(status_logger(), exception_logger());

        if blueprint.consumers.is_empty() {
            warn!("No consumers configured - measurements will be dropped");
        }

        let patch = TopologyPatch::from_blueprint(blueprint)
            .context("Failed to build topology from configuration")?;
        let version = table.patch(patch).context("Failed to apply topology")?;

        info!(
            version,
            routes = table.route_count(),
            producers = table.producer_count(),
            consumers = table.consumer_count(),
            latency_ms = blueprint.router.dispatch_latency_ms,
            "Routing table running"
        );

        let mut routing = RoutingStatsAggregator::new();
        let mut ticker = tokio::time::interval(self.config.stats_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let duration = self.config.duration;
        let deadline = async move {
            match duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);
        tokio::pin!(shutdown);

        let mut last = table.metrics();
        let mut last_sample = Instant::now();

        let stop_reason = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let current = table.metrics();
                    let pending = table.pending_measurements();
                    routing.update(
                        last_sample.elapsed().as_secs_f64(),
                        current.input_measurements - last.input_measurements,
                        current.output_measurements - last.output_measurements,
                        pending,
                    );
                    debug!(
                        cycles = current.cycles,
                        input = current.input_measurements,
                        output = current.output_measurements,
                        pending,
                        "Routing sample"
                    );
                    last = current;
                    last_sample = Instant::now();
                }
                _ = &mut deadline => break StopReason::DurationElapsed,
                _ = &mut shutdown => break StopReason::Shutdown,
            }
        };

        info!(reason = ?stop_reason, "Shutting down routing table...");
        let producers = table.producer_count();
        table.dispose().await;

        let stats = RunStats {
            duration: start_time.elapsed(),
            stop_reason,
            topology_version: table.version(),
            routes: table.route_count(),
            producers,
            router: table.metrics(),
            consumers: table.consumer_metrics(),
            routing,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            throughput = format!("{:.2}", stats.throughput()),
            "Routing table shutdown complete"
        );

        Ok(stats)
    }
}

fn status_logger() -> StatusCallback {
    Arc::new(|message: &str| info!(status = %message, "Routing status"))
}

fn exception_logger() -> ExceptionCallback {
    Arc::new(|err: &RouterError| warn!(error = %err, "Routing exception"))
}
