//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Session, SessionConfig};

/// Execute the `run` command
pub async fn run_router(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(latency_ms) = args.latency_ms {
        info!(latency_ms, "Overriding dispatch latency from CLI");
        blueprint.router.dispatch_latency_ms = latency_ms;
        config_loader::ConfigLoader::validate(&blueprint)
            .context("Invalid dispatch latency override")?;
    }

    info!(
        latency_ms = blueprint.router.dispatch_latency_ms,
        producers = blueprint.producers.len(),
        consumers = blueprint.consumers.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let session = Session::new(SessionConfig {
        blueprint,
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        stats_interval: Duration::from_millis(args.stats_interval_ms.max(1)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Starting routing table...");

    let stats = session
        .run(shutdown_signal())
        .await
        .context("Routing session failed")?;

    info!(
        input = stats.router.input_measurements,
        output = stats.router.output_measurements,
        duration_secs = stats.duration.as_secs_f64(),
        "Routing session completed"
    );
    stats.print_summary();

    info!("Measurement Router finished");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never resolves, leaving the other one
/// (or the run duration) in charge.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C"),
        _ = terminate => warn!("Received SIGTERM"),
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::RouterBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Router:");
    println!("  Dispatch latency: {} ms", blueprint.router.dispatch_latency_ms);
    println!(
        "  Eager wake after: {} pending",
        blueprint.router.max_pending_before_eager_wake
    );
    println!("  Flush threshold: {}", blueprint.router.flush_threshold);

    println!("\nProducers ({}):", blueprint.producers.len());
    for producer in &blueprint.producers {
        println!(
            "  - {} - {} signals @ {} Hz",
            producer.id,
            producer.signals.len(),
            producer.rate_hz
        );
    }

    println!("\nConsumers ({}):", blueprint.consumers.len());
    for consumer in &blueprint.consumers {
        match &consumer.signals {
            Some(signals) => println!(
                "  - {} ({:?}) - {} signals",
                consumer.name,
                consumer.sink_type,
                signals.len()
            ),
            None => println!("  - {} ({:?}) - broadcast", consumer.name, consumer.sink_type),
        }
    }

    println!();
}
