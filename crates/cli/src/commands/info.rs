//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::RouterBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    router: RouterInfo,
    producers: Vec<ProducerInfo>,
    consumers: Vec<ConsumerInfo>,
}

#[derive(Serialize)]
struct RouterInfo {
    dispatch_latency_ms: u64,
    max_pending_before_eager_wake: usize,
    flush_threshold: usize,
    status_interval_cycles: u64,
}

#[derive(Serialize)]
struct ProducerInfo {
    id: String,
    rate_hz: f64,
    batch_size: usize,
    signals: Vec<String>,
}

#[derive(Serialize)]
struct ConsumerInfo {
    name: String,
    sink_type: String,
    broadcast: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    signals: Vec<String>,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    params: std::collections::HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &RouterBlueprint) -> ConfigInfo {
    let router = &blueprint.router;

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        router: RouterInfo {
            dispatch_latency_ms: router.dispatch_latency_ms,
            max_pending_before_eager_wake: router.max_pending_before_eager_wake,
            flush_threshold: router.flush_threshold,
            status_interval_cycles: router.status_interval_cycles,
        },
        producers: blueprint
            .producers
            .iter()
            .map(|p| ProducerInfo {
                id: p.id.clone(),
                rate_hz: p.rate_hz,
                batch_size: p.batch_size,
                signals: p.signals.iter().map(|s| s.to_string()).collect(),
            })
            .collect(),
        consumers: blueprint
            .consumers
            .iter()
            .map(|c| ConsumerInfo {
                name: c.name.clone(),
                sink_type: format!("{:?}", c.sink_type),
                broadcast: c.is_broadcast(),
                signals: c
                    .signals
                    .iter()
                    .flatten()
                    .map(|s| s.to_string())
                    .collect(),
                params: c.params.clone(),
            })
            .collect(),
    }
}

fn print_config_info(blueprint: &RouterBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Measurement Router Configuration                ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let router = &blueprint.router;
    println!("⚙️  Router");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Dispatch latency: {} ms", router.dispatch_latency_ms);
    println!(
        "   ├─ Eager wake after: {} pending",
        router.max_pending_before_eager_wake
    );
    println!("   ├─ Flush threshold: {}", router.flush_threshold);
    println!(
        "   └─ Status every: {} cycles",
        router.status_interval_cycles
    );

    println!("\n📥 Producers ({})", blueprint.producers.len());
    for (i, producer) in blueprint.producers.iter().enumerate() {
        let is_last = i == blueprint.producers.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!(
            "   {} {} ({} Hz, batch {})",
            prefix, producer.id, producer.rate_hz, producer.batch_size
        );
        print_signals(child_prefix, producer.signals.iter().map(|s| s.as_str()), args);
    }

    println!("\n📤 Consumers ({})", blueprint.consumers.len());
    for (i, consumer) in blueprint.consumers.iter().enumerate() {
        let is_last = i == blueprint.consumers.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {} ({:?})", prefix, consumer.name, consumer.sink_type);
        match &consumer.signals {
            Some(signals) => print_signals(child_prefix, signals.iter().map(|s| s.as_str()), args),
            None => println!("   {}  └─ broadcast", child_prefix),
        }
    }

    let unproduced = blueprint.unproduced_subscriptions();
    if !unproduced.is_empty() {
        println!("\n⚠️  Subscriptions without a producer");
        for (consumer, signal) in &unproduced {
            println!("   ├─ {}: {}", consumer, signal);
        }
    }

    println!();
}

fn print_signals<'a>(child_prefix: &str, signals: impl ExactSizeIterator<Item = &'a str>, args: &InfoArgs) {
    let count = signals.len();
    if args.signals && count > 0 {
        println!("   {}  └─ signals: {}", child_prefix, signals.collect::<Vec<_>>().join(", "));
    } else {
        println!("   {}  └─ {} signals", child_prefix, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ConsumerConfig, ProducerConfig, SinkType};
    use std::collections::HashMap;

    #[test]
    fn test_build_config_info() {
        let blueprint = RouterBlueprint {
            producers: vec![ProducerConfig {
                id: "pmu".to_string(),
                signals: vec!["A".into(), "B".into()],
                rate_hz: 50.0,
                batch_size: 2,
            }],
            consumers: vec![
                ConsumerConfig {
                    name: "console".to_string(),
                    sink_type: SinkType::Log,
                    signals: None,
                    params: HashMap::new(),
                },
                ConsumerConfig {
                    name: "historian".to_string(),
                    sink_type: SinkType::File,
                    signals: Some(vec!["B".into()]),
                    params: HashMap::new(),
                },
            ],
            ..Default::default()
        };

        let info = build_config_info(&blueprint);
        assert_eq!(info.producers[0].signals, vec!["A", "B"]);
        assert!(info.consumers[0].broadcast);
        assert!(info.consumers[0].signals.is_empty());
        assert_eq!(info.consumers[1].signals, vec!["B"]);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["router"]["dispatch_latency_ms"], 10);
        assert_eq!(json["consumers"][1]["sink_type"], "File");
    }
}
