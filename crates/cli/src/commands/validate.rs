//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::RouterBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    dispatch_latency_ms: u64,
    producer_count: usize,
    consumer_count: usize,
    signal_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    dispatch_latency_ms: blueprint.router.dispatch_latency_ms,
                    producer_count: blueprint.producers.len(),
                    consumer_count: blueprint.consumers.len(),
                    signal_count: blueprint.produced_signals().len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &RouterBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.producers.is_empty() {
        warnings.push("No producers configured - only injected measurements will be routed".to_string());
    }

    if blueprint.consumers.is_empty() {
        warnings.push("No consumers configured - measurements will be dropped".to_string());
    }

    for consumer in &blueprint.consumers {
        if matches!(consumer.signals.as_deref(), Some([])) {
            warnings.push(format!(
                "Consumer '{}' subscribes to an empty signal list and will receive nothing",
                consumer.name
            ));
        }
    }

    for (consumer, signal) in blueprint.unproduced_subscriptions() {
        warnings.push(format!(
            "Consumer '{}' subscribes to '{}', which no producer emits",
            consumer, signal
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Dispatch latency: {} ms", summary.dispatch_latency_ms);
            println!("  Producers: {}", summary.producer_count);
            println!("  Consumers: {}", summary.consumer_count);
            println!("  Signals: {}", summary.signal_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const CONFIG: &str = r#"
[[producers]]
id = "pmu"
signals = ["A"]

[[consumers]]
name = "historian"
sink_type = "log"
signals = ["A", "Z"]
"#;

    fn args(config: PathBuf) -> ValidateArgs {
        ValidateArgs {
            config,
            json: true,
        }
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(&path, CONFIG).unwrap();

        let result = validate_config(&args(path));
        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("'Z'"));
        assert_eq!(result.summary.unwrap().signal_count, 1);
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(&args(PathBuf::from("/nonexistent/router.toml")));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(&path, "[router]\ndispatch_latency_ms = 900\n").unwrap();

        let result = validate_config(&args(path));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("dispatch_latency_ms"));
    }

    #[test]
    fn test_empty_config_warnings() {
        let warnings = collect_warnings(&RouterBlueprint::default());
        assert_eq!(warnings.len(), 2);
    }
}
