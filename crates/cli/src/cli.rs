//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Measurement Router - high-fan-out routing of measurement streams
#[derive(Parser, Debug)]
#[command(
    name = "measurement-router",
    author,
    version,
    about = "High-fan-out measurement routing table",
    long_about = "Routes time-series measurements from producers to subscribed consumers.\n\n\
                  Loads a routing configuration, attaches mock producers and the configured \n\
                  sinks, and dispatches measurements on a fixed latency cycle."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "MEASUREMENT_ROUTER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "MEASUREMENT_ROUTER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the routing table
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "router.toml",
        env = "MEASUREMENT_ROUTER_CONFIG"
    )]
    pub config: PathBuf,

    /// Run duration in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "MEASUREMENT_ROUTER_DURATION")]
    pub duration: u64,

    /// Override dispatch latency (milliseconds) from configuration
    #[arg(long, env = "MEASUREMENT_ROUTER_LATENCY_MS")]
    pub latency_ms: Option<u64>,

    /// Interval between statistics samples in milliseconds
    #[arg(long, default_value = "1000", env = "MEASUREMENT_ROUTER_STATS_INTERVAL_MS")]
    pub stats_interval_ms: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "MEASUREMENT_ROUTER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "router.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "router.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the signal list of every producer and consumer
    #[arg(long)]
    pub signals: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["measurement-router", "run"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("router.toml"));
                assert_eq!(args.duration, 0);
                assert_eq!(args.latency_ms, None);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["measurement-router", "-q", "-v", "validate"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::try_parse_from([
            "measurement-router",
            "--log-format",
            "json",
            "run",
            "-c",
            "custom.json",
            "--duration",
            "5",
            "--latency-ms",
            "50",
        ])
        .unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("custom.json"));
                assert_eq!(args.duration, 5);
                assert_eq!(args.latency_ms, Some(50));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
