//! CLI argument definitions using clap.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Wear Syncer - wearable sensor telemetry pipeline
#[derive(Parser, Debug)]
#[command(
    name = "wear-syncer",
    author,
    version,
    about = "Wearable sensor telemetry pipeline",
    long_about = "Streams wearable sensor telemetry through decode, detection and \n\
                  durable buffering, then syncs recorded sessions in atomic batches.\n\n\
                  Sessions are driven from a recorded frame file; the decode, \n\
                  detection, storage and sync stages are identical to a live link."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "WEAR_SYNCER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "WEAR_SYNCER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Install the tracing subscriber implied by the global flags.
    pub fn init_logging(&self) -> Result<()> {
        let filter = if self.quiet {
            EnvFilter::new("warn")
        } else {
            let default_level = match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            };
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
        };

        let fmt_layer = match self.log_format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            LogFormat::Pretty => fmt::layer().pretty().boxed(),
            LogFormat::Compact => fmt::layer().compact().boxed(),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

        Ok(())
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a recording session through the pipeline
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
        default_value = "pipeline.toml",
        env = "WEAR_SYNCER_CONFIG"
    )]
    pub config: PathBuf,

    /// Recorded frame file (JSON lines) that drives the session
    #[arg(short, long, env = "WEAR_SYNCER_REPLAY")]
    pub replay: Option<PathBuf>,

    /// Delay between replayed frames, milliseconds
    #[arg(long, default_value = "20", env = "WEAR_SYNCER_REPLAY_GAP_MS")]
    pub replay_gap_ms: u64,

    /// Override the device name filter from configuration
    #[arg(long, env = "WEAR_SYNCER_DEVICE")]
    pub device: Option<String>,

    /// Override the local database path from configuration
    #[arg(long, env = "WEAR_SYNCER_DB")]
    pub db: Option<PathBuf>,

    /// Session timeout in seconds (0 = run until the stream ends)
    #[arg(long, default_value = "0", env = "WEAR_SYNCER_TIMEOUT")]
    pub timeout: u64,

    /// Skip the sync stage after the session ends
    #[arg(long)]
    pub skip_sync: bool,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "WEAR_SYNCER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "pipeline.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "pipeline.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
