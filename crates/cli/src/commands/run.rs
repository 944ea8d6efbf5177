//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineOptions};

/// Execute the `run` command
pub async fn run_session(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(ref device) = args.device {
        info!(device = %device, "Overriding device filter from CLI");
        config.device.name_filter = device.clone();
    }
    if let Some(ref db) = args.db {
        info!(db = %db.display(), "Overriding database path from CLI");
        config.storage.db_path = db.display().to_string();
    }

    info!(
        device = %config.device.name_filter,
        mode = config.device.mode.as_str(),
        strategy = ?config.detection.strategy,
        db = %config.storage.db_path,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let options = PipelineOptions {
        config,
        replay_path: args.replay.clone(),
        replay_gap: Duration::from_millis(args.replay_gap_ms),
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        skip_sync: args.skip_sync,
    };

    let pipeline = Pipeline::new(options);
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting session...");

    tokio::select! {
        result = pipeline.run() => {
            match result {
                Ok(stats) => {
                    info!(
                        duration_secs = stats.duration.as_secs_f64(),
                        rows_persisted = stats.writer.rows_flushed,
                        steps = stats.detection.step_count,
                        rows_synced = ?stats.rows_synced,
                        "Session completed"
                    );
                    stats.print_summary();
                }
                Err(e) => {
                    return Err(e).context("Session failed");
                }
            }
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping session...");
        }
    }

    info!("Wear Syncer finished");
    Ok(())
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &contracts::PipelineConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Device:");
    println!("  Filter: {}", config.device.name_filter);
    println!("  Mode: {}", config.device.mode.as_str());
    println!("  Beat intervals: {}", config.device.ppi_enabled);
    println!("\nDetection:");
    println!("  Strategy: {:?}", config.detection.strategy);
    println!(
        "  Window: {:.1}s @ {:.0} Hz",
        config.detection.window_seconds, config.detection.sample_rate_hz
    );
    println!("\nStorage:");
    println!("  Database: {}", config.storage.db_path);
    println!(
        "  Flush every {} ms, merge window {} ms",
        config.buffer.flush_interval_ms, config.buffer.merge_window_ms
    );
    println!("\nSync:");
    println!("  Batch size: {}", config.sync.batch_size);
    println!();
}
