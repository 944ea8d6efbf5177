//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    device: DeviceInfo,
    reconnect: ReconnectInfo,
    detection: DetectionInfo,
    buffer: BufferInfo,
    sync: SyncInfo,
    storage: StorageInfo,
}

#[derive(Serialize)]
struct DeviceInfo {
    name_filter: String,
    mode: String,
    ppi_enabled: bool,
    scan_timeout_ms: u64,
    mtu: u16,
}

#[derive(Serialize)]
struct ReconnectInfo {
    base_delay_ms: u64,
    multiplier: f64,
    max_delay_ms: u64,
}

#[derive(Serialize)]
struct DetectionInfo {
    strategy: String,
    sample_rate_hz: f32,
    window_seconds: f32,
    analysis_interval_ms: u64,
    frames_to_confirm: u32,
    band_hz: (f32, f32),
}

#[derive(Serialize)]
struct BufferInfo {
    flush_interval_ms: u64,
    merge_window_ms: i64,
    merge_search_depth: usize,
}

#[derive(Serialize)]
struct SyncInfo {
    batch_size: usize,
}

#[derive(Serialize)]
struct StorageInfo {
    db_path: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn build_config_info(config: &contracts::PipelineConfig) -> ConfigInfo {
    ConfigInfo {
        device: DeviceInfo {
            name_filter: config.device.name_filter.clone(),
            mode: config.device.mode.as_str().to_string(),
            ppi_enabled: config.device.ppi_enabled,
            scan_timeout_ms: config.device.scan_timeout_ms,
            mtu: config.device.mtu,
        },
        reconnect: ReconnectInfo {
            base_delay_ms: config.reconnect.base_delay_ms,
            multiplier: config.reconnect.multiplier,
            max_delay_ms: config.reconnect.max_delay_ms,
        },
        detection: DetectionInfo {
            strategy: format!("{:?}", config.detection.strategy),
            sample_rate_hz: config.detection.sample_rate_hz,
            window_seconds: config.detection.window_seconds,
            analysis_interval_ms: config.detection.analysis_interval_ms,
            frames_to_confirm: config.detection.frames_to_confirm,
            band_hz: (config.detection.band_low_hz, config.detection.band_high_hz),
        },
        buffer: BufferInfo {
            flush_interval_ms: config.buffer.flush_interval_ms,
            merge_window_ms: config.buffer.merge_window_ms,
            merge_search_depth: config.buffer.merge_search_depth,
        },
        sync: SyncInfo {
            batch_size: config.sync.batch_size,
        },
        storage: StorageInfo {
            db_path: config.storage.db_path.clone(),
        },
    }
}

fn print_config_info(config: &contracts::PipelineConfig) {
    println!("=== Wear Syncer Configuration ===\n");

    println!("Device");
    println!("   ├─ Filter: {}", config.device.name_filter);
    println!("   ├─ Mode: {}", config.device.mode.as_str());
    println!("   ├─ Beat intervals: {}", config.device.ppi_enabled);
    println!("   ├─ Scan timeout: {} ms", config.device.scan_timeout_ms);
    println!("   └─ MTU: {}", config.device.mtu);

    println!("\nReconnect");
    println!("   ├─ Base delay: {} ms", config.reconnect.base_delay_ms);
    println!("   ├─ Multiplier: {}", config.reconnect.multiplier);
    println!("   └─ Cap: {} ms", config.reconnect.max_delay_ms);

    println!("\nDetection");
    println!("   ├─ Strategy: {:?}", config.detection.strategy);
    println!(
        "   ├─ Window: {:.1}s @ {:.0} Hz",
        config.detection.window_seconds, config.detection.sample_rate_hz
    );
    println!(
        "   ├─ Analysis every {} ms, {} frames to confirm",
        config.detection.analysis_interval_ms, config.detection.frames_to_confirm
    );
    println!(
        "   └─ Band: {:.1}-{:.1} Hz",
        config.detection.band_low_hz, config.detection.band_high_hz
    );

    println!("\nBuffer");
    println!("   ├─ Flush every {} ms", config.buffer.flush_interval_ms);
    println!(
        "   ├─ Merge window: {} ms (depth {})",
        config.buffer.merge_window_ms, config.buffer.merge_search_depth
    );
    println!("   └─ Channel capacity: {}", config.buffer.channel_capacity);

    println!("\nSync");
    println!("   └─ Batch size: {}", config.sync.batch_size);

    println!("\nStorage");
    println!("   └─ Database: {}", config.storage.db_path);

    println!();
}
