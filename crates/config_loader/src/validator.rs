//! Configuration validation.
//!
//! Rules:
//! - device.name_filter non-empty
//! - reconnect delays positive, multiplier > 1, cap >= base
//! - detection rates/windows positive, cadence and search bands ordered
//! - pulse plausibility band ordered
//! - buffer and sync sizes non-zero
//! - storage.db_path non-empty

use contracts::{PipelineConfig, TelemetryError};

/// Validate a parsed pipeline configuration.
///
/// Returns the first rule violation, or Ok(()).
pub fn validate(config: &PipelineConfig) -> Result<(), TelemetryError> {
    validate_device(config)?;
    validate_reconnect(config)?;
    validate_detection(config)?;
    validate_buffer(config)?;
    validate_sync(config)?;
    validate_storage(config)?;
    Ok(())
}

fn validate_device(config: &PipelineConfig) -> Result<(), TelemetryError> {
    if config.device.name_filter.trim().is_empty() {
        return Err(TelemetryError::config_validation(
            "device.name_filter",
            "name filter cannot be empty",
        ));
    }
    if config.device.scan_timeout_ms == 0 {
        return Err(TelemetryError::config_validation(
            "device.scan_timeout_ms",
            "scan timeout must be > 0",
        ));
    }
    Ok(())
}

fn validate_reconnect(config: &PipelineConfig) -> Result<(), TelemetryError> {
    let r = &config.reconnect;
    if r.base_delay_ms == 0 {
        return Err(TelemetryError::config_validation(
            "reconnect.base_delay_ms",
            "base delay must be > 0",
        ));
    }
    if r.multiplier <= 1.0 {
        return Err(TelemetryError::config_validation(
            "reconnect.multiplier",
            format!("multiplier must be > 1.0, got {}", r.multiplier),
        ));
    }
    if r.max_delay_ms < r.base_delay_ms {
        return Err(TelemetryError::config_validation(
            "reconnect.max_delay_ms",
            format!(
                "max delay ({}) must be >= base delay ({})",
                r.max_delay_ms, r.base_delay_ms
            ),
        ));
    }
    Ok(())
}

fn validate_detection(config: &PipelineConfig) -> Result<(), TelemetryError> {
    let d = &config.detection;
    if d.sample_rate_hz <= 0.0 {
        return Err(TelemetryError::config_validation(
            "detection.sample_rate_hz",
            format!("sample rate must be > 0, got {}", d.sample_rate_hz),
        ));
    }
    if d.window_seconds <= 0.0 {
        return Err(TelemetryError::config_validation(
            "detection.window_seconds",
            "analysis window must be > 0",
        ));
    }
    if d.analysis_interval_ms == 0 {
        return Err(TelemetryError::config_validation(
            "detection.analysis_interval_ms",
            "analysis interval must be > 0",
        ));
    }
    if d.frames_to_confirm == 0 {
        return Err(TelemetryError::config_validation(
            "detection.frames_to_confirm",
            "at least one confirming frame is required",
        ));
    }
    if d.min_cadence_hz >= d.max_cadence_hz {
        return Err(TelemetryError::config_validation(
            "detection.min_cadence_hz / detection.max_cadence_hz",
            format!(
                "cadence band must be ordered, got [{}, {}]",
                d.min_cadence_hz, d.max_cadence_hz
            ),
        ));
    }
    if d.band_low_hz <= 0.0 || d.band_low_hz >= d.band_high_hz {
        return Err(TelemetryError::config_validation(
            "detection.band_low_hz / detection.band_high_hz",
            format!(
                "search band must be positive and ordered, got [{}, {}]",
                d.band_low_hz, d.band_high_hz
            ),
        ));
    }
    // The band must be resolvable: anything above Nyquist aliases.
    if d.band_high_hz > d.sample_rate_hz / 2.0 {
        return Err(TelemetryError::config_validation(
            "detection.band_high_hz",
            format!(
                "band top ({}) exceeds Nyquist for sample rate {}",
                d.band_high_hz, d.sample_rate_hz
            ),
        ));
    }
    if d.ridge.scales < 2 {
        return Err(TelemetryError::config_validation(
            "detection.ridge.scales",
            "at least two scales are required to span the band",
        ));
    }
    if d.pulse.min_bpm >= d.pulse.max_bpm {
        return Err(TelemetryError::config_validation(
            "detection.pulse.min_bpm / detection.pulse.max_bpm",
            format!(
                "plausibility band must be ordered, got [{}, {}]",
                d.pulse.min_bpm, d.pulse.max_bpm
            ),
        ));
    }
    Ok(())
}

fn validate_buffer(config: &PipelineConfig) -> Result<(), TelemetryError> {
    let b = &config.buffer;
    if b.flush_interval_ms == 0 {
        return Err(TelemetryError::config_validation(
            "buffer.flush_interval_ms",
            "flush interval must be > 0",
        ));
    }
    if b.merge_window_ms < 0 {
        return Err(TelemetryError::config_validation(
            "buffer.merge_window_ms",
            "merge window cannot be negative",
        ));
    }
    if b.channel_capacity == 0 {
        return Err(TelemetryError::config_validation(
            "buffer.channel_capacity",
            "channel capacity must be > 0",
        ));
    }
    Ok(())
}

fn validate_sync(config: &PipelineConfig) -> Result<(), TelemetryError> {
    if config.sync.batch_size == 0 {
        return Err(TelemetryError::config_validation(
            "sync.batch_size",
            "batch size must be > 0",
        ));
    }
    Ok(())
}

fn validate_storage(config: &PipelineConfig) -> Result<(), TelemetryError> {
    if config.storage.db_path.trim().is_empty() {
        return Err(TelemetryError::config_validation(
            "storage.db_path",
            "database path cannot be empty",
        ));
    }
    Ok(())
}
