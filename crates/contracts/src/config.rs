//! Pipeline configuration contracts shared across crates.

use serde::{Deserialize, Serialize};

use crate::SessionMode;

/// Complete pipeline configuration blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Target device and session mode
    pub device: DeviceConfig,

    /// Reconnect backoff policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Detection engine tuning
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Durable buffer tuning
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Sync engine tuning
    #[serde(default)]
    pub sync: SyncConfig,

    /// Local row store location
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Target device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Substring matched against advertised peripheral names during scan
    pub name_filter: String,

    /// Recording mode
    #[serde(default)]
    pub mode: SessionMode,

    /// Enable the derived-interval (beat-to-beat) channel in standard mode
    #[serde(default)]
    pub ppi_enabled: bool,

    /// Scan auto-stop timeout
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    /// MTU requested after connecting (best-effort)
    #[serde(default = "default_mtu")]
    pub mtu: u16,

    /// Settling delay between stream-stop control commands. The peripheral
    /// firmware requires settling time rather than acknowledging commands.
    #[serde(default = "default_stop_settle_ms")]
    pub stop_settle_ms: u64,
}

fn default_scan_timeout_ms() -> u64 {
    10_000
}

fn default_mtu() -> u16 {
    232
}

fn default_stop_settle_ms() -> u64 {
    200
}

/// Reconnect backoff policy configuration.
///
/// delay(n) = min(base_delay_ms * multiplier^(n-1), max_delay_ms) for n >= 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// First-attempt delay, milliseconds
    pub base_delay_ms: u64,
    /// Exponential growth factor
    pub multiplier: f64,
    /// Delay cap, milliseconds
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            multiplier: 1.5,
            max_delay_ms: 30_000,
        }
    }
}

/// Gait analysis strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GaitStrategy {
    /// Windowed discrete transform, adaptive magnitude threshold
    #[default]
    SpectralPeak,
    /// Morlet kernel bank, fixed-threshold ridge search
    WaveletRidge,
}

/// Detection engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Motion channel sample rate, Hz
    pub sample_rate_hz: f32,

    /// Analysis window length, seconds (buffer capacity rounds up to the
    /// next power of two of rate * window)
    pub window_seconds: f32,

    /// Analysis timer cadence, milliseconds
    pub analysis_interval_ms: u64,

    /// Active gait strategy
    #[serde(default)]
    pub strategy: GaitStrategy,

    /// Consecutive agreeing windows before the confirmed flag flips
    pub frames_to_confirm: u32,

    /// Cadence clamp band, Hz
    pub min_cadence_hz: f32,
    pub max_cadence_hz: f32,

    /// Search band for both strategies, Hz
    pub band_low_hz: f32,
    pub band_high_hz: f32,

    /// Spectral-peak strategy tuning
    #[serde(default)]
    pub spectral: SpectralConfig,

    /// Wavelet-ridge strategy tuning
    #[serde(default)]
    pub ridge: RidgeConfig,

    /// Optical heart-rate estimator tuning
    #[serde(default)]
    pub pulse: PulseConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 52.0,
            window_seconds: 4.0,
            analysis_interval_ms: 2_000,
            strategy: GaitStrategy::default(),
            frames_to_confirm: 3,
            min_cadence_hz: 0.8,
            max_cadence_hz: 3.5,
            band_low_hz: 0.5,
            band_high_hz: 4.0,
            spectral: SpectralConfig::default(),
            ridge: RidgeConfig::default(),
            pulse: PulseConfig::default(),
        }
    }
}

/// Spectral-peak strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralConfig {
    /// Trailing moving-average window over non-walking magnitudes
    pub adaptive_window: usize,
    /// Multiplier applied to the moving average
    pub adaptive_factor: f32,
    /// Floor clamp on the adaptive threshold
    pub threshold_floor: f32,
    /// Minimum history before the adaptive threshold takes over
    pub bootstrap_min: usize,
    /// Fixed threshold used until the history bootstraps
    pub fallback_threshold: f32,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            adaptive_window: 15,
            adaptive_factor: 1.15,
            threshold_floor: 0.02,
            bootstrap_min: 5,
            fallback_threshold: 0.025,
        }
    }
}

/// Wavelet-ridge strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeConfig {
    /// Morlet center-frequency parameter (omega_0)
    pub omega0: f32,
    /// Number of scales spanning the search band
    pub scales: usize,
    /// Kernel truncation: at most this many taps, applied causally
    pub max_taps: usize,
    /// Fixed ridge-magnitude threshold
    pub threshold: f32,
}

impl Default for RidgeConfig {
    fn default() -> Self {
        Self {
            omega0: 6.0,
            scales: 25,
            max_taps: 64,
            threshold: 0.5,
        }
    }
}

/// Optical heart-rate estimator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Moving-average half-width for the smoothing pass
    pub smooth_half_width: usize,
    /// Peak acceptance fraction of the smoothed maximum
    pub peak_fraction: f32,
    /// Spectral estimate length, samples
    pub spectral_len: usize,
    /// Minimum buffered samples before peak detection runs
    pub min_peak_samples: usize,
    /// Inter-peak gaps at or above this are discarded, milliseconds
    pub max_peak_gap_ms: i64,
    /// Plausibility band, beats per minute
    pub min_bpm: u16,
    pub max_bpm: u16,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            smooth_half_width: 5,
            peak_fraction: 0.6,
            spectral_len: 512,
            min_peak_samples: 100,
            max_peak_gap_ms: 2_000,
            min_bpm: 30,
            max_bpm: 200,
        }
    }
}

/// Durable buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Flush timer cadence while recording, milliseconds
    pub flush_interval_ms: u64,
    /// Cross-channel merge window, milliseconds
    pub merge_window_ms: i64,
    /// Bounded backward search depth for merge candidates
    pub merge_search_depth: usize,
    /// Sample channel capacity between link and storage/detection tasks
    pub channel_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 1_000,
            merge_window_ms: 50,
            merge_search_depth: 10,
            channel_capacity: 256,
        }
    }
}

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Rows per upload batch
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { batch_size: 500 }
    }
}

/// Local row store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; ":memory:" keeps the store in memory
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "telemetry.db".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy() {
        let r = ReconnectConfig::default();
        assert_eq!(r.base_delay_ms, 2_000);
        assert_eq!(r.max_delay_ms, 30_000);

        let d = DetectionConfig::default();
        assert_eq!(d.frames_to_confirm, 3);
        assert_eq!(d.spectral.adaptive_window, 15);
        assert_eq!(d.pulse.spectral_len, 512);
    }

    #[test]
    fn test_toml_partial_sections_fill_defaults() {
        let json = r#"{ "device": { "name_filter": "Sense" } }"#;
        let cfg: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.device.scan_timeout_ms, 10_000);
        assert_eq!(cfg.buffer.flush_interval_ms, 1_000);
        assert_eq!(cfg.sync.batch_size, 500);
    }
}
