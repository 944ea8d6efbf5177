//! Configuration parsing.
//!
//! TOML is the primary format; JSON is accepted for machine-generated
//! configs.

use contracts::{PipelineConfig, TelemetryError};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Infer the format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<PipelineConfig, TelemetryError> {
    toml::from_str(content)
        .map_err(|e| TelemetryError::config_parse(format!("TOML parse error: {e}")))
}

pub fn parse_json(content: &str) -> Result<PipelineConfig, TelemetryError> {
    serde_json::from_str(content)
        .map_err(|e| TelemetryError::config_parse(format!("JSON parse error: {e}")))
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<PipelineConfig, TelemetryError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}
