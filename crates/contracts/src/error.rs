//! Layered error definitions
//!
//! Categorized by source: config / link / decode / storage / sync

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum TelemetryError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Link Errors =====
    /// Scan failed or produced no matching peripheral
    #[error("scan error: {message}")]
    Scan { message: String },

    /// Link establishment error
    #[error("link connection error for '{peripheral}': {message}")]
    LinkConnection { peripheral: String, message: String },

    /// Control command / subscription error (transient, not retried)
    #[error("link command '{command}' failed: {message}")]
    LinkCommand { command: String, message: String },

    /// Operation requires an established link
    #[error("no peripheral connected")]
    NotConnected,

    // ===== Decode Errors =====
    /// Payload could not be decoded (dropped at the decoder boundary)
    #[error("decode error on channel '{channel}': {message}")]
    Decode { channel: String, message: String },

    // ===== Storage Errors =====
    /// Local row store write error
    #[error("storage write error: {message}")]
    StorageWrite { message: String },

    /// Local row store query error
    #[error("storage query error: {message}")]
    StorageQuery { message: String },

    // ===== Sync Errors =====
    /// Remote session create/delete error
    #[error("remote session error: {message}")]
    RemoteSession { message: String },

    /// Remote batch upload error
    #[error("remote upload error: {message}")]
    RemoteUpload { message: String },

    /// A sync attempt is already running
    #[error("sync already in flight")]
    SyncInFlight,

    /// Sync requires recording to be stopped first
    #[error("recording is active; stop recording before syncing")]
    RecordingActive,

    /// The attempt was rolled back after a partial failure
    #[error("sync rolled back: {message}")]
    SyncRolledBack { message: String },

    /// Rollback of local synced flags failed; manual restart required
    #[error("unrecoverable sync state, local flag rollback failed: {message}")]
    SyncUnrecoverable { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl TelemetryError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create scan error
    pub fn scan(message: impl Into<String>) -> Self {
        Self::Scan {
            message: message.into(),
        }
    }

    /// Create link connection error
    pub fn link_connection(peripheral: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LinkConnection {
            peripheral: peripheral.into(),
            message: message.into(),
        }
    }

    /// Create link command error
    pub fn link_command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LinkCommand {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create decode error
    pub fn decode(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Create storage write error
    pub fn storage_write(message: impl Into<String>) -> Self {
        Self::StorageWrite {
            message: message.into(),
        }
    }

    /// Create storage query error
    pub fn storage_query(message: impl Into<String>) -> Self {
        Self::StorageQuery {
            message: message.into(),
        }
    }

    /// Create remote session error
    pub fn remote_session(message: impl Into<String>) -> Self {
        Self::RemoteSession {
            message: message.into(),
        }
    }

    /// Create remote upload error
    pub fn remote_upload(message: impl Into<String>) -> Self {
        Self::RemoteUpload {
            message: message.into(),
        }
    }
}
