//! RowStore / RemoteStore traits - persistence and upload interfaces
//!
//! The durable buffer flushes into a `RowStore`; the sync engine pages
//! unsynced rows out of it and uploads them to a `RemoteStore`.

use std::sync::Arc;

use crate::{BufferedReading, SessionMeta, StoredReading, TelemetryError};

/// Local persistent row store.
///
/// Implementations must make `insert_batch` transactional: either every
/// reading in the batch is persisted or none is, because the durable buffer
/// clears itself optimistically and requeues the whole batch on failure.
pub trait RowStore: Send + Sync {
    /// Insert a batch of readings in one transaction.
    fn insert_batch(&self, readings: &[BufferedReading]) -> Result<(), TelemetryError>;

    /// Count rows not yet uploaded.
    fn unsynced_count(&self) -> Result<u64, TelemetryError>;

    /// Earliest and latest capture timestamps over the unsynced set.
    fn unsynced_time_range(&self) -> Result<Option<(i64, i64)>, TelemetryError>;

    /// Fetch the oldest unsynced rows, up to `limit`.
    ///
    /// Marking rows synced advances the page; callers never pass an offset.
    fn fetch_unsynced(&self, limit: usize) -> Result<Vec<StoredReading>, TelemetryError>;

    /// Set the synced flag on the given row ids.
    fn mark_synced(&self, ids: &[i64]) -> Result<(), TelemetryError>;

    /// Clear the synced flag on the given row ids (attempt rollback).
    fn reset_synced(&self, ids: &[i64]) -> Result<(), TelemetryError>;
}

/// Remote store trait
///
/// Session records own uploaded readings; deleting a session removes its
/// readings as well, which is what the whole-attempt rollback relies on.
#[trait_variant::make(RemoteStore: Send)]
pub trait LocalRemoteStore: Sync {
    /// Create a session record; returns the remote session id.
    async fn create_session(&self, meta: &SessionMeta) -> Result<String, TelemetryError>;

    /// Upload one batch of readings tagged with the session id.
    async fn upload_readings(
        &self,
        session_id: &str,
        rows: &[StoredReading],
    ) -> Result<(), TelemetryError>;

    /// Delete a session and every reading uploaded under it.
    async fn delete_session(&self, session_id: &str) -> Result<(), TelemetryError>;
}

/// Progress phases emitted during a sync attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncProgress {
    /// Counting the unsynced set and inferring session metadata
    Preparing { total_rows: u64 },

    /// Remote session record created (lazily, at the first batch)
    SessionCreated { session_id: String },

    /// Batch upload progress
    Uploading { uploaded: u64, total: u64 },
}

/// Sync progress callback type
pub type SyncProgressCallback = Arc<dyn Fn(SyncProgress) + Send + Sync>;

/// Outcome of a completed sync attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote session id, if any rows existed to upload
    pub session_id: Option<String>,

    /// Rows uploaded and marked synced
    pub rows_synced: u64,
}
