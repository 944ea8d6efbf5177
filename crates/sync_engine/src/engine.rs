//! Paged upload with whole-attempt rollback.
//!
//! An attempt pages unsynced rows out of the local store in fixed batches.
//! The remote session is created lazily, right before the first batch goes
//! up, so an immediately failing attempt leaves no stray empty session. Any
//! failure rolls back the entire attempt: delete the remote session and its
//! rows, then clear the synced flag on exactly the rows marked during this
//! attempt. Only a failure of that local clear is unrecoverable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use contracts::{
    RemoteStore, RowStore, SessionMeta, SessionMode, SyncConfig, SyncProgress,
    SyncProgressCallback, SyncReport, TelemetryError,
};

/// Session identity carried into the remote session record
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub device_name: String,
    pub mode: SessionMode,
    pub ppi_enabled: bool,
}

pub struct SyncEngine {
    batch_size: usize,
    in_flight: AtomicBool,
    recording: Arc<AtomicBool>,
}

/// Clears the single-flight flag on every exit path.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    pub fn new(config: &SyncConfig, recording: Arc<AtomicBool>) -> Self {
        Self {
            batch_size: config.batch_size,
            in_flight: AtomicBool::new(false),
            recording,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run one sync attempt. Single-flight; requires recording stopped.
    #[instrument(skip_all, fields(device = %info.device_name))]
    pub async fn sync<R: RemoteStore>(
        &self,
        store: &dyn RowStore,
        remote: &R,
        info: &SessionInfo,
        on_progress: Option<SyncProgressCallback>,
    ) -> Result<SyncReport, TelemetryError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TelemetryError::SyncInFlight);
        }
        let _guard = FlightGuard(&self.in_flight);

        if self.recording.load(Ordering::SeqCst) {
            return Err(TelemetryError::RecordingActive);
        }

        let total = store.unsynced_count()?;
        emit(&on_progress, SyncProgress::Preparing { total_rows: total });
        if total == 0 {
            info!("nothing to sync");
            return Ok(SyncReport {
                session_id: None,
                rows_synced: 0,
            });
        }

        // Session metadata is inferred from the full unsynced set up front,
        // before any batch moves.
        let (start_time_ms, end_time_ms) = store
            .unsynced_time_range()?
            .unwrap_or((0, 0));
        let meta = SessionMeta {
            device_name: info.device_name.clone(),
            mode: info.mode,
            ppi_enabled: info.ppi_enabled,
            start_time_ms,
            end_time_ms,
            total_records: total,
        };

        // Per-attempt state, tracked in memory only: the ids marked during
        // this attempt, never the global synced set.
        let mut session_id: Option<String> = None;
        let mut attempt_ids: Vec<i64> = Vec::new();
        let mut uploaded: u64 = 0;

        loop {
            let page = match store.fetch_unsynced(self.batch_size) {
                Ok(page) => page,
                Err(e) => {
                    return Err(self
                        .rollback(store, remote, session_id, &attempt_ids, e)
                        .await);
                }
            };
            if page.is_empty() {
                break;
            }

            if session_id.is_none() {
                match remote.create_session(&meta).await {
                    Ok(id) => {
                        info!(session_id = %id, total_rows = total, "remote session created");
                        emit(
                            &on_progress,
                            SyncProgress::SessionCreated {
                                session_id: id.clone(),
                            },
                        );
                        session_id = Some(id);
                    }
                    Err(e) => {
                        return Err(self
                            .rollback(store, remote, session_id, &attempt_ids, e)
                            .await);
                    }
                }
            }
            // Invariant: session_id is set before any upload.
            let Some(sid) = session_id.as_deref() else {
                break;
            };

            if let Err(e) = remote.upload_readings(sid, &page).await {
                return Err(self
                    .rollback(store, remote, session_id, &attempt_ids, e)
                    .await);
            }

            let ids: Vec<i64> = page.iter().map(|r| r.id).collect();
            if let Err(e) = store.mark_synced(&ids) {
                return Err(self
                    .rollback(store, remote, session_id, &attempt_ids, e)
                    .await);
            }

            uploaded += ids.len() as u64;
            attempt_ids.extend(ids);
            emit(
                &on_progress,
                SyncProgress::Uploading {
                    uploaded,
                    total,
                },
            );
        }

        metrics::counter!("sync_rows_uploaded_total").increment(uploaded);
        info!(rows = uploaded, session_id = ?session_id, "sync completed");
        Ok(SyncReport {
            session_id,
            rows_synced: uploaded,
        })
    }

    /// Tear the attempt down: remote session first, then the local flags.
    async fn rollback<R: RemoteStore>(
        &self,
        store: &dyn RowStore,
        remote: &R,
        session_id: Option<String>,
        attempt_ids: &[i64],
        cause: TelemetryError,
    ) -> TelemetryError {
        warn!(error = %cause, rows_marked = attempt_ids.len(), "sync failed, rolling back attempt");
        metrics::counter!("sync_rollbacks_total").increment(1);

        if let Some(sid) = session_id {
            if let Err(e) = remote.delete_session(&sid).await {
                // The orphaned remote session is an inconsistency on the
                // remote side only; local state still rolls back below.
                error!(session_id = %sid, error = %e, "remote session delete failed");
            }
        }

        if !attempt_ids.is_empty() {
            if let Err(e) = store.reset_synced(attempt_ids) {
                error!(error = %e, "local synced-flag rollback failed");
                return TelemetryError::SyncUnrecoverable {
                    message: format!("{e} (after: {cause})"),
                };
            }
        }

        TelemetryError::SyncRolledBack {
            message: cause.to_string(),
        }
    }
}

fn emit(callback: &Option<SyncProgressCallback>, progress: SyncProgress) {
    if let Some(cb) = callback {
        cb(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockRemoteStore;
    use contracts::BufferedReading;
    use std::sync::Mutex;
    use storage::MemoryRowStore;

    fn info() -> SessionInfo {
        SessionInfo {
            device_name: "Sense A".to_string(),
            mode: SessionMode::Raw,
            ppi_enabled: false,
        }
    }

    fn engine(batch_size: usize) -> SyncEngine {
        SyncEngine::new(
            &SyncConfig { batch_size },
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn seed(store: &MemoryRowStore, rows: usize) {
        let batch: Vec<BufferedReading> =
            (0..rows as i64).map(|i| BufferedReading::at(1_000 + i)).collect();
        store.insert_batch(&batch).unwrap();
    }

    #[tokio::test]
    async fn test_paged_sync_with_progress() {
        let store = MemoryRowStore::new();
        seed(&store, 12);
        let remote = MockRemoteStore::new();
        let engine = engine(5);

        let progress: Arc<Mutex<Vec<SyncProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = progress.clone();
        let report = engine
            .sync(
                &store,
                &remote,
                &info(),
                Some(Arc::new(move |p| sink.lock().unwrap().push(p))),
            )
            .await
            .unwrap();

        assert_eq!(report.rows_synced, 12);
        let sid = report.session_id.unwrap();
        assert_eq!(remote.row_count(&sid), 12);
        assert_eq!(store.unsynced_count().unwrap(), 0);

        let seen = progress.lock().unwrap();
        assert_eq!(seen[0], SyncProgress::Preparing { total_rows: 12 });
        assert!(matches!(seen[1], SyncProgress::SessionCreated { .. }));
        assert_eq!(
            seen[2],
            SyncProgress::Uploading {
                uploaded: 5,
                total: 12
            }
        );
        assert_eq!(
            *seen.last().unwrap(),
            SyncProgress::Uploading {
                uploaded: 12,
                total: 12
            }
        );

        // Session metadata was inferred from the full unsynced set.
        let meta = remote.session_meta(&sid).unwrap();
        assert_eq!(meta.start_time_ms, 1_000);
        assert_eq!(meta.end_time_ms, 1_011);
        assert_eq!(meta.total_records, 12);
    }

    #[tokio::test]
    async fn test_empty_store_creates_no_session() {
        let store = MemoryRowStore::new();
        let remote = MockRemoteStore::new();
        let report = engine(5).sync(&store, &remote, &info(), None).await.unwrap();
        assert_eq!(report.session_id, None);
        assert_eq!(report.rows_synced, 0);
        assert_eq!(remote.session_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_rolls_back_everything() {
        let store = MemoryRowStore::new();
        seed(&store, 12);
        let remote = MockRemoteStore::new();
        // Batches 1 and 2 succeed, batch 3 fails.
        remote.fail_upload_at(3);

        let err = engine(5)
            .sync(&store, &remote, &info(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::SyncRolledBack { .. }));

        // Atomicity: zero synced rows locally, zero remote rows or sessions.
        assert_eq!(store.unsynced_count().unwrap(), 12);
        assert_eq!(store.synced_count(), 0);
        assert_eq!(remote.session_count(), 0);
        assert_eq!(remote.total_rows(), 0);
    }

    #[tokio::test]
    async fn test_session_create_failure_leaves_no_trace() {
        let store = MemoryRowStore::new();
        seed(&store, 3);
        let remote = MockRemoteStore::new();
        remote.fail_next_creates(1);

        let err = engine(5)
            .sync(&store, &remote, &info(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::SyncRolledBack { .. }));
        assert_eq!(remote.session_count(), 0);
        assert_eq!(store.unsynced_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_mark_failure_rolls_back() {
        let store = MemoryRowStore::new();
        seed(&store, 8);
        let remote = MockRemoteStore::new();
        store.fail_next_marks(1);

        let err = engine(4).sync(&store, &remote, &info(), None).await.unwrap_err();
        assert!(matches!(err, TelemetryError::SyncRolledBack { .. }));
        // The batch went up before the mark failed; rollback removed it.
        assert_eq!(store.synced_count(), 0);
        assert_eq!(remote.session_count(), 0);
        assert_eq!(remote.total_rows(), 0);
    }

    #[tokio::test]
    async fn test_local_rollback_failure_is_unrecoverable() {
        let store = MemoryRowStore::new();
        seed(&store, 10);
        let remote = MockRemoteStore::new();
        remote.fail_upload_at(2);
        store.fail_next_resets(1);

        let err = engine(5)
            .sync(&store, &remote, &info(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::SyncUnrecoverable { .. }));
    }

    #[tokio::test]
    async fn test_recording_must_be_stopped() {
        let store = MemoryRowStore::new();
        seed(&store, 1);
        let remote = MockRemoteStore::new();
        let recording = Arc::new(AtomicBool::new(true));
        let engine = SyncEngine::new(&SyncConfig::default(), recording.clone());

        let err = engine.sync(&store, &remote, &info(), None).await.unwrap_err();
        assert!(matches!(err, TelemetryError::RecordingActive));

        recording.store(false, Ordering::SeqCst);
        assert!(engine.sync(&store, &remote, &info(), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_single_flight_flag_clears_after_completion() {
        let store = MemoryRowStore::new();
        seed(&store, 2);
        let remote = MockRemoteStore::new();
        let engine = engine(5);

        assert!(!engine.is_in_flight());
        engine.sync(&store, &remote, &info(), None).await.unwrap();
        assert!(!engine.is_in_flight());
        // A second run finds nothing and still succeeds.
        let report = engine.sync(&store, &remote, &info(), None).await.unwrap();
        assert_eq!(report.rows_synced, 0);
    }
}
