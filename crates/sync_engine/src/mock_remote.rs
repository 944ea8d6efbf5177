//! In-memory remote store with failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use contracts::{RemoteStore, SessionMeta, StoredReading, TelemetryError};

#[derive(Debug, Default)]
pub struct MockRemoteStore {
    sessions: Mutex<HashMap<String, SessionMeta>>,
    rows: Mutex<HashMap<String, Vec<StoredReading>>>,
    next_session: AtomicU64,
    upload_calls: AtomicU32,
    fail_next_creates: AtomicU32,
    /// Fail the nth upload call of the attempt (1-based); 0 disables.
    fail_upload_at: AtomicU32,
    fail_next_deletes: AtomicU32,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_creates(&self, n: u32) {
        self.fail_next_creates.store(n, Ordering::SeqCst);
    }

    pub fn fail_upload_at(&self, call: u32) {
        self.fail_upload_at.store(call, Ordering::SeqCst);
    }

    pub fn fail_next_deletes(&self, n: u32) {
        self.fail_next_deletes.store(n, Ordering::SeqCst);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn session_meta(&self, session_id: &str) -> Option<SessionMeta> {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(session_id).cloned())
    }

    pub fn row_count(&self, session_id: &str) -> usize {
        self.rows
            .lock()
            .map(|r| r.get(session_id).map(|v| v.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_rows(&self) -> usize {
        self.rows
            .lock()
            .map(|r| r.values().map(|v| v.len()).sum())
            .unwrap_or(0)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl RemoteStore for MockRemoteStore {
    async fn create_session(&self, meta: &SessionMeta) -> Result<String, TelemetryError> {
        if Self::take_failure(&self.fail_next_creates) {
            return Err(TelemetryError::remote_session("injected create failure"));
        }
        let id = format!(
            "session-{}",
            self.next_session.fetch_add(1, Ordering::SeqCst) + 1
        );
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(id.clone(), meta.clone());
        }
        Ok(id)
    }

    async fn upload_readings(
        &self,
        session_id: &str,
        rows: &[StoredReading],
    ) -> Result<(), TelemetryError> {
        let call = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_at = self.fail_upload_at.load(Ordering::SeqCst);
        if fail_at != 0 && call == fail_at {
            return Err(TelemetryError::remote_upload("injected upload failure"));
        }
        if !self
            .sessions
            .lock()
            .map(|s| s.contains_key(session_id))
            .unwrap_or(false)
        {
            return Err(TelemetryError::remote_upload(format!(
                "unknown session '{session_id}'"
            )));
        }
        if let Ok(mut all) = self.rows.lock() {
            all.entry(session_id.to_string())
                .or_default()
                .extend_from_slice(rows);
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), TelemetryError> {
        if Self::take_failure(&self.fail_next_deletes) {
            return Err(TelemetryError::remote_session("injected delete failure"));
        }
        // Session records own their readings; deleting one removes both.
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(session_id);
        }
        if let Ok(mut rows) = self.rows.lock() {
            rows.remove(session_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SessionMode;

    fn meta() -> SessionMeta {
        SessionMeta {
            device_name: "Sense".to_string(),
            mode: SessionMode::Raw,
            ppi_enabled: false,
            start_time_ms: 0,
            end_time_ms: 10,
            total_records: 1,
        }
    }

    #[tokio::test]
    async fn test_delete_removes_session_and_rows() {
        let remote = MockRemoteStore::new();
        let sid = remote.create_session(&meta()).await.unwrap();
        remote.upload_readings(&sid, &[]).await.unwrap();
        assert_eq!(remote.session_count(), 1);

        remote.delete_session(&sid).await.unwrap();
        assert_eq!(remote.session_count(), 0);
        assert_eq!(remote.total_rows(), 0);
    }

    #[tokio::test]
    async fn test_upload_to_unknown_session_rejected() {
        let remote = MockRemoteStore::new();
        assert!(remote.upload_readings("nope", &[]).await.is_err());
    }
}
