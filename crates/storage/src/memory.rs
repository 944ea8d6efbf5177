//! In-memory row store with failure injection, for tests and dry runs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use contracts::{BufferedReading, RowStore, StoredReading, TelemetryError};

#[derive(Debug, Default)]
pub struct MemoryRowStore {
    rows: Mutex<Vec<StoredReading>>,
    next_id: Mutex<i64>,
    fail_next_inserts: AtomicU32,
    fail_next_marks: AtomicU32,
    fail_next_resets: AtomicU32,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_inserts(&self, n: u32) {
        self.fail_next_inserts.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_marks(&self, n: u32) {
        self.fail_next_marks.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_resets(&self, n: u32) {
        self.fail_next_resets.store(n, Ordering::SeqCst);
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn synced_count(&self) -> usize {
        self.rows
            .lock()
            .map(|r| r.iter().filter(|row| row.synced).count())
            .unwrap_or(0)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn lock_rows(&self) -> Result<std::sync::MutexGuard<'_, Vec<StoredReading>>, TelemetryError> {
        self.rows
            .lock()
            .map_err(|_| TelemetryError::storage_query("row store lock poisoned"))
    }
}

impl RowStore for MemoryRowStore {
    fn insert_batch(&self, readings: &[BufferedReading]) -> Result<(), TelemetryError> {
        if Self::take_failure(&self.fail_next_inserts) {
            return Err(TelemetryError::storage_write("injected insert failure"));
        }
        let mut rows = self.lock_rows()?;
        let mut next_id = self
            .next_id
            .lock()
            .map_err(|_| TelemetryError::storage_write("id lock poisoned"))?;
        for reading in readings {
            *next_id += 1;
            rows.push(StoredReading {
                id: *next_id,
                reading: *reading,
                synced: false,
            });
        }
        Ok(())
    }

    fn unsynced_count(&self) -> Result<u64, TelemetryError> {
        Ok(self.lock_rows()?.iter().filter(|r| !r.synced).count() as u64)
    }

    fn unsynced_time_range(&self) -> Result<Option<(i64, i64)>, TelemetryError> {
        let rows = self.lock_rows()?;
        let mut range: Option<(i64, i64)> = None;
        for row in rows.iter().filter(|r| !r.synced) {
            let ts = row.reading.timestamp_ms;
            range = Some(match range {
                None => (ts, ts),
                Some((lo, hi)) => (lo.min(ts), hi.max(ts)),
            });
        }
        Ok(range)
    }

    fn fetch_unsynced(&self, limit: usize) -> Result<Vec<StoredReading>, TelemetryError> {
        Ok(self
            .lock_rows()?
            .iter()
            .filter(|r| !r.synced)
            .take(limit)
            .copied()
            .collect())
    }

    fn mark_synced(&self, ids: &[i64]) -> Result<(), TelemetryError> {
        if Self::take_failure(&self.fail_next_marks) {
            return Err(TelemetryError::storage_write("injected mark failure"));
        }
        let mut rows = self.lock_rows()?;
        for row in rows.iter_mut() {
            if ids.contains(&row.id) {
                row.synced = true;
            }
        }
        Ok(())
    }

    fn reset_synced(&self, ids: &[i64]) -> Result<(), TelemetryError> {
        if Self::take_failure(&self.fail_next_resets) {
            return Err(TelemetryError::storage_write("injected reset failure"));
        }
        let mut rows = self.lock_rows()?;
        for row in rows.iter_mut() {
            if ids.contains(&row.id) {
                row.synced = false;
            }
        }
        Ok(())
    }
}
