//! Single-writer persistence task.
//!
//! All buffer mutation happens inside one task: samples arrive on the fan-out
//! channel, the flush timer fires on a fixed cadence while recording, and a
//! final flush runs when the sample channel closes.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use contracts::{epoch_ms, BufferConfig, RowStore, SampleEvent};

use crate::{DurableBuffer, FlushOutcome};

#[derive(Debug, Default)]
pub struct WriterStats {
    rows_flushed: AtomicU64,
    flush_failures: AtomicU64,
    buffered: AtomicU64,
    last_flush_ms: AtomicI64,
    last_error: Mutex<Option<String>>,
}

/// Point-in-time copy of the writer stats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterStatsSnapshot {
    pub rows_flushed: u64,
    pub flush_failures: u64,
    pub buffered: u64,
    pub last_flush_ms: i64,
    pub last_error: Option<String>,
}

impl WriterStats {
    pub fn snapshot(&self) -> WriterStatsSnapshot {
        WriterStatsSnapshot {
            rows_flushed: self.rows_flushed.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            last_flush_ms: self.last_flush_ms.load(Ordering::Relaxed),
            last_error: self.last_error.lock().map(|g| g.clone()).unwrap_or(None),
        }
    }

    fn set_error(&self, message: Option<String>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = message;
        }
    }
}

/// Handle to the writer task.
///
/// Recording is off until `start_recording`; samples received while off are
/// drained and discarded so the channel never backs up.
pub struct WriterHandle {
    recording: Arc<AtomicBool>,
    stats: Arc<WriterStats>,
    join: JoinHandle<()>,
}

impl WriterHandle {
    pub fn start_recording(&self) {
        self.recording.store(true, Ordering::SeqCst);
        info!("recording started");
    }

    pub fn stop_recording(&self) {
        self.recording.store(false, Ordering::SeqCst);
        info!("recording stopped");
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Shared recording flag, checked by the sync engine's precondition.
    pub fn recording_flag(&self) -> Arc<AtomicBool> {
        self.recording.clone()
    }

    pub fn stats(&self) -> WriterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait for the task to finish and return the final stats. The task
    /// exits after a final flush when the sample channel closes.
    pub async fn join(self) -> WriterStatsSnapshot {
        let _ = self.join.await;
        self.stats.snapshot()
    }
}

/// Spawn the writer task over a sample stream and a row store.
pub fn spawn_writer(
    samples: Receiver<SampleEvent>,
    store: Arc<dyn RowStore>,
    config: BufferConfig,
) -> WriterHandle {
    let recording = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(WriterStats::default());

    let task_recording = recording.clone();
    let task_stats = stats.clone();
    let join = tokio::spawn(async move {
        let mut buffer = DurableBuffer::new(&config);
        let mut timer = tokio::time::interval(Duration::from_millis(config.flush_interval_ms));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = samples.recv() => match received {
                    Ok(event) => {
                        if task_recording.load(Ordering::SeqCst) {
                            buffer.append(&event);
                            task_stats.buffered.store(buffer.len() as u64, Ordering::Relaxed);
                        }
                    }
                    Err(_) => {
                        // Producer gone: flush whatever is left and exit.
                        flush_once(&mut buffer, store.as_ref(), &task_stats);
                        if !buffer.is_empty() {
                            error!(rows = buffer.len(), "final flush failed, rows not persisted");
                        }
                        debug!("writer task exiting");
                        return;
                    }
                },
                _ = timer.tick() => {
                    if task_recording.load(Ordering::SeqCst) {
                        flush_once(&mut buffer, store.as_ref(), &task_stats);
                    }
                }
            }
        }
    });

    WriterHandle {
        recording,
        stats,
        join,
    }
}

fn flush_once(buffer: &mut DurableBuffer, store: &dyn RowStore, stats: &WriterStats) {
    match buffer.flush(store) {
        FlushOutcome::Empty => {}
        FlushOutcome::Flushed { rows } => {
            stats.rows_flushed.fetch_add(rows as u64, Ordering::Relaxed);
            stats.last_flush_ms.store(epoch_ms(), Ordering::Relaxed);
            stats.set_error(None);
        }
        FlushOutcome::Failed {
            requeued,
            alert,
            message,
        } => {
            stats.flush_failures.fetch_add(1, Ordering::Relaxed);
            stats.set_error(Some(message.clone()));
            if alert {
                error!(requeued, error = %message, "local write failing, samples requeued");
            }
        }
    }
    stats.buffered.store(buffer.len() as u64, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryRowStore;
    use contracts::{AxisTriple, DecodedSample};

    fn acc_event(ts: i64) -> SampleEvent {
        SampleEvent::new(
            DecodedSample::Accel {
                raw: AxisTriple::new(1, 2, 3),
            },
            ts,
        )
    }

    fn fast_config() -> BufferConfig {
        BufferConfig {
            flush_interval_ms: 10,
            ..BufferConfig::default()
        }
    }

    #[tokio::test]
    async fn test_samples_flow_to_store_while_recording() {
        let (tx, rx) = async_channel::bounded(16);
        let store = Arc::new(MemoryRowStore::new());
        let handle = spawn_writer(rx, store.clone(), fast_config());
        handle.start_recording();

        tx.send(acc_event(1_000)).await.unwrap();
        tx.send(acc_event(2_000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.row_count(), 2);
        let stats = handle.stats();
        assert_eq!(stats.rows_flushed, 2);
        assert_eq!(stats.last_error, None);

        drop(tx);
        handle.join().await;
    }

    #[tokio::test]
    async fn test_samples_discarded_while_not_recording() {
        let (tx, rx) = async_channel::bounded(16);
        let store = Arc::new(MemoryRowStore::new());
        let handle = spawn_writer(rx, store.clone(), fast_config());

        tx.send(acc_event(1_000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.row_count(), 0);

        drop(tx);
        handle.join().await;
    }

    #[tokio::test]
    async fn test_final_flush_on_channel_close() {
        let (tx, rx) = async_channel::bounded(16);
        let store = Arc::new(MemoryRowStore::new());
        let handle = spawn_writer(rx, store.clone(), BufferConfig {
            flush_interval_ms: 60_000,
            ..BufferConfig::default()
        });
        handle.start_recording();

        tx.send(acc_event(1_000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(tx);
        handle.join().await;

        assert_eq!(store.row_count(), 1);
    }

    #[tokio::test]
    async fn test_flush_failure_requeues_and_recovers() {
        let (tx, rx) = async_channel::bounded(16);
        let store = Arc::new(MemoryRowStore::new());
        store.fail_next_inserts(1);
        let handle = spawn_writer(rx, store.clone(), fast_config());
        handle.start_recording();

        tx.send(acc_event(1_000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // First flush failed, a later one committed the requeued row.
        assert_eq!(store.row_count(), 1);
        let stats = handle.stats();
        assert!(stats.flush_failures >= 1);
        assert_eq!(stats.last_error, None);

        drop(tx);
        handle.join().await;
    }
}
