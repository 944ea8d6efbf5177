//! In-memory durable buffer with cross-channel merging.
//!
//! Samples from different channels that arrive within the merge window of an
//! already-buffered reading fold into that reading's sparse fields instead of
//! creating a new row. Flush clears the buffer optimistically and requeues
//! the whole batch in order when the transaction fails; no sample is ever
//! dropped.

use std::collections::VecDeque;

use tracing::{debug, warn};

use contracts::{BufferConfig, BufferedReading, DecodedSample, RowStore, SampleEvent};

/// Outcome of one flush pass
#[derive(Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing buffered
    Empty,
    /// Batch committed
    Flushed { rows: usize },
    /// Transaction failed; batch requeued at the front. `alert` is true only
    /// for the first failure since the last success, so sustained failure
    /// does not storm the operator.
    Failed {
        requeued: usize,
        alert: bool,
        message: String,
    },
}

#[derive(Debug)]
pub struct DurableBuffer {
    merge_window_ms: i64,
    merge_search_depth: usize,
    rows: VecDeque<BufferedReading>,
    alert_latched: bool,
}

impl DurableBuffer {
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            merge_window_ms: config.merge_window_ms,
            merge_search_depth: config.merge_search_depth,
            rows: VecDeque::new(),
            alert_latched: false,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append one decoded sample. Only persistable channels are buffered;
    /// heart-rate values live in the detection snapshot instead.
    pub fn append(&mut self, event: &SampleEvent) {
        let ts = event.captured_at_ms;
        match event.sample {
            DecodedSample::Ppg { value } => {
                self.merge_or_push(ts, |r| {
                    if r.ppg.is_none() {
                        r.ppg = Some(value);
                        true
                    } else {
                        false
                    }
                });
            }
            DecodedSample::Accel { raw } => {
                self.merge_or_push(ts, |r| {
                    if r.acc.is_none() {
                        r.acc = Some(raw);
                        true
                    } else {
                        false
                    }
                });
            }
            DecodedSample::Gyro { raw } => {
                self.merge_or_push(ts, |r| {
                    if r.gyro.is_none() {
                        r.gyro = Some(raw);
                        true
                    } else {
                        false
                    }
                });
            }
            _ => {}
        }
    }

    /// Bounded backward search for a mergeable reading; otherwise a new row.
    fn merge_or_push<F>(&mut self, ts: i64, mut try_set: F)
    where
        F: FnMut(&mut BufferedReading) -> bool,
    {
        let depth = self.merge_search_depth.min(self.rows.len());
        let start = self.rows.len() - depth;
        for i in (start..self.rows.len()).rev() {
            let row = &mut self.rows[i];
            if (row.timestamp_ms - ts).abs() <= self.merge_window_ms && try_set(row) {
                return;
            }
        }
        let mut row = BufferedReading::at(ts);
        try_set(&mut row);
        self.rows.push_back(row);
    }

    /// One transactional flush. The buffer clears before the transaction
    /// completes; failure re-prepends the batch so later appends queue after
    /// it.
    pub fn flush(&mut self, store: &dyn RowStore) -> FlushOutcome {
        if self.rows.is_empty() {
            return FlushOutcome::Empty;
        }

        let batch: Vec<BufferedReading> = self.rows.drain(..).collect();
        match store.insert_batch(&batch) {
            Ok(()) => {
                self.alert_latched = false;
                debug!(rows = batch.len(), "buffer flushed");
                metrics::counter!("buffer_rows_flushed_total").increment(batch.len() as u64);
                FlushOutcome::Flushed { rows: batch.len() }
            }
            Err(e) => {
                let requeued = batch.len();
                for row in batch.into_iter().rev() {
                    self.rows.push_front(row);
                }
                let alert = !self.alert_latched;
                self.alert_latched = true;
                warn!(requeued, error = %e, "flush failed, batch requeued");
                metrics::counter!("buffer_flush_failures_total").increment(1);
                FlushOutcome::Failed {
                    requeued,
                    alert,
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryRowStore;
    use contracts::AxisTriple;

    fn buffer() -> DurableBuffer {
        DurableBuffer::new(&BufferConfig::default())
    }

    fn acc(ts: i64) -> SampleEvent {
        SampleEvent::new(
            DecodedSample::Accel {
                raw: AxisTriple::new(1, 2, 3),
            },
            ts,
        )
    }

    fn gyro(ts: i64) -> SampleEvent {
        SampleEvent::new(
            DecodedSample::Gyro {
                raw: AxisTriple::new(4, 5, 6),
            },
            ts,
        )
    }

    fn ppg(ts: i64) -> SampleEvent {
        SampleEvent::new(DecodedSample::Ppg { value: 9_000 }, ts)
    }

    #[test]
    fn test_channels_within_window_merge_into_one_row() {
        let mut buf = buffer();
        buf.append(&acc(1_000));
        buf.append(&gyro(1_030));
        buf.append(&ppg(1_049));
        assert_eq!(buf.len(), 1);

        let store = MemoryRowStore::new();
        assert_eq!(buf.flush(&store), FlushOutcome::Flushed { rows: 1 });
        let rows = store.fetch_unsynced(10).unwrap();
        let r = &rows[0].reading;
        assert!(r.ppg.is_some() && r.acc.is_some() && r.gyro.is_some());
    }

    #[test]
    fn test_outside_window_starts_new_row() {
        let mut buf = buffer();
        buf.append(&acc(1_000));
        buf.append(&gyro(1_051));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_same_channel_never_merges() {
        let mut buf = buffer();
        buf.append(&acc(1_000));
        buf.append(&acc(1_010));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_merge_search_is_bounded() {
        let mut buf = buffer();
        buf.append(&ppg(1_000));
        for i in 0..10 {
            buf.append(&gyro(5_000 + i * 100));
        }
        assert_eq!(buf.len(), 11);
        // The only in-window candidate is row 0, which the bounded backward
        // search no longer reaches; a new row is started instead.
        buf.append(&acc(1_010));
        assert_eq!(buf.len(), 12);
    }

    #[test]
    fn test_failed_flush_requeues_in_order_and_latches_alert() {
        let mut buf = buffer();
        buf.append(&acc(1_000));
        buf.append(&acc(2_000));

        let store = MemoryRowStore::new();
        store.fail_next_inserts(2);

        match buf.flush(&store) {
            FlushOutcome::Failed { requeued, alert, .. } => {
                assert_eq!(requeued, 2);
                assert!(alert);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // Later appends queue after the requeued batch.
        buf.append(&acc(3_000));
        assert_eq!(buf.len(), 3);

        // Second consecutive failure must not alert again.
        match buf.flush(&store) {
            FlushOutcome::Failed { alert, .. } => assert!(!alert),
            other => panic!("expected failure, got {other:?}"),
        }

        // Recovery commits every buffered row, oldest first, and re-arms the
        // alert latch.
        assert_eq!(buf.flush(&store), FlushOutcome::Flushed { rows: 3 });
        let rows = store.fetch_unsynced(10).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].reading.timestamp_ms, 1_000);
        assert_eq!(rows[2].reading.timestamp_ms, 3_000);

        store.fail_next_inserts(1);
        buf.append(&acc(4_000));
        match buf.flush(&store) {
            FlushOutcome::Failed { alert, .. } => assert!(alert),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
