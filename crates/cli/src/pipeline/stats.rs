//! Session statistics.

use std::time::Duration;

use detection::DetectionSnapshot;
use link::LinkCountersSnapshot;
use observability::SessionMetricsAggregator;
use storage::WriterStatsSnapshot;

/// Statistics from one pipeline session
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Wall-clock duration of the session
    pub duration: Duration,

    /// Frames in the recording that drove the session
    pub frames_replayed: u64,

    /// Link counters at session end
    pub link: LinkCountersSnapshot,

    /// Writer stats after the final flush
    pub writer: WriterStatsSnapshot,

    /// Detection state at session end
    pub detection: DetectionSnapshot,

    /// Last displayed heart rate
    pub heart_rate: Option<u16>,

    /// Remote session id, if the sync stage created one
    pub session_id: Option<String>,

    /// Rows uploaded by the sync stage (None = sync skipped or failed)
    pub rows_synced: Option<u64>,

    /// Status-loop aggregation
    pub metrics: SessionMetricsAggregator,
}

impl SessionStats {
    /// Persisted rows per second of session time
    pub fn rows_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.writer.rows_flushed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print the end-of-session report
    pub fn print_summary(&self) {
        println!("\n{}", self.metrics.summary());
        println!("Duration: {:.2}s", self.duration.as_secs_f64());
        println!("Frames replayed: {}", self.frames_replayed);
        println!("Rows/s: {:.1}", self.rows_per_second());
        match (&self.session_id, self.rows_synced) {
            (Some(id), Some(rows)) => println!("Synced: {rows} rows to session {id}"),
            (None, Some(0)) => println!("Synced: nothing to upload"),
            _ => println!("Synced: skipped"),
        }
        println!();
    }
}
