//! Session metrics collection.
//!
//! Pipeline crates emit their own counters at the point of work; this module
//! adds the status-loop gauges and an in-memory aggregator for the
//! end-of-session summary.

use metrics::{counter, gauge, histogram};

/// Record the current link state as a labelled gauge (1 = active).
pub fn record_link_state(state: &str) {
    gauge!("pipeline_link_state", "state" => state.to_string()).set(1.0);
}

/// Record the displayed heart rate
pub fn record_heart_rate(bpm: u16) {
    gauge!("pipeline_heart_rate_bpm").set(bpm as f64);
    histogram!("pipeline_heart_rate_bpm_hist").record(bpm as f64);
}

/// Record the number of rows waiting in the durable buffer
pub fn record_buffer_depth(depth: u64) {
    gauge!("pipeline_buffer_depth").set(depth as f64);
}

/// Record one detection window outcome
pub fn record_detection_window(cadence_hz: f32, walking: bool) {
    if walking {
        counter!("pipeline_walking_windows_total").increment(1);
        histogram!("pipeline_cadence_hz").record(cadence_hz as f64);
    }
}

/// Session metrics aggregator.
///
/// Aggregates status snapshots in memory so the CLI can print a summary when
/// the session ends, independent of the Prometheus exporter.
#[derive(Debug, Clone, Default)]
pub struct SessionMetricsAggregator {
    /// Status snapshots observed
    pub snapshots: u64,

    /// Snapshots with confirmed walking
    pub walking_snapshots: u64,

    /// Final step count
    pub steps: u64,

    /// Rows flushed to the local store
    pub rows_flushed: u64,

    /// Flush failures observed
    pub flush_failures: u64,

    /// Packets received over the link
    pub packets: u64,

    /// Unexpected disconnections
    pub disconnections: u64,

    /// Cadence statistics over walking snapshots, Hz
    pub cadence_stats: RunningStats,

    /// Displayed heart-rate statistics, bpm
    pub pulse_stats: RunningStats,
}

impl SessionMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one status snapshot into the aggregate.
    pub fn update(
        &mut self,
        walking: bool,
        cadence_hz: f32,
        pulse_bpm: Option<u16>,
        steps: u64,
    ) {
        self.snapshots += 1;
        if walking {
            self.walking_snapshots += 1;
            self.cadence_stats.push(cadence_hz as f64);
        }
        if let Some(bpm) = pulse_bpm {
            self.pulse_stats.push(bpm as f64);
        }
        self.steps = steps;
    }

    /// Fold writer and link totals; callers pass cumulative counts.
    pub fn update_totals(
        &mut self,
        rows_flushed: u64,
        flush_failures: u64,
        packets: u64,
        disconnections: u64,
    ) {
        self.rows_flushed = rows_flushed;
        self.flush_failures = flush_failures;
        self.packets = packets;
        self.disconnections = disconnections;
    }

    /// Produce the summary report
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            snapshots: self.snapshots,
            walking_snapshots: self.walking_snapshots,
            walking_rate: if self.snapshots > 0 {
                self.walking_snapshots as f64 / self.snapshots as f64 * 100.0
            } else {
                0.0
            },
            steps: self.steps,
            rows_flushed: self.rows_flushed,
            flush_failures: self.flush_failures,
            packets: self.packets,
            disconnections: self.disconnections,
            cadence_hz: StatsSummary::from(&self.cadence_stats),
            pulse_bpm: StatsSummary::from(&self.pulse_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Session summary report
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub snapshots: u64,
    pub walking_snapshots: u64,
    pub walking_rate: f64,
    pub steps: u64,
    pub rows_flushed: u64,
    pub flush_failures: u64,
    pub packets: u64,
    pub disconnections: u64,
    pub cadence_hz: StatsSummary,
    pub pulse_bpm: StatsSummary,
}

impl std::fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Session Summary ===")?;
        writeln!(f, "Packets received: {}", self.packets)?;
        writeln!(f, "Unexpected disconnections: {}", self.disconnections)?;
        writeln!(f, "Rows persisted: {}", self.rows_flushed)?;
        writeln!(f, "Flush failures: {}", self.flush_failures)?;
        writeln!(
            f,
            "Walking windows: {} of {} ({:.1}%)",
            self.walking_snapshots, self.snapshots, self.walking_rate
        )?;
        writeln!(f, "Steps: {}", self.steps)?;
        writeln!(f, "Cadence (Hz): {}", self.cadence_hz)?;
        writeln!(f, "Heart rate (bpm): {}", self.pulse_bpm)?;
        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.2}, max={:.2}, mean={:.2}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = SessionMetricsAggregator::new();

        aggregator.update(false, 0.0, None, 0);
        aggregator.update(true, 1.8, Some(72), 4);
        aggregator.update(true, 2.0, Some(75), 8);
        aggregator.update_totals(120, 1, 900, 2);

        assert_eq!(aggregator.snapshots, 3);
        assert_eq!(aggregator.walking_snapshots, 2);
        assert_eq!(aggregator.steps, 8);
        assert_eq!(aggregator.cadence_stats.count(), 2);
        assert!((aggregator.cadence_stats.mean() - 1.9).abs() < 1e-6);
        assert_eq!(aggregator.rows_flushed, 120);
        assert_eq!(aggregator.disconnections, 2);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = SessionMetricsAggregator::new();
        aggregator.update(true, 1.8, Some(70), 12);
        aggregator.update_totals(50, 0, 300, 0);

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Steps: 12"));
        assert!(output.contains("Rows persisted: 50"));
        assert!(output.contains("100.0%"));
    }
}
