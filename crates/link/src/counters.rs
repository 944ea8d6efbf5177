//! Link-layer running counters, exposed read-only to observers.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LinkCounters {
    disconnections: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnect_failures: AtomicU64,
    reconnect_successes: AtomicU64,
    packets_total: AtomicU64,
    packets_since_reconnect: AtomicU64,
    samples_dropped: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCountersSnapshot {
    pub disconnections: u64,
    pub reconnect_attempts: u64,
    pub reconnect_failures: u64,
    pub reconnect_successes: u64,
    pub packets_total: u64,
    pub packets_since_reconnect: u64,
    pub samples_dropped: u64,
}

impl LinkCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_disconnection(&self) {
        self.disconnections.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("link_disconnections_total").increment(1);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("link_reconnect_attempts_total").increment(1);
    }

    pub fn record_reconnect_failure(&self) {
        self.reconnect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_success(&self) {
        self.reconnect_successes.fetch_add(1, Ordering::Relaxed);
        // Per-session packet counter restarts with the new link.
        self.packets_since_reconnect.store(0, Ordering::Relaxed);
    }

    pub fn record_packet(&self) {
        self.packets_total.fetch_add(1, Ordering::Relaxed);
        self.packets_since_reconnect.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("link_packets_total").increment(1);
    }

    pub fn record_sample_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("link_samples_dropped_total").increment(1);
    }

    pub fn snapshot(&self) -> LinkCountersSnapshot {
        LinkCountersSnapshot {
            disconnections: self.disconnections.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            reconnect_failures: self.reconnect_failures.load(Ordering::Relaxed),
            reconnect_successes: self.reconnect_successes.load(Ordering::Relaxed),
            packets_total: self.packets_total.load(Ordering::Relaxed),
            packets_since_reconnect: self.packets_since_reconnect.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
        }
    }
}
