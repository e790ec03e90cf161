//! Refresh counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for a cache's refresh activity since construction.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
    /// Refreshes that swapped in a new snapshot
    pub refreshes: AtomicU64,

    /// Refreshes skipped because another was in flight
    pub skipped: AtomicU64,

    /// Refreshes abandoned because the fetch failed
    pub fetch_errors: AtomicU64,

    /// Refreshes abandoned because a field could not be resolved
    pub config_errors: AtomicU64,

    /// Records returned by the most recent successful fetch
    pub last_record_count: AtomicU64,
}

impl RefreshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_refresh(&self, records: usize) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        self.last_record_count.store(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_config_error(&self) {
        self.config_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> RefreshMetricsSnapshot {
        RefreshMetricsSnapshot {
            refreshes: self.refreshes.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            config_errors: self.config_errors.load(Ordering::Relaxed),
            last_record_count: self.last_record_count.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of refresh metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshMetricsSnapshot {
    pub refreshes: u64,
    pub skipped: u64,
    pub fetch_errors: u64,
    pub config_errors: u64,
    pub last_record_count: u64,
}

impl RefreshMetricsSnapshot {
    /// Refresh attempts that reached the fetcher.
    pub fn attempts(&self) -> u64 {
        self.refreshes + self.fetch_errors + self.config_errors
    }
}
