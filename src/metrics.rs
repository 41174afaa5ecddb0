use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing conversion activity.
#[derive(Default)]
pub struct ConversionMetrics {
    items_received: AtomicU64,
    records_emitted: AtomicU64,
    unsupported_skipped: AtomicU64,
    missing_path_skipped: AtomicU64,
}

impl ConversionMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an item handed to the stage.
    pub fn record_received(&self) {
        self.items_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a structured record emitted for an item.
    pub fn record_emitted(&self) {
        self.records_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item dropped over an unsupported file format.
    pub fn record_unsupported(&self) {
        self.unsupported_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item dropped for lacking a file path.
    pub fn record_missing_path(&self) {
        self.missing_path_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_received: self.items_received.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            unsupported_skipped: self.unsupported_skipped.load(Ordering::Relaxed),
            missing_path_skipped: self.missing_path_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of conversion counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of items handed to the stage since startup.
    pub items_received: u64,
    /// Number of structured records emitted.
    pub records_emitted: u64,
    /// Items dropped over unsupported file formats.
    pub unsupported_skipped: u64,
    /// Items dropped for lacking a file path.
    pub missing_path_skipped: u64,
}
