//! Engine counters
//!
//! Cheap atomic counters over the ingestion and emission paths, exposed as
//! a plain snapshot for polling from monitoring code. Counters use relaxed
//! ordering; a snapshot is a consistent-enough view for reporting, not a
//! linearizable one.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters owned by the engine.
#[derive(Debug, Default)]
pub struct ReconstructionStats {
    events_ingested: AtomicU64,
    metadata_ingested: AtomicU64,
    traces_completed: AtomicU64,
    traces_evicted: AtomicU64,
    traces_drained: AtomicU64,
    valid_emitted: AtomicU64,
    invalid_emitted: AtomicU64,
}

impl ReconstructionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_event(&self) {
        self.events_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_metadata(&self) {
        self.metadata_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completion(&self) {
        self.traces_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.traces_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self) {
        self.traces_drained.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_emission(&self, valid: bool) {
        if valid {
            self.valid_emitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.invalid_emitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            metadata_ingested: self.metadata_ingested.load(Ordering::Relaxed),
            traces_completed: self.traces_completed.load(Ordering::Relaxed),
            traces_evicted: self.traces_evicted.load(Ordering::Relaxed),
            traces_drained: self.traces_drained.load(Ordering::Relaxed),
            valid_emitted: self.valid_emitted.load(Ordering::Relaxed),
            invalid_emitted: self.invalid_emitted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub events_ingested: u64,
    pub metadata_ingested: u64,
    /// Traces that finished naturally (gapless, closed, with metadata).
    pub traces_completed: u64,
    /// Traces force-flushed by the timeout scan.
    pub traces_evicted: u64,
    /// Traces flushed by `shutdown`.
    pub traces_drained: u64,
    pub valid_emitted: u64,
    pub invalid_emitted: u64,
}

impl StatsSnapshot {
    /// Fraction of emitted traces that were invalid (0.0 to 1.0).
    pub fn invalid_rate(&self) -> f64 {
        let total = self.valid_emitted + self.invalid_emitted;
        if total == 0 {
            0.0
        } else {
            self.invalid_emitted as f64 / total as f64
        }
    }
}
