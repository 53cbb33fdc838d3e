//! Trace reconstruction engine
//!
//! Wires the registry, buffers and timeout policy into one ingestion facade:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ PRODUCER THREADS                                               │
//! │   submit(record) ──► registry.obtain(trace_id)                 │
//! │                      buffer.insert / set_metadata              │
//! │                      finished? ──► remove + dispatch (valid)   │
//! │                      advance watermark ──► timeout scan        │
//! └────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//!              valid / invalid trace listeners (sync, in order)
//! ```
//!
//! There is no internal worker thread: timeout scanning piggybacks on the
//! thread calling [`submit`] or [`tick`]. The watermark and the scan share
//! one mutex, so a scan observes a consistent watermark and two scans never
//! interleave. The scan briefly serializes ingestion across traces; the
//! trade-off buys strict ordering of eviction decisions.
//!
//! A record arriving for a trace id that was already emitted (completed or
//! evicted) opens a fresh buffer and is treated as a second, independent
//! trace.
//!
//! [`submit`]: ReconstructionEngine::submit
//! [`tick`]: ReconstructionEngine::tick

use std::fmt;
use std::sync::{Mutex, RwLock};

use thiserror::Error;
use tracing::debug;

use crate::config::ReconstructionConfig;
use crate::flow_record::FlowRecord;
use crate::stats::{ReconstructionStats, StatsSnapshot};
use crate::timeout::TimeoutPolicy;
use crate::trace_buffer::TraceBuffer;
use crate::trace_events::TraceEventRecords;
use crate::trace_registry::TraceRegistry;

/// Error type listeners may return; carried through unmodified.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Receives emitted traces. Listeners run synchronously on the thread that
/// discovered completion or eviction, in registration order. An error
/// aborts the in-flight operation and propagates to its caller; the engine
/// does not retry.
pub trait TraceListener: Send + Sync {
    fn on_trace(&self, trace: &TraceEventRecords) -> Result<(), ListenerError>;
}

impl<F> TraceListener for F
where
    F: Fn(&TraceEventRecords) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_trace(&self, trace: &TraceEventRecords) -> Result<(), ListenerError> {
        self(trace)
    }
}

/// Which listener set an emission was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceChannel {
    Valid,
    Invalid,
}

impl fmt::Display for TraceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceChannel::Valid => f.write_str("valid"),
            TraceChannel::Invalid => f.write_str("invalid"),
        }
    }
}

/// Errors surfaced by the ingestion facade. Buffer bookkeeping never
/// errors (inconsistencies degrade to invalid traces); only listener
/// failures propagate.
#[derive(Error, Debug)]
pub enum ReconstructionError {
    #[error("{channel} trace listener failed for trace {trace_id}: {source}")]
    Listener {
        channel: TraceChannel,
        trace_id: u64,
        #[source]
        source: ListenerError,
    },
}

/// Watermark shared across all producers; guarded together with the scan.
#[derive(Debug)]
struct ScanState {
    watermark: i64,
}

/// Reconstructs ordered traces from a concurrent, possibly out-of-order
/// stream of flow records.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use rehacer::config::ReconstructionConfig;
/// use rehacer::engine::{ListenerError, ReconstructionEngine};
/// use rehacer::flow_record::{TraceEvent, TraceMetadata};
/// use rehacer::trace_events::TraceEventRecords;
///
/// let engine = ReconstructionEngine::new(ReconstructionConfig::unbounded());
/// let emitted = Arc::new(AtomicUsize::new(0));
/// let seen = Arc::clone(&emitted);
/// engine.on_valid_trace(move |_trace: &TraceEventRecords| -> Result<(), ListenerError> {
///     seen.fetch_add(1, Ordering::SeqCst);
///     Ok(())
/// });
///
/// engine.submit(TraceMetadata::new(1, 7, "session", "host")).unwrap();
/// engine.submit(TraceEvent::before(10, 1, 0, "main()", "app.Main")).unwrap();
/// engine.submit(TraceEvent::after(20, 1, 1, "main()", "app.Main")).unwrap();
/// assert_eq!(emitted.load(Ordering::SeqCst), 1);
/// ```
pub struct ReconstructionEngine {
    config: ReconstructionConfig,
    policy: TimeoutPolicy,
    registry: TraceRegistry,
    scan: Mutex<ScanState>,
    valid_listeners: RwLock<Vec<Box<dyn TraceListener>>>,
    invalid_listeners: RwLock<Vec<Box<dyn TraceListener>>>,
    stats: ReconstructionStats,
}

impl ReconstructionEngine {
    pub fn new(config: ReconstructionConfig) -> Self {
        let policy = TimeoutPolicy::from_config(&config);
        Self {
            config,
            policy,
            registry: TraceRegistry::new(),
            scan: Mutex::new(ScanState { watermark: -1 }),
            valid_listeners: RwLock::new(Vec::new()),
            invalid_listeners: RwLock::new(Vec::new()),
            stats: ReconstructionStats::new(),
        }
    }

    /// Register a listener for structurally complete traces.
    pub fn on_valid_trace(&self, listener: impl TraceListener + 'static) {
        self.valid_listeners.write().unwrap().push(Box::new(listener));
    }

    /// Register a listener for traces failing the completeness invariants.
    /// Invalid traces are always delivered, never silently dropped.
    pub fn on_invalid_trace(&self, listener: impl TraceListener + 'static) {
        self.invalid_listeners
            .write()
            .unwrap()
            .push(Box::new(listener));
    }

    /// Ingest one record. Completion is detected synchronously within the
    /// call that closes the sequence; afterwards the event's timestamp
    /// advances the watermark (it never regresses) and drives the timeout
    /// scan. Metadata records carry no timestamp and leave the watermark
    /// untouched, but still trigger a scan.
    pub fn submit(&self, record: impl Into<FlowRecord>) -> Result<(), ReconstructionError> {
        let logging_timestamp = match record.into() {
            FlowRecord::Metadata(metadata) => {
                let trace_id = metadata.trace_id;
                let buffer = self.registry.obtain(trace_id);
                buffer.set_metadata(metadata);
                self.stats.record_metadata();
                self.complete_if_finished(trace_id, &buffer)?;
                None
            }
            FlowRecord::Event(event) => {
                let trace_id = event.trace_id;
                let timestamp = event.timestamp;
                let buffer = self.registry.obtain(trace_id);
                buffer.insert_event(event);
                self.stats.record_event();
                self.complete_if_finished(trace_id, &buffer)?;
                Some(timestamp)
            }
        };
        if self.policy.enabled() {
            let mut scan = self.scan.lock().unwrap();
            if let Some(timestamp) = logging_timestamp {
                if timestamp > scan.watermark {
                    scan.watermark = timestamp;
                }
            }
            self.scan_expired(&mut scan)?;
        }
        Ok(())
    }

    /// Ingest a whole bundle: metadata first (when present), then each
    /// event, through the regular [`submit`] path.
    ///
    /// [`submit`]: ReconstructionEngine::submit
    pub fn submit_trace(&self, records: TraceEventRecords) -> Result<(), ReconstructionError> {
        let (metadata, events) = records.into_parts();
        if let Some(metadata) = metadata {
            self.submit(metadata)?;
        }
        for event in events {
            self.submit(event)?;
        }
        Ok(())
    }

    /// External time signal: advances the watermark (never regresses) and
    /// runs the timeout scan without ingesting a record. Useful when the
    /// producer stream can go silent while eviction should continue.
    pub fn tick(&self, timestamp: i64) -> Result<(), ReconstructionError> {
        if !self.policy.enabled() {
            return Ok(());
        }
        let mut scan = self.scan.lock().unwrap();
        if timestamp > scan.watermark {
            scan.watermark = timestamp;
        }
        self.scan_expired(&mut scan)
    }

    /// Drain every remaining buffer unconditionally, dispatching each per
    /// its validity, and leave the registry empty. Callers are expected to
    /// have quiesced producers first.
    pub fn shutdown(&self) -> Result<(), ReconstructionError> {
        let _scan = self.scan.lock().unwrap();
        for (trace_id, buffer) in self.registry.drain() {
            self.stats.record_drain();
            debug!(trace_id, reason = ?buffer.invalidity(), "draining trace at shutdown");
            self.dispatch(trace_id, &buffer)?;
        }
        Ok(())
    }

    /// Number of traces currently open in the registry.
    pub fn open_traces(&self) -> usize {
        self.registry.len()
    }

    /// Largest event timestamp observed so far, -1 before the first event.
    pub fn watermark(&self) -> i64 {
        self.scan.lock().unwrap().watermark
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Natural-completion path: the caller that completes the sequence
    /// removes the buffer; a racing eviction may have won, in which case
    /// there is nothing left to dispatch here.
    fn complete_if_finished(
        &self,
        trace_id: u64,
        buffer: &TraceBuffer,
    ) -> Result<(), ReconstructionError> {
        if buffer.is_finished() {
            if let Some(buffer) = self.registry.remove(trace_id) {
                self.stats.record_completion();
                let trace = buffer.to_trace_events();
                self.emit(TraceChannel::Valid, trace_id, &trace)?;
            }
        }
        Ok(())
    }

    /// Timeout scan. Caller holds the scan mutex. Candidate ids come from a
    /// snapshot; each is then removed individually, so a trace completing
    /// concurrently is skipped rather than emitted twice.
    fn scan_expired(&self, scan: &mut ScanState) -> Result<(), ReconstructionError> {
        let watermark = scan.watermark;
        let expired: Vec<u64> = self
            .registry
            .snapshot_ids()
            .into_iter()
            .filter(|&trace_id| {
                self.registry.get(trace_id).is_some_and(|buffer| {
                    self.policy.is_expired(
                        buffer.min_logging_timestamp(),
                        buffer.max_logging_timestamp(),
                        watermark,
                    )
                })
            })
            .collect();
        for trace_id in expired {
            if let Some(buffer) = self.registry.remove(trace_id) {
                self.stats.record_eviction();
                debug!(trace_id, watermark, reason = ?buffer.invalidity(), "evicting expired trace");
                self.dispatch(trace_id, &buffer)?;
            }
        }
        Ok(())
    }

    fn dispatch(&self, trace_id: u64, buffer: &TraceBuffer) -> Result<(), ReconstructionError> {
        let trace = buffer.to_trace_events();
        if buffer.is_invalid() {
            self.emit(TraceChannel::Invalid, trace_id, &trace)
        } else {
            self.emit(TraceChannel::Valid, trace_id, &trace)
        }
    }

    fn emit(
        &self,
        channel: TraceChannel,
        trace_id: u64,
        trace: &TraceEventRecords,
    ) -> Result<(), ReconstructionError> {
        self.stats.record_emission(channel == TraceChannel::Valid);
        let listeners = match channel {
            TraceChannel::Valid => self.valid_listeners.read().unwrap(),
            TraceChannel::Invalid => self.invalid_listeners.read().unwrap(),
        };
        for listener in listeners.iter() {
            listener
                .on_trace(trace)
                .map_err(|source| ReconstructionError::Listener {
                    channel,
                    trace_id,
                    source,
                })?;
        }
        Ok(())
    }
}
