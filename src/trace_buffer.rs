//! Per-trace accumulation buffer
//!
//! A [`TraceBuffer`] collects the records belonging to one trace id while the
//! trace is still in flight: events sorted by order index, at most one
//! metadata record, and the bookkeeping needed to decide completeness.
//!
//! Inconsistent input never panics and never returns an error across the
//! public boundary; it marks the buffer damaged and the trace surfaces as
//! invalid at emission time. This keeps a corrupted producer from stalling
//! the rest of the stream.
//!
//! All mutation is serialized through the buffer's own mutex. Producers
//! feeding different traces never contend with each other.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use tracing::error;

use crate::flow_record::{EventKind, TraceEvent, TraceMetadata};
use crate::trace_events::TraceEventRecords;

/// Why a buffer fails the completeness invariants.
///
/// Informational only; valid/invalid classification at emission time does
/// not depend on the specific reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidityReason {
    /// Structural corruption: trace-id mismatch, duplicate order index, or
    /// duplicate metadata.
    Damaged,
    /// No metadata record was ever attached.
    MissingMetadata,
    /// The buffer holds no events.
    Empty,
    /// The order-index sequence has gaps.
    GappedSequence,
    /// Not every opened call frame has been closed.
    OpenFrames,
}

impl fmt::Display for InvalidityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            InvalidityReason::Damaged => "damaged",
            InvalidityReason::MissingMetadata => "missing metadata",
            InvalidityReason::Empty => "empty",
            InvalidityReason::GappedSequence => "gapped sequence",
            InvalidityReason::OpenFrames => "open frames",
        };
        f.write_str(reason)
    }
}

#[derive(Debug)]
struct BufferState {
    metadata: Option<TraceMetadata>,
    events: BTreeMap<u32, TraceEvent>,
    trace_id: Option<u64>,
    closeable: bool,
    damaged: bool,
    /// Net count of Before minus After/AfterFailed events. Zero exactly
    /// when every opened frame has been closed.
    open_events: i64,
    /// Highest order index seen, -1 while empty.
    max_order_index: i64,
    min_logging_timestamp: i64,
    max_logging_timestamp: i64,
}

/// Accumulates the records of one trace until it finishes or is evicted.
#[derive(Debug)]
pub struct TraceBuffer {
    inner: Mutex<BufferState>,
}

impl TraceBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BufferState {
                metadata: None,
                events: BTreeMap::new(),
                trace_id: None,
                closeable: false,
                damaged: false,
                open_events: 0,
                max_order_index: -1,
                min_logging_timestamp: i64::MAX,
                max_logging_timestamp: -1,
            }),
        }
    }

    /// Insert one event, updating timestamps, the frame counter and the
    /// entry-call flag. A trace-id mismatch or a duplicate order index
    /// marks the buffer damaged; the first event at an index is kept.
    pub fn insert_event(&self, event: TraceEvent) {
        let mut state = self.inner.lock().unwrap();
        match state.trace_id {
            None => state.trace_id = Some(event.trace_id),
            Some(id) if id != event.trace_id => {
                error!(
                    expected = id,
                    found = event.trace_id,
                    order_index = event.order_index,
                    "trace id mismatch in event"
                );
                state.damaged = true;
            }
            Some(_) => {}
        }
        if event.timestamp > state.max_logging_timestamp {
            state.max_logging_timestamp = event.timestamp;
        }
        if event.timestamp < state.min_logging_timestamp {
            state.min_logging_timestamp = event.timestamp;
        }
        let order_index = event.order_index;
        if i64::from(order_index) > state.max_order_index {
            state.max_order_index = i64::from(order_index);
        }
        match event.kind {
            EventKind::Before { .. } => {
                if order_index == 0 {
                    state.closeable = true;
                }
                state.open_events += 1;
            }
            EventKind::After { .. } | EventKind::AfterFailed { .. } => {
                state.open_events -= 1;
            }
            EventKind::Call { .. } => {}
        }
        if state.events.contains_key(&order_index) {
            error!(
                trace_id = event.trace_id,
                order_index, "duplicate entry for order index"
            );
            state.damaged = true;
        } else {
            state.events.insert(order_index, event);
        }
    }

    /// Attach trace metadata. A second metadata record or a trace-id
    /// mismatch marks the buffer damaged.
    pub fn set_metadata(&self, metadata: TraceMetadata) {
        let mut state = self.inner.lock().unwrap();
        match state.trace_id {
            None => state.trace_id = Some(metadata.trace_id),
            Some(id) if id != metadata.trace_id => {
                error!(
                    expected = id,
                    found = metadata.trace_id,
                    "trace id mismatch in metadata"
                );
                state.damaged = true;
            }
            Some(_) => {}
        }
        if state.metadata.is_none() {
            state.metadata = Some(metadata);
        } else {
            error!(trace_id = metadata.trace_id, "duplicate trace metadata");
            state.damaged = true;
        }
    }

    /// True once the buffer holds a gapless, fully closed sequence starting
    /// at the entry call (order index 0) with metadata attached.
    pub fn is_finished(&self) -> bool {
        let state = self.inner.lock().unwrap();
        state.closeable && !Self::invalid(&state)
    }

    /// True while any completeness invariant fails.
    pub fn is_invalid(&self) -> bool {
        let state = self.inner.lock().unwrap();
        Self::invalid(&state)
    }

    /// The first failing invariant, or `None` for a complete trace.
    pub fn invalidity(&self) -> Option<InvalidityReason> {
        let state = self.inner.lock().unwrap();
        if state.damaged {
            Some(InvalidityReason::Damaged)
        } else if state.metadata.is_none() {
            Some(InvalidityReason::MissingMetadata)
        } else if state.events.is_empty() {
            Some(InvalidityReason::Empty)
        } else if state.max_order_index + 1 != state.events.len() as i64 {
            Some(InvalidityReason::GappedSequence)
        } else if state.open_events != 0 {
            Some(InvalidityReason::OpenFrames)
        } else {
            None
        }
    }

    fn invalid(state: &BufferState) -> bool {
        state.metadata.is_none()
            || state.damaged
            || state.open_events != 0
            || state.max_order_index + 1 != state.events.len() as i64
            || state.events.is_empty()
    }

    /// Smallest event timestamp, `i64::MAX` while no event was inserted.
    pub fn min_logging_timestamp(&self) -> i64 {
        self.inner.lock().unwrap().min_logging_timestamp
    }

    /// Largest event timestamp, -1 while no event was inserted.
    pub fn max_logging_timestamp(&self) -> i64 {
        self.inner.lock().unwrap().max_logging_timestamp
    }

    /// Trace id of the first record seen, if any.
    pub fn trace_id(&self) -> Option<u64> {
        self.inner.lock().unwrap().trace_id
    }

    /// Immutable snapshot of metadata plus the events in ascending order
    /// index order. Intended for dispatch after the buffer has been removed
    /// from the registry, when no further mutation can happen.
    pub fn to_trace_events(&self) -> TraceEventRecords {
        let state = self.inner.lock().unwrap();
        TraceEventRecords::new(
            state.metadata.clone(),
            state.events.values().cloned().collect(),
        )
    }
}

impl Default for TraceBuffer {
    fn default() -> Self {
        Self::new()
    }
}
