//! Flow record model for event-based traces
//!
//! A trace is the set of all records sharing one 64-bit trace id. Within a
//! trace, every event carries a 0-based order index assigned by the producer;
//! the index defines reconstruction order regardless of arrival order.
//!
//! The record taxonomy is a closed sum type:
//!
//! ```text
//! FlowRecord
//! ├─ Metadata(TraceMetadata)      trace-level identity, at most once per trace
//! └─ Event(TraceEvent)
//!     ├─ Before       opens a call frame (index 0 = entry call)
//!     ├─ After        closes a call frame
//!     ├─ AfterFailed  closes a call frame, carries the failure cause
//!     └─ Call         records a call edge, no frame effect
//! ```

use serde::{Deserialize, Serialize};

/// Parent trace id value marking a root trace (no enclosing trace).
pub const NO_PARENT_TRACE_ID: u64 = 0;

/// Parent order index value marking a root trace.
pub const NO_PARENT_ORDER_INDEX: i32 = -1;

/// Trace-level metadata: identity and session/host correlation.
///
/// At most one metadata record belongs to a trace. A second metadata record
/// for the same trace id marks the trace as damaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct TraceMetadata {
    pub trace_id: u64,
    /// Id of the thread that produced the trace in the observed system.
    pub thread_id: u64,
    /// Session the traced request belongs to (empty if none).
    pub session_id: String,
    /// Host the trace was recorded on.
    pub hostname: String,
    /// Enclosing trace id, or [`NO_PARENT_TRACE_ID`] for a root trace.
    pub parent_trace_id: u64,
    /// Order index within the enclosing trace, or [`NO_PARENT_ORDER_INDEX`].
    pub parent_order_index: i32,
}

impl TraceMetadata {
    /// Create metadata for a root trace (no parent linkage).
    pub fn new(
        trace_id: u64,
        thread_id: u64,
        session_id: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            trace_id,
            thread_id,
            session_id: session_id.into(),
            hostname: hostname.into(),
            parent_trace_id: NO_PARENT_TRACE_ID,
            parent_order_index: NO_PARENT_ORDER_INDEX,
        }
    }

    /// Create metadata for a trace nested under `parent_trace_id` at
    /// `parent_order_index`.
    pub fn with_parent(
        trace_id: u64,
        thread_id: u64,
        session_id: impl Into<String>,
        hostname: impl Into<String>,
        parent_trace_id: u64,
        parent_order_index: i32,
    ) -> Self {
        Self {
            trace_id,
            thread_id,
            session_id: session_id.into(),
            hostname: hostname.into(),
            parent_trace_id,
            parent_order_index,
        }
    }

    /// True if this trace has no enclosing trace.
    pub fn is_root(&self) -> bool {
        self.parent_trace_id == NO_PARENT_TRACE_ID
    }
}

/// Kind-specific payload of a [`TraceEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum EventKind {
    /// Entry into an operation. The event at order index 0 is the trace's
    /// entry call.
    Before {
        operation_signature: String,
        class_signature: String,
    },
    /// Normal return from an operation.
    After {
        operation_signature: String,
        class_signature: String,
    },
    /// Abnormal return from an operation.
    AfterFailed {
        operation_signature: String,
        class_signature: String,
        cause: String,
    },
    /// Call-site edge from caller to callee. Does not open or close a
    /// frame; the callee's own Before/After events do.
    Call {
        caller_operation_signature: String,
        caller_class_signature: String,
        callee_operation_signature: String,
        callee_class_signature: String,
    },
}

/// One flow event within a trace.
///
/// `timestamp` is monotonic logical time in the engine's configured unit;
/// `order_index` is the event's 0-based position within its trace as
/// assigned by the producer (delivery order may differ).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct TraceEvent {
    pub timestamp: i64,
    pub trace_id: u64,
    pub order_index: u32,
    pub kind: EventKind,
}

impl TraceEvent {
    pub fn before(
        timestamp: i64,
        trace_id: u64,
        order_index: u32,
        operation_signature: impl Into<String>,
        class_signature: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            trace_id,
            order_index,
            kind: EventKind::Before {
                operation_signature: operation_signature.into(),
                class_signature: class_signature.into(),
            },
        }
    }

    pub fn after(
        timestamp: i64,
        trace_id: u64,
        order_index: u32,
        operation_signature: impl Into<String>,
        class_signature: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            trace_id,
            order_index,
            kind: EventKind::After {
                operation_signature: operation_signature.into(),
                class_signature: class_signature.into(),
            },
        }
    }

    pub fn after_failed(
        timestamp: i64,
        trace_id: u64,
        order_index: u32,
        operation_signature: impl Into<String>,
        class_signature: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            trace_id,
            order_index,
            kind: EventKind::AfterFailed {
                operation_signature: operation_signature.into(),
                class_signature: class_signature.into(),
                cause: cause.into(),
            },
        }
    }

    pub fn call(
        timestamp: i64,
        trace_id: u64,
        order_index: u32,
        caller_operation_signature: impl Into<String>,
        caller_class_signature: impl Into<String>,
        callee_operation_signature: impl Into<String>,
        callee_class_signature: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            trace_id,
            order_index,
            kind: EventKind::Call {
                caller_operation_signature: caller_operation_signature.into(),
                caller_class_signature: caller_class_signature.into(),
                callee_operation_signature: callee_operation_signature.into(),
                callee_class_signature: callee_class_signature.into(),
            },
        }
    }

    /// True for events that open a call frame.
    pub fn opens_frame(&self) -> bool {
        matches!(self.kind, EventKind::Before { .. })
    }

    /// True for events that close a call frame.
    pub fn closes_frame(&self) -> bool {
        matches!(
            self.kind,
            EventKind::After { .. } | EventKind::AfterFailed { .. }
        )
    }
}

/// The single ingestion type accepted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum FlowRecord {
    Metadata(TraceMetadata),
    Event(TraceEvent),
}

impl FlowRecord {
    /// Trace id the record belongs to.
    pub fn trace_id(&self) -> u64 {
        match self {
            FlowRecord::Metadata(m) => m.trace_id,
            FlowRecord::Event(e) => e.trace_id,
        }
    }
}

impl From<TraceMetadata> for FlowRecord {
    fn from(metadata: TraceMetadata) -> Self {
        FlowRecord::Metadata(metadata)
    }
}

impl From<TraceEvent> for FlowRecord {
    fn from(event: TraceEvent) -> Self {
        FlowRecord::Event(event)
    }
}
