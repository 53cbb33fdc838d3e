//! Emitted trace bundle
//!
//! [`TraceEventRecords`] is the immutable unit handed to trace listeners:
//! the trace metadata (when one was recorded) plus the event sequence in
//! ascending order-index order. The same shape is delivered on both the
//! valid and the invalid channel; classification happens at emission time.

use serde::{Deserialize, Serialize};

use crate::flow_record::{TraceEvent, TraceMetadata};

/// An emitted trace: metadata plus the ordered event sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEventRecords {
    metadata: Option<TraceMetadata>,
    events: Vec<TraceEvent>,
}

impl TraceEventRecords {
    /// Build a bundle from metadata and events already sorted by order
    /// index.
    pub fn new(metadata: Option<TraceMetadata>, events: Vec<TraceEvent>) -> Self {
        debug_assert!(
            events.windows(2).all(|w| w[0].order_index < w[1].order_index),
            "events must be sorted by order index"
        );
        Self { metadata, events }
    }

    pub fn metadata(&self) -> Option<&TraceMetadata> {
        self.metadata.as_ref()
    }

    /// Events in ascending order-index order.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Trace id of the bundle, from the metadata or the first event.
    pub fn trace_id(&self) -> Option<u64> {
        self.metadata
            .as_ref()
            .map(|m| m.trace_id)
            .or_else(|| self.events.first().map(|e| e.trace_id))
    }

    /// The entry call, when the trace has its order-index-0 event.
    pub fn entry_call(&self) -> Option<&TraceEvent> {
        self.events.first().filter(|e| e.order_index == 0)
    }

    /// Decompose into metadata and the ordered event sequence.
    pub fn into_parts(self) -> (Option<TraceMetadata>, Vec<TraceEvent>) {
        (self.metadata, self.events)
    }
}
