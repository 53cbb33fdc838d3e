//! Concurrent trace registry
//!
//! Maps trace ids to their in-flight [`TraceBuffer`]s. Creation is an atomic
//! insert-if-absent, so racing producers submitting the first records of a
//! trace always converge on a single buffer. Removal is the single hand-off
//! point between natural completion and timeout eviction: whichever path
//! removes the entry first owns the buffer and is responsible for dispatch.
//!
//! Per trace id the registry moves through `absent → open → removed`, and
//! `removed` is terminal for that buffer. A record arriving for an id that
//! was already emitted opens a fresh buffer (a second, independent trace).

use std::sync::Arc;

use dashmap::DashMap;
use fnv::FnvBuildHasher;

use crate::trace_buffer::TraceBuffer;

/// Concurrent map from trace id to the buffer accumulating that trace.
#[derive(Debug)]
pub struct TraceRegistry {
    buffers: DashMap<u64, Arc<TraceBuffer>, FnvBuildHasher>,
}

impl TraceRegistry {
    pub fn new() -> Self {
        Self {
            buffers: DashMap::with_hasher(FnvBuildHasher::default()),
        }
    }

    /// Buffer for `trace_id`, created atomically on first use. The factory
    /// runs at most once per id under contention.
    pub fn obtain(&self, trace_id: u64) -> Arc<TraceBuffer> {
        self.buffers
            .entry(trace_id)
            .or_insert_with(|| Arc::new(TraceBuffer::new()))
            .value()
            .clone()
    }

    /// Look up an open buffer without creating one.
    pub fn get(&self, trace_id: u64) -> Option<Arc<TraceBuffer>> {
        self.buffers.get(&trace_id).map(|entry| entry.value().clone())
    }

    /// Atomically take a buffer out of the registry. Returns `None` when a
    /// competing completion or eviction already removed it.
    pub fn remove(&self, trace_id: u64) -> Option<Arc<TraceBuffer>> {
        self.buffers.remove(&trace_id).map(|(_, buffer)| buffer)
    }

    /// Snapshot of the currently open trace ids. Buffers inserted or removed
    /// while iterating may or may not be reflected.
    pub fn snapshot_ids(&self) -> Vec<u64> {
        self.buffers.iter().map(|entry| *entry.key()).collect()
    }

    /// Remove and return every open buffer.
    pub fn drain(&self) -> Vec<(u64, Arc<TraceBuffer>)> {
        self.snapshot_ids()
            .into_iter()
            .filter_map(|trace_id| self.remove(trace_id).map(|buffer| (trace_id, buffer)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for TraceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
