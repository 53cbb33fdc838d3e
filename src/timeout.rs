//! Timeout eviction policy
//!
//! Eviction is driven by record timestamps, not wall-clock time: the engine
//! tracks a watermark (the largest timestamp observed across all events) and
//! a trace expires once its own window falls behind that watermark. This
//! keeps eviction deterministic and replay-safe when analyzing historical
//! logs, under the documented assumption of a roughly monotonic stream.
//! A record arriving later than its trace's timeout window finds the trace
//! already flushed, possibly incomplete.

use crate::config::{ReconstructionConfig, UNBOUNDED};

/// Duration and idle limits, in engine time units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    max_trace_duration: i64,
    max_trace_timeout: i64,
}

impl TimeoutPolicy {
    pub fn from_config(config: &ReconstructionConfig) -> Self {
        Self {
            max_trace_duration: config.max_trace_duration,
            max_trace_timeout: config.max_trace_timeout,
        }
    }

    /// Policy under which no trace ever expires.
    pub fn unbounded() -> Self {
        Self {
            max_trace_duration: UNBOUNDED,
            max_trace_timeout: UNBOUNDED,
        }
    }

    /// False iff both limits are unbounded; the engine skips scanning then.
    pub fn enabled(&self) -> bool {
        !(self.max_trace_duration == UNBOUNDED && self.max_trace_timeout == UNBOUNDED)
    }

    /// Whether a trace with the given timestamp window has expired at
    /// `watermark`: either idle past the timeout (its latest event fell
    /// behind the watermark by more than `max_trace_timeout`) or spanning
    /// more than `max_trace_duration` since its earliest event.
    pub fn is_expired(&self, min_timestamp: i64, max_timestamp: i64, watermark: i64) -> bool {
        let idle_cutoff = watermark.saturating_sub(self.max_trace_timeout);
        let duration_cutoff = watermark.saturating_sub(self.max_trace_duration);
        max_timestamp <= idle_cutoff || min_timestamp <= duration_cutoff
    }
}
