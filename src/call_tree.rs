//! Hierarchical call-tree derivation
//!
//! Rebuilds the call-frame nesting of an emitted trace from its flat,
//! order-index-sorted event sequence. A Before event opens a frame, the
//! matching After/AfterFailed closes it, and nesting follows the stack
//! discipline of the observed execution. Call events materialize as
//! assumed zero-width frames for callees that produced no events of their
//! own (an uninstrumented or remote callee).
//!
//! Intended for structurally complete traces; sequences violating the
//! stack discipline return a descriptive error instead of a tree.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flow_record::EventKind;
use crate::trace_events::TraceEventRecords;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallTreeError {
    #[error("trace has no events")]
    EmptyTrace,
    #[error("trace does not open with an entry call at order index 0")]
    MissingEntryCall,
    #[error("close event at order index {order_index} has no matching open frame")]
    UnbalancedClose { order_index: u32 },
    #[error("{count} call frame(s) left open at end of trace")]
    UnclosedFrames { count: usize },
}

/// One call frame: the interval between a Before event and its matching
/// After/AfterFailed, with the frames it encloses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFrame {
    pub operation_signature: String,
    pub class_signature: String,
    pub entry_timestamp: i64,
    pub exit_timestamp: i64,
    pub entry_order_index: u32,
    pub exit_order_index: u32,
    /// Failure cause when the frame was closed by an AfterFailed event.
    pub failure: Option<String>,
    /// True for zero-width frames synthesized from Call events.
    pub assumed: bool,
    pub children: Vec<CallFrame>,
}

impl CallFrame {
    pub fn duration(&self) -> i64 {
        self.exit_timestamp - self.entry_timestamp
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(CallFrame::count).sum::<usize>()
    }

    fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(CallFrame::depth)
            .max()
            .unwrap_or(0)
    }
}

/// The reconstructed call hierarchy of one trace.
///
/// Usually a single root (the entry call), but a trace whose entry call
/// returns before a sibling top-level call is represented as a forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTree {
    roots: Vec<CallFrame>,
}

impl CallTree {
    /// Rebuild the frame nesting from an emitted trace.
    pub fn from_trace(trace: &TraceEventRecords) -> Result<Self, CallTreeError> {
        let events = trace.events();
        if events.is_empty() {
            return Err(CallTreeError::EmptyTrace);
        }
        let entry = &events[0];
        if entry.order_index != 0 || !entry.opens_frame() {
            return Err(CallTreeError::MissingEntryCall);
        }

        let mut stack: Vec<CallFrame> = Vec::new();
        let mut roots: Vec<CallFrame> = Vec::new();
        for event in events {
            match &event.kind {
                EventKind::Before {
                    operation_signature,
                    class_signature,
                } => {
                    stack.push(CallFrame {
                        operation_signature: operation_signature.clone(),
                        class_signature: class_signature.clone(),
                        entry_timestamp: event.timestamp,
                        exit_timestamp: event.timestamp,
                        entry_order_index: event.order_index,
                        exit_order_index: event.order_index,
                        failure: None,
                        assumed: false,
                        children: Vec::new(),
                    });
                }
                EventKind::After { .. } | EventKind::AfterFailed { .. } => {
                    let mut frame = stack.pop().ok_or(CallTreeError::UnbalancedClose {
                        order_index: event.order_index,
                    })?;
                    frame.exit_timestamp = event.timestamp;
                    frame.exit_order_index = event.order_index;
                    if let EventKind::AfterFailed { cause, .. } = &event.kind {
                        frame.failure = Some(cause.clone());
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(frame),
                        None => roots.push(frame),
                    }
                }
                EventKind::Call {
                    callee_operation_signature,
                    callee_class_signature,
                    ..
                } => {
                    let frame = CallFrame {
                        operation_signature: callee_operation_signature.clone(),
                        class_signature: callee_class_signature.clone(),
                        entry_timestamp: event.timestamp,
                        exit_timestamp: event.timestamp,
                        entry_order_index: event.order_index,
                        exit_order_index: event.order_index,
                        failure: None,
                        assumed: true,
                        children: Vec::new(),
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(frame),
                        None => roots.push(frame),
                    }
                }
            }
        }
        if !stack.is_empty() {
            return Err(CallTreeError::UnclosedFrames { count: stack.len() });
        }
        Ok(Self { roots })
    }

    /// Top-level frames in execution order.
    pub fn roots(&self) -> &[CallFrame] {
        &self.roots
    }

    /// The entry call's frame.
    pub fn entry(&self) -> &CallFrame {
        &self.roots[0]
    }

    /// Total number of frames in the tree.
    pub fn frame_count(&self) -> usize {
        self.roots.iter().map(CallFrame::count).sum()
    }

    /// Maximum nesting depth.
    pub fn depth(&self) -> usize {
        self.roots.iter().map(CallFrame::depth).max().unwrap_or(0)
    }
}
