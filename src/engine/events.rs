//! Run event stream consumed by the presentation layer
//!
//! The engine emits node state transitions and log appends as they happen so
//! a UI can render live status without polling. Events are fire-and-forget:
//! nothing in the engine waits on a subscriber.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::stats::LogEntry;
use crate::graph::NodeState;

/// One observable moment of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RunEvent {
    StateChanged {
        node_id: String,
        from: NodeState,
        to: NodeState,
        timestamp: DateTime<Utc>,
    },
    Log(LogEntry),
}

/// Outbound channel for [`RunEvent`]s.
///
/// Backed by an unbounded channel; `emit` never blocks and the bus keeps one
/// receiver alive so emitting without subscribers is harmless. Receivers
/// share a single queue, so the stream is meant for one consumer (the
/// presentation layer), which then fans out as it sees fit.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: async_channel::Sender<RunEvent>,
    rx: async_channel::Receiver<RunEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }

    pub fn subscribe(&self) -> async_channel::Receiver<RunEvent> {
        self.rx.clone()
    }

    pub fn emit(&self, event: RunEvent) {
        // Unbounded, so this only fails if the channel is closed.
        let _ = self.tx.try_send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
