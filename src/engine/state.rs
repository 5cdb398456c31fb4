//! Per-node lifecycle tracking
//!
//! Owned by the walker; the UI only observes it through the event stream and
//! the final run result. Nodes without an entry are `Idle`.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::engine::events::{EventBus, RunEvent};
use crate::graph::NodeState;

#[derive(Debug)]
pub struct StateTracker {
    states: RwLock<HashMap<String, NodeState>>,
    events: EventBus,
}

impl StateTracker {
    pub fn new(events: EventBus) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Current state of a node; `Idle` until first transition.
    pub fn state(&self, node_id: &str) -> NodeState {
        self.states
            .read()
            .expect("state map poisoned")
            .get(node_id)
            .copied()
            .unwrap_or_default()
    }

    /// Record a transition and emit it. Returns the previous state.
    pub fn transition(&self, node_id: &str, to: NodeState) -> NodeState {
        let from = {
            let mut states = self.states.write().expect("state map poisoned");
            states.insert(node_id.to_string(), to).unwrap_or_default()
        };
        self.events.emit(RunEvent::StateChanged {
            node_id: node_id.to_string(),
            from,
            to,
            timestamp: Utc::now(),
        });
        from
    }

    /// Final per-node states for the run result.
    pub fn snapshot(&self) -> HashMap<String, NodeState> {
        self.states.read().expect("state map poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        let tracker = StateTracker::new(EventBus::new());
        assert_eq!(tracker.state("never-seen"), NodeState::Idle);
    }

    #[test]
    fn test_transition_returns_previous() {
        let tracker = StateTracker::new(EventBus::new());
        assert_eq!(tracker.transition("n1", NodeState::Waiting), NodeState::Idle);
        assert_eq!(
            tracker.transition("n1", NodeState::Running),
            NodeState::Waiting
        );
        assert_eq!(tracker.state("n1"), NodeState::Running);
    }

    #[tokio::test]
    async fn test_transitions_are_emitted() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let tracker = StateTracker::new(bus);

        tracker.transition("n1", NodeState::Waiting);

        match rx.recv().await.unwrap() {
            RunEvent::StateChanged { node_id, from, to, .. } => {
                assert_eq!(node_id, "n1");
                assert_eq!(from, NodeState::Idle);
                assert_eq!(to, NodeState::Waiting);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
