//! Node types and lifecycle states

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of node types understood by the engine.
///
/// The tags match the type strings the editor writes into its graph export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Prompt,
    MultiThread,
    ThreadMerge,
    Decision,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::Prompt => "prompt",
            NodeKind::MultiThread => "multi_thread",
            NodeKind::ThreadMerge => "thread_merge",
            NodeKind::Decision => "decision",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a node within one run.
///
/// `Idle` nodes have not been reached; `Waiting` nodes are blocked on a join
/// barrier; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Idle,
    Waiting,
    Running,
    Completed,
    Failed,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Completed | NodeState::Failed)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Idle => "idle",
            NodeState::Waiting => "waiting",
            NodeState::Running => "running",
            NodeState::Completed => "completed",
            NodeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A single node of the workflow graph.
///
/// Lifecycle state is deliberately not stored here; the walker owns it and
/// surfaces it through the state tracker and the final run result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: NodeKind,

    /// Type-specific fields (prompt text, model name, condition, ...).
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    /// Fetch a data-bag field as a string slice.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// The display name configured in the editor, if any.
    pub fn name(&self) -> Option<&str> {
        self.data_str("name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_round_trip() {
        for kind in [
            NodeKind::Start,
            NodeKind::Prompt,
            NodeKind::MultiThread,
            NodeKind::ThreadMerge,
            NodeKind::Decision,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let back: NodeKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn test_node_deserializes_editor_shape() {
        let node: Node = serde_json::from_str(
            r#"{"id": "p1", "type": "prompt", "data": {"name": "Summarize", "model": "gpt-4o"}}"#,
        )
        .unwrap();
        assert_eq!(node.kind, NodeKind::Prompt);
        assert_eq!(node.name(), Some("Summarize"));
        assert_eq!(node.data_str("model"), Some("gpt-4o"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(NodeState::Completed.is_terminal());
        assert!(NodeState::Failed.is_terminal());
        assert!(!NodeState::Waiting.is_terminal());
        assert!(!NodeState::Idle.is_terminal());
    }
}
