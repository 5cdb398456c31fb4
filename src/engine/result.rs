//! Run result types

use std::collections::HashMap;

use serde::Serialize;

use crate::engine::stats::StatsSnapshot;
use crate::graph::NodeState;

/// Summary of one end-to-end run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: String,
    /// True when no reachable node ended `Failed`.
    pub success: bool,
    /// True when the run was stopped by the cancellation signal.
    pub cancelled: bool,
    /// Final lifecycle state of every node in the graph.
    pub states: HashMap<String, NodeState>,
    pub stats: StatsSnapshot,
}

impl RunResult {
    pub fn state(&self, node_id: &str) -> NodeState {
        self.states.get(node_id).copied().unwrap_or_default()
    }

    pub fn failed_nodes(&self) -> Vec<&str> {
        let mut failed: Vec<&str> = self
            .states
            .iter()
            .filter(|(_, state)| **state == NodeState::Failed)
            .map(|(id, _)| id.as_str())
            .collect();
        failed.sort_unstable();
        failed
    }
}
