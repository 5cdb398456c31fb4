//! Decision node - conditional branching
//!
//! Evaluates the node's `condition` against the run context and keeps only
//! the candidates wired to the matching `"true"`/`"false"` source handle.
//! Discarded branches never leave `idle`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::engine::error::ProcessError;
use crate::graph::{Node, NodeKind};

use super::condition::evaluate_condition;
use super::registry::{
    NodeDetails, NodeMetadata, NodeOutputs, NodeProcess, OutputField, ProcessArgs,
};

struct DecisionProcess;

#[async_trait]
impl NodeProcess for DecisionProcess {
    async fn process(&self, args: ProcessArgs<'_>) -> Result<Vec<Node>, ProcessError> {
        let node = args.node;
        let condition = node
            .data_str("condition")
            .ok_or_else(|| ProcessError::missing_field(&node.id, "condition"))?;

        let outcome = evaluate_condition(condition, args.context).await?;
        let chosen_handle = if outcome { "true" } else { "false" };

        // Targets wired to the chosen handle; edges without a handle are
        // followed regardless of the outcome.
        let chosen: HashSet<&str> = args
            .out_edges
            .iter()
            .filter(|edge| {
                edge.source_handle
                    .as_deref()
                    .map(|handle| handle == chosen_handle)
                    .unwrap_or(true)
            })
            .map(|edge| edge.target.as_str())
            .collect();

        let next: Vec<Node> = args
            .candidates
            .iter()
            .filter(|candidate| chosen.contains(candidate.id.as_str()))
            .cloned()
            .collect();

        args.context.set(&node.id, "result", json!(outcome)).await;
        debug!(node_id = %node.id, condition, outcome, kept = next.len(), "decision evaluated");
        args.stats.log(
            &node.id,
            "decision node",
            json!({
                "condition": condition,
                "result": outcome,
                "kept": next.iter().map(|n| n.id.clone()).collect::<Vec<_>>(),
            }),
        );

        Ok(next)
    }
}

fn outputs(node: &Node, slot: &serde_json::Map<String, serde_json::Value>) -> NodeOutputs {
    let mut outputs = NodeOutputs::new();
    outputs.insert(
        "result".to_string(),
        OutputField {
            title: "Condition result".to_string(),
            description: node.data_str("condition").map(String::from),
            value: slot.get("result").cloned(),
        },
    );
    outputs
}

pub fn details() -> NodeDetails {
    NodeDetails {
        metadata: NodeMetadata {
            kind: NodeKind::Decision,
            name: "Decision".to_string(),
            description: "Branch on a condition over the run context".to_string(),
            tags: vec!["flow".to_string(), "branch".to_string()],
            addable: true,
        },
        process: Arc::new(DecisionProcess),
        outputs: Some(outputs),
        on_disconnect: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::engine::context::RunContext;
    use crate::engine::events::EventBus;
    use crate::engine::stats::StatsCollector;
    use crate::graph::Edge;

    async fn run_decision(
        condition: Option<&str>,
        ctx: &RunContext,
    ) -> Result<Vec<Node>, ProcessError> {
        let stats = StatsCollector::new(EventBus::new());
        let config = RunConfig::new();
        let mut node = Node::new("d", NodeKind::Decision);
        if let Some(condition) = condition {
            node = node.with_data("condition", json!(condition));
        }
        let candidates = vec![Node::new("yes", NodeKind::Prompt), Node::new("no", NodeKind::Prompt)];
        let out_edges = vec![
            Edge::new("d", "yes").with_source_handle("true"),
            Edge::new("d", "no").with_source_handle("false"),
        ];

        details()
            .process
            .process(ProcessArgs {
                context: ctx,
                node: &node,
                candidates: &candidates,
                predecessors: &[],
                out_edges: &out_edges,
                stats: &stats,
                config: &config,
            })
            .await
    }

    #[tokio::test]
    async fn test_true_branch_keeps_true_handle_targets() {
        let ctx = RunContext::new();
        ctx.set("p1", "count", json!(5)).await;

        let next = run_decision(Some("p1.count > 3"), &ctx).await.unwrap();

        let ids: Vec<_> = next.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["yes"]);
        assert_eq!(ctx.get_value("d", "result").await, Some(json!(true)));
    }

    #[tokio::test]
    async fn test_false_branch_keeps_false_handle_targets() {
        let ctx = RunContext::new();
        ctx.set("p1", "count", json!(1)).await;

        let next = run_decision(Some("p1.count > 3"), &ctx).await.unwrap();

        let ids: Vec<_> = next.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["no"]);
    }

    #[tokio::test]
    async fn test_missing_condition_is_process_error() {
        let ctx = RunContext::new();
        let err = run_decision(None, &ctx).await.unwrap_err();
        assert!(matches!(err, ProcessError::MissingField { .. }));
    }

    #[tokio::test]
    async fn test_malformed_condition_is_process_error() {
        let ctx = RunContext::new();
        let err = run_decision(Some("not a reference"), &ctx).await.unwrap_err();
        assert!(matches!(err, ProcessError::Condition(_)));
    }
}
