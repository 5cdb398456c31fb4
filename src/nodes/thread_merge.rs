//! Thread-merge node - fan-in point
//!
//! The walker holds this node in `waiting` until every counted predecessor
//! branch has delivered; by the time the process function runs, all upstream
//! slots are final. The documented exception to the own-slot-only rule:
//! this node reads the slots of the nodes that feed it and aggregates them
//! into its own, keyed `<source_id>.<key>`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::engine::error::ProcessError;
use crate::graph::{Node, NodeKind};

use super::registry::{
    NodeDetails, NodeMetadata, NodeOutputs, NodeProcess, OutputField, ProcessArgs,
};

struct ThreadMergeProcess;

#[async_trait]
impl NodeProcess for ThreadMergeProcess {
    async fn process(&self, args: ProcessArgs<'_>) -> Result<Vec<Node>, ProcessError> {
        let node = args.node;
        let mut merged = 0usize;

        for predecessor in args.predecessors {
            let Some(slot) = args.context.get(&predecessor.id).await else {
                // Predecessor failed or was pruned before writing anything.
                continue;
            };
            merged += 1;
            for (key, value) in slot {
                args.context
                    .set(&node.id, &format!("{}.{}", predecessor.id, key), value)
                    .await;
            }
        }

        args.context.set(&node.id, "merged", json!(merged)).await;
        debug!(node_id = %node.id, merged, "merged predecessor slots");
        args.stats.log(
            &node.id,
            "thread merge node",
            json!({ "merged": merged, "expected": args.predecessors.len() }),
        );
        Ok(args.candidates.to_vec())
    }
}

fn outputs(_node: &Node, slot: &serde_json::Map<String, serde_json::Value>) -> NodeOutputs {
    let mut outputs = NodeOutputs::new();
    outputs.insert(
        "merged".to_string(),
        OutputField {
            title: "Merged branches".to_string(),
            description: None,
            value: slot.get("merged").cloned(),
        },
    );
    outputs
}

/// Drop the disconnected neighbor from this node's `sources` list, which the
/// editor maintains as edges are drawn.
fn on_disconnect(node: &mut Node, other: &mut Node) {
    if let Some(serde_json::Value::Array(sources)) = node.data.get_mut("sources") {
        sources.retain(|source| source.as_str() != Some(other.id.as_str()));
    }
}

pub fn details() -> NodeDetails {
    NodeDetails {
        metadata: NodeMetadata {
            kind: NodeKind::ThreadMerge,
            name: "Thread Merge".to_string(),
            description: "Wait for every incoming branch, then continue".to_string(),
            tags: vec!["flow".to_string(), "parallel".to_string()],
            addable: true,
        },
        process: Arc::new(ThreadMergeProcess),
        outputs: Some(outputs),
        on_disconnect: Some(on_disconnect),
    }
}
