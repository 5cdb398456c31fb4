//! Multi-thread node - fan-out point
//!
//! Returns every candidate successor; the walker schedules each as an
//! independent concurrent branch sharing the run context and stats.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::engine::error::ProcessError;
use crate::graph::{Node, NodeKind};

use super::registry::{NodeDetails, NodeMetadata, NodeProcess, ProcessArgs};

struct MultiThreadProcess;

#[async_trait]
impl NodeProcess for MultiThreadProcess {
    async fn process(&self, args: ProcessArgs<'_>) -> Result<Vec<Node>, ProcessError> {
        args.context
            .set(&args.node.id, "branches", json!(args.candidates.len()))
            .await;
        args.stats.log(
            &args.node.id,
            "multi thread node",
            json!({ "branches": args.candidates.len() }),
        );
        Ok(args.candidates.to_vec())
    }
}

pub fn details() -> NodeDetails {
    NodeDetails {
        metadata: NodeMetadata {
            kind: NodeKind::MultiThread,
            name: "Multi Thread".to_string(),
            description: "Run every outgoing branch concurrently".to_string(),
            tags: vec!["flow".to_string(), "parallel".to_string()],
            addable: true,
        },
        process: Arc::new(MultiThreadProcess),
        outputs: None,
        on_disconnect: None,
    }
}
