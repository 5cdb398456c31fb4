//! Start node - run entry point

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::engine::error::ProcessError;
use crate::graph::{Node, NodeKind};

use super::registry::{NodeDetails, NodeMetadata, NodeProcess, ProcessArgs};

struct StartProcess;

#[async_trait]
impl NodeProcess for StartProcess {
    async fn process(&self, args: ProcessArgs<'_>) -> Result<Vec<Node>, ProcessError> {
        debug!(node_id = %args.node.id, "start node entered");
        args.stats.log(
            &args.node.id,
            "start node",
            json!({ "next": args.candidates.len() }),
        );
        Ok(args.candidates.to_vec())
    }
}

pub fn details() -> NodeDetails {
    NodeDetails {
        metadata: NodeMetadata {
            kind: NodeKind::Start,
            name: "Start".to_string(),
            description: "Entry point of the workflow".to_string(),
            tags: vec!["flow".to_string()],
            addable: false,
        },
        process: Arc::new(StartProcess),
        outputs: None,
        on_disconnect: None,
    }
}
