//! Node registry and the process contract
//!
//! A static catalog mapping each node type tag to its process function,
//! display metadata, and edit-time hooks. Resolved once at startup; lookup of
//! an unregistered type is a configuration error and fails the run before
//! scheduling begins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::RunConfig;
use crate::engine::context::RunContext;
use crate::engine::error::{EngineError, ProcessError};
use crate::engine::stats::StatsCollector;
use crate::graph::{Edge, Node, NodeKind};

/// Everything a process function may see while executing one node.
///
/// `candidates` are the statically-known successors along the node's counted
/// outgoing edges; the contract is to return the subset execution should
/// continue to. `predecessors` and `out_edges` are read-only views for the
/// merge and decision nodes.
pub struct ProcessArgs<'a> {
    pub context: &'a RunContext,
    pub node: &'a Node,
    pub candidates: &'a [Node],
    pub predecessors: &'a [Node],
    pub out_edges: &'a [Edge],
    pub stats: &'a StatsCollector,
    pub config: &'a RunConfig,
}

/// Async processing logic of one node type.
///
/// Implementations may suspend for arbitrary durations; the walker runs them
/// on independent tasks so a slow node never blocks a sibling branch. By
/// convention a process only writes to its own context slot.
#[async_trait]
pub trait NodeProcess: Send + Sync {
    async fn process(&self, args: ProcessArgs<'_>) -> Result<Vec<Node>, ProcessError>;
}

/// Display metadata surfaced to the editor's node palette.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub kind: NodeKind,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Whether the palette offers this type; the start node is placed once
    /// by the editor and not addable.
    pub addable: bool,
}

/// One field of a node's human-readable result snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct OutputField {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

pub type NodeOutputs = HashMap<String, OutputField>;

/// Produces a result snapshot for the UI from a node and its context slot.
pub type OutputsFn = fn(&Node, &serde_json::Map<String, Value>) -> NodeOutputs;

/// Edit-time hook invoked when an edge between `node` and `other` is
/// removed, letting a type clean up derived state in the data bags. Not part
/// of the run loop.
pub type OnDisconnect = fn(node: &mut Node, other: &mut Node);

/// Registry entry for one node type.
#[derive(Clone)]
pub struct NodeDetails {
    pub metadata: NodeMetadata,
    pub process: Arc<dyn NodeProcess>,
    pub outputs: Option<OutputsFn>,
    pub on_disconnect: Option<OnDisconnect>,
}

impl std::fmt::Debug for NodeDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDetails")
            .field("metadata", &self.metadata)
            .field("process", &"<dyn NodeProcess>")
            .field("outputs", &self.outputs.map(|_| "<fn>"))
            .field("on_disconnect", &self.on_disconnect.map(|_| "<fn>"))
            .finish()
    }
}

/// Catalog of node types, keyed by type tag.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    entries: HashMap<NodeKind, NodeDetails>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in node types.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(super::start::details());
        registry.register(super::prompt::details());
        registry.register(super::multi_thread::details());
        registry.register(super::thread_merge::details());
        registry.register(super::decision::details());
        registry
    }

    /// Add or replace the entry for a node type.
    pub fn register(&mut self, details: NodeDetails) {
        self.entries.insert(details.metadata.kind, details);
    }

    pub fn lookup(&self, kind: NodeKind) -> Result<&NodeDetails, EngineError> {
        self.entries
            .get(&kind)
            .ok_or(EngineError::UnknownNodeType(kind))
    }

    /// Metadata of the types the editor palette may add.
    pub fn addable_metadata(&self) -> Vec<&NodeMetadata> {
        let mut metadata: Vec<&NodeMetadata> = self
            .entries
            .values()
            .map(|details| &details.metadata)
            .filter(|m| m.addable)
            .collect();
        metadata.sort_by(|a, b| a.name.cmp(&b.name));
        metadata
    }
}
