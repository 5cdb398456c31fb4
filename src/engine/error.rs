//! Engine error types

use crate::graph::{GraphError, NodeKind};

/// Errors that abort a run before any node is scheduled.
///
/// Node-level failures are not represented here; a failing process function
/// marks its node `Failed` and is contained to that branch.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("No node type '{0}' registered")]
    UnknownNodeType(NodeKind),

    #[error("Start node not found: {0}")]
    StartNodeNotFound(String),
}

/// Errors raised by a node's process function.
///
/// These mark the node `Failed` and prune its successors; sibling branches
/// continue independently.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Node '{node}' is missing required field '{field}'")]
    MissingField { node: String, field: String },

    #[error("No API key configured and developer mode is off")]
    MissingApiKey,

    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("Condition error: {0}")]
    Condition(#[from] crate::nodes::condition::ConditionError),

    #[error("API request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcessError {
    /// Shorthand for the missing-field case.
    pub fn missing_field(node: &str, field: &str) -> Self {
        Self::MissingField {
            node: node.to_string(),
            field: field.to_string(),
        }
    }
}
