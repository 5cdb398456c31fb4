//! Node type catalog
//!
//! This module contains:
//! - `registry` - The type tag → `NodeDetails` dispatch table and the
//!   `NodeProcess` contract
//! - `condition` - Condition evaluation for decision nodes
//! - One module per built-in node type: `start`, `prompt`, `multi_thread`,
//!   `thread_merge`, `decision`

pub mod condition;
pub mod decision;
pub mod multi_thread;
pub mod prompt;
pub mod registry;
pub mod start;
pub mod thread_merge;

pub use condition::{evaluate_condition, ConditionError};
pub use registry::{
    NodeDetails, NodeMetadata, NodeOutputs, NodeProcess, NodeRegistry, OnDisconnect, OutputField,
    OutputsFn, ProcessArgs,
};
