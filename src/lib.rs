//! # Threadflow
//!
//! The workflow graph execution engine behind a visual prompt-flow editor.
//! The engine walks a directed graph of typed nodes, invokes each node's
//! async process function, propagates a shared run context between nodes,
//! forks concurrent branches at fan-outs, and joins them again at merges.
//!
//! ## Features
//!
//! - **Typed node registry** - start, prompt, multi-thread, thread-merge,
//!   and decision nodes, each with display metadata for the editor
//! - **Concurrent branches** - fan-outs run as independent tasks sharing one
//!   run context and stats collector
//! - **Join barriers** - a merge node runs exactly once, after every live
//!   incoming branch has delivered
//! - **Partial-failure semantics** - a failing node prunes its own lineage;
//!   sibling branches keep running
//! - **Live events** - state transitions and log entries stream to the UI
//!   while the run is in flight
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use threadflow::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let graph = Graph::from_json(
//!         r#"{
//!             "nodes": [
//!                 {"id": "start-1", "type": "start", "data": {}},
//!                 {"id": "p1", "type": "prompt",
//!                  "data": {"prompt": "Say hello", "model": "gpt-4o"}}
//!             ],
//!             "edges": [
//!                 {"id": "e1", "source": "start-1", "target": "p1"}
//!             ]
//!         }"#,
//!     )?;
//!
//!     let registry = Arc::new(NodeRegistry::builtin());
//!     let walker = Walker::new(registry, RunConfig::new().with_dev_mode(true));
//!     let result = walker.run(&graph, "start-1").await?;
//!
//!     println!("run {} success={}", result.run_id, result.success);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod graph;
pub mod nodes;

// Re-export main types
pub use config::RunConfig;
pub use engine::{
    EngineError, EventBus, LogEntry, ProcessError, RunContext, RunEvent, RunResult, StateTracker,
    StatsCollector, StatsSnapshot, Walker,
};
pub use graph::{Edge, Graph, GraphError, Node, NodeKind, NodeState};
pub use nodes::{
    NodeDetails, NodeMetadata, NodeOutputs, NodeProcess, NodeRegistry, OutputField, ProcessArgs,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::RunConfig;
    pub use crate::engine::{
        EngineError, ProcessError, RunContext, RunEvent, RunResult, StatsCollector, Walker,
    };
    pub use crate::graph::{Edge, Graph, Node, NodeKind, NodeState};
    pub use crate::nodes::{NodeDetails, NodeProcess, NodeRegistry, ProcessArgs};
}
