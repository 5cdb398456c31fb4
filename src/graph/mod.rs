//! Graph snapshot handed to the engine at run start
//!
//! This module contains:
//! - `node` - Node identity, type tags, and lifecycle states
//! - `edge` - Directed edges with port handles
//! - `Graph` - The validated node/edge set with adjacency indexes
//!
//! The engine borrows an immutable `Graph` for the duration of a run; the
//! editing layer owns the mutable representation and exports snapshots as
//! JSON (`Graph::from_json`).

pub mod edge;
pub mod node;

pub use edge::Edge;
pub use node::{Node, NodeKind, NodeState};

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Edge '{edge}' references unknown node '{node}'")]
    UnknownEdgeEndpoint { edge: String, node: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct GraphExport {
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// A validated directed graph of typed nodes.
///
/// Construction rejects duplicate node ids and edges with dangling endpoints;
/// adjacency indexes are built once so the walker can resolve successors and
/// predecessors without scanning the edge list.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    by_id: HashMap<String, usize>,
    outgoing: HashMap<String, Vec<usize>>,
    incoming: HashMap<String, Vec<usize>>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, GraphError> {
        let mut by_id = HashMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            if by_id.insert(node.id.clone(), idx).is_some() {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
        }

        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, edge) in edges.iter().enumerate() {
            for endpoint in [&edge.source, &edge.target] {
                if !by_id.contains_key(endpoint) {
                    return Err(GraphError::UnknownEdgeEndpoint {
                        edge: edge.id.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
            outgoing.entry(edge.source.clone()).or_default().push(idx);
            incoming.entry(edge.target.clone()).or_default().push(idx);
        }

        Ok(Self {
            nodes,
            edges,
            by_id,
            outgoing,
            incoming,
        })
    }

    /// Parse the editor's serialized export: `{"nodes": [...], "edges": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let export: GraphExport = serde_json::from_str(json)?;
        Self::new(export.nodes, export.edges)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.by_id.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, idx: usize) -> &Edge {
        &self.edges[idx]
    }

    /// Indexes of edges leaving `id`, in edge-list order.
    pub fn out_edges(&self, id: &str) -> &[usize] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Indexes of edges entering `id`, in edge-list order.
    pub fn in_edges(&self, id: &str) -> &[usize] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct successor nodes of `id`, in first-edge order.
    pub fn successors(&self, id: &str) -> Vec<&Node> {
        self.neighbors(self.out_edges(id), |edge| &edge.target)
    }

    /// Distinct predecessor nodes of `id`, in first-edge order.
    pub fn predecessors(&self, id: &str) -> Vec<&Node> {
        self.neighbors(self.in_edges(id), |edge| &edge.source)
    }

    fn neighbors<'a>(
        &'a self,
        edge_idxs: &[usize],
        pick: impl Fn(&'a Edge) -> &'a String,
    ) -> Vec<&'a Node> {
        let mut seen = HashSet::new();
        edge_idxs
            .iter()
            .map(|&idx| pick(&self.edges[idx]))
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| self.node(id))
            .collect()
    }

    /// Node ids reachable from `start` by following edges forward,
    /// including `start` itself.
    pub fn reachable_from(&self, start: &str) -> HashSet<String> {
        let mut reachable = HashSet::new();
        if !self.contains(start) {
            return reachable;
        }
        let mut queue = VecDeque::from([start.to_string()]);
        reachable.insert(start.to_string());
        while let Some(id) = queue.pop_front() {
            for &idx in self.out_edges(&id) {
                let target = &self.edges[idx].target;
                if reachable.insert(target.clone()) {
                    queue.push_back(target.clone());
                }
            }
        }
        reachable
    }

    /// Edge indexes that close a cycle on some path from `start`.
    ///
    /// Classified by an iterative DFS: an edge into a node still on the
    /// current DFS stack is a back edge. The walker excludes these from join
    /// accounting so cyclic graphs cannot deadlock a barrier.
    pub fn back_edges(&self, start: &str) -> HashSet<usize> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut back = HashSet::new();
        if !self.contains(start) {
            return back;
        }

        let mut color: HashMap<&str, Color> = HashMap::new();
        // Stack of (node, next out-edge position) frames.
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        color.insert(start, Color::Gray);

        while let Some(&mut (id, ref mut pos)) = stack.last_mut() {
            let edges = self.out_edges(id);
            if *pos >= edges.len() {
                color.insert(id, Color::Black);
                stack.pop();
                continue;
            }
            let edge_idx = edges[*pos];
            *pos += 1;

            let target = self.edges[edge_idx].target.as_str();
            match color.get(target).copied().unwrap_or(Color::White) {
                Color::White => {
                    color.insert(target, Color::Gray);
                    stack.push((target, 0));
                }
                Color::Gray => {
                    back.insert(edge_idx);
                }
                Color::Black => {}
            }
        }

        back
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Graph {
        Graph::new(
            vec![
                Node::new("s", NodeKind::Start),
                Node::new("a", NodeKind::Prompt),
                Node::new("b", NodeKind::Prompt),
                Node::new("m", NodeKind::ThreadMerge),
            ],
            vec![
                Edge::new("s", "a"),
                Edge::new("s", "b"),
                Edge::new("a", "m"),
                Edge::new("b", "m"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_node_id() {
        let result = Graph::new(
            vec![Node::new("x", NodeKind::Start), Node::new("x", NodeKind::Prompt)],
            vec![],
        );
        assert!(matches!(result, Err(GraphError::DuplicateNodeId(_))));
    }

    #[test]
    fn test_dangling_edge() {
        let result = Graph::new(
            vec![Node::new("a", NodeKind::Start)],
            vec![Edge::new("a", "ghost")],
        );
        assert!(matches!(
            result,
            Err(GraphError::UnknownEdgeEndpoint { .. })
        ));
    }

    #[test]
    fn test_successors_and_predecessors() {
        let graph = diamond();
        let succ: Vec<_> = graph.successors("s").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(succ, vec!["a", "b"]);
        let pred: Vec<_> = graph.predecessors("m").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(pred, vec!["a", "b"]);
    }

    #[test]
    fn test_parallel_edges_dedup_neighbors() {
        let graph = Graph::new(
            vec![Node::new("a", NodeKind::Start), Node::new("b", NodeKind::Prompt)],
            vec![Edge::new("a", "b"), Edge::new("a", "b")],
        )
        .unwrap();
        assert_eq!(graph.successors("a").len(), 1);
        assert_eq!(graph.out_edges("a").len(), 2);
    }

    #[test]
    fn test_reachability_ignores_detached_nodes() {
        let graph = Graph::new(
            vec![
                Node::new("s", NodeKind::Start),
                Node::new("a", NodeKind::Prompt),
                Node::new("island", NodeKind::Prompt),
            ],
            vec![Edge::new("s", "a")],
        )
        .unwrap();
        let reachable = graph.reachable_from("s");
        assert!(reachable.contains("s"));
        assert!(reachable.contains("a"));
        assert!(!reachable.contains("island"));
    }

    #[test]
    fn test_back_edge_classification() {
        let graph = Graph::new(
            vec![
                Node::new("s", NodeKind::Start),
                Node::new("a", NodeKind::Prompt),
                Node::new("b", NodeKind::Prompt),
            ],
            vec![Edge::new("s", "a"), Edge::new("a", "b"), Edge::new("b", "a")],
        )
        .unwrap();
        let back = graph.back_edges("s");
        assert_eq!(back.len(), 1);
        assert!(back.contains(&2)); // b -> a closes the cycle
    }

    #[test]
    fn test_diamond_has_no_back_edges() {
        assert!(diamond().back_edges("s").is_empty());
    }

    #[test]
    fn test_from_json_editor_export() {
        let graph = Graph::from_json(
            r#"{
                "nodes": [
                    {"id": "start-1", "type": "start", "data": {}},
                    {"id": "d1", "type": "decision", "data": {"condition": "start-1.ok"}},
                    {"id": "p1", "type": "prompt", "data": {"prompt": "hello"}}
                ],
                "edges": [
                    {"id": "e1", "source": "start-1", "target": "d1"},
                    {"id": "e2", "source": "d1", "sourceHandle": "true", "target": "p1"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.node("d1").unwrap().kind, NodeKind::Decision);
        let idx = graph.out_edges("d1")[0];
        assert_eq!(graph.edge(idx).source_handle.as_deref(), Some("true"));
    }
}
