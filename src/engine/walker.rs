//! Graph walker - drives one run of a workflow graph
//!
//! The walker owns a signal-driven scheduling loop. Node processes run on
//! spawned tasks and report back over a channel; the loop keeps a per-node
//! edge account to resolve fan-in barriers and branch pruning:
//!
//! - a completing node delivers an *arrive* along each chosen outgoing edge
//!   and a *prune* along each discarded one; a failed node prunes everything
//! - a node spawns exactly once, when its account drains with at least one
//!   real arrival; draining with none leaves it `idle` forever and cascades
//!   prunes to its successors
//! - edges that close a cycle on a path from the start are excluded from the
//!   accounting, so the counted graph is acyclic and every run terminates
//!
//! Cancellation stops new spawns and lets in-flight work finish naturally.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::engine::context::RunContext;
use crate::engine::error::{EngineError, ProcessError};
use crate::engine::events::{EventBus, RunEvent};
use crate::engine::result::RunResult;
use crate::engine::state::StateTracker;
use crate::engine::stats::StatsCollector;
use crate::graph::{Edge, Graph, Node, NodeState};
use crate::nodes::{NodeRegistry, ProcessArgs};

/// Executes graphs against a node registry with per-run configuration.
pub struct Walker {
    registry: Arc<NodeRegistry>,
    config: Arc<RunConfig>,
    events: EventBus,
}

/// Report sent back by a node task when its process function returns.
struct TaskDone {
    node_id: String,
    outcome: Result<Vec<String>, ProcessError>,
}

/// Join/prune accounting for one node.
#[derive(Debug, Default)]
struct NodeAccount {
    /// Counted incoming edges that have not yet delivered a signal.
    remaining: usize,
    /// Counted incoming edges that delivered an arrival.
    arrived: usize,
    /// Set once the node has been handed to a task (or ruled out).
    spawned: bool,
    /// Set when the account drained with zero arrivals.
    dead: bool,
}

enum Signal {
    Arrive(String),
    Prune(String),
}

impl Walker {
    pub fn new(registry: Arc<NodeRegistry>, config: RunConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
            events: EventBus::new(),
        }
    }

    /// Subscribe to state transitions and log entries as they happen.
    pub fn events(&self) -> async_channel::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Run a graph to termination.
    pub async fn run(&self, graph: &Graph, start_id: &str) -> Result<RunResult, EngineError> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_with_cancel(graph, start_id, cancel_rx).await
    }

    /// Run a graph with a cancellation signal. Raising the signal stops new
    /// nodes from being scheduled; in-flight processes finish naturally and
    /// the run returns a normal result with `cancelled` set.
    #[instrument(skip(self, graph, cancel), fields(start = %start_id))]
    pub async fn run_with_cancel(
        &self,
        graph: &Graph,
        start_id: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunResult, EngineError> {
        let run_id = Uuid::new_v4().to_string();

        if !graph.contains(start_id) {
            return Err(EngineError::StartNodeNotFound(start_id.to_string()));
        }
        let reachable = graph.reachable_from(start_id);

        // Pre-flight: every reachable node must resolve in the registry.
        // A missing type is a configuration error and nothing gets scheduled.
        for node in graph.nodes() {
            if reachable.contains(&node.id) {
                self.registry.lookup(node.kind)?;
            }
        }

        info!(run_id = %run_id, nodes = graph.len(), reachable = reachable.len(), "starting run");

        let back = graph.back_edges(start_id);
        let mut accounts: HashMap<String, NodeAccount> = reachable
            .iter()
            .map(|id| (id.clone(), NodeAccount::default()))
            .collect();
        let mut counted_out: HashMap<String, Vec<usize>> = HashMap::new();
        let mut counted_in: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, edge) in graph.edges().iter().enumerate() {
            if back.contains(&idx)
                || !reachable.contains(&edge.source)
                || !reachable.contains(&edge.target)
            {
                continue;
            }
            counted_out.entry(edge.source.clone()).or_default().push(idx);
            counted_in.entry(edge.target.clone()).or_default().push(idx);
            if let Some(account) = accounts.get_mut(&edge.target) {
                account.remaining += 1;
            }
        }
        // The start node is seeded directly; nothing gates it.
        if let Some(account) = accounts.get_mut(start_id) {
            account.remaining = 0;
        }

        let tracker = Arc::new(StateTracker::new(self.events.clone()));
        let stats = Arc::new(StatsCollector::new(self.events.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut run = RunLoop {
            graph,
            registry: self.registry.as_ref(),
            config: self.config.clone(),
            context: RunContext::new(),
            stats: stats.clone(),
            tracker: tracker.clone(),
            accounts,
            counted_out,
            counted_in,
            tx,
            semaphore: self.config.max_concurrency.map(|n| Arc::new(Semaphore::new(n))),
            cancel: cancel.clone(),
            inflight: 0,
            waiting_since: HashMap::new(),
        };

        run.deliver(VecDeque::from([Signal::Arrive(start_id.to_string())]));

        let mut sweeper = self.config.join_timeout.map(|timeout| {
            tokio::time::interval((timeout / 4).max(Duration::from_millis(10)))
        });

        while run.inflight > 0 {
            match &mut sweeper {
                Some(interval) => {
                    tokio::select! {
                        maybe = rx.recv() => match maybe {
                            Some(done) => run.on_done(done),
                            None => break,
                        },
                        _ = interval.tick() => {
                            if let Some(timeout) = self.config.join_timeout {
                                run.sweep(timeout);
                            }
                        }
                    }
                }
                None => match rx.recv().await {
                    Some(done) => run.on_done(done),
                    None => break,
                },
            }
        }

        let cancelled = *cancel.borrow();
        let mut states: HashMap<String, NodeState> = graph
            .nodes()
            .iter()
            .map(|node| (node.id.clone(), NodeState::Idle))
            .collect();
        states.extend(tracker.snapshot());
        let success = !states.values().any(|state| *state == NodeState::Failed);

        info!(run_id = %run_id, success, cancelled, "run finished");

        Ok(RunResult {
            run_id,
            success,
            cancelled,
            states,
            stats: stats.snapshot(),
        })
    }
}

/// Mutable scheduling state of one run.
struct RunLoop<'g> {
    graph: &'g Graph,
    registry: &'g NodeRegistry,
    config: Arc<RunConfig>,
    context: RunContext,
    stats: Arc<StatsCollector>,
    tracker: Arc<StateTracker>,
    accounts: HashMap<String, NodeAccount>,
    counted_out: HashMap<String, Vec<usize>>,
    counted_in: HashMap<String, Vec<usize>>,
    tx: mpsc::UnboundedSender<TaskDone>,
    semaphore: Option<Arc<Semaphore>>,
    cancel: watch::Receiver<bool>,
    inflight: usize,
    waiting_since: HashMap<String, Instant>,
}

impl RunLoop<'_> {
    /// Handle a finished node task: record its terminal state and signal its
    /// counted outgoing edges.
    fn on_done(&mut self, done: TaskDone) {
        self.inflight -= 1;
        let mut signals = VecDeque::new();

        match done.outcome {
            Ok(chosen) => {
                self.tracker.transition(&done.node_id, NodeState::Completed);
                let chosen: HashSet<String> = chosen.into_iter().collect();
                for &idx in self.counted_edges_out(&done.node_id) {
                    let target = self.graph.edge(idx).target.clone();
                    if chosen.contains(&target) {
                        signals.push_back(Signal::Arrive(target));
                    } else {
                        signals.push_back(Signal::Prune(target));
                    }
                }
            }
            Err(err) => {
                self.tracker.transition(&done.node_id, NodeState::Failed);
                error!(node_id = %done.node_id, error = %err, "node failed");
                self.stats.log(
                    &done.node_id,
                    "node failed",
                    json!({ "error": err.to_string() }),
                );
                for &idx in self.counted_edges_out(&done.node_id) {
                    signals.push_back(Signal::Prune(self.graph.edge(idx).target.clone()));
                }
            }
        }

        self.deliver(signals);
    }

    /// Drain a signal worklist, spawning nodes whose accounts drain with at
    /// least one arrival and cascading prunes through dead ones.
    fn deliver(&mut self, mut queue: VecDeque<Signal>) {
        while let Some(signal) = queue.pop_front() {
            match signal {
                Signal::Arrive(id) => {
                    let ready = {
                        let Some(account) = self.accounts.get_mut(&id) else {
                            continue;
                        };
                        if account.spawned || account.dead {
                            // Idempotent scheduling: re-reached nodes are
                            // not run again.
                            continue;
                        }
                        if account.arrived == 0 {
                            self.tracker.transition(&id, NodeState::Waiting);
                            self.waiting_since.insert(id.clone(), Instant::now());
                        }
                        account.arrived += 1;
                        account.remaining = account.remaining.saturating_sub(1);
                        account.remaining == 0
                    };
                    if ready {
                        self.spawn_node(&id);
                    }
                }
                Signal::Prune(id) => {
                    enum Outcome {
                        Ignore,
                        Spawn,
                        Dead,
                    }
                    let outcome = {
                        let Some(account) = self.accounts.get_mut(&id) else {
                            continue;
                        };
                        if account.spawned || account.dead {
                            continue;
                        }
                        account.remaining = account.remaining.saturating_sub(1);
                        if account.remaining > 0 {
                            Outcome::Ignore
                        } else if account.arrived > 0 {
                            // Remaining branches are gone but at least one
                            // arrived; the barrier is satisfied.
                            Outcome::Spawn
                        } else {
                            account.dead = true;
                            Outcome::Dead
                        }
                    };
                    match outcome {
                        Outcome::Ignore => {}
                        Outcome::Spawn => self.spawn_node(&id),
                        Outcome::Dead => {
                            debug!(node_id = %id, "branch pruned");
                            for &idx in self.counted_edges_out(&id) {
                                queue.push_back(Signal::Prune(
                                    self.graph.edge(idx).target.clone(),
                                ));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Hand a ready node to a task. Skipped (but still marked) when the
    /// cancellation signal is raised.
    fn spawn_node(&mut self, id: &str) {
        if let Some(account) = self.accounts.get_mut(id) {
            account.spawned = true;
        }
        self.waiting_since.remove(id);

        if *self.cancel.borrow() {
            debug!(node_id = %id, "cancellation raised, not scheduling");
            return;
        }
        let Some(node) = self.graph.node(id).cloned() else {
            return;
        };
        let Ok(details) = self.registry.lookup(node.kind) else {
            // Pre-flight validation resolves every reachable type.
            return;
        };

        let process = details.process.clone();
        let candidates = self.neighbor_nodes(self.counted_edges_out(id), |edge| &edge.target);
        let predecessors = self.neighbor_nodes(self.counted_edges_in(id), |edge| &edge.source);
        let out_edges: Vec<Edge> = self
            .counted_edges_out(id)
            .iter()
            .map(|&idx| self.graph.edge(idx).clone())
            .collect();

        let context = self.context.clone();
        let stats = self.stats.clone();
        let config = self.config.clone();
        let tracker = self.tracker.clone();
        let semaphore = self.semaphore.clone();
        let tx = self.tx.clone();
        let node_id = id.to_string();

        self.inflight += 1;
        debug!(node_id = %id, inflight = self.inflight, "scheduling node");

        tokio::spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            tracker.transition(&node_id, NodeState::Running);
            let result = process
                .process(ProcessArgs {
                    context: &context,
                    node: &node,
                    candidates: &candidates,
                    predecessors: &predecessors,
                    out_edges: &out_edges,
                    stats: &stats,
                    config: &config,
                })
                .await;
            let outcome = result.map(|nodes| nodes.into_iter().map(|n| n.id).collect());
            let _ = tx.send(TaskDone { node_id, outcome });
        });
    }

    /// Fail nodes that have sat blocked on a join barrier past the bound.
    fn sweep(&mut self, timeout: Duration) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .waiting_since
            .iter()
            .filter(|(_, &since)| now.duration_since(since) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            self.waiting_since.remove(&id);
            let stuck = {
                let Some(account) = self.accounts.get_mut(&id) else {
                    continue;
                };
                if account.spawned || account.dead {
                    continue;
                }
                account.spawned = true;
                true
            };
            if stuck {
                warn!(node_id = %id, ?timeout, "join barrier timed out");
                self.tracker.transition(&id, NodeState::Failed);
                self.stats.log(
                    &id,
                    "join timeout",
                    json!({ "timeoutMs": timeout.as_millis() as u64 }),
                );
                let prunes: VecDeque<Signal> = self
                    .counted_edges_out(&id)
                    .iter()
                    .map(|&idx| Signal::Prune(self.graph.edge(idx).target.clone()))
                    .collect();
                self.deliver(prunes);
            }
        }
    }

    fn counted_edges_out(&self, id: &str) -> &[usize] {
        self.counted_out.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn counted_edges_in(&self, id: &str) -> &[usize] {
        self.counted_in.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct neighbor nodes along the given edges, in first-edge order.
    fn neighbor_nodes(
        &self,
        edge_idxs: &[usize],
        pick: impl Fn(&Edge) -> &String,
    ) -> Vec<Node> {
        let mut seen = HashSet::new();
        edge_idxs
            .iter()
            .map(|&idx| pick(self.graph.edge(idx)))
            .filter(|id| seen.insert(id.to_string()))
            .filter_map(|id| self.graph.node(id).cloned())
            .collect()
    }
}
