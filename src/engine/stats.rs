//! Run statistics: usage counters and the trace log
//!
//! Counters are commutative sums, so lock-free atomic accumulation gives the
//! same totals under any branch interleaving. Log entries carry a per-run
//! sequence number; ordering is causal within a branch, interleaved across
//! branches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::engine::events::{EventBus, RunEvent};

/// One structured trace entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// Aggregated view of a run's stats, taken at the end of the run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub amount: f64,
    pub log: Vec<LogEntry>,
}

/// Per-run collector written by all branches concurrently.
#[derive(Debug)]
pub struct StatsCollector {
    tokens_in: AtomicU64,
    tokens_out: AtomicU64,
    /// Accrued in integer micro-dollars so addition stays commutative.
    amount_micros: AtomicU64,
    seq: AtomicU64,
    log: Mutex<Vec<LogEntry>>,
    events: EventBus,
}

impl StatsCollector {
    pub fn new(events: EventBus) -> Self {
        Self {
            tokens_in: AtomicU64::new(0),
            tokens_out: AtomicU64::new(0),
            amount_micros: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            log: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn add_tokens_in(&self, n: u64) {
        self.tokens_in.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_tokens_out(&self, n: u64) {
        self.tokens_out.fetch_add(n, Ordering::Relaxed);
    }

    /// Accrue a dollar amount. Negative amounts are ignored.
    pub fn add_amount(&self, dollars: f64) {
        if dollars > 0.0 {
            let micros = (dollars * 1_000_000.0).round() as u64;
            self.amount_micros.fetch_add(micros, Ordering::Relaxed);
        }
    }

    /// Append a trace entry and mirror it onto the event stream.
    pub fn log(&self, node_id: &str, message: impl Into<String>, details: Value) {
        let entry = LogEntry {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            node_id: node_id.to_string(),
            message: message.into(),
            details,
        };
        self.events.emit(RunEvent::Log(entry.clone()));
        self.log.lock().expect("stats log poisoned").push(entry);
    }

    pub fn tokens_in(&self) -> u64 {
        self.tokens_in.load(Ordering::Relaxed)
    }

    pub fn tokens_out(&self) -> u64 {
        self.tokens_out.load(Ordering::Relaxed)
    }

    pub fn amount(&self) -> f64 {
        self.amount_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let mut log = self.log.lock().expect("stats log poisoned").clone();
        log.sort_by_key(|entry| entry.seq);
        StatsSnapshot {
            tokens_in: self.tokens_in(),
            tokens_out: self.tokens_out(),
            amount: self.amount(),
            log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn collector() -> StatsCollector {
        StatsCollector::new(EventBus::new())
    }

    #[test]
    fn test_counters_accumulate() {
        let stats = collector();
        stats.add_tokens_in(100);
        stats.add_tokens_in(50);
        stats.add_tokens_out(30);
        stats.add_amount(0.0015);
        stats.add_amount(0.0005);

        assert_eq!(stats.tokens_in(), 150);
        assert_eq!(stats.tokens_out(), 30);
        assert!((stats.amount() - 0.002).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_concurrent_increments_sum() {
        let stats = Arc::new(collector());
        let mut handles = Vec::new();
        for _ in 0..2 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                stats.add_tokens_in(100);
                stats.add_tokens_in(50);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(stats.tokens_in(), 300);
    }

    #[test]
    fn test_log_sequence_is_ordered() {
        let stats = collector();
        stats.log("a", "first", Value::Null);
        stats.log("b", "second", json!({"k": 1}));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.log.len(), 2);
        assert_eq!(snapshot.log[0].message, "first");
        assert_eq!(snapshot.log[1].message, "second");
        assert!(snapshot.log[0].seq < snapshot.log[1].seq);
    }

    #[tokio::test]
    async fn test_log_mirrors_to_event_stream() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let stats = StatsCollector::new(bus);
        stats.log("p1", "prompt node", Value::Null);

        match rx.recv().await.unwrap() {
            RunEvent::Log(entry) => assert_eq!(entry.node_id, "p1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
