//! Per-run configuration
//!
//! Settings the editor's settings dialog collects are passed explicitly into
//! the walker at run start rather than living in ambient process state, so
//! runs stay reproducible and testable in isolation.

use std::time::Duration;

/// Configuration for one run.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// OpenAI API key used by prompt nodes. Absent keys outside developer
    /// mode fail the prompt node, not the run.
    pub api_key: Option<String>,

    /// Developer mode: prompt nodes simulate model calls instead of hitting
    /// the API.
    pub dev_mode: bool,

    /// Upper bound on how long a node may sit blocked on a join barrier.
    /// `None` waits indefinitely.
    pub join_timeout: Option<Duration>,

    /// Cap on simultaneously running node processes. `None` is unbounded.
    pub max_concurrency: Option<usize>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = Some(timeout);
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }
}
