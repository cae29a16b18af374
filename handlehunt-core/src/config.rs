use handlehunt_scanner::prober::{DEFAULT_PROBE_TIMEOUT, DEFAULT_USER_AGENT};
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 32;

/// Tunables for a [`ScanEngine`](crate::engine::ScanEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of probe workers per scan; never more than this many requests
    /// are in flight for one handle.
    pub concurrency: usize,
    pub probe_timeout: Duration,
    pub user_agent: String,
}

impl EngineConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
