//! Runner configuration

use crate::duration::human;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("surge/", env!("CARGO_PKG_VERSION"));

/// Knobs that are not part of a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// How often the runner reconciles concurrency
    #[serde(with = "human")]
    pub tick_interval: Duration,
    /// How long retired sessions may take to finish at teardown
    #[serde(with = "human")]
    pub grace_period: Duration,
    /// Default per-request timeout
    #[serde(with = "human")]
    pub request_timeout: Duration,
    /// Hard cap on live sessions
    pub max_sessions: usize,
    /// User agent header
    pub user_agent: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            max_sessions: 10_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl RunnerConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set tick interval
    #[must_use]
    pub const fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval = tick;
        self
    }

    /// Set teardown grace period
    #[must_use]
    pub const fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set default request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set session cap
    #[must_use]
    pub const fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set user agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
