//! Metric collection: samples in, summaries out.

mod collector;
mod histogram;

pub use collector::{MetricCollector, MetricSummary, Sample};
pub use histogram::{LatencyHistogram, MAX_TRACKABLE_US};

/// Every scripted HTTP operation
pub const HTTP_REQS: &str = "http_reqs";
/// Credential exchanges
pub const AUTH: &str = "auth";
/// Finished iterations (value = iteration wall time)
pub const ITERATIONS: &str = "iterations";
/// Setup health check
pub const SETUP: &str = "setup";
/// Concurrency shortfall per tick
pub const SCHEDULER_FAILURES: &str = "scheduler_failures";
