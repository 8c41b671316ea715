//! Surge: load-test execution engine for HTTP services
//!
//! Surge drives a population of virtual users against a target service,
//! following a piecewise ramp profile, and judges the run with declarative
//! thresholds over streaming latency and error statistics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  target(t)  ┌──────────┐  spawn/retire  ┌──────────┐
//! │ Ramp     │────────────►│ Test     │───────────────►│ Sessions │
//! │ Scheduler│             │ Runner   │                │ (tokio)  │
//! └──────────┘             └────┬─────┘                └────┬─────┘
//!                               │ summaries                 │ samples
//!                          ┌────▼─────┐               ┌─────▼────┐
//!                          │Thresholds│◄──────────────│Collector │
//!                          └──────────┘               └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use surge::{Operation, Scenario};
//!
//! # async fn demo() {
//! let scenario = Scenario::new("smoke")
//!     .with_stage(Duration::from_secs(10), 5)
//!     .with_step(Operation::get("health", "/api/health"))
//!     .with_threshold("http_reqs", "p(95)<500");
//! let report = surge::start(&scenario, "http://localhost:8080", None, None).await;
//! assert!(report.overall_pass);
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Credential acquisition
pub mod auth;
mod breaking;
mod client;
mod config;
/// Human-readable durations
pub mod duration;
/// Samples, histograms and summaries
pub mod metrics;
mod report;
mod result;
mod runner;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod scenario;
mod schedule;
mod session;
mod template;
/// Threshold expression language
pub mod threshold;

pub use auth::{AuthError, AuthToken, Credentials, LoginEndpoint, StaticToken, TokenSource};
pub use breaking::BreakingPointDetector;
pub use client::{ClientError, OutgoingRequest, TargetClient, TimedResponse};
pub use config::{RunnerConfig, DEFAULT_USER_AGENT};
pub use metrics::{MetricCollector, MetricSummary, Sample};
pub use report::{BreakingPoint, EndReason, RunReport};
pub use result::{SurgeError, SurgeResult};
pub use runner::{start, TestRunner};
pub use scenario::{
    AuthConfig, BreakingPointConfig, Branch, HealthCheck, HttpMethod, Operation, Scenario, Stage,
    Step, ThinkTime, ThresholdSpec,
};
pub use schedule::{RampScheduler, StagePlan};
pub use session::{IterationEnd, Session, SessionContext, SessionOutcome};
pub use template::TemplateVars;
pub use threshold::{Threshold, ThresholdParseError, ThresholdResult};
