//! Final outcome of a run.

use crate::metrics::MetricSummary;
use crate::threshold::ThresholdResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why the run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Schedule ran to the end
    Completed,
    /// Wall-clock budget expired
    TimeBudget,
    /// An abort-on-fail threshold failed
    ThresholdAbort,
    /// Stress mode found the breaking point
    BreakingPoint,
    /// Setup health check or preparation failed
    SetupFailed,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::TimeBudget => "time budget exhausted",
            Self::ThresholdAbort => "aborted by threshold",
            Self::BreakingPoint => "breaking point reached",
            Self::SetupFailed => "setup failed",
        };
        f.write_str(s)
    }
}

/// First concurrency level at which the error rate crossed the ceiling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakingPoint {
    /// Sessions running when detected
    pub concurrency: u32,
    /// Scheduler target when detected
    pub target: u32,
    /// Seconds since the run started
    pub elapsed_secs: f64,
    /// Error rate of the offending window
    pub error_rate: f64,
}

/// Immutable result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run id
    pub run_id: String,
    /// Scenario name
    pub scenario_id: String,
    /// Run start
    pub start_time: DateTime<Utc>,
    /// Run end
    pub end_time: DateTime<Utc>,
    /// Summaries by metric name
    pub per_metric: BTreeMap<String, MetricSummary>,
    /// Verdicts by threshold name
    pub per_threshold: BTreeMap<String, ThresholdResult>,
    /// All thresholds passed and setup succeeded
    pub overall_pass: bool,
    /// Setup failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_failure: Option<String>,
    /// Why the run stopped
    pub end_reason: EndReason,
    /// Most sessions running at once
    pub peak_concurrency: u32,
    /// Sessions ever started
    pub sessions_started: u64,
    /// Sessions aborted after the grace period
    pub sessions_force_stopped: u64,
    /// Stress-mode finding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaking_point: Option<BreakingPoint>,
}

impl RunReport {
    /// Report for a run that never started sessions
    pub fn setup_failed(
        run_id: impl Into<String>,
        scenario_id: impl Into<String>,
        start_time: DateTime<Utc>,
        message: impl Into<String>,
        per_metric: BTreeMap<String, MetricSummary>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            scenario_id: scenario_id.into(),
            start_time,
            end_time: Utc::now(),
            per_metric,
            per_threshold: BTreeMap::new(),
            overall_pass: false,
            setup_failure: Some(message.into()),
            end_reason: EndReason::SetupFailed,
            peak_concurrency: 0,
            sessions_started: 0,
            sessions_force_stopped: 0,
            breaking_point: None,
        }
    }

    /// Replace the threshold verdicts; `overall_pass` stays false for a failed setup
    #[must_use]
    pub fn with_threshold_results(mut self, per_threshold: BTreeMap<String, ThresholdResult>) -> Self {
        self.overall_pass = self.setup_failure.is_none() && per_threshold.values().all(|r| r.pass);
        self.per_threshold = per_threshold;
        self
    }

    /// Wall-clock length of the run in seconds
    pub fn duration_secs(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    /// Thresholds that failed
    pub fn failed_thresholds(&self) -> impl Iterator<Item = (&String, &ThresholdResult)> {
        self.per_threshold.iter().filter(|(_, r)| !r.pass)
    }

    /// Summary of one metric
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.per_metric.get(name)
    }
}
