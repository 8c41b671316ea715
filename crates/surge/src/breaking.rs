//! Stress mode: windowed error-rate watch that pins the breaking point.

use crate::report::BreakingPoint;
use crate::scenario::BreakingPointConfig;
use std::time::Duration;

/// Accumulates per-tick counter deltas into windows and reports the first
/// window whose error rate exceeds the ceiling.
#[derive(Debug, Clone)]
pub struct BreakingPointDetector {
    config: BreakingPointConfig,
    last_total: u64,
    last_failures: u64,
    window_total: u64,
    window_failures: u64,
    found: Option<BreakingPoint>,
}

impl BreakingPointDetector {
    /// Create a detector
    pub fn new(config: BreakingPointConfig) -> Self {
        Self {
            config,
            last_total: 0,
            last_failures: 0,
            window_total: 0,
            window_failures: 0,
            found: None,
        }
    }

    /// Metric being watched
    pub fn metric(&self) -> &str {
        &self.config.metric
    }

    /// Whether the run should end once the point is found
    pub fn aborts(&self) -> bool {
        self.config.abort
    }

    /// The breaking point, once found
    pub fn found(&self) -> Option<BreakingPoint> {
        self.found
    }

    /// Feed the metric's running `(total, failures)`.
    ///
    /// Returns the breaking point on the tick it is first detected.
    pub fn observe(
        &mut self,
        counters: (u64, u64),
        concurrency: u32,
        target: u32,
        elapsed: Duration,
    ) -> Option<BreakingPoint> {
        let (total, failures) = counters;
        self.window_total += total.saturating_sub(self.last_total);
        self.window_failures += failures.saturating_sub(self.last_failures);
        self.last_total = total;
        self.last_failures = failures;

        if self.found.is_some() || self.window_total < self.config.min_samples.max(1) {
            return None;
        }
        let error_rate = self.window_failures as f64 / self.window_total as f64;
        self.window_total = 0;
        self.window_failures = 0;
        if error_rate <= self.config.error_rate_ceiling {
            return None;
        }
        let point = BreakingPoint {
            concurrency,
            target,
            elapsed_secs: elapsed.as_secs_f64(),
            error_rate,
        };
        self.found = Some(point);
        Some(point)
    }
}
