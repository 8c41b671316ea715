//! Bounded latency histogram.
//!
//! Quantiles come from an HDR histogram in microseconds with three
//! significant digits. Its size is fixed by [`MAX_TRACKABLE_US`], so memory
//! stays flat no matter how long the run lasts. Min, max and mean are
//! tracked exactly beside it and quantiles are clamped to `[min, max]`.

use hdrhistogram::Histogram;

/// Largest value resolved individually (one hour); larger values saturate
pub const MAX_TRACKABLE_US: u64 = 3_600_000_000;

const SIGNIFICANT_DIGITS: u8 = 3;

// Constant bounds: 1 <= low, 2 * low <= high, digits <= 5
#[allow(clippy::expect_used)]
fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, MAX_TRACKABLE_US, SIGNIFICANT_DIGITS)
        .expect("histogram bounds are valid")
}

/// Streaming latency histogram with exact min/max/mean
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    histogram: Histogram<u64>,
    /// Sum in milliseconds
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyHistogram {
    /// Create an empty histogram
    pub fn new() -> Self {
        Self {
            histogram: new_histogram(),
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Record a value in milliseconds. Negative and NaN values count as zero.
    pub fn record(&mut self, value_ms: f64) {
        let value_ms = if value_ms.is_finite() && value_ms > 0.0 {
            value_ms
        } else if value_ms == f64::INFINITY {
            MAX_TRACKABLE_US as f64 / 1000.0
        } else {
            0.0
        };
        let us = (value_ms * 1000.0).round() as u64;
        self.histogram.saturating_record(us);
        self.sum += value_ms;
        self.min = self.min.min(value_ms);
        self.max = self.max.max(value_ms);
    }

    /// Value at percentile `p` (0..=100) in milliseconds; 0 when empty
    pub fn percentile(&self, p: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let quantile = p.clamp(0.0, 100.0) / 100.0;
        let us = self.histogram.value_at_quantile(quantile);
        (us as f64 / 1000.0).clamp(self.min, self.max)
    }

    /// Mean in milliseconds; 0 when empty
    pub fn mean(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.sum / self.count() as f64
        }
    }

    /// Smallest value; 0 when empty
    pub fn min(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.min
        }
    }

    /// Largest value; 0 when empty
    pub fn max(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max
        }
    }

    /// Number of recorded values
    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }
}
