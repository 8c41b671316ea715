//! Thread-safe sample sink with on-demand summaries.

use super::histogram::LatencyHistogram;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

/// One observation emitted by a session or the runner
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Metric name
    pub metric: String,
    /// Observed value (latency in ms for request metrics)
    pub value: f64,
    /// When the observation was taken
    pub timestamp: Instant,
    /// Whether the observation counts as a success
    pub success: bool,
}

impl Sample {
    /// Create a sample stamped now
    pub fn new(metric: &str, value: f64, success: bool) -> Self {
        Self {
            metric: metric.to_string(),
            value,
            timestamp: Instant::now(),
            success,
        }
    }
}

/// Aggregated view of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Number of samples
    pub count: u64,
    /// Samples with `success = false`
    pub failures: u64,
    /// Samples per second since the collector started
    pub rate_per_second: f64,
    /// Mean value
    pub mean: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Median
    pub p50: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// `failures / count`
    pub error_rate: f64,
}

#[derive(Debug, Default)]
struct Series {
    histogram: LatencyHistogram,
    failures: u64,
}

impl Series {
    fn record(&mut self, value: f64, success: bool) {
        self.histogram.record(value);
        if !success {
            self.failures += 1;
        }
    }

    fn summarize(&self, elapsed_secs: f64) -> MetricSummary {
        let count = self.histogram.count();
        MetricSummary {
            count,
            failures: self.failures,
            rate_per_second: if elapsed_secs > 0.0 {
                count as f64 / elapsed_secs
            } else {
                0.0
            },
            mean: self.histogram.mean(),
            min: self.histogram.min(),
            max: self.histogram.max(),
            p50: self.histogram.percentile(50.0),
            p95: self.histogram.percentile(95.0),
            p99: self.histogram.percentile(99.0),
            error_rate: if count == 0 {
                0.0
            } else {
                self.failures as f64 / count as f64
            },
        }
    }
}

/// Shared metric sink.
///
/// Writers take the map's read lock only to find their series, then lock that
/// series alone, so distinct metrics never contend.
#[derive(Debug)]
pub struct MetricCollector {
    started: Instant,
    series: RwLock<HashMap<String, Arc<Mutex<Series>>>>,
}

impl Default for MetricCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCollector {
    /// Create a collector; rates are measured from now
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            series: RwLock::new(HashMap::new()),
        }
    }

    fn series_for(&self, metric: &str) -> Arc<Mutex<Series>> {
        if let Some(series) = self
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(metric)
        {
            return Arc::clone(series);
        }
        let mut map = self.series.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(metric.to_string()).or_default())
    }

    fn existing(&self, metric: &str) -> Option<Arc<Mutex<Series>>> {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(metric)
            .cloned()
    }

    /// Ingest a sample
    pub fn record(&self, sample: Sample) {
        self.record_value(&sample.metric, sample.value, sample.success);
    }

    /// Ingest a value without building a [`Sample`]
    pub fn record_value(&self, metric: &str, value: f64, success: bool) {
        let series = self.series_for(metric);
        series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(value, success);
    }

    /// Summary of one metric, `None` if it never received a sample
    pub fn summary(&self, metric: &str) -> Option<MetricSummary> {
        let series = self.existing(metric)?;
        let elapsed = self.started.elapsed().as_secs_f64();
        let guard = series.lock().unwrap_or_else(PoisonError::into_inner);
        Some(guard.summarize(elapsed))
    }

    /// Summaries of every metric, sorted by name
    pub fn summaries(&self) -> BTreeMap<String, MetricSummary> {
        let snapshot: Vec<(String, Arc<Mutex<Series>>)> = self
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, series)| (name.clone(), Arc::clone(series)))
            .collect();
        let elapsed = self.started.elapsed().as_secs_f64();
        snapshot
            .into_iter()
            .map(|(name, series)| {
                let summary = series
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .summarize(elapsed);
                (name, summary)
            })
            .collect()
    }

    /// Running `(total, failures)` of a metric; zeros if unknown
    pub fn counters(&self, metric: &str) -> (u64, u64) {
        self.existing(metric).map_or((0, 0), |series| {
            let guard = series.lock().unwrap_or_else(PoisonError::into_inner);
            (guard.histogram.count(), guard.failures)
        })
    }

    /// Names of all metrics seen so far
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// When the collector started
    pub fn started(&self) -> Instant {
        self.started
    }
}
