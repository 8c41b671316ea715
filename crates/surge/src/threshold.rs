//! Declarative pass/fail expressions over metric summaries.
//!
//! Expressions follow the k6 style: `p(95)<500`, `p99 <= 1.5s`,
//! `error_rate<0.01`, `count>=100`, `rate>20`, `avg<200ms`.

use crate::metrics::MetricSummary;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const EXPRESSION_PATTERN: &str = r"^\s*(count|rate|mean|avg|p50|p95|p99|p\(\s*(?:50|95|99)\s*\)|error_rate)\s*(<=|>=|<|>)\s*(\d+(?:\.\d+)?)\s*(ms|s)?\s*$";

// Constant pattern, covered by test_expression_pattern_compiles
#[allow(clippy::expect_used)]
static EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(EXPRESSION_PATTERN).expect("threshold pattern compiles"));

/// Threshold expression errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThresholdParseError {
    /// Expression does not match `<aggregate> <comparator> <number>[unit]`
    #[error("malformed threshold expression '{expression}'")]
    Malformed {
        /// Offending expression
        expression: String,
    },

    /// A time unit on a non-latency aggregate
    #[error("unit '{unit}' is not allowed on '{aggregate}'")]
    UnitNotAllowed {
        /// Aggregate name
        aggregate: String,
        /// Unit found
        unit: String,
    },
}

/// Summary field a threshold reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Sample count
    Count,
    /// Samples per second
    Rate,
    /// Mean value
    Mean,
    /// Median
    P50,
    /// 95th percentile
    P95,
    /// 99th percentile
    P99,
    /// Failure ratio
    ErrorRate,
}

impl Aggregate {
    fn from_token(token: &str) -> Option<Self> {
        let compact: String = token.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            "count" => Some(Self::Count),
            "rate" => Some(Self::Rate),
            "mean" | "avg" => Some(Self::Mean),
            "p50" | "p(50)" => Some(Self::P50),
            "p95" | "p(95)" => Some(Self::P95),
            "p99" | "p(99)" => Some(Self::P99),
            "error_rate" => Some(Self::ErrorRate),
            _ => None,
        }
    }

    /// Whether the aggregate is a latency value (accepts `ms`/`s`)
    pub fn is_latency(self) -> bool {
        matches!(self, Self::Mean | Self::P50 | Self::P95 | Self::P99)
    }

    /// Read the field from a summary
    pub fn select(self, summary: &MetricSummary) -> f64 {
        match self {
            Self::Count => summary.count as f64,
            Self::Rate => summary.rate_per_second,
            Self::Mean => summary.mean,
            Self::P50 => summary.p50,
            Self::P95 => summary.p95,
            Self::P99 => summary.p99,
            Self::ErrorRate => summary.error_rate,
        }
    }
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Rate => write!(f, "rate"),
            Self::Mean => write!(f, "mean"),
            Self::P50 => write!(f, "p(50)"),
            Self::P95 => write!(f, "p(95)"),
            Self::P99 => write!(f, "p(99)"),
            Self::ErrorRate => write!(f, "error_rate"),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
}

impl Comparator {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    /// Apply `observed <op> bound`
    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
        }
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// A parsed threshold bound to one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Report key: `"<metric>: <expression>"`
    pub name: String,
    /// Metric name
    pub metric: String,
    /// Expression as written
    pub expression: String,
    /// Summary field
    pub aggregate: Aggregate,
    /// Operator
    pub comparator: Comparator,
    /// Bound, normalised to milliseconds for latency aggregates
    pub bound: f64,
    /// End the run as soon as this fails
    pub abort_on_fail: bool,
}

/// Outcome of one threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    /// Metric name
    pub metric: String,
    /// Expression as written
    pub expression: String,
    /// Verdict
    pub pass: bool,
    /// Observed value; absent when the metric had no samples
    pub observed: Option<f64>,
    /// Bound compared against
    pub bound: f64,
}

impl Threshold {
    /// Parse `expression` for `metric`
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ThresholdParseError> {
        let malformed = || ThresholdParseError::Malformed {
            expression: expression.to_string(),
        };
        let caps = EXPRESSION.captures(expression).ok_or_else(malformed)?;

        let aggregate = caps
            .get(1)
            .and_then(|m| Aggregate::from_token(m.as_str()))
            .ok_or_else(malformed)?;
        let comparator = caps
            .get(2)
            .and_then(|m| Comparator::from_token(m.as_str()))
            .ok_or_else(malformed)?;
        let mut bound: f64 = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(malformed)?;

        if let Some(unit) = caps.get(4).map(|m| m.as_str()) {
            if !aggregate.is_latency() {
                return Err(ThresholdParseError::UnitNotAllowed {
                    aggregate: aggregate.to_string(),
                    unit: unit.to_string(),
                });
            }
            if unit == "s" {
                bound *= 1000.0;
            }
        }

        let expression = expression.trim().to_string();
        Ok(Self {
            name: format!("{}: {}", metric, expression),
            metric: metric.to_string(),
            expression,
            aggregate,
            comparator,
            bound,
            abort_on_fail: false,
        })
    }

    /// Mark as abort-on-fail
    pub fn with_abort_on_fail(mut self, abort: bool) -> Self {
        self.abort_on_fail = abort;
        self
    }

    /// Evaluate against the metric's summary. Zero samples never pass.
    pub fn evaluate(&self, summary: Option<&MetricSummary>) -> ThresholdResult {
        let observed = summary
            .filter(|s| s.count > 0)
            .map(|s| self.aggregate.select(s));
        ThresholdResult {
            metric: self.metric.clone(),
            expression: self.expression.clone(),
            pass: observed.is_some_and(|v| self.comparator.holds(v, self.bound)),
            observed,
            bound: self.bound,
        }
    }
}

/// Evaluate every threshold, keyed by threshold name
pub fn evaluate_all(
    thresholds: &[Threshold],
    summaries: &BTreeMap<String, MetricSummary>,
) -> BTreeMap<String, ThresholdResult> {
    thresholds
        .iter()
        .map(|t| (t.name.clone(), t.evaluate(summaries.get(&t.metric))))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_pattern_compiles() {
        assert!(Regex::new(EXPRESSION_PATTERN).is_ok());
        assert!(EXPRESSION.is_match("p(95)<500"));
    }

    fn summary_with_p95(p95: f64) -> MetricSummary {
        MetricSummary {
            count: 100,
            failures: 2,
            rate_per_second: 12.5,
            mean: p95 / 2.0,
            min: 1.0,
            max: p95 * 2.0,
            p50: p95 / 2.0,
            p95,
            p99: p95 * 1.5,
            error_rate: 0.02,
        }
    }

    #[test]
    fn test_parse_k6_percentile() {
        let t = Threshold::parse("login", "p(95)<500").unwrap();
        assert_eq!(t.aggregate, Aggregate::P95);
        assert_eq!(t.comparator, Comparator::Lt);
        assert_eq!(t.bound, 500.0);
        assert_eq!(t.name, "login: p(95)<500");
        assert!(!t.abort_on_fail);
    }

    #[test]
    fn test_parse_variants() {
        let cases = [
            ("p99 <= 1000", Aggregate::P99, Comparator::Le, 1000.0),
            ("p( 50 ) > 1", Aggregate::P50, Comparator::Gt, 1.0),
            ("avg<200ms", Aggregate::Mean, Comparator::Lt, 200.0),
            ("mean < 1.5s", Aggregate::Mean, Comparator::Lt, 1500.0),
            ("error_rate<0.01", Aggregate::ErrorRate, Comparator::Lt, 0.01),
            ("count>=100", Aggregate::Count, Comparator::Ge, 100.0),
            ("rate>20", Aggregate::Rate, Comparator::Gt, 20.0),
        ];
        for (expr, aggregate, comparator, bound) in cases {
            let t = Threshold::parse("m", expr).unwrap();
            assert_eq!(t.aggregate, aggregate, "{}", expr);
            assert_eq!(t.comparator, comparator, "{}", expr);
            assert!((t.bound - bound).abs() < 1e-9, "{}", expr);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for expr in ["", "p(95)", "p(90)<5", "p95 == 5", "latency<5", "p95<abc", "p95<-1"] {
            assert!(
                matches!(
                    Threshold::parse("m", expr),
                    Err(ThresholdParseError::Malformed { .. })
                ),
                "{}",
                expr
            );
        }
    }

    #[test]
    fn test_parse_rejects_unit_on_ratio() {
        let err = Threshold::parse("m", "error_rate<1s").unwrap_err();
        assert!(matches!(err, ThresholdParseError::UnitNotAllowed { .. }));
    }

    #[test]
    fn test_login_p95_pass_and_fail() {
        let t = Threshold::parse("login", "p95 < 500").unwrap();
        let pass = t.evaluate(Some(&summary_with_p95(480.0)));
        assert!(pass.pass);
        assert_eq!(pass.observed, Some(480.0));
        let fail = t.evaluate(Some(&summary_with_p95(520.0)));
        assert!(!fail.pass);
        assert_eq!(fail.observed, Some(520.0));
        assert_eq!(fail.bound, 500.0);
    }

    #[test]
    fn test_zero_samples_fail() {
        let t = Threshold::parse("login", "p95 < 500").unwrap();
        let missing = t.evaluate(None);
        assert!(!missing.pass);
        assert!(missing.observed.is_none());

        let mut empty = summary_with_p95(0.0);
        empty.count = 0;
        assert!(!t.evaluate(Some(&empty)).pass);
    }

    #[test]
    fn test_evaluation_idempotent() {
        let t = Threshold::parse("login", "p(99)<1000").unwrap();
        let s = summary_with_p95(400.0);
        assert_eq!(t.evaluate(Some(&s)), t.evaluate(Some(&s)));
    }

    #[test]
    fn test_boundary_comparators() {
        assert!(!Comparator::Lt.holds(5.0, 5.0));
        assert!(Comparator::Le.holds(5.0, 5.0));
        assert!(!Comparator::Gt.holds(5.0, 5.0));
        assert!(Comparator::Ge.holds(5.0, 5.0));
    }

    #[test]
    fn test_evaluate_all() {
        let thresholds = vec![
            Threshold::parse("http_reqs", "p(95)<500").unwrap(),
            Threshold::parse("http_reqs", "error_rate<0.01").unwrap(),
            Threshold::parse("missing", "count>0").unwrap(),
        ];
        let mut summaries = BTreeMap::new();
        summaries.insert("http_reqs".to_string(), summary_with_p95(300.0));
        let results = evaluate_all(&thresholds, &summaries);
        assert_eq!(results.len(), 3);
        assert!(results["http_reqs: p(95)<500"].pass);
        assert!(!results["http_reqs: error_rate<0.01"].pass);
        assert!(!results["missing: count>0"].pass);
    }

    #[test]
    fn test_display() {
        assert_eq!(Aggregate::P95.to_string(), "p(95)");
        assert_eq!(Comparator::Ge.to_string(), ">=");
    }
}
