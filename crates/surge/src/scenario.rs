//! Scenario definitions: stages, operation steps, think time, and thresholds.
//!
//! A [`Scenario`] is the immutable, data-driven description of one load test.
//! It is usually loaded from YAML:
//!
//! ```yaml
//! name: normal-load
//! stages:
//!   - { duration: 30s, target: 50 }
//!   - { duration: 4m, target: 50 }
//!   - { duration: 30s, target: 0 }
//! think_time: { min: 2s, max: 5s }
//! setup: { path: /api/health }
//! auth: { path: /api/auth/login, token_field: access_token }
//! steps:
//!   - { name: profile, method: GET, path: /api/auth/profile }
//!   - { name: list_projects, method: GET, path: /api/projects }
//!   - name: create_project
//!     method: POST
//!     path: /api/projects
//!     body: { name: "Load Test Project {{timestamp}}" }
//!     expect_status: [201]
//! thresholds:
//!   http_reqs: ["p(95)<500", "p(99)<1000", "error_rate<0.01"]
//! ```

use crate::duration::human;
use crate::result::{SurgeError, SurgeResult};
use crate::threshold::Threshold;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Stages
// =============================================================================

/// A timed control point of the ramp profile
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stage {
    /// Time to move from the previous target to this one (zero = instant jump)
    #[serde(with = "human")]
    pub duration: Duration,
    /// Concurrency at the end of the stage
    pub target: u32,
}

impl Stage {
    /// Create a stage
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }

    /// Create a zero-duration stage (instantaneous jump)
    pub fn spike(target: u32) -> Self {
        Self::new(Duration::ZERO, target)
    }

    /// Check if this stage is an instantaneous jump
    pub fn is_spike(&self) -> bool {
        self.duration.is_zero()
    }
}

// =============================================================================
// Operations
// =============================================================================

/// HTTP methods
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// HTTP GET method
    #[default]
    Get,
    /// HTTP POST method
    Post,
    /// HTTP PUT method
    Put,
    /// HTTP DELETE method
    Delete,
    /// HTTP PATCH method
    Patch,
    /// HTTP HEAD method
    Head,
}

impl HttpMethod {
    /// Convert into the client's method type
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
            Self::Head => reqwest::Method::HEAD,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Patch => write!(f, "PATCH"),
            Self::Head => write!(f, "HEAD"),
        }
    }
}

/// One HTTP operation a session performs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    /// Operation name; samples are recorded under this metric name
    pub name: String,
    /// HTTP method
    #[serde(default)]
    pub method: HttpMethod,
    /// Path template, relative to the target base URL
    pub path: String,
    /// JSON body template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Extra headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Status codes that count as success
    #[serde(default = "default_expect_status")]
    pub expect_status: Vec<u16>,
    /// Send the session's bearer token
    #[serde(default = "default_true")]
    pub authenticated: bool,
    /// Chance of running this operation in a given iteration (1.0 = always)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    /// Per-operation timeout override
    #[serde(
        default,
        with = "human::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

fn default_expect_status() -> Vec<u16> {
    vec![200]
}

fn default_true() -> bool {
    true
}

impl Operation {
    /// Create an operation expecting `200`
    pub fn new(name: &str, method: HttpMethod, path: &str) -> Self {
        Self {
            name: name.to_string(),
            method,
            path: path.to_string(),
            body: None,
            headers: HashMap::new(),
            expect_status: default_expect_status(),
            authenticated: true,
            probability: None,
            timeout: None,
        }
    }

    /// Create a GET operation
    pub fn get(name: &str, path: &str) -> Self {
        Self::new(name, HttpMethod::Get, path)
    }

    /// Create a POST operation with a JSON body
    pub fn post(name: &str, path: &str, body: serde_json::Value) -> Self {
        Self::new(name, HttpMethod::Post, path).with_body(body)
    }

    /// Set the JSON body template
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Replace the accepted status codes
    pub fn expect(mut self, statuses: &[u16]) -> Self {
        self.expect_status = statuses.to_vec();
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Run only with the given probability
    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = Some(probability);
        self
    }

    /// Override the runner's request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Do not send the bearer token
    pub fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Check whether a status code counts as success
    pub fn accepts(&self, status: u16) -> bool {
        self.expect_status.contains(&status)
    }
}

/// One weighted alternative of a [`Step::OneOf`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    /// Relative weight
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Steps run when this branch is picked
    pub steps: Vec<Step>,
}

fn default_weight() -> f64 {
    1.0
}

impl Branch {
    /// Create a branch
    pub fn new(weight: f64, steps: Vec<Step>) -> Self {
        Self { weight, steps }
    }
}

/// An element of the operation sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Step {
    /// Pick exactly one branch by weight
    OneOf {
        /// Candidate branches
        one_of: Vec<Branch>,
    },
    /// Perform one HTTP operation
    Request(Operation),
}

impl Step {
    /// Pick a branch index by weight. Returns `None` for an empty choice
    /// or one whose total weight is not a positive finite number.
    pub fn pick_branch<R: Rng + ?Sized>(branches: &[Branch], rng: &mut R) -> Option<usize> {
        let total: f64 = branches.iter().map(|b| b.weight.max(0.0)).sum();
        if branches.is_empty() || !total.is_finite() || total <= 0.0 {
            return None;
        }
        let mut roll = rng.gen_range(0.0..total);
        for (i, branch) in branches.iter().enumerate() {
            let w = branch.weight.max(0.0);
            if roll < w {
                return Some(i);
            }
            roll -= w;
        }
        Some(branches.len() - 1)
    }

    fn visit_operations<'a>(steps: &'a [Step], out: &mut Vec<&'a Operation>) {
        for step in steps {
            match step {
                Self::Request(op) => out.push(op),
                Self::OneOf { one_of } => {
                    for branch in one_of {
                        Self::visit_operations(&branch.steps, out);
                    }
                }
            }
        }
    }
}

impl From<Operation> for Step {
    fn from(op: Operation) -> Self {
        Self::Request(op)
    }
}

// =============================================================================
// Think time, auth, setup, stress mode
// =============================================================================

/// Uniform pause between a session's iterations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThinkTime {
    /// Shortest pause
    #[serde(with = "human")]
    pub min: Duration,
    /// Longest pause
    #[serde(with = "human")]
    pub max: Duration,
}

impl Default for ThinkTime {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

impl ThinkTime {
    /// Uniform think time in `[min, max]`
    pub fn between(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Constant think time
    pub fn fixed(d: Duration) -> Self {
        Self { min: d, max: d }
    }

    /// Mean pause
    pub fn mean(&self) -> Duration {
        (self.min + self.max) / 2
    }

    /// Draw a pause
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = rng.gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Login contract of the target service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    /// Login path
    #[serde(default = "default_login_path")]
    pub path: String,
    /// JSON field carrying the email
    #[serde(default = "default_email_field")]
    pub email_field: String,
    /// JSON field carrying the password
    #[serde(default = "default_password_field")]
    pub password_field: String,
    /// JSON field of the response holding the bearer token
    #[serde(default = "default_token_field")]
    pub token_field: String,
    /// Status code of a successful login
    #[serde(default = "default_ok")]
    pub expected_status: u16,
    /// Refresh the token after this long
    #[serde(
        default,
        with = "human::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_ttl: Option<Duration>,
}

fn default_login_path() -> String {
    "/api/auth/login".to_string()
}

fn default_email_field() -> String {
    "email".to_string()
}

fn default_password_field() -> String {
    "password".to_string()
}

fn default_token_field() -> String {
    "access_token".to_string()
}

fn default_ok() -> u16 {
    200
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            path: default_login_path(),
            email_field: default_email_field(),
            password_field: default_password_field(),
            token_field: default_token_field(),
            expected_status: default_ok(),
            token_ttl: None,
        }
    }
}

/// Precondition check run before any session starts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheck {
    /// Health check path
    #[serde(default = "default_health_path")]
    pub path: String,
    /// Status code of a healthy target
    #[serde(default = "default_ok")]
    pub expected_status: u16,
}

fn default_health_path() -> String {
    "/api/health".to_string()
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            expected_status: default_ok(),
        }
    }
}

/// Stress mode: find the concurrency at which errors start to climb
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakingPointConfig {
    /// Metric whose error rate is watched
    #[serde(default = "default_breaking_metric")]
    pub metric: String,
    /// Error rate (0..1) that counts as broken
    pub error_rate_ceiling: f64,
    /// Samples needed in a window before it is judged
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,
    /// End the run at the breaking point
    #[serde(default)]
    pub abort: bool,
}

fn default_breaking_metric() -> String {
    crate::metrics::HTTP_REQS.to_string()
}

fn default_min_samples() -> u64 {
    20
}

impl BreakingPointConfig {
    /// Watch `http_reqs` with the given ceiling
    pub fn new(error_rate_ceiling: f64) -> Self {
        Self {
            metric: default_breaking_metric(),
            error_rate_ceiling,
            min_samples: default_min_samples(),
            abort: false,
        }
    }

    /// End the run once the breaking point is found
    pub fn aborting(mut self) -> Self {
        self.abort = true;
        self
    }
}

/// A threshold as written in a scenario file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ThresholdSpec {
    /// Bare expression, e.g. `"p(95)<500"`
    Expr(String),
    /// Expression with options
    Detailed {
        /// The expression
        threshold: String,
        /// End the run as soon as this threshold fails
        #[serde(default)]
        abort_on_fail: bool,
    },
}

impl ThresholdSpec {
    /// The expression text
    pub fn expression(&self) -> &str {
        match self {
            Self::Expr(e) | Self::Detailed { threshold: e, .. } => e,
        }
    }

    /// Whether a failure aborts the run
    pub fn abort_on_fail(&self) -> bool {
        matches!(
            self,
            Self::Detailed {
                abort_on_fail: true,
                ..
            }
        )
    }
}

// =============================================================================
// Scenario
// =============================================================================

/// Immutable load test definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    /// Scenario name (reported as the scenario id)
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Concurrency before the first stage
    #[serde(default)]
    pub start_concurrency: u32,
    /// Ramp profile
    pub stages: Vec<Stage>,
    /// Operation sequence each session repeats
    pub steps: Vec<Step>,
    /// Pause between iterations
    #[serde(default)]
    pub think_time: ThinkTime,
    /// Precondition health check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<HealthCheck>,
    /// Login contract; sessions run anonymously without it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    /// Pass/fail expressions keyed by metric name
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<ThresholdSpec>>,
    /// Stress mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaking_point: Option<BreakingPointConfig>,
}

impl Scenario {
    /// Create an empty scenario
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            start_concurrency: 0,
            stages: Vec::new(),
            steps: Vec::new(),
            think_time: ThinkTime::default(),
            setup: None,
            auth: None,
            thresholds: BTreeMap::new(),
            breaking_point: None,
        }
    }

    /// Append a stage
    pub fn with_stage(mut self, duration: Duration, target: u32) -> Self {
        self.stages.push(Stage::new(duration, target));
        self
    }

    /// Append a step
    pub fn with_step(mut self, step: impl Into<Step>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Set the think time
    pub fn with_think_time(mut self, think_time: ThinkTime) -> Self {
        self.think_time = think_time;
        self
    }

    /// Set the setup health check
    pub fn with_setup(mut self, check: HealthCheck) -> Self {
        self.setup = Some(check);
        self
    }

    /// Set the login contract
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Add a threshold expression on a metric
    pub fn with_threshold(mut self, metric: &str, expression: &str) -> Self {
        self.thresholds
            .entry(metric.to_string())
            .or_default()
            .push(ThresholdSpec::Expr(expression.to_string()));
        self
    }

    /// Add a threshold that aborts the run when it fails
    pub fn with_abort_threshold(mut self, metric: &str, expression: &str) -> Self {
        self.thresholds
            .entry(metric.to_string())
            .or_default()
            .push(ThresholdSpec::Detailed {
                threshold: expression.to_string(),
                abort_on_fail: true,
            });
        self
    }

    /// Enable stress mode
    pub fn with_breaking_point(mut self, config: BreakingPointConfig) -> Self {
        self.breaking_point = Some(config);
        self
    }

    /// Sum of all stage durations
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Every operation reachable from the step list
    pub fn operations(&self) -> Vec<&Operation> {
        let mut out = Vec::new();
        Step::visit_operations(&self.steps, &mut out);
        out
    }

    /// Parse all threshold expressions
    pub fn thresholds(&self) -> SurgeResult<Vec<Threshold>> {
        let mut parsed = Vec::new();
        for (metric, specs) in &self.thresholds {
            for spec in specs {
                let threshold = Threshold::parse(metric, spec.expression())
                    .map_err(|source| SurgeError::InvalidThreshold {
                        metric: metric.clone(),
                        source,
                    })?
                    .with_abort_on_fail(spec.abort_on_fail());
                parsed.push(threshold);
            }
        }
        Ok(parsed)
    }

    /// Check that the scenario can be run
    pub fn validate(&self) -> SurgeResult<()> {
        if self.stages.is_empty() {
            return Err(SurgeError::invalid_scenario("scenario has no stages"));
        }
        if self.steps.is_empty() {
            return Err(SurgeError::invalid_scenario("scenario has no steps"));
        }
        if self.think_time.min > self.think_time.max {
            return Err(SurgeError::invalid_scenario(format!(
                "think_time.min ({:?}) exceeds think_time.max ({:?})",
                self.think_time.min, self.think_time.max
            )));
        }
        validate_steps(&self.steps)?;
        if let Some(bp) = &self.breaking_point {
            if !(0.0..=1.0).contains(&bp.error_rate_ceiling) {
                return Err(SurgeError::invalid_scenario(format!(
                    "breaking_point.error_rate_ceiling must be within [0, 1], got {}",
                    bp.error_rate_ceiling
                )));
            }
        }
        self.thresholds()?;
        Ok(())
    }

    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> SurgeResult<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| SurgeError::scenario_parse(e.to_string()))
    }

    /// Load from JSON string
    pub fn from_json(json: &str) -> SurgeResult<Self> {
        serde_json::from_str(json).map_err(|e| SurgeError::scenario_parse(e.to_string()))
    }

    /// Load and validate a scenario file (`.json` as JSON, anything else as YAML)
    pub fn load(path: &Path) -> SurgeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let scenario = if is_json {
            Self::from_json(&content)?
        } else {
            Self::from_yaml(&content)?
        };
        scenario.validate()?;
        Ok(scenario)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> SurgeResult<String> {
        serde_yaml_ng::to_string(self).map_err(|e| SurgeError::scenario_parse(e.to_string()))
    }
}

fn validate_steps(steps: &[Step]) -> SurgeResult<()> {
    for step in steps {
        match step {
            Step::Request(op) => {
                if op.name.trim().is_empty() {
                    return Err(SurgeError::invalid_scenario("operation with empty name"));
                }
                if op.expect_status.is_empty() {
                    return Err(SurgeError::invalid_scenario(format!(
                        "operation '{}' accepts no status code",
                        op.name
                    )));
                }
                if let Some(p) = op.probability {
                    if !(0.0..=1.0).contains(&p) {
                        return Err(SurgeError::invalid_scenario(format!(
                            "operation '{}' has probability {} outside [0, 1]",
                            op.name, p
                        )));
                    }
                }
            }
            Step::OneOf { one_of } => {
                let total: f64 = one_of.iter().map(|b| b.weight).sum();
                let weights_ok = one_of
                    .iter()
                    .all(|b| b.weight.is_finite() && b.weight >= 0.0);
                if one_of.is_empty() || !weights_ok || !total.is_finite() || total <= 0.0 {
                    return Err(SurgeError::invalid_scenario(
                        "one_of needs at least one branch and finite, positive weights",
                    ));
                }
                for branch in one_of {
                    validate_steps(&branch.steps)?;
                }
            }
        }
    }
    Ok(())
}
