//! HTTP client for the service under test.

use crate::config::RunnerConfig;
use crate::scenario::HealthCheck;
use std::time::{Duration, Instant};

/// Errors from the target client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request exceeded its timeout
    #[error("request to {url} timed out")]
    Timeout {
        /// Requested URL
        url: String,
    },

    /// Status differs from what the caller required
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// A request ready to send
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    /// HTTP method
    pub method: reqwest::Method,
    /// Path relative to the base URL, or an absolute URL
    pub path: String,
    /// JSON body
    pub body: Option<serde_json::Value>,
    /// Extra headers
    pub headers: Vec<(String, String)>,
    /// Bearer token
    pub bearer: Option<String>,
    /// Timeout override
    pub timeout: Option<Duration>,
}

impl OutgoingRequest {
    /// Request without body, headers or token
    pub fn new(method: reqwest::Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            bearer: None,
            timeout: None,
        }
    }

    /// Attach a JSON body
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A response with timing metadata
#[derive(Debug, Clone)]
pub struct TimedResponse {
    /// HTTP status code
    pub status: u16,
    /// Time to last byte
    pub latency: Duration,
    /// Response body
    pub body: String,
}

impl TimedResponse {
    /// Parse the body as JSON
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

const MAX_ERROR_BODY: usize = 512;

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    body
}

/// Client bound to one target base URL; cheap to clone
#[derive(Debug, Clone)]
pub struct TargetClient {
    base_url: String,
    client: reqwest::Client,
}

impl TargetClient {
    /// Build a client using the runner's timeout and user agent
    pub fn new(base_url: impl Into<String>, config: &RunnerConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(config.max_sessions)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Wrap an existing reqwest client
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a path against the base URL
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send a request and time it to the last body byte.
    ///
    /// Any status is returned as `Ok`; callers decide what counts as success.
    pub async fn send(&self, request: OutgoingRequest) -> Result<TimedResponse, ClientError> {
        let url = self.url(&request.path);
        let mut builder = self.client.request(request.method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let start = Instant::now();
        let result = async {
            let resp = builder.send().await?;
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        }
        .await;
        let latency = start.elapsed();

        match result {
            Ok((status, body)) => Ok(TimedResponse {
                status,
                latency,
                body,
            }),
            Err(e) if e.is_timeout() => Err(ClientError::Timeout { url }),
            Err(e) => Err(ClientError::Http(e)),
        }
    }

    /// Check the target; fails unless the expected status comes back
    pub async fn health_check(&self, check: &HealthCheck) -> Result<TimedResponse, ClientError> {
        let resp = self
            .send(OutgoingRequest::new(reqwest::Method::GET, check.path.clone()))
            .await?;
        if resp.status == check.expected_status {
            Ok(resp)
        } else {
            Err(ClientError::UnexpectedStatus {
                status: resp.status,
                body: truncate_body(resp.body),
            })
        }
    }
}
