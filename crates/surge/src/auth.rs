//! Credential acquisition: turning email/password into a bearer token.

use crate::client::{ClientError, OutgoingRequest, TargetClient};
use crate::scenario::AuthConfig;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Login credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A bearer token owned by one session
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    /// Token value
    pub value: String,
    /// When it was issued
    pub acquired_at: Instant,
}

impl AuthToken {
    /// Token issued now
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            acquired_at: Instant::now(),
        }
    }

    /// Whether the token is older than `ttl` (never, without a ttl)
    pub fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.acquired_at.elapsed() >= ttl)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

/// Credential exchange errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Login endpoint answered with the wrong status
    #[error("login rejected with status {status}")]
    Rejected {
        /// HTTP status code
        status: u16,
    },

    /// Response did not carry the token field
    #[error("login response has no '{field}' string field")]
    MissingToken {
        /// Expected field
        field: String,
    },

    /// Request failed
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Source of bearer tokens for sessions
#[async_trait]
pub trait TokenSource: Send + Sync + std::fmt::Debug {
    /// Obtain a fresh token
    async fn acquire(&self) -> Result<AuthToken, AuthError>;
}

/// Logs in against the target's login endpoint
#[derive(Debug, Clone)]
pub struct LoginEndpoint {
    client: TargetClient,
    config: AuthConfig,
    credentials: Credentials,
}

impl LoginEndpoint {
    /// Create a login source
    pub fn new(client: TargetClient, config: AuthConfig, credentials: Credentials) -> Self {
        Self {
            client,
            config,
            credentials,
        }
    }

    fn login_body(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(
            self.config.email_field.clone(),
            serde_json::Value::String(self.credentials.email.clone()),
        );
        body.insert(
            self.config.password_field.clone(),
            serde_json::Value::String(self.credentials.password.clone()),
        );
        serde_json::Value::Object(body)
    }
}

/// Look up a dotted path (`data.access_token`) in a JSON document
fn extract_token<'a>(doc: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    field
        .split('.')
        .try_fold(doc, |node, key| node.get(key))
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl TokenSource for LoginEndpoint {
    async fn acquire(&self) -> Result<AuthToken, AuthError> {
        let request =
            OutgoingRequest::new(reqwest::Method::POST, self.config.path.clone()).json(self.login_body());
        let resp = self.client.send(request).await?;
        if resp.status != self.config.expected_status {
            return Err(AuthError::Rejected {
                status: resp.status,
            });
        }
        let missing = || AuthError::MissingToken {
            field: self.config.token_field.clone(),
        };
        let doc = resp.json().ok_or_else(missing)?;
        let token = extract_token(&doc, &self.config.token_field).ok_or_else(missing)?;
        Ok(AuthToken::new(token))
    }
}

/// Hands out a fixed, pre-issued token
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap a token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn acquire(&self) -> Result<AuthToken, AuthError> {
        Ok(AuthToken::new(self.0.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("load@test.local", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("load@test.local"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_token_expiry() {
        let token = AuthToken::new("t");
        assert!(!token.is_expired(None));
        assert!(!token.is_expired(Some(Duration::from_secs(3600))));
        assert!(token.is_expired(Some(Duration::ZERO)));
        assert!(!format!("{:?}", token).contains("\"t\""));
    }

    #[test]
    fn test_login_body_uses_configured_fields() {
        let client = TargetClient::new("http://localhost", &RunnerConfig::default()).unwrap();
        let config = AuthConfig {
            email_field: "username".to_string(),
            password_field: "secret".to_string(),
            ..AuthConfig::default()
        };
        let login = LoginEndpoint::new(client, config, Credentials::new("a@b.c", "pw"));
        let body = login.login_body();
        assert_eq!(body["username"], "a@b.c");
        assert_eq!(body["secret"], "pw");
    }

    #[test]
    fn test_extract_token() {
        let doc = serde_json::json!({
            "access_token": "flat",
            "data": { "token": "nested" },
            "empty": "",
            "number": 5
        });
        assert_eq!(extract_token(&doc, "access_token"), Some("flat"));
        assert_eq!(extract_token(&doc, "data.token"), Some("nested"));
        assert_eq!(extract_token(&doc, "empty"), None);
        assert_eq!(extract_token(&doc, "number"), None);
        assert_eq!(extract_token(&doc, "missing"), None);
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticToken::new("abc");
        assert_eq!(source.acquire().await.unwrap().value, "abc");
    }

    #[tokio::test]
    async fn test_login_against_unreachable_host_fails() {
        let client = TargetClient::new("http://127.0.0.1:1", &RunnerConfig::default()).unwrap();
        let login = LoginEndpoint::new(client, AuthConfig::default(), Credentials::new("a", "b"));
        assert!(matches!(
            login.acquire().await,
            Err(AuthError::Client(_))
        ));
    }
}
