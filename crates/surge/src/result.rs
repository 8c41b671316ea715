//! Result and error types for Surge.

use thiserror::Error;

/// Result type for Surge operations
pub type SurgeResult<T> = Result<T, SurgeError>;

/// Errors that can occur while loading or preparing a run
#[derive(Debug, Error)]
pub enum SurgeError {
    /// Scenario file could not be parsed
    #[error("Failed to parse scenario: {message}")]
    ScenarioParse {
        /// Error message
        message: String,
    },

    /// Scenario parsed but is not runnable
    #[error("Invalid scenario: {message}")]
    InvalidScenario {
        /// Error message
        message: String,
    },

    /// Threshold expression is malformed
    #[error("Invalid threshold on '{metric}': {source}")]
    InvalidThreshold {
        /// Metric the threshold is attached to
        metric: String,
        /// Underlying parse error
        #[source]
        source: crate::threshold::ThresholdParseError,
    },

    /// Duration string is malformed
    #[error("Invalid duration '{input}'")]
    InvalidDuration {
        /// Offending input
        input: String,
    },

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(#[from] crate::client::ClientError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SurgeError {
    /// Create a scenario parse error
    #[must_use]
    pub fn scenario_parse(message: impl Into<String>) -> Self {
        Self::ScenarioParse {
            message: message.into(),
        }
    }

    /// Create an invalid scenario error
    #[must_use]
    pub fn invalid_scenario(message: impl Into<String>) -> Self {
        Self::InvalidScenario {
            message: message.into(),
        }
    }
}
