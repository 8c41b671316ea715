//! Log subscriber installation

use crate::config::{CliConfig, LogFormat};
use crate::error::{CliError, CliResult};
use tracing_subscriber::{fmt, EnvFilter};

/// Build the filter: `RUST_LOG` wins, otherwise the verbosity default
pub fn env_filter(config: &CliConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.default_filter()))
}

/// Install the global subscriber, writing to stderr
pub fn init_tracing(config: &CliConfig) -> CliResult<()> {
    let builder = fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .with_target(false);
    let result = match config.log_format {
        LogFormat::Text => builder.with_ansi(config.color.should_color()).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| CliError::config(format!("failed to install log subscriber: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Verbosity;

    #[test]
    fn test_env_filter_builds_for_every_verbosity() {
        for verbosity in [
            Verbosity::Quiet,
            Verbosity::Normal,
            Verbosity::Verbose,
            Verbosity::Debug,
        ] {
            let config = CliConfig::new().with_verbosity(verbosity);
            let filter = env_filter(&config);
            assert!(!filter.to_string().is_empty());
        }
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = CliConfig::new().with_verbosity(Verbosity::Quiet);
        let first = init_tracing(&config);
        let second = init_tracing(&config);
        assert!(first.is_ok() || second.is_err());
        assert!(second.is_err());
    }
}
