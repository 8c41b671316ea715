//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Surge: load-test HTTP services with ramping virtual users and thresholds
#[derive(Parser, Debug)]
#[command(name = "surge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario against a target service
    Run(RunArgs),

    /// Parse and validate a scenario, then print its stage plan
    Validate(ValidateArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scenario file (YAML or JSON)
    pub scenario: PathBuf,

    /// Base URL of the target service
    #[arg(short, long, env = "SURGE_URL")]
    pub url: String,

    /// Login email
    #[arg(long, env = "SURGE_EMAIL", requires = "password")]
    pub email: Option<String>,

    /// Login password
    #[arg(long, env = "SURGE_PASSWORD", hide_env_values = true, requires = "email")]
    pub password: Option<String>,

    /// Pre-issued bearer token (skips the login endpoint)
    #[arg(long, env = "SURGE_TOKEN", hide_env_values = true, conflicts_with = "email")]
    pub token: Option<String>,

    /// Wall-clock budget, e.g. "10m" (default: the schedule's length)
    #[arg(short, long)]
    pub budget: Option<String>,

    /// Concurrency reconciliation interval
    #[arg(long, default_value = "1s")]
    pub tick: String,

    /// Teardown grace period for in-flight iterations
    #[arg(long, default_value = "30s")]
    pub grace: String,

    /// Default per-request timeout
    #[arg(long, default_value = "30s")]
    pub timeout: String,

    /// Maximum concurrent sessions
    #[arg(long, default_value = "10000")]
    pub max_sessions: usize,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: ReportFormatArg,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Scenario file (YAML or JSON)
    pub scenario: PathBuf,
}

/// Report output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormatArg {
    /// Text table
    #[default]
    Text,
    /// Pretty JSON
    Json,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// JSON lines
    Json,
}

impl From<LogFormatArg> for crate::config::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}
