//! Surge CLI Library
//!
//! Argument parsing, report rendering and process glue for the `surge`
//! binary. All load-test behavior lives in the `surge` crate.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod logging;
mod output;
pub mod render;

pub use commands::{
    Cli, ColorArg, Commands, LogFormatArg, ReportFormatArg, RunArgs, ValidateArgs,
};
pub use config::{CliConfig, ColorChoice, LogFormat, Verbosity};
pub use error::{CliError, CliResult};
pub use output::ProgressReporter;
pub use render::{render_plan, render_report_json, render_report_text};

use std::process::ExitCode;
use surge::{EndReason, RunReport};

/// How a command finished, mapped to the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Everything passed (exit 0)
    Passed,
    /// One or more thresholds failed (exit 1)
    ThresholdsFailed,
    /// Setup or preparation failed (exit 2)
    SetupFailed,
}

impl Outcome {
    /// Classify a finished run
    #[must_use]
    pub fn of(report: &RunReport) -> Self {
        if report.end_reason == EndReason::SetupFailed {
            Self::SetupFailed
        } else if report.overall_pass {
            Self::Passed
        } else {
            Self::ThresholdsFailed
        }
    }

    /// Process exit code
    #[must_use]
    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Numeric exit status
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Passed => 0,
            Self::ThresholdsFailed => 1,
            Self::SetupFailed => 2,
        }
    }
}
