//! Surge CLI: run HTTP load-test scenarios
//!
//! ## Usage
//!
//! ```bash
//! surge validate demos/spike.yaml
//! surge run demos/normal.yaml --url http://localhost:8080 --email a@b.c --password pw
//! surge run demos/stress.yaml --url http://localhost:8080 --budget 10m --format json -o report.json
//! ```

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use surge::duration::parse_duration;
use surge::{Credentials, RunnerConfig, Scenario, StaticToken, TestRunner};
use surge_cli::logging::init_tracing;
use surge_cli::{
    render_plan, render_report_json, render_report_text, Cli, CliConfig, CliError, CliResult,
    ColorChoice, Commands, LogFormat, Outcome, ProgressReporter, ReportFormatArg, RunArgs,
    ValidateArgs, Verbosity,
};

fn main() -> ExitCode {
    match run() {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("Error: {e}");
            Outcome::SetupFailed.exit_code()
        }
    }
}

fn run() -> CliResult<Outcome> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(&config)?;

    match cli.command {
        Commands::Run(args) => run_scenario(&config, &args),
        Commands::Validate(args) => validate_scenario(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };
    let color: ColorChoice = cli.color.into();
    let log_format: LogFormat = cli.log_format.into();

    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_log_format(log_format)
}

fn duration_arg(flag: &str, value: &str) -> CliResult<std::time::Duration> {
    parse_duration(value).map_err(|e| CliError::invalid_argument(format!("--{flag}: {e}")))
}

fn runner_config(args: &RunArgs) -> CliResult<RunnerConfig> {
    if args.max_sessions == 0 {
        return Err(CliError::invalid_argument("--max-sessions must be at least 1"));
    }
    Ok(RunnerConfig::new()
        .with_tick_interval(duration_arg("tick", &args.tick)?)
        .with_grace_period(duration_arg("grace", &args.grace)?)
        .with_request_timeout(duration_arg("timeout", &args.timeout)?)
        .with_max_sessions(args.max_sessions))
}

fn run_scenario(config: &CliConfig, args: &RunArgs) -> CliResult<Outcome> {
    let mut reporter = ProgressReporter::new(
        config.color.should_color(),
        config.verbosity.is_quiet(),
    );

    let scenario = Scenario::load(&args.scenario)?;
    let budget = args
        .budget
        .as_deref()
        .map(|b| duration_arg("budget", b))
        .transpose()?;
    let runner_config = runner_config(args)?;

    let credentials = match (&args.email, &args.password) {
        (Some(email), Some(password)) => Some(Credentials::new(email, password)),
        _ => None,
    };
    let mut runner = TestRunner::new(runner_config);
    if let Some(token) = &args.token {
        runner = runner.with_token_source(Arc::new(StaticToken::new(token.clone())));
    }

    if config.verbosity.is_verbose() {
        reporter.info(&format!(
            "running '{}' against {} ({} stages)",
            scenario.name,
            args.url,
            scenario.stages.len()
        ));
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::config(format!("failed to create runtime: {e}")))?;

    reporter.start_spinner(&format!("surge: {}", scenario.name));
    let report = rt.block_on(runner.start(&scenario, &args.url, credentials, budget));
    reporter.finish();

    let rendered = match args.format {
        ReportFormatArg::Text => render_report_text(&report),
        ReportFormatArg::Json => render_report_json(&report)?,
    };
    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)?;
            reporter.info(&format!("report written to {}", path.display()));
        }
        None => print!("{rendered}"),
    }

    let outcome = Outcome::of(&report);
    match outcome {
        Outcome::Passed => reporter.success(&format!("{} thresholds passed", report.per_threshold.len())),
        Outcome::ThresholdsFailed => reporter.failure(&format!(
            "{} of {} thresholds failed",
            report.failed_thresholds().count(),
            report.per_threshold.len()
        )),
        Outcome::SetupFailed => reporter.failure(&format!(
            "setup failed: {}",
            report.setup_failure.as_deref().unwrap_or("unknown")
        )),
    }
    Ok(outcome)
}

fn validate_scenario(config: &CliConfig, args: &ValidateArgs) -> CliResult<Outcome> {
    let scenario = Scenario::load(&args.scenario)?;
    print!("{}", render_plan(&scenario));

    let reporter = ProgressReporter::new(
        config.color.should_color(),
        config.verbosity.is_quiet(),
    );
    reporter.success(&format!("{} is valid", args.scenario.display()));
    Ok(Outcome::Passed)
}
