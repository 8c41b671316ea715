//! Report and plan rendering

use crate::error::{CliError, CliResult};
use std::time::Duration;
use surge::duration::format_duration;
use surge::{RampScheduler, RunReport, Scenario, Step};

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

fn fmt_ms(ms: f64) -> String {
    if ms >= 10_000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else if ms >= 100.0 {
        format!("{:.0}ms", ms)
    } else {
        format!("{:.1}ms", ms)
    }
}

/// Render a run report as a text table
pub fn render_report_text(report: &RunReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("SURGE RUN: {}\n", report.scenario_id));
    output.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    output.push_str(&format!(
        "Run: {} │ Duration: {:.1}s │ Ended: {}\n",
        report.run_id,
        report.duration_secs(),
        report.end_reason
    ));
    output.push_str(&format!(
        "Peak concurrency: {} │ Sessions: {} ({} force-stopped)\n\n",
        report.peak_concurrency, report.sessions_started, report.sessions_force_stopped
    ));

    if let Some(failure) = &report.setup_failure {
        output.push_str(&format!("Setup failure: {}\n\n", failure));
    }

    if !report.per_metric.is_empty() {
        output.push_str("Metrics:\n");
        output.push_str("┌────────────────────┬─────────┬─────────┬─────────┬─────────┬─────────┬─────────┐\n");
        output.push_str("│ Metric             │ Count   │ Rate/s  │ p50     │ p95     │ p99     │ Errors  │\n");
        output.push_str("├────────────────────┼─────────┼─────────┼─────────┼─────────┼─────────┼─────────┤\n");
        for (name, m) in &report.per_metric {
            output.push_str(&format!(
                "│ {:<18} │ {:>7} │ {:>7.1} │ {:>7} │ {:>7} │ {:>7} │ {:>6.2}% │\n",
                truncate(name, 18),
                m.count,
                m.rate_per_second,
                fmt_ms(m.p50),
                fmt_ms(m.p95),
                fmt_ms(m.p99),
                m.error_rate * 100.0
            ));
        }
        output.push_str("└────────────────────┴─────────┴─────────┴─────────┴─────────┴─────────┴─────────┘\n\n");
    }

    if !report.per_threshold.is_empty() {
        output.push_str("Thresholds:\n");
        for (name, result) in &report.per_threshold {
            let mark = if result.pass { "✓" } else { "✗" };
            let observed = result
                .observed
                .map_or_else(|| "no samples".to_string(), |v| format!("{:.3}", v));
            output.push_str(&format!("  {} {} (observed {})\n", mark, name, observed));
        }
        output.push('\n');
    }

    if let Some(point) = &report.breaking_point {
        output.push_str(&format!(
            "Breaking point: {} sessions (target {}) at {:.1}s, error rate {:.1}%\n\n",
            point.concurrency,
            point.target,
            point.elapsed_secs,
            point.error_rate * 100.0
        ));
    }

    output.push_str(&format!(
        "Result: {}\n",
        if report.overall_pass { "PASS" } else { "FAIL" }
    ));
    output
}

/// Render a run report as pretty JSON
pub fn render_report_json(report: &RunReport) -> CliResult<String> {
    serde_json::to_string_pretty(report).map_err(|e| CliError::report_generation(e.to_string()))
}

fn describe_steps(steps: &[Step], depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth + 1);
    for step in steps {
        match step {
            Step::Request(op) => {
                let chance = op
                    .probability
                    .map_or_else(String::new, |p| format!(" ({:.0}%)", p * 100.0));
                out.push_str(&format!("{indent}{} {} {}{}\n", op.method, op.path, op.name, chance));
            }
            Step::OneOf { one_of } => {
                out.push_str(&format!("{indent}one of:\n"));
                for branch in one_of {
                    out.push_str(&format!("{indent}  weight {}:\n", branch.weight));
                    describe_steps(&branch.steps, depth + 2, out);
                }
            }
        }
    }
}

/// Render the stage plan of a validated scenario
pub fn render_plan(scenario: &Scenario) -> String {
    let scheduler = RampScheduler::with_start(scenario.start_concurrency, scenario.stages.clone());
    let mut output = String::new();

    output.push_str(&format!("SCENARIO: {}\n", scenario.name));
    if !scenario.description.is_empty() {
        output.push_str(&format!("{}\n", scenario.description));
    }
    output.push('\n');

    output.push_str("Stages:\n");
    for row in scheduler.plan() {
        let kind = if row.duration == Duration::ZERO {
            "jump"
        } else {
            "ramp"
        };
        output.push_str(&format!(
            "  {:>2}. at {:>8}  {} {:>5} → {:<5} over {}\n",
            row.index + 1,
            format_duration(row.starts_at),
            kind,
            row.from,
            row.to,
            format_duration(row.duration)
        ));
    }
    output.push_str(&format!(
        "Total: {} │ peak {} sessions │ think time {}–{}\n\n",
        format_duration(scheduler.total_duration()),
        scheduler.peak_target(),
        format_duration(scenario.think_time.min),
        format_duration(scenario.think_time.max)
    ));

    output.push_str("Steps:\n");
    describe_steps(&scenario.steps, 0, &mut output);

    if !scenario.thresholds.is_empty() {
        output.push_str("\nThresholds:\n");
        for (metric, specs) in &scenario.thresholds {
            for spec in specs {
                let abort = if spec.abort_on_fail() { " [abort]" } else { "" };
                output.push_str(&format!("  {}: {}{}\n", metric, spec.expression(), abort));
            }
        }
    }
    output
}
