//! Test runner: owns the schedule, the collector and the session population.
//!
//! Each tick the runner asks the scheduler for the desired concurrency and
//! reconciles the live session count to it. Surplus sessions are retired
//! newest first and allowed to finish their current iteration.

use crate::auth::{Credentials, LoginEndpoint, TokenSource};
use crate::breaking::BreakingPointDetector;
use crate::client::TargetClient;
use crate::config::RunnerConfig;
use crate::metrics::{self, MetricCollector};
use crate::report::{EndReason, RunReport};
use crate::scenario::Scenario;
use crate::schedule::RampScheduler;
use crate::session::{Session, SessionContext, SessionOutcome};
use crate::threshold::{self, Threshold};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A live session task
#[derive(Debug)]
struct SessionHandle {
    id: u64,
    stop: watch::Sender<bool>,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    fn retire(&self) {
        let _ = self.stop.send(true);
    }
}

/// Population bookkeeping for one run
#[derive(Debug, Default)]
struct Population {
    active: Vec<SessionHandle>,
    retiring: Vec<SessionHandle>,
    next_id: u64,
    started: u64,
    peak: u32,
    iterations: u64,
}

impl Population {
    fn live(&self) -> usize {
        self.active.len() + self.retiring.len()
    }

    fn running(&self) -> u32 {
        self.active.len() as u32
    }

    fn spawn(&mut self, ctx: &Arc<SessionContext>) {
        self.next_id += 1;
        let (stop, rx) = watch::channel(false);
        let session = Session::new(self.next_id, Arc::clone(ctx));
        let task = tokio::spawn(session.run(rx));
        self.active.push(SessionHandle {
            id: self.next_id,
            stop,
            task,
        });
        self.started += 1;
        self.peak = self.peak.max(self.running());
    }

    fn retire_newest(&mut self, count: usize) {
        for _ in 0..count {
            if let Some(handle) = self.active.pop() {
                handle.retire();
                debug!(session_id = handle.id, "session retired");
                self.retiring.push(handle);
            }
        }
    }

    /// Drop retired sessions whose task already finished
    async fn reap(&mut self) {
        let (done, pending): (Vec<_>, Vec<_>) = self
            .retiring
            .drain(..)
            .partition(|h| h.task.is_finished());
        self.retiring = pending;
        for handle in done {
            if let Ok(outcome) = handle.task.await {
                self.iterations += outcome.iterations;
            }
        }
    }
}

/// Orchestrates runs with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct TestRunner {
    config: RunnerConfig,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl TestRunner {
    /// Create a runner
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            token_source: None,
        }
    }

    /// Use this token source instead of logging in with credentials
    pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    /// Runner configuration
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn resolve_token_source(
        &self,
        scenario: &Scenario,
        client: &TargetClient,
        credentials: Option<Credentials>,
    ) -> Option<Arc<dyn TokenSource>> {
        if let Some(source) = &self.token_source {
            return Some(Arc::clone(source));
        }
        let auth = scenario.auth.as_ref()?;
        match credentials {
            Some(credentials) => Some(Arc::new(LoginEndpoint::new(
                client.clone(),
                auth.clone(),
                credentials,
            ))),
            None => {
                warn!(scenario = %scenario.name, "scenario declares auth but no credentials were given; running anonymously");
                None
            }
        }
    }

    /// Run `scenario` against `base_url` and always produce a report.
    ///
    /// `time_budget` caps the wall-clock length; teardown starts when it
    /// expires even if stages remain.
    #[instrument(skip_all, fields(scenario = %scenario.name, base_url = %base_url))]
    pub async fn start(
        &self,
        scenario: &Scenario,
        base_url: &str,
        credentials: Option<Credentials>,
        time_budget: Option<Duration>,
    ) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let start_time = Utc::now();
        let collector = Arc::new(MetricCollector::new());
        info!(run_id = %run_id, stages = scenario.stages.len(), "run starting");

        // Parsed thresholds are still judged (and fail) when setup fails
        let setup_failed = |message: String, thresholds: &[Threshold], collector: &MetricCollector| {
            warn!(run_id = %run_id, error = %message, "setup failed");
            let per_metric = collector.summaries();
            let per_threshold = threshold::evaluate_all(thresholds, &per_metric);
            RunReport::setup_failed(
                run_id.clone(),
                scenario.name.clone(),
                start_time,
                message,
                per_metric,
            )
            .with_threshold_results(per_threshold)
        };

        let thresholds = match scenario.validate().and_then(|()| scenario.thresholds()) {
            Ok(t) => t,
            Err(e) => return setup_failed(e.to_string(), &[], &collector),
        };
        let client = match TargetClient::new(base_url, &self.config) {
            Ok(c) => c,
            Err(e) => return setup_failed(e.to_string(), &thresholds, &collector),
        };

        if let Some(check) = &scenario.setup {
            let check_start = Instant::now();
            let result = client.health_check(check).await;
            let latency_ms = check_start.elapsed().as_secs_f64() * 1000.0;
            collector.record_value(metrics::SETUP, latency_ms, result.is_ok());
            if let Err(e) = result {
                return setup_failed(
                    format!("health check {} failed: {}", check.path, e),
                    &thresholds,
                    &collector,
                );
            }
            debug!(run_id = %run_id, latency_ms, "setup health check passed");
        }

        let ctx = Arc::new(SessionContext {
            token_source: self.resolve_token_source(scenario, &client, credentials),
            token_ttl: scenario.auth.as_ref().and_then(|a| a.token_ttl),
            client,
            collector: Arc::clone(&collector),
            steps: scenario.steps.clone(),
            think_time: scenario.think_time,
        });

        let scheduler = RampScheduler::with_start(scenario.start_concurrency, scenario.stages.clone());
        let mut detector = scenario
            .breaking_point
            .clone()
            .map(BreakingPointDetector::new);
        let mut population = Population::default();

        let end_reason = self
            .drive(
                &run_id,
                &scheduler,
                &ctx,
                &thresholds,
                detector.as_mut(),
                &mut population,
                time_budget,
            )
            .await;

        let force_stopped = self.teardown(&run_id, &mut population).await;

        let per_metric = collector.summaries();
        let per_threshold = threshold::evaluate_all(&thresholds, &per_metric);
        let overall_pass = per_threshold.values().all(|r| r.pass);

        info!(
            run_id = %run_id,
            end_reason = %end_reason,
            overall_pass,
            sessions_started = population.started,
            iterations = population.iterations,
            "run finished"
        );

        RunReport {
            run_id,
            scenario_id: scenario.name.clone(),
            start_time,
            end_time: Utc::now(),
            per_metric,
            per_threshold,
            overall_pass,
            setup_failure: None,
            end_reason,
            peak_concurrency: population.peak,
            sessions_started: population.started,
            sessions_force_stopped: force_stopped,
            breaking_point: detector.and_then(|d| d.found()),
        }
    }

    /// The tick loop; returns why it ended
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        run_id: &str,
        scheduler: &RampScheduler,
        ctx: &Arc<SessionContext>,
        thresholds: &[Threshold],
        mut detector: Option<&mut BreakingPointDetector>,
        population: &mut Population,
        time_budget: Option<Duration>,
    ) -> EndReason {
        let started = Instant::now();
        let deadline = time_budget.map(|b| tokio::time::Instant::from_std(started + b));
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_target = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = sleep_until(deadline) => {
                    info!(run_id = %run_id, "time budget exhausted");
                    return EndReason::TimeBudget;
                }
            }

            let elapsed = started.elapsed();
            let Some(target) = scheduler.target_at(elapsed) else {
                return EndReason::Completed;
            };

            population.reap().await;
            self.reconcile(run_id, target, ctx, population);
            if last_target != Some(target) {
                debug!(run_id = %run_id, target, running = population.running(), "target changed");
                last_target = Some(target);
            }

            if let Some(failed) = first_abort_failure(thresholds, &ctx.collector) {
                warn!(run_id = %run_id, threshold = %failed, "abort-on-fail threshold failed");
                return EndReason::ThresholdAbort;
            }

            if let Some(detector) = detector.as_deref_mut() {
                let counters = ctx.collector.counters(detector.metric());
                if let Some(point) = detector.observe(counters, population.running(), target, elapsed) {
                    warn!(
                        run_id = %run_id,
                        concurrency = point.concurrency,
                        error_rate = point.error_rate,
                        elapsed_secs = point.elapsed_secs,
                        "breaking point reached"
                    );
                    if detector.aborts() {
                        return EndReason::BreakingPoint;
                    }
                }
            }
        }
    }

    /// Start or retire sessions so that `running == target`, within the cap
    fn reconcile(
        &self,
        run_id: &str,
        target: u32,
        ctx: &Arc<SessionContext>,
        population: &mut Population,
    ) {
        let running = population.running();
        if target > running {
            let wanted = (target - running) as usize;
            let room = self.config.max_sessions.saturating_sub(population.live());
            let spawn = wanted.min(room);
            for _ in 0..spawn {
                population.spawn(ctx);
            }
            let shortfall = wanted - spawn;
            if shortfall > 0 {
                ctx.collector
                    .record_value(metrics::SCHEDULER_FAILURES, shortfall as f64, false);
                warn!(
                    run_id = %run_id,
                    target,
                    running = population.running(),
                    shortfall,
                    "session cap reached; running at reduced concurrency"
                );
            }
        } else if target < running {
            population.retire_newest((running - target) as usize);
        }
    }

    /// Stop every session; abort those still busy after the grace period.
    /// Returns the number of force-stopped sessions.
    async fn teardown(&self, run_id: &str, population: &mut Population) -> u64 {
        let count = population.active.len();
        population.retire_newest(count);
        info!(run_id = %run_id, sessions = population.retiring.len(), "stopping sessions");

        let deadline = tokio::time::Instant::now() + self.config.grace_period;
        let waits = population.retiring.drain(..).map(|mut handle| async move {
            let result = tokio::time::timeout_at(deadline, &mut handle.task).await;
            (handle, result)
        });

        let mut force_stopped = 0;
        for (handle, result) in join_all(waits).await {
            match result {
                Ok(Ok(outcome)) => population.iterations += outcome.iterations,
                Ok(Err(e)) => warn!(run_id = %run_id, session_id = handle.id, error = %e, "session task failed"),
                Err(_) => {
                    handle.task.abort();
                    force_stopped += 1;
                    warn!(run_id = %run_id, session_id = handle.id, "session force-stopped after grace period");
                }
            }
        }
        force_stopped
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Name of the first abort-on-fail threshold that fails on a metric with samples
fn first_abort_failure(thresholds: &[Threshold], collector: &MetricCollector) -> Option<String> {
    thresholds
        .iter()
        .filter(|t| t.abort_on_fail)
        .find(|t| {
            collector
                .summary(&t.metric)
                .is_some_and(|s| s.count > 0 && !t.evaluate(Some(&s)).pass)
        })
        .map(|t| t.name.clone())
}

/// Run `scenario` with the default configuration
pub async fn start(
    scenario: &Scenario,
    base_url: &str,
    credentials: Option<Credentials>,
    time_budget: Option<Duration>,
) -> RunReport {
    TestRunner::default()
        .start(scenario, base_url, credentials, time_budget)
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::scenario::{HealthCheck, Operation, ThinkTime};

    fn fast_config() -> RunnerConfig {
        RunnerConfig::default()
            .with_tick_interval(Duration::from_millis(20))
            .with_grace_period(Duration::from_millis(500))
            .with_request_timeout(Duration::from_millis(500))
    }

    fn unreachable_scenario() -> Scenario {
        Scenario::new("unreachable")
            .with_stage(Duration::from_millis(200), 4)
            .with_step(Operation::get("home", "/"))
            .with_think_time(ThinkTime::fixed(Duration::from_millis(10)))
    }

    #[test]
    fn test_first_abort_failure_needs_samples() {
        let collector = MetricCollector::new();
        let thresholds = vec![
            Threshold::parse("http_reqs", "error_rate<0.5").unwrap().with_abort_on_fail(true),
            Threshold::parse("http_reqs", "p(95)<0.001").unwrap(),
        ];
        assert!(first_abort_failure(&thresholds, &collector).is_none());
        collector.record_value("http_reqs", 10.0, false);
        assert_eq!(
            first_abort_failure(&thresholds, &collector).as_deref(),
            Some("http_reqs: error_rate<0.5")
        );
    }

    #[tokio::test]
    async fn test_invalid_scenario_is_setup_failure() {
        let report = TestRunner::new(fast_config())
            .start(&Scenario::new("empty"), "http://127.0.0.1:1", None, None)
            .await;
        assert_eq!(report.end_reason, EndReason::SetupFailed);
        assert!(!report.overall_pass);
        assert_eq!(report.sessions_started, 0);
    }

    #[tokio::test]
    async fn test_setup_health_check_failure_starts_no_sessions() {
        let scenario = unreachable_scenario().with_setup(HealthCheck::default());
        let report = TestRunner::new(fast_config())
            .start(&scenario, "http://127.0.0.1:1", None, None)
            .await;
        assert_eq!(report.end_reason, EndReason::SetupFailed);
        assert!(report.setup_failure.as_deref().unwrap().contains("/api/health"));
        assert_eq!(report.metric(metrics::SETUP).unwrap().failures, 1);
        assert!(report.metric(metrics::HTTP_REQS).is_none());
    }

    #[tokio::test]
    async fn test_setup_failure_still_reports_thresholds() {
        let scenario = unreachable_scenario()
            .with_setup(HealthCheck::default())
            .with_threshold("http_reqs", "p(95)<500");
        let report = TestRunner::new(fast_config())
            .start(&scenario, "http://127.0.0.1:1", None, None)
            .await;
        assert_eq!(report.end_reason, EndReason::SetupFailed);
        let result = &report.per_threshold["http_reqs: p(95)<500"];
        assert!(!result.pass);
        assert!(result.observed.is_none());
        assert!(!report.overall_pass);
    }

    #[tokio::test]
    async fn test_failures_degrade_into_metrics() {
        let scenario = unreachable_scenario().with_threshold("http_reqs", "error_rate<0.5");
        let report = TestRunner::new(fast_config())
            .start(&scenario, "http://127.0.0.1:1", None, None)
            .await;
        assert_eq!(report.end_reason, EndReason::Completed);
        assert!(!report.overall_pass);
        let http = report.metric(metrics::HTTP_REQS).unwrap();
        assert!(http.count > 0);
        assert_eq!(http.error_rate, 1.0);
        assert!(report.sessions_started >= 1);
    }

    #[tokio::test]
    async fn test_abort_threshold_ends_run_early() {
        let scenario = Scenario::new("abort")
            .with_stage(Duration::ZERO, 2)
            .with_stage(Duration::from_secs(30), 2)
            .with_step(Operation::get("home", "/"))
            .with_think_time(ThinkTime::fixed(Duration::from_millis(10)))
            .with_abort_threshold("http_reqs", "error_rate<0.1");
        let report = TestRunner::new(fast_config())
            .start(&scenario, "http://127.0.0.1:1", None, None)
            .await;
        assert_eq!(report.end_reason, EndReason::ThresholdAbort);
        assert!(report.duration_secs() < 10.0);
    }

    #[tokio::test]
    async fn test_session_cap_records_scheduler_failures() {
        let scenario = Scenario::new("capped")
            .with_stage(Duration::ZERO, 5)
            .with_stage(Duration::from_millis(100), 5)
            .with_step(Operation::get("home", "/"))
            .with_think_time(ThinkTime::fixed(Duration::from_millis(10)));
        let report = TestRunner::new(fast_config().with_max_sessions(2))
            .start(&scenario, "http://127.0.0.1:1", None, None)
            .await;
        assert_eq!(report.peak_concurrency, 2);
        let failures = report.metric(metrics::SCHEDULER_FAILURES).unwrap();
        assert!(failures.count >= 1);
        assert_eq!(failures.max, 3.0);
    }

    #[tokio::test]
    async fn test_time_budget_cuts_run() {
        let scenario = Scenario::new("long")
            .with_stage(Duration::from_secs(600), 1)
            .with_step(Operation::get("home", "/"))
            .with_think_time(ThinkTime::fixed(Duration::from_millis(10)));
        let report = TestRunner::new(fast_config())
            .start(&scenario, "http://127.0.0.1:1", None, Some(Duration::from_millis(200)))
            .await;
        assert_eq!(report.end_reason, EndReason::TimeBudget);
        assert!(report.duration_secs() < 5.0);
    }
}
