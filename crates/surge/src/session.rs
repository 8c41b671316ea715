//! Virtual user: one token, one rng, the scenario's steps on repeat.

use crate::auth::{AuthToken, TokenSource};
use crate::client::{OutgoingRequest, TargetClient};
use crate::metrics::{self, MetricCollector};
use crate::scenario::{Operation, Step, ThinkTime};
use crate::template::TemplateVars;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, trace};

/// State shared by every session of a run
#[derive(Debug)]
pub struct SessionContext {
    /// Target client
    pub client: TargetClient,
    /// Sample sink
    pub collector: Arc<MetricCollector>,
    /// Steps to repeat
    pub steps: Vec<Step>,
    /// Pause between iterations
    pub think_time: ThinkTime,
    /// Where tokens come from; `None` runs anonymously
    pub token_source: Option<Arc<dyn TokenSource>>,
    /// Token lifetime
    pub token_ttl: Option<Duration>,
}

/// What a session did over its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOutcome {
    /// Session id
    pub id: u64,
    /// Iterations finished
    pub iterations: u64,
    /// Failed operations and credential exchanges
    pub errors: u64,
}

/// How one iteration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationEnd {
    /// Every planned operation ran
    Completed,
    /// Credential exchange failed; no operation ran
    AuthFailed,
    /// An operation was refused with 401/403; token dropped
    Unauthorized,
}

/// One virtual user
#[derive(Debug)]
pub struct Session {
    id: u64,
    ctx: Arc<SessionContext>,
    token: Option<AuthToken>,
    iteration: u64,
    errors: u64,
    rng: StdRng,
}

fn is_auth_rejection(status: u16) -> bool {
    status == 401 || status == 403
}

impl Session {
    /// Create a session
    pub fn new(id: u64, ctx: Arc<SessionContext>) -> Self {
        Self {
            id,
            ctx,
            token: None,
            iteration: 0,
            errors: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a session with a deterministic rng
    pub fn with_seed(id: u64, ctx: Arc<SessionContext>, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(id, ctx)
        }
    }

    /// Session id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Iterate until `stop` turns true. Stop is honoured between iterations
    /// and during think time, never mid-request.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> SessionOutcome {
        debug!(session_id = self.id, "session started");
        loop {
            if *stop.borrow() {
                break;
            }
            self.iterate().await;

            let pause = self.ctx.think_time.sample(&mut self.rng);
            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(
            session_id = self.id,
            iterations = self.iteration,
            errors = self.errors,
            "session stopped"
        );
        SessionOutcome {
            id: self.id,
            iterations: self.iteration,
            errors: self.errors,
        }
    }

    fn needs_token(&self) -> bool {
        self.ctx.token_source.is_some()
            && self
                .token
                .as_ref()
                .map_or(true, |t| t.is_expired(self.ctx.token_ttl))
    }

    async fn authenticate(&mut self) -> bool {
        let Some(source) = self.ctx.token_source.clone() else {
            return true;
        };
        let start = Instant::now();
        let result = source.acquire().await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(token) => {
                self.ctx.collector.record_value(metrics::AUTH, latency_ms, true);
                self.token = Some(token);
                true
            }
            Err(e) => {
                self.ctx.collector.record_value(metrics::AUTH, latency_ms, false);
                debug!(session_id = self.id, error = %e, "credential exchange failed");
                self.token = None;
                false
            }
        }
    }

    /// Resolve `one_of` choices and probabilities into a flat plan
    fn plan_iteration(&mut self) -> Vec<Operation> {
        let ctx = Arc::clone(&self.ctx);
        let mut plan = Vec::new();
        let mut pending: Vec<&Step> = ctx.steps.iter().rev().collect();
        while let Some(step) = pending.pop() {
            match step {
                Step::Request(op) => {
                    let runs = op
                        .probability
                        .map_or(true, |p| p >= 1.0 || (p > 0.0 && self.rng.gen_bool(p)));
                    if runs {
                        plan.push(op.clone());
                    }
                }
                Step::OneOf { one_of } => {
                    if let Some(i) = Step::pick_branch(one_of, &mut self.rng) {
                        pending.extend(one_of[i].steps.iter().rev());
                    }
                }
            }
        }
        plan
    }

    /// Perform one operation; returns `(success, status)`
    async fn perform(&self, op: &Operation) -> (bool, Option<u16>) {
        let vars = TemplateVars::now(self.id, self.iteration);
        let request = OutgoingRequest {
            method: op.method.as_reqwest(),
            path: vars.render(&op.path),
            body: op.body.as_ref().map(|b| vars.render_json(b)),
            headers: op
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), vars.render(v)))
                .collect(),
            bearer: if op.authenticated {
                self.token.as_ref().map(|t| t.value.clone())
            } else {
                None
            },
            timeout: op.timeout,
        };

        let start = Instant::now();
        let (latency, status, success) = match self.ctx.client.send(request).await {
            Ok(resp) => (resp.latency, Some(resp.status), op.accepts(resp.status)),
            Err(e) => {
                debug!(session_id = self.id, operation = %op.name, error = %e, "request failed");
                (start.elapsed(), None, false)
            }
        };
        let latency_ms = latency.as_secs_f64() * 1000.0;
        self.ctx.collector.record_value(&op.name, latency_ms, success);
        self.ctx
            .collector
            .record_value(metrics::HTTP_REQS, latency_ms, success);
        trace!(session_id = self.id, operation = %op.name, ?status, latency_ms, "operation");
        (success, status)
    }

    /// Run one iteration: authenticate if needed, then the planned operations
    pub async fn iterate(&mut self) -> IterationEnd {
        let started = Instant::now();
        let mut clean = true;

        let end = if self.needs_token() && !self.authenticate().await {
            self.errors += 1;
            clean = false;
            IterationEnd::AuthFailed
        } else {
            let mut end = IterationEnd::Completed;
            for op in self.plan_iteration() {
                let (success, status) = self.perform(&op).await;
                if !success {
                    self.errors += 1;
                    clean = false;
                }
                if op.authenticated
                    && self.ctx.token_source.is_some()
                    && status.is_some_and(is_auth_rejection)
                {
                    self.token = None;
                    end = IterationEnd::Unauthorized;
                    break;
                }
            }
            end
        };

        self.ctx.collector.record_value(
            metrics::ITERATIONS,
            started.elapsed().as_secs_f64() * 1000.0,
            clean,
        );
        self.iteration += 1;
        end
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, StaticToken};
    use crate::config::RunnerConfig;
    use crate::scenario::Branch;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Default)]
    struct FailingSource {
        calls: AtomicU64,
    }

    #[async_trait]
    impl TokenSource for FailingSource {
        async fn acquire(&self) -> Result<AuthToken, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AuthError::Rejected { status: 401 })
        }
    }

    fn context(steps: Vec<Step>, token_source: Option<Arc<dyn TokenSource>>) -> Arc<SessionContext> {
        let client = TargetClient::new("http://127.0.0.1:1", &RunnerConfig::default()).unwrap();
        Arc::new(SessionContext {
            client,
            collector: Arc::new(MetricCollector::new()),
            steps,
            think_time: ThinkTime::fixed(Duration::from_millis(1)),
            token_source,
            token_ttl: None,
        })
    }

    #[tokio::test]
    async fn test_auth_failure_records_one_sample_and_skips_operations() {
        let source = Arc::new(FailingSource::default());
        let ctx = context(
            vec![Operation::get("profile", "/api/auth/profile").into()],
            Some(source.clone()),
        );
        let mut session = Session::with_seed(1, Arc::clone(&ctx), 1);
        for _ in 0..3 {
            assert_eq!(session.iterate().await, IterationEnd::AuthFailed);
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(ctx.collector.counters(metrics::AUTH), (3, 3));
        assert_eq!(ctx.collector.counters("profile"), (0, 0));
        assert_eq!(ctx.collector.counters(metrics::ITERATIONS), (3, 3));
    }

    #[tokio::test]
    async fn test_static_token_then_failed_requests_degrade_to_samples() {
        let ctx = context(
            vec![
                Operation::get("a", "/a").into(),
                Operation::get("b", "/b").into(),
            ],
            Some(Arc::new(StaticToken::new("tok"))),
        );
        let mut session = Session::with_seed(2, Arc::clone(&ctx), 2);
        assert_eq!(session.iterate().await, IterationEnd::Completed);
        assert_eq!(ctx.collector.counters(metrics::AUTH), (1, 0));
        assert_eq!(ctx.collector.counters("a"), (1, 1));
        assert_eq!(ctx.collector.counters("b"), (1, 1));
        assert_eq!(ctx.collector.counters(metrics::HTTP_REQS), (2, 2));

        session.iterate().await;
        assert_eq!(ctx.collector.counters(metrics::AUTH), (1, 0));
    }

    #[tokio::test]
    async fn test_plan_respects_probability() {
        let ctx = context(
            vec![
                Operation::get("always", "/").into(),
                Operation::get("never", "/").with_probability(0.0).into(),
            ],
            None,
        );
        let mut session = Session::with_seed(3, ctx, 3);
        for _ in 0..50 {
            let names: Vec<_> = session.plan_iteration().into_iter().map(|o| o.name).collect();
            assert_eq!(names, vec!["always"]);
        }
    }

    #[tokio::test]
    async fn test_plan_one_of_picks_exactly_one_branch() {
        let ctx = context(
            vec![
                Step::OneOf {
                    one_of: vec![
                        Branch::new(1.0, vec![Operation::get("x", "/x").into()]),
                        Branch::new(
                            1.0,
                            vec![
                                Operation::get("y1", "/y").into(),
                                Operation::get("y2", "/y").into(),
                            ],
                        ),
                    ],
                },
                Operation::get("tail", "/t").into(),
            ],
            None,
        );
        let mut session = Session::with_seed(4, ctx, 4);
        let mut saw_x = false;
        let mut saw_y = false;
        for _ in 0..100 {
            let names: Vec<_> = session.plan_iteration().into_iter().map(|o| o.name).collect();
            match names.as_slice() {
                [x, tail] if x == "x" && tail == "tail" => saw_x = true,
                [y1, y2, tail] if y1 == "y1" && y2 == "y2" && tail == "tail" => saw_y = true,
                other => panic!("unexpected plan {:?}", other),
            }
        }
        assert!(saw_x && saw_y);
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let ctx = context(vec![Operation::get("a", "/a").into()], None);
        let session = Session::with_seed(5, Arc::clone(&ctx), 5);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(session.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.id, 5);
        assert!(outcome.iterations >= 1);
        assert_eq!(outcome.errors, outcome.iterations);
    }

    #[tokio::test]
    async fn test_run_exits_when_sender_dropped() {
        let ctx = context(vec![Operation::get("a", "/a").into()], None);
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            Session::with_seed(6, ctx, 6).run(rx),
        )
        .await
        .unwrap();
        assert_eq!(outcome.iterations, 1);
    }
}
