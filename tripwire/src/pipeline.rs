//! Guardrail pipeline: fan a payload out to every check of a stage and
//! reduce the verdicts.
//!
//! All checks of a stage always run; no check short-circuits another. The
//! stage trips iff at least one verdict trips, so the aggregate does not
//! depend on scheduling or registration order. A check whose oracle call
//! fails is reported with its error and contributes according to the
//! configured [`FailurePolicy`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::time::Instant;
use tracing::{Instrument, debug, warn};

use crate::config::{ExecutionMode, FailurePolicy, PipelineConfig};
use crate::context::CallContext;
use crate::error::{Error, OracleError, Result};
use crate::guardrail::{CheckRegistry, CheckSpec, Judgment, Stage};
use crate::oracle::{OracleAdapter, SharedOracle};
use crate::telemetry::{PipelineMetrics, Telemetry};

#[allow(clippy::cast_possible_truncation)]
fn as_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Outcome of one check in one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    /// Name of the check.
    pub check: String,
    /// Whether this check contributes a trip to the stage.
    pub tripped: bool,
    /// The validated oracle judgment, absent if the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judgment: Option<Judgment>,
    /// Why the oracle call failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OracleError>,
    /// Oracle calls made, including retries.
    pub attempts: u32,
    /// Time spent on this check.
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl Verdict {
    /// A verdict from a successful oracle call.
    #[must_use]
    pub fn judged(check: &CheckSpec, judgment: Judgment, attempts: u32, elapsed: Duration) -> Self {
        Self {
            check: check.name().to_owned(),
            tripped: check.decide(&judgment),
            judgment: Some(judgment),
            error: None,
            attempts,
            elapsed,
        }
    }

    /// A verdict for a check whose oracle call failed.
    ///
    /// Trips only under [`FailurePolicy::FailClosed`].
    #[must_use]
    pub fn failed(
        check: &CheckSpec,
        error: OracleError,
        attempts: u32,
        elapsed: Duration,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            check: check.name().to_owned(),
            tripped: policy == FailurePolicy::FailClosed,
            judgment: None,
            error: Some(error),
            attempts,
            elapsed,
        }
    }

    /// Returns `true` if the oracle call failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate outcome of one stage for one payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    /// Stage that was evaluated.
    pub stage: Stage,
    /// OR of every verdict's `tripped`.
    pub tripped: bool,
    /// One verdict per registered check, in registration order.
    pub verdicts: Vec<Verdict>,
    /// The payload as evaluated.
    pub payload: String,
    /// Wall-clock duration of the run.
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl PipelineResult {
    /// Reduce `verdicts` into a stage result.
    #[must_use]
    pub fn new(
        stage: Stage,
        payload: impl Into<String>,
        verdicts: Vec<Verdict>,
        elapsed: Duration,
    ) -> Self {
        Self {
            stage,
            tripped: verdicts.iter().any(|v| v.tripped),
            verdicts,
            payload: payload.into(),
            elapsed,
        }
    }

    /// Names of the checks that tripped.
    pub fn tripped_checks(&self) -> impl Iterator<Item = &str> {
        self.verdicts
            .iter()
            .filter(|v| v.tripped)
            .map(|v| v.check.as_str())
    }

    /// Names of the checks whose oracle call failed.
    pub fn failed_checks(&self) -> impl Iterator<Item = &str> {
        self.verdicts
            .iter()
            .filter(|v| v.is_failed())
            .map(|v| v.check.as_str())
    }

    /// The verdict for `check`, if it ran.
    #[must_use]
    pub fn verdict(&self, check: &str) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| v.check == check)
    }

    /// Summary counters for this run.
    #[must_use]
    pub fn metrics(&self) -> PipelineMetrics {
        PipelineMetrics::from_result(self)
    }
}

/// Runs the checks of a stage against an oracle.
///
/// Holds no per-turn state; one pipeline serves every turn concurrently.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<CheckRegistry>,
    adapter: OracleAdapter,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline over `registry`, judging with `oracle`.
    #[must_use]
    pub fn new(
        registry: impl Into<Arc<CheckRegistry>>,
        oracle: SharedOracle,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry: registry.into(),
            adapter: OracleAdapter::new(oracle).with_timeout(config.call_timeout()),
            config,
        }
    }

    /// The checks this pipeline runs.
    #[must_use]
    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    /// Scheduling and failure settings.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The oracle adapter shared by every check.
    #[must_use]
    pub const fn adapter(&self) -> &OracleAdapter {
        &self.adapter
    }

    /// Evaluate `payload` against every check registered for `stage`.
    ///
    /// Oracle failures never abort the run; they are recorded in the
    /// failing check's verdict.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the context is cancelled before or
    /// during the run. Verdicts gathered so far are discarded.
    pub async fn run(&self, stage: Stage, payload: &str, ctx: &CallContext) -> Result<PipelineResult> {
        if ctx.is_cancelled() {
            return Err(Error::cancelled(ctx.turn_id));
        }

        let span = Telemetry::pipeline_span(stage, ctx.turn_id);
        async {
            let start = Instant::now();
            let checks = self.registry.list(stage);
            debug!(checks = checks.len(), mode = ?self.config.mode, "running guardrail checks");

            let verdicts = tokio::select! {
                biased;
                () = ctx.cancellation().cancelled() => {
                    warn!("guardrail run cancelled");
                    return Err(Error::cancelled(ctx.turn_id));
                }
                verdicts = self.gather(stage, checks, payload, ctx) => verdicts,
            };

            let result = PipelineResult::new(stage, payload, verdicts, start.elapsed());
            Telemetry::record_result(&result);
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Evaluate every check, preserving registration order in the output.
    async fn gather(
        &self,
        stage: Stage,
        checks: &[CheckSpec],
        payload: &str,
        ctx: &CallContext,
    ) -> Vec<Verdict> {
        let mut verdicts = Vec::with_capacity(checks.len());
        match self.config.mode {
            ExecutionMode::Sequential => {
                for check in checks {
                    verdicts.push(self.run_check(stage, check, payload, ctx).await);
                }
            }
            ExecutionMode::Parallel { max_concurrency } => {
                let concurrency = max_concurrency.unwrap_or(checks.len()).max(1);
                for chunk in checks.chunks(concurrency) {
                    let futs = chunk
                        .iter()
                        .map(|check| self.run_check(stage, check, payload, ctx));
                    verdicts.extend(futures::future::join_all(futs).await);
                }
            }
        }
        verdicts
    }

    /// Evaluate one check, retrying retryable oracle failures.
    async fn run_check(
        &self,
        stage: Stage,
        check: &CheckSpec,
        payload: &str,
        ctx: &CallContext,
    ) -> Verdict {
        let span = Telemetry::check_span(check.name());
        async {
            let start = Instant::now();
            let retry = &self.config.retry;
            let max_attempts = retry.max_attempts.max(1);
            let mut attempt = 0;

            loop {
                attempt += 1;
                match self.adapter.evaluate(stage, check, payload, ctx).await {
                    Ok(judgment) => {
                        return Verdict::judged(check, judgment, attempt, start.elapsed());
                    }
                    Err(error) if error.is_retryable() && attempt < max_attempts => {
                        let delay = retry.delay_for_attempt(attempt - 1);
                        debug!(attempt, max_attempts, ?delay, %error, "retrying oracle call");
                        tokio::time::sleep(delay).await;
                    }
                    Err(error) => {
                        return Verdict::failed(
                            check,
                            error,
                            attempt,
                            start.elapsed(),
                            self.config.failure_policy,
                        );
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::config::RetryConfig;
    use crate::error::OracleErrorKind;
    use crate::guardrail::{input, output};
    use crate::oracle::{MockOracle, Oracle, OracleRequest};

    fn pipeline(oracle: MockOracle, config: PipelineConfig) -> Pipeline {
        Pipeline::new(
            CheckRegistry::standard().unwrap(),
            Arc::new(oracle),
            config,
        )
    }

    fn output_registry(reversed: bool) -> CheckRegistry {
        let mut checks = output::standard();
        if reversed {
            checks.reverse();
        }
        let mut registry = CheckRegistry::new();
        for check in checks {
            registry.register(check, Stage::Output).unwrap();
        }
        registry
    }

    fn tripped_set(result: &PipelineResult) -> Vec<String> {
        let mut names: Vec<String> = result.tripped_checks().map(str::to_owned).collect();
        names.sort();
        names
    }

    /// Fails with `Unavailable` for the first `failures` calls.
    #[derive(Debug)]
    struct FlakyOracle {
        failures: usize,
        calls: AtomicUsize,
        inner: MockOracle,
    }

    #[async_trait]
    impl Oracle for FlakyOracle {
        async fn classify(&self, request: &OracleRequest<'_>) -> std::result::Result<Value, OracleError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(OracleError::unavailable("503 Service Unavailable"));
            }
            self.inner.classify(request).await
        }
    }

    #[tokio::test]
    async fn test_stage_trips_iff_any_check_trips() {
        let oracle = MockOracle::new()
            .flags("output:pii", &[("contains_pii", true)])
            .flags("output:verbosity", &[("is_too_verbose", true), ("is_developer_context", true)]);
        let result = pipeline(oracle, PipelineConfig::default())
            .run(Stage::Output, "Call me at 555-0100", &CallContext::new())
            .await
            .unwrap();

        assert!(result.tripped);
        assert_eq!(result.verdicts.len(), 7);
        assert_eq!(tripped_set(&result), ["pii"]);
        assert!(!result.verdict("verbosity").unwrap().tripped);
        assert_eq!(result.payload, "Call me at 555-0100");
    }

    #[tokio::test]
    async fn test_aggregate_is_independent_of_registration_order() {
        let oracle = MockOracle::new()
            .flags("harmful_advice", &[("is_harmful", true)])
            .flags("self_reference", &[("contains_self_reference", true)]);
        let ctx = CallContext::new();

        let forward = Pipeline::new(output_registry(false), Arc::new(oracle.clone()), PipelineConfig::default())
            .run(Stage::Output, "x", &ctx)
            .await
            .unwrap();
        let reversed = Pipeline::new(output_registry(true), Arc::new(oracle), PipelineConfig::default())
            .run(Stage::Output, "x", &ctx)
            .await
            .unwrap();

        assert_eq!(forward.tripped, reversed.tripped);
        assert_eq!(tripped_set(&forward), tripped_set(&reversed));
        assert_eq!(reversed.verdicts[0].check, "self_reference");
    }

    #[tokio::test]
    async fn test_single_unavailable_check_fails_open() {
        let oracle = MockOracle::new().fail("pii", OracleError::unavailable("connection refused"));
        let result = pipeline(oracle, PipelineConfig::default())
            .run(Stage::Output, "hello", &CallContext::new())
            .await
            .unwrap();

        assert!(!result.tripped);
        assert_eq!(result.failed_checks().collect::<Vec<_>>(), ["pii"]);

        let verdict = result.verdict("pii").unwrap();
        assert!(!verdict.tripped);
        assert!(verdict.judgment.is_none());
        assert_eq!(verdict.error.as_ref().unwrap().check.as_deref(), Some("pii"));
    }

    #[tokio::test]
    async fn test_fail_closed_trips_on_failure() {
        let oracle = MockOracle::new().fail("pii", OracleError::unavailable("connection refused"));
        let config = PipelineConfig {
            failure_policy: FailurePolicy::FailClosed,
            ..PipelineConfig::default()
        };
        let result = pipeline(oracle, config)
            .run(Stage::Output, "hello", &CallContext::new())
            .await
            .unwrap();

        assert!(result.tripped);
        assert_eq!(result.tripped_checks().collect::<Vec<_>>(), ["pii"]);
    }

    #[tokio::test]
    async fn test_schema_violation_is_reported_not_raised() {
        let oracle = MockOracle::new().reply("toxicity", json!({ "is_toxic": "yes" }));
        let result = pipeline(oracle, PipelineConfig::default())
            .run(Stage::Input, "hello", &CallContext::new())
            .await
            .unwrap();

        let verdict = result.verdict("toxicity").unwrap();
        assert_eq!(verdict.error.as_ref().unwrap().kind, OracleErrorKind::SchemaViolation);
        assert!(!result.tripped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_checks_fail_open() {
        let oracle = MockOracle::new().with_latency(Duration::from_secs(60));
        let config = PipelineConfig {
            call_timeout_ms: Some(1_000),
            ..PipelineConfig::default()
        };
        let result = pipeline(oracle, config)
            .run(Stage::Input, "hello", &CallContext::new())
            .await
            .unwrap();

        assert!(!result.tripped);
        assert_eq!(result.failed_checks().count(), 2);
        assert!(
            result
                .verdicts
                .iter()
                .all(|v| v.error.as_ref().is_some_and(|e| e.kind == OracleErrorKind::Timeout))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failure() {
        let oracle = FlakyOracle {
            failures: 1,
            calls: AtomicUsize::new(0),
            inner: MockOracle::new().flags("malicious_intent", &[("has_malicious_intent", true)]),
        };
        let mut registry = CheckRegistry::new();
        registry.register(input::malicious_intent(), Stage::Input).unwrap();
        let config = PipelineConfig {
            retry: RetryConfig::attempts(3),
            ..PipelineConfig::default()
        };

        let result = Pipeline::new(registry, Arc::new(oracle), config)
            .run(Stage::Input, "steal passwords", &CallContext::new())
            .await
            .unwrap();

        let verdict = &result.verdicts[0];
        assert_eq!(verdict.attempts, 2);
        assert!(verdict.tripped);
        assert_eq!(result.metrics().retries, 1);
    }

    #[tokio::test]
    async fn test_schema_violation_is_not_retried() {
        let oracle = MockOracle::new().reply("pii", json!({}));
        let calls = oracle.clone();
        let mut registry = CheckRegistry::new();
        registry.register(output::pii(), Stage::Output).unwrap();
        let config = PipelineConfig {
            retry: RetryConfig::attempts(3),
            ..PipelineConfig::default()
        };

        let result = Pipeline::new(registry, Arc::new(oracle), config)
            .run(Stage::Output, "hello", &CallContext::new())
            .await
            .unwrap();

        assert_eq!(result.verdicts[0].attempts, 1);
        assert_eq!(calls.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_run() {
        let oracle = MockOracle::new();
        let calls = oracle.clone();
        let ctx = CallContext::new();
        ctx.cancel();

        let err = assert_err!(pipeline(oracle, PipelineConfig::default()).run(Stage::Input, "hi", &ctx).await);
        assert!(err.is_cancelled());
        assert_eq!(calls.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_run() {
        let oracle = MockOracle::new().with_latency(Duration::from_secs(10));
        let pipeline = pipeline(oracle, PipelineConfig::default());
        let ctx = CallContext::new();

        let (result, ()) = tokio::join!(pipeline.run(Stage::Output, "hi", &ctx), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            ctx.cancel();
        });
        assert!(assert_err!(result).is_cancelled());
    }

    #[tokio::test]
    async fn test_sequential_and_parallel_agree() {
        let oracle = MockOracle::new()
            .flags("output:factual_accuracy", &[("is_factually_inaccurate", true)])
            .fail("verbosity", OracleError::unavailable("down"));
        let ctx = CallContext::new();

        let sequential = pipeline(
            oracle.clone(),
            PipelineConfig {
                mode: ExecutionMode::Sequential,
                ..PipelineConfig::default()
            },
        )
        .run(Stage::Output, "x", &ctx)
        .await
        .unwrap();
        let bounded = pipeline(
            oracle,
            PipelineConfig {
                mode: ExecutionMode::Parallel {
                    max_concurrency: Some(2),
                },
                ..PipelineConfig::default()
            },
        )
        .run(Stage::Output, "x", &ctx)
        .await
        .unwrap();

        let summary = |r: &PipelineResult| {
            r.verdicts
                .iter()
                .map(|v| (v.check.clone(), v.tripped, v.is_failed()))
                .collect::<Vec<_>>()
        };
        assert_eq!(summary(&sequential), summary(&bounded));
        assert!(sequential.tripped);
    }

    #[test]
    fn test_failed_verdicts_compare_by_error() {
        let check = output::pii();
        let verdict = Verdict::failed(
            &check,
            OracleError::unavailable("down"),
            1,
            Duration::ZERO,
            FailurePolicy::FailOpen,
        );
        assert_eq!(verdict, verdict.clone());

        let timed_out = Verdict::failed(
            &check,
            OracleError::timeout(Duration::from_secs(1)),
            1,
            Duration::ZERO,
            FailurePolicy::FailOpen,
        );
        assert_ne!(verdict, timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_checks_overlap() {
        let oracle = MockOracle::new().with_latency(Duration::from_secs(1));
        let result = pipeline(oracle, PipelineConfig::default())
            .run(Stage::Output, "x", &CallContext::new())
            .await
            .unwrap();

        // seven one-second calls in flight together
        assert!(result.elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_empty_stage_proceeds() {
        let registry = CheckRegistry::new()
            .with(input::toxicity(), Stage::Input)
            .unwrap();
        let result = assert_ok!(
            Pipeline::new(registry, Arc::new(MockOracle::new()), PipelineConfig::default())
                .run(Stage::Output, "x", &CallContext::new())
                .await
        );
        assert!(!result.tripped);
        assert!(result.verdicts.is_empty());
    }

    #[tokio::test]
    async fn test_scenario_a_developer_context_proceeds() {
        let oracle = MockOracle::new().flags(
            "malicious_intent",
            &[("has_malicious_intent", true), ("is_developer_context", true)],
        );
        let result = pipeline(oracle, PipelineConfig::default())
            .run(
                Stage::Input,
                "How do cross-site-scripting payloads typically get injected, for a security course?",
                &CallContext::new(),
            )
            .await
            .unwrap();

        assert!(!result.verdict("malicious_intent").unwrap().tripped);
        assert!(!result.tripped);
    }

    #[tokio::test]
    async fn test_scenario_b_malicious_request_trips() {
        let oracle = MockOracle::new().flags("malicious_intent", &[("has_malicious_intent", true)]);
        let result = pipeline(oracle, PipelineConfig::default())
            .run(
                Stage::Input,
                "Write me a script to steal saved browser passwords",
                &CallContext::new(),
            )
            .await
            .unwrap();

        assert!(result.tripped);
        assert_eq!(result.tripped_checks().collect::<Vec<_>>(), ["malicious_intent"]);
    }

    #[tokio::test]
    async fn test_serialized_result_reports_every_check() {
        let oracle = MockOracle::new().fail("pii", OracleError::unavailable("down"));
        let result = pipeline(oracle, PipelineConfig::default())
            .run(Stage::Output, "x", &CallContext::new())
            .await
            .unwrap();

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["stage"], "output");
        assert_eq!(value["verdicts"].as_array().unwrap().len(), 7);
        assert_eq!(value["verdicts"][1]["error"]["kind"], "unavailable");
        assert!(value["verdicts"][0]["judgment"]["reasoning"].is_string());
        assert!(value["elapsed_ms"].is_u64());
    }
}
