//! Plan driver layering per-step retry and a dependency-aware parallel mode
//! over the engine.
//!
//! Unlike the engine, the executor never lets an error escape: every run,
//! success or failure, comes back as a structured [`ExecutionReport`] with
//! the cumulative log trail.

use crate::adapter::{CallInput, Context};
use crate::engine::OrchestrationEngine;
use crate::error::OrchestratorError;
use crate::plan::{OrchestrationPlan, OrchestrationStep};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionOptions {
    /// Additional attempts per step after the first failure; 0 means the
    /// first failure is terminal.
    pub max_retries: u32,
    /// Schedule steps by inferred data dependencies instead of list order.
    pub parallel: bool,
}

impl ExecutionOptions {
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            parallel: false,
        }
    }

    pub fn parallel() -> Self {
        Self {
            max_retries: 0,
            parallel: true,
        }
    }
}

/// Outcome of one plan execution, reported whether or not the run succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub context: Context,
    pub logs: Vec<String>,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
    pub completed_steps: usize,
    pub total_steps: usize,
}

#[derive(Clone)]
struct SharedState {
    context: Context,
    logs: Vec<String>,
}

pub struct Executor {
    engine: Arc<OrchestrationEngine>,
}

/// Backoff after a failed attempt, indexed from 0.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(100u64.saturating_mul(1u64 << attempt.min(20)))
}

impl Executor {
    pub fn new(engine: Arc<OrchestrationEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &OrchestrationEngine {
        &self.engine
    }

    #[instrument(skip(self, plan, initial_context), fields(steps = plan.steps.len(), parallel = options.parallel))]
    pub async fn execute(
        &self,
        plan: &OrchestrationPlan,
        initial_context: Context,
        options: ExecutionOptions,
    ) -> ExecutionReport {
        let started = Instant::now();
        let total_steps = plan.steps.len();
        let run_id = Uuid::new_v4();
        debug!(%run_id, "executing plan");

        let state = Arc::new(Mutex::new(SharedState {
            context: initial_context,
            logs: vec![format!("Starting execution of plan with {total_steps} steps")],
        }));

        let (completed_steps, failure) = if options.parallel {
            self.execute_parallel(plan, &state, options.max_retries).await
        } else {
            self.execute_sequential(plan, &state, options.max_retries).await
        };

        // All step futures have been driven to completion or dropped by now,
        // so the try_unwrap normally succeeds; the fallback clones the state
        // out from under the last straggling reference.
        let SharedState { context, mut logs } = match Arc::try_unwrap(state) {
            Ok(mutex) => mutex.into_inner(),
            Err(state) => state.lock().await.clone(),
        };

        let execution_time_ms = started.elapsed().as_millis() as u64;

        match failure {
            None => {
                logs.push(format!(
                    "Execution completed successfully in {execution_time_ms}ms"
                ));
                ExecutionReport {
                    success: true,
                    context,
                    logs,
                    execution_time_ms,
                    error: None,
                    failed_step: None,
                    completed_steps,
                    total_steps,
                }
            }
            Some(err) => {
                logs.push(format!("Execution failed: {err}"));
                let failed_step = match &err {
                    OrchestratorError::StepFailure { index, .. } => Some(*index),
                    OrchestratorError::Deadlock => None,
                    // Sequential steps complete strictly in order, so the
                    // failing one sits right after the completed prefix.
                    _ if !options.parallel => Some(completed_steps),
                    _ => None,
                };
                ExecutionReport {
                    success: false,
                    context,
                    logs,
                    execution_time_ms,
                    error: Some(err.to_string()),
                    failed_step,
                    completed_steps,
                    total_steps,
                }
            }
        }
    }

    async fn execute_sequential(
        &self,
        plan: &OrchestrationPlan,
        state: &Arc<Mutex<SharedState>>,
        max_retries: u32,
    ) -> (usize, Option<OrchestratorError>) {
        let mut completed = 0;
        for (index, step) in plan.steps.iter().enumerate() {
            match self
                .execute_step_with_retry(index, step, state, max_retries)
                .await
            {
                Ok(()) => completed += 1,
                Err(err) => {
                    state
                        .lock()
                        .await
                        .logs
                        .push(format!("Step {} failed: {}", index + 1, err));
                    return (completed, Some(err));
                }
            }
        }
        (completed, None)
    }

    /// Dependency-aware scheduling: step `i` depends on every earlier step
    /// whose output key equals `i`'s input key. All ready steps are launched
    /// as a batch; after at least one settles the ready set is recomputed.
    /// No runnable step and nothing in flight while work remains is a
    /// deadlock.
    async fn execute_parallel(
        &self,
        plan: &OrchestrationPlan,
        state: &Arc<Mutex<SharedState>>,
        max_retries: u32,
    ) -> (usize, Option<OrchestratorError>) {
        let steps = &plan.steps;
        let total = steps.len();

        let dependencies: Vec<Vec<usize>> = (0..total)
            .map(|i| {
                (0..i)
                    .filter(|&j| steps[j].output_key == steps[i].input_key)
                    .collect()
            })
            .collect();

        let mut completed: HashSet<usize> = HashSet::new();
        let mut started: HashSet<usize> = HashSet::new();
        let mut in_flight: FuturesUnordered<
            BoxFuture<'_, (usize, Result<(), OrchestratorError>)>,
        > = FuturesUnordered::new();

        while completed.len() < total {
            let ready: Vec<usize> = (0..total)
                .filter(|index| !completed.contains(index) && !started.contains(index))
                .filter(|&index| dependencies[index].iter().all(|dep| completed.contains(dep)))
                .collect();

            if ready.is_empty() && in_flight.is_empty() {
                return (completed.len(), Some(OrchestratorError::Deadlock));
            }

            for index in ready {
                started.insert(index);
                let step = &steps[index];
                let state = Arc::clone(state);
                in_flight.push(Box::pin(async move {
                    let outcome = self
                        .execute_step_with_retry(index, step, &state, max_retries)
                        .await;
                    (index, outcome)
                }));
            }

            match in_flight.next().await {
                Some((index, Ok(()))) => {
                    completed.insert(index);
                }
                Some((_, Err(err))) => return (completed.len(), Some(err)),
                None => break,
            }
        }

        (completed.len(), None)
    }

    async fn execute_step_with_retry(
        &self,
        index: usize,
        step: &OrchestrationStep,
        state: &Arc<Mutex<SharedState>>,
        max_retries: u32,
    ) -> Result<(), OrchestratorError> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                state
                    .lock()
                    .await
                    .logs
                    .push(format!("Retry attempt {} for agent {}", attempt, step.agent_id));
            }

            match self.try_step(index, step, state).await {
                Ok(()) => return Ok(()),
                // A missing agent cannot heal between attempts.
                Err(err @ OrchestratorError::AgentNotFound(_)) => return Err(err),
                Err(err) if attempt >= max_retries => return Err(err),
                Err(err) => {
                    debug!(agent = %step.agent_id, attempt, error = %err, "step failed, backing off");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_step(
        &self,
        index: usize,
        step: &OrchestrationStep,
        state: &Arc<Mutex<SharedState>>,
    ) -> Result<(), OrchestratorError> {
        let adapter = self
            .engine
            .get_adapter(&step.agent_id)
            .ok_or_else(|| OrchestratorError::AgentNotFound(step.agent_id.clone()))?;

        let input = {
            let mut shared = state.lock().await;
            shared.logs.push(format!(
                "Executing agent {} with input from {}",
                step.agent_id, step.input_key
            ));
            CallInput {
                context: shared.context.clone(),
                input: shared
                    .context
                    .get(&step.input_key)
                    .cloned()
                    .unwrap_or(Value::Null),
            }
        };

        let result = adapter
            .call(input)
            .await
            .map_err(|err| OrchestratorError::StepFailure {
                index,
                agent_id: step.agent_id.clone(),
                message: err.to_string(),
            })?;

        let mut shared = state.lock().await;
        shared.logs.extend(result.logs);

        if let Some(message) = result.error.filter(|e| !e.is_empty()) {
            shared.logs.push(format!("Error: {message}"));
            return Err(OrchestratorError::StepFailure {
                index,
                agent_id: step.agent_id.clone(),
                message,
            });
        }

        shared.context.insert(step.output_key.clone(), result.output);
        shared.logs.push(format!(
            "Agent {} completed, output saved to {}",
            step.agent_id, step.output_key
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockAdapter;
    use serde_json::json;

    fn setup() -> (Arc<OrchestrationEngine>, Executor) {
        let engine = Arc::new(OrchestrationEngine::new());
        let executor = Executor::new(engine.clone());
        (engine, executor)
    }

    fn seeded(value: Value) -> Context {
        let mut context = Context::new();
        context.insert("input".to_string(), value);
        context
    }

    #[tokio::test]
    async fn sequential_execution_reports_full_completion() {
        let (engine, executor) = setup();
        engine.register_adapter(Arc::new(MockAdapter::named("mock-agent")));

        let plan = OrchestrationPlan::new(vec![
            OrchestrationStep::new("mock-agent", "input", "step1"),
            OrchestrationStep::new("mock-agent", "step1", "final"),
        ]);

        let report = executor
            .execute(&plan, seeded(json!("data")), ExecutionOptions::default())
            .await;

        assert!(report.success);
        assert!(report.context.contains_key("step1"));
        assert!(report.context.contains_key("final"));
        assert_eq!(report.completed_steps, 2);
        assert_eq!(report.total_steps, 2);
        assert!(!report.logs.is_empty());
    }

    #[tokio::test]
    async fn first_failure_aborts_and_reports_failed_step() {
        let (engine, executor) = setup();
        engine.register_adapter(Arc::new(MockAdapter::named("ok")));
        engine.register_adapter(Arc::new(MockAdapter::named("broken").fail_times(u64::MAX)));

        let plan = OrchestrationPlan::new(vec![
            OrchestrationStep::new("ok", "input", "step1"),
            OrchestrationStep::new("broken", "step1", "step2"),
            OrchestrationStep::new("ok", "step2", "final"),
        ]);

        let report = executor
            .execute(&plan, seeded(json!(1)), ExecutionOptions::default())
            .await;

        assert!(!report.success);
        assert_eq!(report.failed_step, Some(1));
        assert_eq!(report.completed_steps, 1);
        assert_eq!(report.total_steps, 3);
        assert!(!report.context.contains_key("final"));
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn retry_until_success_invokes_adapter_per_attempt() {
        let (engine, executor) = setup();
        let flaky = Arc::new(MockAdapter::named("flaky").fail_times(2));
        engine.register_adapter(flaky.clone());

        let plan = OrchestrationPlan::new(vec![OrchestrationStep::new(
            "flaky", "input", "result",
        )]);

        let report = executor
            .execute(&plan, seeded(json!(1)), ExecutionOptions::with_retries(3))
            .await;

        assert!(report.success);
        assert_eq!(flaky.call_count(), 3);
    }

    #[tokio::test]
    async fn retries_exhausted_reports_failure_after_final_attempt() {
        let (engine, executor) = setup();
        let flaky = Arc::new(MockAdapter::named("flaky").fail_times(2));
        engine.register_adapter(flaky.clone());

        let plan = OrchestrationPlan::new(vec![OrchestrationStep::new(
            "flaky", "input", "result",
        )]);

        let report = executor
            .execute(&plan, seeded(json!(1)), ExecutionOptions::with_retries(1))
            .await;

        assert!(!report.success);
        assert_eq!(flaky.call_count(), 2);
    }

    #[tokio::test]
    async fn zero_retries_means_first_failure_is_terminal() {
        let (engine, executor) = setup();
        let flaky = Arc::new(MockAdapter::named("flaky").fail_times(1));
        engine.register_adapter(flaky.clone());

        let plan = OrchestrationPlan::new(vec![OrchestrationStep::new(
            "flaky", "input", "result",
        )]);

        let report = executor
            .execute(&plan, seeded(json!(1)), ExecutionOptions::default())
            .await;

        assert!(!report.success);
        assert_eq!(flaky.call_count(), 1);
    }

    #[tokio::test]
    async fn parallel_independent_steps_both_complete() {
        let (engine, executor) = setup();
        engine.register_adapter(Arc::new(MockAdapter::named("a")));
        engine.register_adapter(Arc::new(MockAdapter::named("b")));

        let plan = OrchestrationPlan::new(vec![
            OrchestrationStep::new("a", "input", "result1"),
            OrchestrationStep::new("b", "input", "result2"),
        ]);

        let report = executor
            .execute(&plan, seeded(json!("shared")), ExecutionOptions::parallel())
            .await;

        assert!(report.success);
        assert!(report.context.contains_key("result1"));
        assert!(report.context.contains_key("result2"));
        assert_eq!(report.completed_steps, 2);
    }

    #[tokio::test]
    async fn parallel_respects_data_dependencies() {
        let (engine, executor) = setup();
        engine.register_adapter_as(
            "tag",
            Arc::new(MockAdapter::named("tag").with_transform(|input| {
                json!(format!("{}+", input.as_str().unwrap_or_default()))
            })),
        );

        let plan = OrchestrationPlan::new(vec![
            OrchestrationStep::new("tag", "input", "step1"),
            OrchestrationStep::new("tag", "step1", "final"),
        ]);

        let report = executor
            .execute(&plan, seeded(json!("x")), ExecutionOptions::parallel())
            .await;

        assert!(report.success);
        // The dependent step must have observed its upstream output.
        assert_eq!(report.context["final"], json!("x++"));
    }

    #[tokio::test]
    async fn unsatisfiable_dependencies_deadlock() {
        let (engine, executor) = setup();
        engine.register_adapter(Arc::new(MockAdapter::named("a")));
        engine.register_adapter(Arc::new(MockAdapter::named("b")));

        // Neither input key is seeded or produced by an earlier step.
        let plan = OrchestrationPlan::new(vec![
            OrchestrationStep::new("a", "needs-b", "made-a"),
            OrchestrationStep::new("b", "needs-a", "made-b"),
        ]);

        let report = executor
            .execute(&plan, seeded(json!(1)), ExecutionOptions::parallel())
            .await;

        assert!(!report.success);
        assert!(report.error.as_deref().unwrap_or_default().contains("deadlock"));
        assert_eq!(report.completed_steps, 0);
    }

    #[tokio::test]
    async fn parallel_forward_references_are_not_dependencies() {
        let (engine, executor) = setup();
        engine.register_adapter(Arc::new(MockAdapter::named("a")));
        engine.register_adapter(Arc::new(MockAdapter::named("b")));

        // Step 0 consumes a key only produced by the later step 1; dependency
        // inference scans earlier steps only, so step 0 runs with a null
        // input instead of waiting.
        let plan = OrchestrationPlan::new(vec![
            OrchestrationStep::new("a", "late", "first"),
            OrchestrationStep::new("b", "input", "late"),
        ]);

        let report = executor
            .execute(&plan, seeded(json!(1)), ExecutionOptions::parallel())
            .await;

        assert!(report.success);
        assert_eq!(report.completed_steps, 2);
    }

    #[tokio::test]
    async fn missing_agent_is_reported_not_raised() {
        let (_engine, executor) = setup();

        let plan = OrchestrationPlan::new(vec![OrchestrationStep::new(
            "ghost", "input", "result",
        )]);

        let report = executor
            .execute(&plan, seeded(json!(1)), ExecutionOptions::default())
            .await;

        assert!(!report.success);
        assert_eq!(report.failed_step, Some(0));
        assert!(report.error.as_deref().unwrap_or_default().contains("not found"));
    }

    #[tokio::test]
    async fn report_always_carries_timing_and_counts() {
        let (engine, executor) = setup();
        engine.register_adapter(Arc::new(
            MockAdapter::named("slow").with_delay(Duration::from_millis(10)),
        ));

        let plan = OrchestrationPlan::new(vec![OrchestrationStep::new(
            "slow", "input", "result",
        )]);

        let report = executor
            .execute(&plan, seeded(json!(1)), ExecutionOptions::default())
            .await;

        assert!(report.success);
        assert!(report.execution_time_ms >= 10);
        assert_eq!(report.completed_steps, report.total_steps);
    }
}
