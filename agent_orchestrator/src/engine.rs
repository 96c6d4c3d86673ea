//! Sequential plan walker: resolves adapters and threads context keys.

use crate::adapter::{AgentAdapter, CallInput, Context};
use crate::error::OrchestratorError;
use crate::plan::OrchestrationPlan;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Final context and ordered log trail from a successful run.
#[derive(Debug, Clone)]
pub struct EngineRun {
    pub context: Context,
    pub logs: Vec<String>,
}

/// Executes an ordered list of steps against its adapter map. Single step
/// failure is fatal here; callers wanting retries or partial-progress
/// reporting wrap this in an [`crate::Executor`].
#[derive(Default)]
pub struct OrchestrationEngine {
    adapters: DashMap<String, Arc<dyn AgentAdapter>>,
}

impl OrchestrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert keyed by the adapter's own manifest id.
    pub fn register_adapter(&self, adapter: Arc<dyn AgentAdapter>) {
        let id = adapter.manifest().id.clone();
        debug!(agent = %id, "registering adapter with engine");
        self.adapters.insert(id, adapter);
    }

    /// Upsert under an explicit key, leaving the adapter's manifest untouched.
    pub fn register_adapter_as(&self, id: impl Into<String>, adapter: Arc<dyn AgentAdapter>) {
        self.adapters.insert(id.into(), adapter);
    }

    pub fn get_adapter(&self, id: &str) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters.get(id).map(|entry| entry.value().clone())
    }

    pub fn has_adapter(&self, id: &str) -> bool {
        self.adapters.contains_key(id)
    }

    pub fn adapter_ids(&self) -> Vec<String> {
        self.adapters.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Runs the plan sequentially over a context seeded from
    /// `initial_context`. For each step: resolve the adapter (missing adapter
    /// aborts with [`OrchestratorError::AgentNotFound`]), build the call input
    /// from the step's input key, await the call, and on success write the
    /// output under the step's output key. A non-empty error string or a
    /// raised adapter error aborts the whole execution.
    #[instrument(skip(self, plan, initial_context), fields(steps = plan.steps.len()))]
    pub async fn execute(
        &self,
        plan: &OrchestrationPlan,
        initial_context: Context,
    ) -> Result<EngineRun, OrchestratorError> {
        let mut context = initial_context;
        let mut logs = vec![format!(
            "Starting orchestration with {} steps",
            plan.steps.len()
        )];

        for (index, step) in plan.steps.iter().enumerate() {
            let adapter = self
                .get_adapter(&step.agent_id)
                .ok_or_else(|| OrchestratorError::AgentNotFound(step.agent_id.clone()))?;

            let input = CallInput {
                context: context.clone(),
                input: context.get(&step.input_key).cloned().unwrap_or(Value::Null),
            };

            logs.push(format!(
                "Step {}: Calling agent {}",
                index + 1,
                adapter.manifest().name
            ));

            let result = match adapter.call(input).await {
                Ok(result) => result,
                Err(err) => {
                    logs.push(format!("Exception in step {}: {}", index + 1, err));
                    return Err(OrchestratorError::StepFailure {
                        index,
                        agent_id: step.agent_id.clone(),
                        message: err.to_string(),
                    });
                }
            };

            logs.extend(result.logs);

            if let Some(message) = result.error.filter(|e| !e.is_empty()) {
                logs.push(format!("Error: {message}"));
                return Err(OrchestratorError::StepFailure {
                    index,
                    agent_id: step.agent_id.clone(),
                    message,
                });
            }

            context.insert(step.output_key.clone(), result.output);
            logs.push(format!("Step {}: Completed successfully", index + 1));
        }

        logs.push("Orchestration completed successfully".to_string());
        Ok(EngineRun { context, logs })
    }
}
