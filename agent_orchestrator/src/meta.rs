//! Task analysis, agent selection, and end-to-end orchestration.
//!
//! This layer classifies a task's required capabilities with fixed keyword
//! rules, ranks candidate agents, and drives the engine with the resulting
//! workflow.

use crate::adapter::Context;
use crate::engine::{EngineRun, OrchestrationEngine};
use crate::error::OrchestratorError;
use crate::plan::{OrchestrationPlan, OrchestrationStep};
use crate::registry::AgentRegistry;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

const CAPABILITY_KEYWORDS: [&str; 8] = [
    "search",
    "query",
    "retrieval",
    "fetch",
    "api",
    "http",
    "proof",
    "verify",
];

/// Derived, ephemeral description of what a task needs. Not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TaskAnalysis {
    pub original_task: String,
    pub breakdown: Vec<String>,
    pub selected_agents: Vec<String>,
    pub required_capabilities: Vec<String>,
    pub estimated_steps: usize,
    pub complexity: usize,
    pub reasoning: String,
}

/// One step of a mega-task workflow, richer than an [`OrchestrationStep`]:
/// it carries the assigned sub-goal and an explicit dependency edge.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStep {
    pub agent_id: String,
    pub agent_name: String,
    pub task: String,
    pub expected_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<usize>>,
}

/// Outcome of one mega-task workflow step.
#[derive(Debug, Clone, Serialize)]
pub struct StepExecution {
    pub success: bool,
    pub step: usize,
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MegaTaskResult {
    pub task_analysis: TaskAnalysis,
    pub workflow: Vec<WorkflowStep>,
    pub execution_results: Vec<StepExecution>,
    pub success: bool,
    pub total_time_ms: u64,
}

impl MegaTaskResult {
    /// Human-readable run summary for CLI output.
    pub fn summary(&self) -> String {
        let mut summary = format!("Mega-Task: {}\n\n", self.task_analysis.original_task);
        summary.push_str(&format!(
            "Status: {}\n",
            if self.success { "SUCCESS" } else { "FAILED" }
        ));
        summary.push_str(&format!("Time: {}ms\n", self.total_time_ms));
        summary.push_str(&format!(
            "Agents Used: {}\n\n",
            self.task_analysis.selected_agents.join(", ")
        ));
        summary.push_str("Execution Steps:\n");

        for (index, execution) in self.execution_results.iter().enumerate() {
            summary.push_str(&format!(
                "{}. {}: {}\n",
                index + 1,
                execution.agent_name,
                if execution.success { "ok" } else { "failed" }
            ));
            if let Some(error) = &execution.error {
                summary.push_str(&format!("   Error: {error}\n"));
            }
        }

        summary
    }
}

struct ScoredAgent {
    id: String,
    score: usize,
    reputation: f64,
    /// Registration order; the explicit stable-sort secondary key.
    order: usize,
}

/// Breaks a free-text task into a multi-agent workflow and executes it.
pub struct MetaAgent {
    engine: OrchestrationEngine,
    registry: AgentRegistry,
    llm_enabled: bool,
}

impl MetaAgent {
    pub fn new(registry: AgentRegistry) -> Self {
        Self {
            engine: OrchestrationEngine::new(),
            registry,
            llm_enabled: false,
        }
    }

    pub fn with_engine(registry: AgentRegistry, engine: OrchestrationEngine) -> Self {
        Self {
            engine,
            registry,
            llm_enabled: false,
        }
    }

    pub fn engine(&self) -> &OrchestrationEngine {
        &self.engine
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AgentRegistry {
        &mut self.registry
    }

    /// Classify the task's required capabilities and suggest agents.
    pub async fn analyze_task(&self, task: &str) -> TaskAnalysis {
        info!(%task, "analyzing task");
        if self.llm_enabled {
            self.analyze_with_llm(task).await
        } else {
            self.analyze_with_rules(task)
        }
    }

    // TODO: route through an LLM planner once a provider client lands; the
    // rule path is the behavioral contract it must match.
    async fn analyze_with_llm(&self, task: &str) -> TaskAnalysis {
        self.analyze_with_rules(task)
    }

    fn analyze_with_rules(&self, task: &str) -> TaskAnalysis {
        let task_lower = task.to_lowercase();
        let mut selected_agents: Vec<String> = Vec::new();
        let mut breakdown: Vec<String> = Vec::new();
        let mut reasoning = String::from("Rule-based analysis: ");

        let contains_any =
            |keywords: &[&str]| keywords.iter().any(|keyword| task_lower.contains(keyword));

        if contains_any(&["smart contract", "deploy", "contract"]) {
            selected_agents.push("contract-agent".to_string());
            breakdown.push("Deploy or interact with a smart contract".to_string());
            reasoning.push_str("Contract operations detected. ");
        }

        if contains_any(&["zk", "zero knowledge", "proof"]) {
            selected_agents.push("zk-agent".to_string());
            breakdown.push("Generate or verify a zero-knowledge proof".to_string());
            reasoning.push_str("ZK proof operations detected. ");
        }

        let workspace_goal = "Analyze the workspace and retrieve context";
        if contains_any(&["analyze", "workspace", "file", "code"]) {
            selected_agents.push("rag-agent".to_string());
            breakdown.push(workspace_goal.to_string());
            reasoning.push_str("Workspace analysis needed. ");
        }

        if contains_any(&["api", "http", "fetch", "request"]) {
            selected_agents.push("http-agent".to_string());
            breakdown.push("Make HTTP API requests".to_string());
            reasoning.push_str("External API interaction needed. ");
        }

        if contains_any(&["document", "report", "summary"]) {
            selected_agents.push("rag-agent".to_string());
            if !breakdown.iter().any(|goal| goal == workspace_goal) {
                breakdown.push("Generate documentation or reports".to_string());
            }
            reasoning.push_str("Documentation generation needed. ");
        }

        if selected_agents.is_empty() {
            selected_agents.push("rag-agent".to_string());
            breakdown.push("Process the task with the retrieval agent".to_string());
            reasoning.push_str("Using retrieval agent for general processing. ");
        }

        // Computed independently of the breakdown, so the two can disagree.
        let required_capabilities: Vec<String> = CAPABILITY_KEYWORDS
            .iter()
            .filter(|keyword| task_lower.contains(*keyword))
            .map(|keyword| keyword.to_string())
            .collect();

        let complexity = breakdown.len() + required_capabilities.len();

        TaskAnalysis {
            original_task: task.to_string(),
            estimated_steps: breakdown.len(),
            breakdown,
            selected_agents,
            required_capabilities,
            complexity,
            reasoning,
        }
    }

    /// Ranks every registered agent by how many required capabilities appear
    /// as case-insensitive substrings of any of its tags, then by reputation
    /// (default 0.5), then by registration order; returns the de-duplicated
    /// ordered id list.
    pub fn select_agents(&self, capabilities: &[String]) -> Vec<String> {
        let mut scored: Vec<ScoredAgent> = Vec::new();

        for (order, agent) in self.registry.list_agents().into_iter().enumerate() {
            let tags = agent.manifest.tag_slice();
            let score = capabilities
                .iter()
                .filter(|capability| {
                    let needle = capability.to_lowercase();
                    tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
                })
                .count();

            if score > 0 {
                scored.push(ScoredAgent {
                    id: agent.id,
                    score,
                    reputation: agent.manifest.reputation_or_default(),
                    order,
                });
            }
        }

        scored.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(
                    b.reputation
                        .partial_cmp(&a.reputation)
                        .unwrap_or(Ordering::Equal),
                )
                .then(a.order.cmp(&b.order))
        });

        let mut seen: HashSet<String> = HashSet::new();
        scored
            .into_iter()
            .filter(|agent| seen.insert(agent.id.clone()))
            .map(|agent| agent.id)
            .collect()
    }

    /// One step per agent id, chaining input/output keys from `input` to
    /// `final` exactly like the planner does.
    pub fn create_workflow(&self, task: &str, agent_ids: &[String]) -> OrchestrationPlan {
        debug!(%task, agents = agent_ids.len(), "creating workflow");
        let steps = agent_ids
            .iter()
            .enumerate()
            .map(|(index, agent_id)| OrchestrationStep {
                agent_id: agent_id.clone(),
                input_key: if index == 0 {
                    "input".to_string()
                } else {
                    format!("step{index}")
                },
                output_key: if index == agent_ids.len() - 1 {
                    "final".to_string()
                } else {
                    format!("step{}", index + 1)
                },
            })
            .collect();

        OrchestrationPlan::new(steps)
    }

    /// Full pipeline: analyze, select, lazily register missing adapters into
    /// the engine, build the workflow, and execute it over the seeded
    /// context. Returns the merged context and analyzer-then-engine logs.
    pub async fn orchestrate(
        &self,
        task: &str,
        initial_context: Context,
    ) -> Result<EngineRun, OrchestratorError> {
        let mut logs = Vec::new();

        let analysis = self.analyze_task(task).await;
        logs.push(format!(
            "Task analysis: {} capabilities identified",
            analysis.required_capabilities.len()
        ));
        logs.push(format!(
            "Required capabilities: {}",
            analysis.required_capabilities.join(", ")
        ));

        let selected = self.select_agents(&analysis.required_capabilities);
        logs.push(format!(
            "Selected {} agents: {}",
            selected.len(),
            selected.join(", ")
        ));

        for agent_id in &selected {
            if !self.engine.has_adapter(agent_id) {
                if let Some(adapter) = self.registry.get_adapter(agent_id) {
                    self.engine.register_adapter_as(agent_id.clone(), adapter);
                }
            }
        }

        let workflow = self.create_workflow(task, &selected);
        logs.push(format!("Created workflow with {} steps", workflow.steps.len()));

        let mut context = initial_context;
        context.insert("task".to_string(), Value::String(task.to_string()));

        let run = self.engine.execute(&workflow, context).await?;
        logs.extend(run.logs);

        Ok(EngineRun {
            context: run.context,
            logs,
        })
    }

    /// Expands the analysis into a per-step workflow with agent names,
    /// sub-goal text, and an explicit sequential dependency on the
    /// immediately preceding step.
    pub fn create_workflow_from_analysis(&self, analysis: &TaskAnalysis) -> Vec<WorkflowStep> {
        let mut workflow: Vec<WorkflowStep> = Vec::new();

        for (index, agent_id) in analysis.selected_agents.iter().enumerate() {
            let Some(manifest) = self.registry.get_manifest(agent_id) else {
                warn!(agent = %agent_id, "agent not found in registry, skipping workflow step");
                continue;
            };

            let position = workflow.len();
            workflow.push(WorkflowStep {
                agent_id: agent_id.clone(),
                agent_name: manifest.name.clone(),
                task: analysis
                    .breakdown
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| analysis.original_task.clone()),
                expected_output: expected_output_for(agent_id),
                depends_on: (position > 0).then(|| vec![position - 1]),
            });
        }

        workflow
    }

    /// Runs the workflow one single-step plan at a time, short-circuiting on
    /// the first step whose declared dependency failed or whose own
    /// execution fails.
    pub async fn execute_mega_task(&self, mega_task: &str) -> MegaTaskResult {
        let started = Instant::now();
        info!(task = %mega_task, "executing mega-task");

        let analysis = self.analyze_task(mega_task).await;

        for agent_id in &analysis.selected_agents {
            if !self.engine.has_adapter(agent_id) {
                if let Some(adapter) = self.registry.get_adapter(agent_id) {
                    self.engine.register_adapter_as(agent_id.clone(), adapter);
                }
            }
        }

        let workflow = self.create_workflow_from_analysis(&analysis);
        let mut execution_results: Vec<StepExecution> = Vec::new();
        let mut success = true;

        for (index, step) in workflow.iter().enumerate() {
            let failed_dependency = step.depends_on.as_ref().and_then(|deps| {
                deps.iter()
                    .copied()
                    .find(|&dep| !execution_results.get(dep).map_or(false, |r| r.success))
            });

            if let Some(dep) = failed_dependency {
                execution_results.push(StepExecution {
                    success: false,
                    step: index,
                    agent_name: step.agent_name.clone(),
                    result: None,
                    logs: Vec::new(),
                    error: Some(format!("Dependency step {} failed", dep + 1)),
                });
                success = false;
                break;
            }

            let plan = OrchestrationPlan::new(vec![OrchestrationStep::new(
                step.agent_id.clone(),
                "task",
                "result",
            )]);

            let mut context = Context::new();
            context.insert("task".to_string(), Value::String(step.task.clone()));
            context.insert(
                "previous_results".to_string(),
                serde_json::to_value(&execution_results).unwrap_or(Value::Null),
            );

            match self.engine.execute(&plan, context).await {
                Ok(run) => {
                    execution_results.push(StepExecution {
                        success: true,
                        step: index,
                        agent_name: step.agent_name.clone(),
                        result: run.context.get("result").cloned(),
                        logs: run.logs,
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(step = index, error = %err, "mega-task step failed");
                    execution_results.push(StepExecution {
                        success: false,
                        step: index,
                        agent_name: step.agent_name.clone(),
                        result: None,
                        logs: Vec::new(),
                        error: Some(err.to_string()),
                    });
                    success = false;
                    break;
                }
            }
        }

        MegaTaskResult {
            task_analysis: analysis,
            workflow,
            execution_results,
            success,
            total_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn expected_output_for(agent_id: &str) -> String {
    match agent_id {
        "rag-agent" => "Analysis, file listings, or contextual information",
        "contract-agent" => "Contract deployment receipt or transaction hash",
        "zk-agent" => "Zero-knowledge proof or verification result",
        "http-agent" => "API response data",
        _ => "Task completion confirmation",
    }
    .to_string()
}
