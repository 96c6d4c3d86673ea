//! Plan runner for the CLI: loads a TOML plan file, validates it against the
//! built-in agent population, executes it, and reports the outcome.

use crate::adapter::Context;
use crate::engine::OrchestrationEngine;
use crate::executor::{ExecutionOptions, ExecutionReport, Executor};
use crate::http_adapter::HttpAdapter;
use crate::plan::{OrchestrationPlan, OrchestrationStep};
use crate::planner::Planner;
use crate::registry::AgentRegistry;
use crate::settings::Settings;
use crate::specialist::{ContractAgent, ProofAgent, RetrievalAgent};
use anyhow::{anyhow, Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Plan file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFile {
    /// Job metadata
    pub job: JobMetadata,

    /// Initial payload seeded under the `input` context key
    #[serde(default)]
    pub input: Value,

    /// Ordered step list
    pub steps: Vec<StepConfig>,

    /// Execution settings for this plan
    #[serde(default)]
    pub settings: PlanSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub name: String,
    pub description: Option<String>,
    pub version: String,

    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Agent id to call
    pub agent: String,

    /// Context key feeding this step
    pub input_key: String,

    /// Context key receiving this step's output
    pub output_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanSettings {
    /// Retries per step; falls back to the executor section of the settings
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Dependency-aware parallel scheduling instead of list order
    #[serde(default)]
    pub parallel: Option<bool>,

    /// Output file for the JSON execution report
    pub output_file: Option<PathBuf>,
}

/// The built-in agent population the CLI runs against.
pub fn default_registry(settings: &Settings) -> Result<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(HttpAdapter::new(
        Duration::from_secs(settings.http.timeout_seconds),
        settings.http.requests_per_second,
    )?));
    registry.register(Arc::new(ContractAgent::new()));
    registry.register(Arc::new(ProofAgent::new()));
    registry.register(Arc::new(RetrievalAgent::new()));
    Ok(registry)
}

/// Execute a plan from a configuration file.
#[instrument(skip(settings))]
pub async fn run(config_path: PathBuf, settings: Settings) -> Result<()> {
    info!("Loading plan from {:?}", config_path);

    let config = load_plan_file(&config_path).context("Failed to load plan configuration")?;
    info!("Loaded plan: {} (version: {})", config.job.name, config.job.version);

    let registry = default_registry(&settings)?;

    let plan = OrchestrationPlan::new(
        config
            .steps
            .iter()
            .map(|step| OrchestrationStep::new(&step.agent, &step.input_key, &step.output_key))
            .collect(),
    );

    let planner = Planner::new(&registry);
    if !planner.validate_plan(&plan) {
        return Err(anyhow!(
            "Plan '{}' failed validation: check agent ids and the input/output key chain",
            config.job.name
        ));
    }

    let engine = Arc::new(OrchestrationEngine::new());
    for agent in registry.list_agents() {
        engine.register_adapter_as(agent.id, agent.adapter);
    }
    let executor = Executor::new(engine);

    let mut context = Context::new();
    context.insert("input".to_string(), config.input.clone());

    let options = ExecutionOptions {
        max_retries: config
            .settings
            .max_retries
            .unwrap_or(settings.executor.max_retries),
        parallel: config
            .settings
            .parallel
            .unwrap_or(settings.executor.parallel),
    };

    let report = executor.execute(&plan, context, options).await;

    print_summary(&config.job, &report);

    if let Some(output_file) = &config.settings.output_file {
        save_report(&report, output_file).context("Failed to save execution report")?;
    }

    if report.success {
        Ok(())
    } else {
        Err(anyhow!(
            "Plan execution failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        ))
    }
}

/// Load a plan configuration from a TOML file.
fn load_plan_file(config_path: &Path) -> Result<PlanFile> {
    let contents = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read plan file: {config_path:?}"))?;

    let config: PlanFile = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse TOML plan: {config_path:?}"))?;

    validate_plan_file(&config)?;
    Ok(config)
}

fn validate_plan_file(config: &PlanFile) -> Result<()> {
    if config.steps.is_empty() {
        return Err(anyhow!("Plan must contain at least one step"));
    }

    let mut output_keys = std::collections::HashSet::new();
    for step in &config.steps {
        if !output_keys.insert(&step.output_key) {
            return Err(anyhow!("Duplicate output key: {}", step.output_key));
        }
    }

    Ok(())
}

fn print_summary(job: &JobMetadata, report: &ExecutionReport) {
    println!("\n=== Plan Execution Summary ===");
    println!("Job: {}", job.name);
    println!("Status: {}", if report.success { "success" } else { "failed" });
    println!("Steps: {}/{}", report.completed_steps, report.total_steps);
    println!("Duration: {}ms", report.execution_time_ms);

    if let Some(error) = &report.error {
        println!("Error: {error}");
        if let Some(step) = report.failed_step {
            println!("Failed step index: {step}");
        }
    }

    println!("\nLogs:");
    for line in &report.logs {
        println!("  {line}");
    }
    println!("==============================\n");
}

fn save_report(report: &ExecutionReport, output_file: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;

    std::fs::write(output_file, json)
        .with_context(|| format!("Failed to write report to: {output_file:?}"))?;

    info!("Execution report saved to {:?}", output_file);
    Ok(())
}
