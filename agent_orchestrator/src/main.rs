//! Main entry point for the Agent Orchestrator CLI.

use agent_orchestrator::{
    adapter::Context, batch, cli, meta::MetaAgent, settings::Settings, telemetry,
};
use anyhow::{anyhow, Result};
use clap::Parser;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = cli::Cli::parse();

    // Load settings
    let settings = Settings::load()?;

    // Initialize telemetry
    telemetry::init(&settings.logging)?;

    // Execute the requested command
    match args.command {
        cli::Commands::Run { config } => batch::run(config, settings).await,
        cli::Commands::Orchestrate { task, input } => orchestrate(&task, input, settings).await,
        cli::Commands::Mega { task } => mega(&task, settings).await,
        cli::Commands::Agents => list_agents(settings),
    }
}

async fn orchestrate(task: &str, input: Option<String>, settings: Settings) -> Result<()> {
    let registry = batch::default_registry(&settings)?;
    let meta = MetaAgent::new(registry);

    let mut context = Context::new();
    if let Some(raw) = input {
        // Accept both JSON payloads and plain strings.
        let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
        context.insert("input".to_string(), value);
    }

    let run = meta.orchestrate(task, context).await?;

    for line in &run.logs {
        println!("{line}");
    }
    println!("{}", serde_json::to_string_pretty(&run.context)?);
    Ok(())
}

async fn mega(task: &str, settings: Settings) -> Result<()> {
    let registry = batch::default_registry(&settings)?;
    let meta = MetaAgent::new(registry);

    let result = meta.execute_mega_task(task).await;
    println!("{}", result.summary());

    if result.success {
        Ok(())
    } else {
        Err(anyhow!("mega-task failed"))
    }
}

fn list_agents(settings: Settings) -> Result<()> {
    let registry = batch::default_registry(&settings)?;

    for agent in registry.list_agents() {
        let tags = agent.manifest.tag_slice().join(", ");
        println!(
            "{:<16} {:<32} cost={:<6} tags=[{}]",
            agent.id,
            agent.manifest.name,
            agent.manifest.cost.unwrap_or(0.0),
            tags
        );
    }

    let stats = registry.stats();
    println!(
        "\n{} agents, avg cost {:.3}, cost range [{:.3}, {:.3}]",
        stats.total_agents, stats.average_cost, stats.min_cost, stats.max_cost
    );
    Ok(())
}
