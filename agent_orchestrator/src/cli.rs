//! Command-line interface definitions using clap derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Agent Orchestrator CLI
#[derive(Parser)]
#[command(name = "orchestrator-cli")]
#[command(about = "Coordinates heterogeneous agents along declarative step sequences")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a plan from a TOML configuration file
    Run {
        /// Path to the plan configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Analyze a free-text task, select agents, and execute the workflow
    Orchestrate {
        /// The task to orchestrate
        task: String,
        /// Initial input payload (JSON; plain strings also accepted)
        #[arg(long)]
        input: Option<String>,
    },
    /// Run a task as a mega-task workflow with per-step reporting
    Mega {
        /// The task to break down and execute
        task: String,
    },
    /// List the built-in agent population and registry statistics
    Agents,
}
