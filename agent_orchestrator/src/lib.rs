//! Agent Orchestrator - Core Library
//!
//! Coordinates calls to heterogeneous agents (HTTP endpoints, mock executors,
//! specialized task handlers) according to a declarative step sequence.

pub mod adapter;
pub mod batch;
pub mod cli;
pub mod engine;
pub mod error;
pub mod executor;
pub mod http_adapter;
pub mod meta;
pub mod plan;
pub mod planner;
pub mod registry;
pub mod settings;
pub mod specialist;
pub mod telemetry;

pub use adapter::{AgentAdapter, AgentManifest, CallInput, CallResult, Context, MockAdapter, Protocol};
pub use engine::{EngineRun, OrchestrationEngine};
pub use error::OrchestratorError;
pub use executor::{ExecutionOptions, ExecutionReport, Executor};
pub use meta::{MegaTaskResult, MetaAgent, TaskAnalysis, WorkflowStep};
pub use plan::{OrchestrationPlan, OrchestrationStep};
pub use planner::Planner;
pub use registry::{AgentRegistry, RegistryStats};
