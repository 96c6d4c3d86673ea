//! Adapter contract shared by every agent the orchestrator can call, plus the
//! mock adapter used throughout the test suite.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Transport protocol an agent speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Mcp,
    N8n,
    Custom,
}

/// Static descriptive metadata for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentManifest {
    pub id: String,
    pub name: String,
    pub description: String,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation: Option<f64>,
}

impl AgentManifest {
    /// Reputation used for selection tie-breaks; agents that never earned a
    /// score sit in the middle of the [0, 1] range.
    pub fn reputation_or_default(&self) -> f64 {
        self.reputation.unwrap_or(0.5)
    }

    pub fn tag_slice(&self) -> &[String] {
        self.tags.as_deref().unwrap_or(&[])
    }
}

/// The mutable key-value store threaded through one plan execution.
pub type Context = HashMap<String, Value>;

/// What an adapter receives for one step: a snapshot of the shared context
/// plus the value resolved from the step's input key.
#[derive(Debug, Clone)]
pub struct CallInput {
    pub context: Context,
    pub input: Value,
}

/// Uniform result shape for a single adapter call. A non-empty `error` is the
/// sole failure signal the engine inspects; adapters encode ordinary domain
/// failures here rather than returning `Err`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallResult {
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

impl CallResult {
    pub fn ok(output: Value) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            output: Value::Null,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Uniform async call capability around a specific external resource.
///
/// Concrete variants (HTTP, mock, task-specific handlers) are separate
/// implementations behind this single abstraction.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn manifest(&self) -> &AgentManifest;
    async fn call(&self, input: CallInput) -> Result<CallResult>;
}

// --- Mock adapter ---

type TransformFn = dyn Fn(Value) -> Value + Send + Sync;

#[derive(Default)]
struct MockBehavior {
    /// Number of upcoming calls that report a transient error.
    fail_next: u64,
    /// When set, every call raises instead of returning a result.
    error_mode: bool,
}

/// Test double satisfying the adapter contract: scripted failures, optional
/// transform function, artificial delay, and an invocation counter.
pub struct MockAdapter {
    manifest: AgentManifest,
    transform: Option<Box<TransformFn>>,
    delay: Option<Duration>,
    behavior: Mutex<MockBehavior>,
    calls: AtomicU64,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            manifest: AgentManifest {
                id: id.clone(),
                name: format!("Mock Adapter ({id})"),
                description: "Mock agent for testing".to_string(),
                protocol: Protocol::Custom,
                endpoint: None,
                cost: Some(0.0),
                tags: Some(
                    ["simulation", "testing", "mock", "test"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                reputation: None,
            },
            transform: None,
            delay: None,
            behavior: Mutex::new(MockBehavior::default()),
            calls: AtomicU64::new(0),
        }
    }

    /// Replace the whole manifest, for tests that need full control.
    pub fn with_manifest(mut self, manifest: AgentManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.manifest.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.manifest.cost = Some(cost);
        self
    }

    pub fn with_reputation(mut self, reputation: f64) -> Self {
        self.manifest.reputation = Some(reputation);
        self
    }

    pub fn with_transform(mut self, transform: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Script the next `n` calls to report a transient error before the
    /// adapter starts succeeding again.
    pub fn fail_times(self, n: u64) -> Self {
        self.behavior.lock().fail_next = n;
        self
    }

    /// When enabled, every call raises instead of returning a result.
    pub fn set_error_mode(&self, enabled: bool) {
        self.behavior.lock().error_mode = enabled;
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentAdapter for MockAdapter {
    fn manifest(&self) -> &AgentManifest {
        &self.manifest
    }

    async fn call(&self, input: CallInput) -> Result<CallResult> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        {
            let mut behavior = self.behavior.lock();
            if behavior.error_mode {
                return Err(anyhow!("mock adapter configured to raise"));
            }
            if behavior.fail_next > 0 {
                behavior.fail_next -= 1;
                return Ok(CallResult::failed("transient mock failure"));
            }
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let output = match &self.transform {
            Some(transform) => transform(input.input),
            None => json!({
                "success": true,
                "input": input.input,
                "timestamp": Utc::now().timestamp_millis(),
                "processed_by": self.manifest.name,
            }),
        };

        debug!(agent = %self.manifest.id, "mock adapter call completed");

        Ok(CallResult {
            output,
            error: None,
            cost: self.manifest.cost,
            logs: vec![format!("Mock agent {} executed successfully", self.manifest.name)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_input(value: Value) -> CallInput {
        CallInput {
            context: Context::new(),
            input: value,
        }
    }

    #[tokio::test]
    async fn mock_adapter_echoes_input_by_default() {
        let adapter = MockAdapter::new();
        let result = adapter.call(empty_input(json!("payload"))).await.unwrap();

        assert!(result.error.is_none());
        assert_eq!(result.output["input"], json!("payload"));
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn mock_adapter_applies_transform() {
        let adapter = MockAdapter::new().with_transform(|input| json!({ "wrapped": input }));
        let result = adapter.call(empty_input(json!(41))).await.unwrap();

        assert_eq!(result.output, json!({ "wrapped": 41 }));
    }

    #[tokio::test]
    async fn mock_adapter_scripted_failures_are_consumed() {
        let adapter = MockAdapter::new().fail_times(2);

        let first = adapter.call(empty_input(Value::Null)).await.unwrap();
        assert!(first.error.is_some());

        let second = adapter.call(empty_input(Value::Null)).await.unwrap();
        assert!(second.error.is_some());

        let third = adapter.call(empty_input(Value::Null)).await.unwrap();
        assert!(third.error.is_none());
        assert_eq!(adapter.call_count(), 3);
    }

    #[tokio::test]
    async fn mock_adapter_error_mode_raises() {
        let adapter = MockAdapter::new();
        adapter.set_error_mode(true);

        assert!(adapter.call(empty_input(Value::Null)).await.is_err());

        adapter.set_error_mode(false);
        assert!(adapter.call(empty_input(Value::Null)).await.is_ok());
    }
}
