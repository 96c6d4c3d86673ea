//! Outbound HTTP adapter: a rate-limited `reqwest` client behind the
//! uniform adapter contract. Transport failures are encoded in the call
//! result's `error` field so the engine's single failure path applies.

use crate::adapter::{AgentAdapter, AgentManifest, CallInput, CallResult, Protocol};
use anyhow::Result;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tracing::debug;

fn default_method() -> String {
    "GET".to_string()
}

/// Request shape accepted by the adapter; a bare string input is treated as
/// a GET for that URL.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpRequestInput {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl HttpRequestInput {
    fn bare(url: String) -> Self {
        Self {
            url,
            method: default_method(),
            headers: HashMap::new(),
            params: HashMap::new(),
            body: None,
        }
    }
}

pub struct HttpAdapter {
    manifest: AgentManifest,
    client: Client,
    limiter: DefaultDirectRateLimiter,
}

impl HttpAdapter {
    pub fn new(timeout: Duration, requests_per_second: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("agent-orchestrator/0.1")
            .build()?;

        let quota = Quota::per_second(
            NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            manifest: AgentManifest {
                id: "http-agent".to_string(),
                name: "HTTP Agent".to_string(),
                description: "Rate-limited HTTP client for external API calls".to_string(),
                protocol: Protocol::Http,
                endpoint: None,
                cost: None,
                tags: Some(
                    ["http", "api", "fetch", "request", "rest", "external"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                reputation: None,
            },
            client,
            limiter: RateLimiter::direct(quota),
        })
    }

    pub fn with_manifest(mut self, manifest: AgentManifest) -> Self {
        self.manifest = manifest;
        self
    }

    fn parse_input(input: &Value) -> Result<HttpRequestInput, String> {
        match input {
            Value::String(url) => Ok(HttpRequestInput::bare(url.clone())),
            other => serde_json::from_value(other.clone())
                .map_err(|err| format!("invalid http request input: {err}")),
        }
    }
}

#[async_trait]
impl AgentAdapter for HttpAdapter {
    fn manifest(&self) -> &AgentManifest {
        &self.manifest
    }

    async fn call(&self, input: CallInput) -> Result<CallResult> {
        let request = match Self::parse_input(&input.input) {
            Ok(request) => request,
            Err(message) => return Ok(CallResult::failed(message)),
        };

        if request.url.is_empty() {
            return Ok(CallResult::failed("url is required"));
        }

        let method = match Method::from_bytes(request.method.to_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return Ok(CallResult::failed(format!(
                    "unsupported http method: {}",
                    request.method
                )))
            }
        };

        let mut logs = vec![format!("HTTP Agent: {} {}", method, request.url)];

        self.limiter.until_ready().await;

        let mut builder = self.client.request(method, &request.url);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                let data: Value =
                    serde_json::from_str(&text).unwrap_or(Value::String(text));
                let request_duration_ms = started.elapsed().as_millis() as u64;

                debug!(status = status.as_u16(), request_duration_ms, "http call finished");
                logs.push(format!(
                    "Response {} in {}ms",
                    status.as_u16(),
                    request_duration_ms
                ));

                let success = status.is_success();
                Ok(CallResult {
                    output: json!({
                        "success": success,
                        "status": status.as_u16(),
                        "data": data,
                        "request_duration_ms": request_duration_ms,
                    }),
                    error: (!success).then(|| format!("http status {}", status.as_u16())),
                    cost: None,
                    logs,
                })
            }
            Err(err) => {
                logs.push(format!("Request failed: {err}"));
                Ok(CallResult {
                    output: json!({ "success": false }),
                    error: Some(format!("request failed: {err}")),
                    cost: None,
                    logs,
                })
            }
        }
    }
}
