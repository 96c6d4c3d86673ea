//! Specialized task handlers behind the uniform adapter contract: smart
//! contract operations, zero-knowledge proof operations, and document
//! retrieval. All three are simulation-grade stand-ins for their real
//! backends, which live outside this process.

use crate::adapter::{AgentAdapter, AgentManifest, CallInput, CallResult, Protocol};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

/// The task text for a call: the step input if it is a string, otherwise the
/// `task` key of the shared context.
fn task_text(input: &CallInput) -> String {
    input
        .input
        .as_str()
        .map(str::to_string)
        .or_else(|| {
            input
                .context
                .get("task")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unspecified operation".to_string())
}

fn fake_hex(bytes: usize) -> String {
    let mut hex = String::new();
    while hex.len() < bytes * 2 {
        hex.push_str(&Uuid::new_v4().simple().to_string());
    }
    hex.truncate(bytes * 2);
    format!("0x{hex}")
}

// --- Contract agent ---

/// Simulates deployment of and interaction with smart contracts.
pub struct ContractAgent {
    manifest: AgentManifest,
}

impl ContractAgent {
    pub fn new() -> Self {
        Self {
            manifest: AgentManifest {
                id: "contract-agent".to_string(),
                name: "Smart Contract Agent".to_string(),
                description: "Deploys and interacts with smart contracts on various networks"
                    .to_string(),
                protocol: Protocol::Custom,
                endpoint: None,
                cost: Some(0.05),
                tags: Some(
                    ["contract", "deploy", "blockchain", "transaction"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                reputation: None,
            },
        }
    }
}

impl Default for ContractAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentAdapter for ContractAgent {
    fn manifest(&self) -> &AgentManifest {
        &self.manifest
    }

    async fn call(&self, input: CallInput) -> Result<CallResult> {
        let task = task_text(&input);
        let task_lower = task.to_lowercase();
        let mut logs = vec![format!("Contract Agent processing: {task}")];

        let output = if task_lower.contains("deploy") {
            let address = fake_hex(20);
            let transaction_hash = fake_hex(32);
            logs.push(format!("Contract deployed at {address}"));
            logs.push(format!("Transaction hash: {transaction_hash}"));
            json!({
                "contract_address": address,
                "transaction_hash": transaction_hash,
                "network": "sepolia",
                "gas_used": 1_234_567,
                "status": "deployed",
            })
        } else if task_lower.contains("verify") {
            logs.push("Contract verified on block explorer".to_string());
            json!({
                "verified": true,
                "compiler_version": "0.8.20",
                "optimization": true,
            })
        } else if task_lower.contains("interact") || task_lower.contains("call") {
            let transaction_hash = fake_hex(32);
            logs.push(format!("Transaction sent: {transaction_hash}"));
            logs.push("Transaction confirmed".to_string());
            json!({
                "transaction_hash": transaction_hash,
                "block_number": 12_345_678,
                "status": "success",
                "gas_used": 45_678,
            })
        } else {
            logs.push("No contract workspace configured, reporting empty set".to_string());
            json!({ "contracts": [], "location": "contracts/" })
        };

        Ok(CallResult {
            output,
            error: None,
            cost: self.manifest.cost,
            logs,
        })
    }
}

// --- Proof agent ---

/// Simulates zero-knowledge proof generation and verification. Proof
/// commitments are SHA-256 digests over the serialized step input, so equal
/// payloads produce equal commitments.
pub struct ProofAgent {
    manifest: AgentManifest,
}

impl ProofAgent {
    pub fn new() -> Self {
        Self {
            manifest: AgentManifest {
                id: "zk-agent".to_string(),
                name: "Zero-Knowledge Proof Agent".to_string(),
                description: "Generates and verifies zero-knowledge proofs".to_string(),
                protocol: Protocol::Custom,
                endpoint: None,
                cost: Some(0.1),
                tags: Some(
                    ["proof", "verification", "privacy", "zk"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                reputation: None,
            },
        }
    }

    fn commitment(payload: &Value) -> String {
        let serialized = serde_json::to_vec(payload).unwrap_or_default();
        let digest = Sha256::digest(&serialized);
        format!("0x{digest:x}")
    }
}

impl Default for ProofAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentAdapter for ProofAgent {
    fn manifest(&self) -> &AgentManifest {
        &self.manifest
    }

    async fn call(&self, input: CallInput) -> Result<CallResult> {
        let task = task_text(&input);
        let task_lower = task.to_lowercase();
        let mut logs = vec![format!("Proof Agent processing: {task}")];

        let output = if task_lower.contains("verify") {
            logs.push("Proof verified".to_string());
            json!({
                "valid": true,
                "scheme": "groth16",
                "verified_at": Utc::now().timestamp_millis(),
            })
        } else {
            let commitment = Self::commitment(&input.input);
            logs.push(format!("Proof generated with commitment {commitment}"));
            json!({
                "proof": commitment,
                "scheme": "groth16",
                "public_signals": [task],
                "generated_at": Utc::now().timestamp_millis(),
            })
        };

        Ok(CallResult {
            output,
            error: None,
            cost: self.manifest.cost,
            logs,
        })
    }
}

// --- Retrieval agent ---

#[derive(Debug, Clone, Serialize)]
struct Document {
    id: String,
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct RetrievalMatch {
    id: String,
    score: usize,
    snippet: String,
}

/// In-memory document retrieval with keyword scoring; the stand-in for a
/// vector-search backend.
pub struct RetrievalAgent {
    manifest: AgentManifest,
    documents: RwLock<Vec<Document>>,
}

const SNIPPET_LEN: usize = 160;
const MAX_MATCHES: usize = 3;

impl RetrievalAgent {
    pub fn new() -> Self {
        Self {
            manifest: AgentManifest {
                id: "rag-agent".to_string(),
                name: "Retrieval Agent".to_string(),
                description: "Searches an in-memory document store by keyword overlap"
                    .to_string(),
                protocol: Protocol::Custom,
                endpoint: None,
                cost: Some(0.01),
                tags: Some(
                    ["search", "query", "retrieval", "rag", "semantic-search"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                reputation: None,
            },
            documents: RwLock::new(Vec::new()),
        }
    }

    pub fn add_document(&self, id: impl Into<String>, text: impl Into<String>) {
        self.documents.write().push(Document {
            id: id.into(),
            text: text.into(),
        });
    }

    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }

    fn search(&self, query: &str) -> Vec<RetrievalMatch> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();

        let documents = self.documents.read();
        let mut matches: Vec<RetrievalMatch> = documents
            .iter()
            .filter_map(|document| {
                let text_lower = document.text.to_lowercase();
                let score = terms.iter().filter(|term| text_lower.contains(*term)).count();
                (score > 0).then(|| RetrievalMatch {
                    id: document.id.clone(),
                    score,
                    snippet: document.text.chars().take(SNIPPET_LEN).collect(),
                })
            })
            .collect();

        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(MAX_MATCHES);
        matches
    }
}

impl Default for RetrievalAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentAdapter for RetrievalAgent {
    fn manifest(&self) -> &AgentManifest {
        &self.manifest
    }

    async fn call(&self, input: CallInput) -> Result<CallResult> {
        let query = task_text(&input);
        let total_documents = self.document_count();
        let mut logs = vec![format!("Retrieval Agent searching for: {query}")];

        let matches = self.search(&query);
        debug!(total_documents, matched = matches.len(), "retrieval completed");
        if total_documents == 0 {
            logs.push("Document store is empty".to_string());
        } else {
            logs.push(format!(
                "Matched {} of {} documents",
                matches.len(),
                total_documents
            ));
        }

        Ok(CallResult {
            output: json!({
                "query": query,
                "matches": matches,
                "total_documents": total_documents,
            }),
            error: None,
            cost: self.manifest.cost,
            logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Context;

    fn input_with_task(task: &str) -> CallInput {
        CallInput {
            context: Context::new(),
            input: json!(task),
        }
    }

    #[tokio::test]
    async fn contract_agent_deploy_produces_receipt() {
        let agent = ContractAgent::new();
        let result = agent
            .call(input_with_task("deploy the registry contract"))
            .await
            .unwrap();

        assert!(result.error.is_none());
        assert_eq!(result.output["status"], json!("deployed"));
        let address = result.output["contract_address"].as_str().unwrap();
        assert!(address.starts_with("0x"));
        assert_eq!(address.len(), 2 + 40);
        let hash = result.output["transaction_hash"].as_str().unwrap();
        assert_eq!(hash.len(), 2 + 64);
    }

    #[tokio::test]
    async fn contract_agent_reads_task_from_context() {
        let agent = ContractAgent::new();
        let mut context = Context::new();
        context.insert("task".to_string(), json!("verify the deployment"));

        let result = agent
            .call(CallInput {
                context,
                input: Value::Null,
            })
            .await
            .unwrap();

        assert_eq!(result.output["verified"], json!(true));
    }

    #[tokio::test]
    async fn proof_agent_commitment_is_deterministic() {
        let agent = ProofAgent::new();

        let first = agent
            .call(input_with_task("generate a proof for batch 7"))
            .await
            .unwrap();
        let second = agent
            .call(input_with_task("generate a proof for batch 7"))
            .await
            .unwrap();

        assert_eq!(first.output["proof"], second.output["proof"]);
        assert!(first.output["proof"].as_str().unwrap().starts_with("0x"));
    }

    #[tokio::test]
    async fn proof_agent_verify_path() {
        let agent = ProofAgent::new();
        let result = agent
            .call(input_with_task("verify the submitted proof"))
            .await
            .unwrap();

        assert_eq!(result.output["valid"], json!(true));
    }

    #[tokio::test]
    async fn retrieval_agent_ranks_by_keyword_overlap() {
        let agent = RetrievalAgent::new();
        agent.add_document("a", "the orchestration engine executes plans");
        agent.add_document("b", "plans and engine and orchestration and retries");
        agent.add_document("c", "completely unrelated text");

        let result = agent
            .call(input_with_task("orchestration engine plans"))
            .await
            .unwrap();

        let matches = result.output["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(result.output["total_documents"], json!(3));
    }

    #[tokio::test]
    async fn retrieval_agent_handles_empty_store() {
        let agent = RetrievalAgent::new();
        let result = agent.call(input_with_task("anything")).await.unwrap();

        assert!(result.error.is_none());
        assert_eq!(result.output["matches"], json!([]));
        assert!(result.logs.iter().any(|line| line.contains("empty")));
    }
}
