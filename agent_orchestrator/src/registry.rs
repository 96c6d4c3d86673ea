//! Keyed store mapping agent ids to adapter instances and their manifests.
//!
//! The registry is explicitly constructed and explicitly passed; it is
//! read-mostly during execution and written only during registration, and it
//! must not be mutated concurrently with an in-flight execution touching the
//! same ids (caller discipline, not an enforced lock).

use crate::adapter::{AgentAdapter, AgentManifest, Protocol};
use crate::error::OrchestratorError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A registry entry as seen by callers: the registration key, the manifest in
/// effect for that key (including any per-registration overrides), and the
/// adapter itself.
#[derive(Clone)]
pub struct RegisteredAgent {
    pub id: String,
    pub manifest: AgentManifest,
    pub adapter: Arc<dyn AgentAdapter>,
}

struct RegistryEntry {
    manifest: AgentManifest,
    adapter: Arc<dyn AgentAdapter>,
    /// Insertion index; keeps listing order deterministic and serves as the
    /// stable-sort secondary key during agent selection.
    seq: u64,
}

/// Aggregate registry figures.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_agents: usize,
    pub protocols: Vec<Protocol>,
    pub average_cost: f64,
    pub min_cost: f64,
    pub max_cost: f64,
}

#[derive(Default)]
pub struct AgentRegistry {
    entries: HashMap<String, RegistryEntry>,
    next_seq: u64,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Raw registration: keys by the adapter's own manifest id, overwriting
    /// any previous registration under that id. An overwritten entry keeps
    /// its original position in listing order.
    pub fn register(&mut self, adapter: Arc<dyn AgentAdapter>) {
        let id = adapter.manifest().id.clone();
        let manifest = adapter.manifest().clone();
        let seq = match self.entries.get(&id) {
            Some(existing) => existing.seq,
            None => self.bump_seq(),
        };
        debug!(agent = %id, "registering adapter");
        self.entries.insert(id, RegistryEntry { manifest, adapter, seq });
    }

    /// Safe registration under an explicit key. Fails with
    /// [`OrchestratorError::DuplicateRegistration`] if the key is taken,
    /// leaving the existing registration intact.
    ///
    /// `capabilities` and `reputation` override the manifest recorded for
    /// this key without touching the adapter's intrinsic manifest, so one
    /// adapter can be registered under several keys with different overlays.
    pub fn register_agent(
        &mut self,
        id: impl Into<String>,
        adapter: Arc<dyn AgentAdapter>,
        capabilities: Option<Vec<String>>,
        reputation: Option<f64>,
    ) -> Result<(), OrchestratorError> {
        let id = id.into();
        if self.entries.contains_key(&id) {
            return Err(OrchestratorError::DuplicateRegistration(id));
        }

        let mut manifest = adapter.manifest().clone();
        if let Some(tags) = capabilities {
            manifest.tags = Some(tags);
        }
        if let Some(reputation) = reputation {
            manifest.reputation = Some(reputation);
        }

        let seq = self.bump_seq();
        debug!(agent = %id, "registering adapter with manifest overrides");
        self.entries.insert(id, RegistryEntry { manifest, adapter, seq });
        Ok(())
    }

    /// Removes both manifest and adapter. Idempotent: reports whether
    /// anything was actually removed and never fails for a missing id.
    pub fn unregister_agent(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get_adapter(&self, id: &str) -> Option<Arc<dyn AgentAdapter>> {
        self.entries.get(id).map(|entry| entry.adapter.clone())
    }

    pub fn get_manifest(&self, id: &str) -> Option<&AgentManifest> {
        self.entries.get(id).map(|entry| &entry.manifest)
    }

    /// All agents whose tag list contains `capability` as an exact element
    /// (case-sensitive; a superstring tag does not match).
    pub fn find_by_capability(&self, capability: &str) -> Vec<(String, Arc<dyn AgentAdapter>)> {
        self.ordered_entries()
            .into_iter()
            .filter(|(_, entry)| {
                entry
                    .manifest
                    .tag_slice()
                    .iter()
                    .any(|tag| tag == capability)
            })
            .map(|(id, entry)| (id.clone(), entry.adapter.clone()))
            .collect()
    }

    /// All manifests whose cost is at most `max_cost`; agents without a
    /// declared cost count as free and always pass.
    pub fn find_by_cost(&self, max_cost: f64) -> Vec<&AgentManifest> {
        self.ordered_entries()
            .into_iter()
            .filter(|(_, entry)| entry.manifest.cost.unwrap_or(0.0) <= max_cost)
            .map(|(_, entry)| &entry.manifest)
            .collect()
    }

    /// Manifests of every registered agent, in insertion order.
    pub fn list_all(&self) -> Vec<&AgentManifest> {
        self.ordered_entries()
            .into_iter()
            .map(|(_, entry)| &entry.manifest)
            .collect()
    }

    /// Full registry view, in insertion order.
    pub fn list_agents(&self) -> Vec<RegisteredAgent> {
        self.ordered_entries()
            .into_iter()
            .map(|(id, entry)| RegisteredAgent {
                id: id.clone(),
                manifest: entry.manifest.clone(),
                adapter: entry.adapter.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let manifests = self.list_all();
        let total_agents = manifests.len();

        let mut protocols: Vec<Protocol> = Vec::new();
        for manifest in &manifests {
            if !protocols.contains(&manifest.protocol) {
                protocols.push(manifest.protocol);
            }
        }

        let costs: Vec<f64> = manifests
            .iter()
            .map(|manifest| manifest.cost.unwrap_or(0.0))
            .collect();

        let average_cost = if costs.is_empty() {
            0.0
        } else {
            costs.iter().sum::<f64>() / costs.len() as f64
        };
        let min_cost = costs.iter().copied().fold(f64::INFINITY, f64::min);
        let max_cost = costs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        RegistryStats {
            total_agents,
            protocols,
            average_cost,
            min_cost: if costs.is_empty() { 0.0 } else { min_cost },
            max_cost: if costs.is_empty() { 0.0 } else { max_cost },
        }
    }

    fn ordered_entries(&self) -> Vec<(&String, &RegistryEntry)> {
        let mut entries: Vec<(&String, &RegistryEntry)> = self.entries.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.seq);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockAdapter;

    fn mock(id: &str) -> Arc<MockAdapter> {
        Arc::new(MockAdapter::named(id))
    }

    #[test]
    fn raw_register_keys_by_manifest_id_and_overwrites() {
        let mut registry = AgentRegistry::new();
        registry.register(mock("alpha"));
        registry.register(mock("alpha"));

        assert_eq!(registry.len(), 1);
        assert!(registry.get_adapter("alpha").is_some());
    }

    #[test]
    fn safe_register_rejects_duplicates_and_keeps_first() {
        let mut registry = AgentRegistry::new();
        registry
            .register_agent("worker", mock("alpha"), Some(vec!["search".into()]), None)
            .unwrap();

        let err = registry
            .register_agent("worker", mock("beta"), None, None)
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateRegistration(_)));

        // The rejected call must not disturb the original registration.
        let manifest = registry.get_manifest("worker").unwrap();
        assert_eq!(manifest.id, "alpha");
        assert_eq!(manifest.tag_slice(), ["search".to_string()]);
    }

    #[test]
    fn override_does_not_touch_intrinsic_manifest() {
        let mut registry = AgentRegistry::new();
        let adapter = mock("alpha");
        registry
            .register_agent(
                "custom-key",
                adapter.clone(),
                Some(vec!["special".into()]),
                Some(0.9),
            )
            .unwrap();

        let manifest = registry.get_manifest("custom-key").unwrap();
        assert_eq!(manifest.id, "alpha");
        assert_eq!(manifest.reputation, Some(0.9));

        // Intrinsic manifest unchanged.
        assert!(adapter.manifest().reputation.is_none());
        assert_ne!(adapter.manifest().tag_slice(), ["special".to_string()]);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut registry = AgentRegistry::new();
        registry.register(mock("alpha"));

        assert!(registry.unregister_agent("alpha"));
        assert!(!registry.unregister_agent("alpha"));
        assert!(!registry.unregister_agent("never-existed"));
    }

    #[test]
    fn find_by_capability_requires_exact_tag() {
        let mut registry = AgentRegistry::new();
        registry
            .register_agent("a", mock("a"), Some(vec!["search".into()]), None)
            .unwrap();
        registry
            .register_agent("b", mock("b"), Some(vec!["searching".into()]), None)
            .unwrap();

        let found = registry.find_by_capability("search");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "a");
    }

    #[test]
    fn find_by_cost_treats_missing_cost_as_zero() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(MockAdapter::named("priced").with_cost(5.0)));

        let unpriced = AgentManifest {
            id: "free".to_string(),
            name: "Free".to_string(),
            description: "no declared cost".to_string(),
            protocol: Protocol::Custom,
            endpoint: None,
            cost: None,
            tags: None,
            reputation: None,
        };
        registry.register(Arc::new(MockAdapter::named("free").with_manifest(unpriced)));

        let cheap = registry.find_by_cost(1.0);
        assert_eq!(cheap.len(), 1);
        assert_eq!(cheap[0].id, "free");

        let all = registry.find_by_cost(10.0);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn stats_on_empty_registry_reports_zero_average() {
        let registry = AgentRegistry::new();
        let stats = registry.stats();

        assert_eq!(stats.total_agents, 0);
        assert_eq!(stats.average_cost, 0.0);
        assert_eq!(stats.min_cost, 0.0);
        assert_eq!(stats.max_cost, 0.0);
    }

    #[test]
    fn stats_aggregates_protocols_and_costs() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(MockAdapter::named("a").with_cost(1.0)));
        registry.register(Arc::new(MockAdapter::named("b").with_cost(3.0)));

        let stats = registry.stats();
        assert_eq!(stats.total_agents, 2);
        assert_eq!(stats.protocols, vec![Protocol::Custom]);
        assert!((stats.average_cost - 2.0).abs() < f64::EPSILON);
        assert_eq!(stats.min_cost, 1.0);
        assert_eq!(stats.max_cost, 3.0);
    }

    #[test]
    fn listing_preserves_insertion_order() {
        let mut registry = AgentRegistry::new();
        for id in ["c", "a", "b"] {
            registry.register(mock(id));
        }

        let ids: Vec<String> = registry.list_agents().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
