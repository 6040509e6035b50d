use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::analysis::TaskKind;

/// A backend provider known to the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub display_name: String,
    pub active: bool,
}

/// A declared (provider, task kind) skill used for routing decisions.
/// Unique per (provider_id, kind); re-declaring replaces the earlier row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapability {
    pub provider_id: String,
    pub kind: TaskKind,
    /// Self-reported quality estimate in [0, 1].
    pub confidence: f32,
    pub latency_ms: u64,
    pub cost_per_call: Option<f64>,
    pub max_input_len: usize,
}

/// Directory of providers and their declared capabilities.
///
/// Read-only while a request is being routed; the router receives it as an
/// injected dependency so tests can substitute a hand-built index.
#[derive(Debug, Default)]
pub struct CapabilityIndex {
    providers: HashMap<String, ProviderInfo>,
    capabilities: Vec<ProviderCapability>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: ProviderInfo) {
        self.providers.insert(info.id.clone(), info);
    }

    /// Declares a capability, replacing any earlier declaration for the same
    /// (provider, kind) pair.
    pub fn declare(&mut self, capability: ProviderCapability) {
        self.capabilities
            .retain(|c| !(c.provider_id == capability.provider_id && c.kind == capability.kind));
        self.capabilities.push(capability);
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderInfo> {
        self.providers.get(id)
    }

    fn is_active(&self, provider_id: &str) -> bool {
        self.providers.get(provider_id).map_or(false, |p| p.active)
    }

    /// All capabilities matching one of `kinds` with confidence at or above
    /// `min_confidence`, restricted to active providers. An empty result is
    /// an ordinary outcome, not an error.
    pub fn query(&self, kinds: &[TaskKind], min_confidence: f32) -> Vec<&ProviderCapability> {
        self.capabilities
            .iter()
            .filter(|c| kinds.contains(&c.kind))
            .filter(|c| c.confidence >= min_confidence)
            .filter(|c| self.is_active(&c.provider_id))
            .collect()
    }
}
