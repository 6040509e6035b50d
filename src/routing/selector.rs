use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::analysis::TaskKind;
use crate::capability::CapabilityIndex;

/// Picks the best provider for a task kind from the capability index.
///
/// Finding no candidate is an expected outcome, reported as `None`; the
/// orchestrator records the task as unserviceable and moves on.
pub struct ProviderSelector {
    index: Arc<CapabilityIndex>,
}

impl ProviderSelector {
    pub fn new(index: Arc<CapabilityIndex>) -> Self {
        Self { index }
    }

    /// Best active provider for `kind` with confidence >= `min_confidence`,
    /// skipping any id in `exclude` (so a fallback never re-picks a provider
    /// that already failed the task). Candidates are ordered by confidence
    /// descending, then latency ascending.
    pub fn select(
        &self,
        kind: TaskKind,
        min_confidence: f32,
        exclude: &[String],
    ) -> Option<String> {
        let mut candidates = self.index.query(&[kind], min_confidence);
        candidates.retain(|c| !exclude.contains(&c.provider_id));
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then(a.latency_ms.cmp(&b.latency_ms))
        });

        let picked = candidates.first().map(|c| c.provider_id.clone());
        match &picked {
            Some(id) => debug!(task = %kind, provider = %id, "selected provider"),
            None => debug!(task = %kind, min_confidence, "no capable provider"),
        }
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ProviderCapability, ProviderInfo};

    fn index_with(rows: Vec<(&str, f32, u64)>) -> Arc<CapabilityIndex> {
        let mut index = CapabilityIndex::new();
        for (id, confidence, latency_ms) in rows {
            index.register(ProviderInfo {
                id: id.to_string(),
                display_name: id.to_string(),
                active: true,
            });
            index.declare(ProviderCapability {
                provider_id: id.to_string(),
                kind: TaskKind::MelodyGeneration,
                confidence,
                latency_ms,
                cost_per_call: None,
                max_input_len: 4_096,
            });
        }
        Arc::new(index)
    }

    #[test]
    fn picks_highest_confidence() {
        let selector = ProviderSelector::new(index_with(vec![
            ("low", 0.75, 100),
            ("high", 0.95, 5_000),
            ("mid", 0.85, 100),
        ]));
        assert_eq!(
            selector.select(TaskKind::MelodyGeneration, 0.7, &[]),
            Some("high".to_string())
        );
    }

    #[test]
    fn equal_confidence_breaks_tie_on_latency() {
        let selector = ProviderSelector::new(index_with(vec![
            ("slow", 0.9, 3_000),
            ("fast", 0.9, 200),
        ]));
        assert_eq!(
            selector.select(TaskKind::MelodyGeneration, 0.7, &[]),
            Some("fast".to_string())
        );
    }

    #[test]
    fn never_returns_below_threshold() {
        let selector = ProviderSelector::new(index_with(vec![("weak", 0.65, 100)]));
        assert_eq!(selector.select(TaskKind::MelodyGeneration, 0.7, &[]), None);
        // The same provider qualifies at the relaxed fallback threshold.
        assert_eq!(
            selector.select(TaskKind::MelodyGeneration, 0.6, &[]),
            Some("weak".to_string())
        );
    }

    #[test]
    fn excluded_providers_are_skipped() {
        let selector = ProviderSelector::new(index_with(vec![
            ("best", 0.95, 100),
            ("next", 0.8, 100),
        ]));
        assert_eq!(
            selector.select(TaskKind::MelodyGeneration, 0.7, &["best".to_string()]),
            Some("next".to_string())
        );
    }

    #[test]
    fn empty_candidate_set_is_none() {
        let selector = ProviderSelector::new(Arc::new(CapabilityIndex::new()));
        assert_eq!(selector.select(TaskKind::StyleTransfer, 0.7, &[]), None);
    }
}
