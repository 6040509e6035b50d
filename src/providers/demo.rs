use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;

use super::{ArtifactRef, GenerationOutput, OutputDetail, PromptContext, ProviderClient, ProviderError};
use crate::analysis::TaskKind;

/// In-process stand-in for real vendor backends. Produces deterministic
/// stub artifacts after a short simulated latency, so the demo binary works
/// without any API keys or network access.
pub struct DemoClient {
    latency: Duration,
}

impl DemoClient {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(150),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }

    fn detail_for(kind: TaskKind, ctx: &PromptContext) -> OutputDetail {
        match kind {
            TaskKind::MelodyGeneration => OutputDetail::Melody {
                key: Some("C major".to_string()),
                tempo_bpm: ctx
                    .attributes
                    .get("tempo_bpm")
                    .and_then(|t| t.parse().ok()),
            },
            TaskKind::ChordProgression => OutputDetail::Harmony {
                progression: vec!["C", "Am", "F", "G"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            },
            TaskKind::RhythmGeneration => OutputDetail::Rhythm {
                pattern: "x..x..x.".to_string(),
            },
            TaskKind::Orchestration => OutputDetail::Orchestration {
                instruments: vec!["strings", "piano", "double bass"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            },
            TaskKind::StyleTransfer => OutputDetail::StyleTransfer {
                style: ctx
                    .attributes
                    .get("genre")
                    .cloned()
                    .unwrap_or_else(|| "original".to_string()),
            },
        }
    }
}

impl Default for DemoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for DemoClient {
    async fn generate(
        &self,
        provider_id: &str,
        kind: TaskKind,
        ctx: &PromptContext,
    ) -> Result<GenerationOutput, ProviderError> {
        // Simulate vendor-side processing time.
        sleep(self.latency).await;

        Ok(GenerationOutput {
            artifact: ArtifactRef::new(format!(
                "demo://{}/{}/{}",
                provider_id, kind, ctx.request_id
            )),
            detail: Self::detail_for(kind, ctx),
        })
    }
}
