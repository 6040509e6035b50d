use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::analysis::TaskKind;

pub mod demo;

/// Everything a provider gets to see about the request it is serving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContext {
    pub request_id: Uuid,
    pub prompt: String,
    pub attributes: HashMap<String, String>,
    pub params: HashMap<String, String>,
}

/// Opaque handle to a generated artifact (an audio render, a MIDI file, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub uri: String,
}

impl ArtifactRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Typed per-task payload. The tag must agree with the assignment's task
/// kind; the executor rejects mismatched outputs at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputDetail {
    Melody {
        key: Option<String>,
        tempo_bpm: Option<u32>,
    },
    Harmony {
        progression: Vec<String>,
    },
    Rhythm {
        pattern: String,
    },
    Orchestration {
        instruments: Vec<String>,
    },
    StyleTransfer {
        style: String,
    },
}

impl OutputDetail {
    pub fn kind(&self) -> TaskKind {
        match self {
            OutputDetail::Melody { .. } => TaskKind::MelodyGeneration,
            OutputDetail::Harmony { .. } => TaskKind::ChordProgression,
            OutputDetail::Rhythm { .. } => TaskKind::RhythmGeneration,
            OutputDetail::Orchestration { .. } => TaskKind::Orchestration,
            OutputDetail::StyleTransfer { .. } => TaskKind::StyleTransfer,
        }
    }
}

/// A provider's successful answer for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub artifact: ArtifactRef,
    pub detail: OutputDetail,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("input of {actual} chars exceeds provider limit of {limit}")]
    InputTooLong { limit: usize, actual: usize },
}

/// The opaque vendor boundary. All protocol detail for talking to an actual
/// AI backend lives behind this trait; the router only sees typed outputs
/// and errors.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn generate(
        &self,
        provider_id: &str,
        kind: TaskKind,
        ctx: &PromptContext,
    ) -> Result<GenerationOutput, ProviderError>;
}
