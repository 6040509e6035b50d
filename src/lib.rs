pub mod analysis;
pub mod capability;
pub mod config;
pub mod providers;
pub mod routing;
pub mod storage;

pub use analysis::{PromptAnalyzer, TaskBreakdown, TaskKind, VoiceType};
pub use capability::{CapabilityIndex, ProviderCapability, ProviderInfo};
pub use config::RouterConfig;
pub use providers::{
    ArtifactRef, GenerationOutput, OutputDetail, PromptContext, ProviderClient, ProviderError,
};
pub use routing::{
    AggregatedResult, AssignmentStatus, ExecutionStrategy, FailureCause, GenerationRequest,
    Priority, RequestStatus, Router, RouterError, StatusSnapshot, StatusTracker, TaskAssignment,
    TaskFailure,
};
pub use storage::{AssignmentStore, MemoryStore, RequestStore, RouterStore, StoreError};
