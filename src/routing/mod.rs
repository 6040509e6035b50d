use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::analysis::TaskKind;
use crate::providers::{ArtifactRef, GenerationOutput};
use crate::storage::StoreError;

pub mod executor;
pub mod orchestrator;
pub mod selector;
pub mod status;

pub use executor::TaskExecutor;
pub use orchestrator::Router;
pub use selector::ProviderSelector;
pub use status::{StatusSnapshot, StatusTracker, TaskStatusDetail};

/// Lifecycle of a generation request as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// An incoming generation request. Immutable once created; the router only
/// ever updates its status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub prompt: String,
    pub params: HashMap<String, String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            params: HashMap::new(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Execution ordering key. `base` is the task's position in the breakdown,
/// `attempt` counts fallback generations; the derived lexicographic order
/// keeps a fallback strictly after the attempt it replaces while staying
/// ahead of the next task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority {
    pub base: u32,
    pub attempt: u32,
}

impl Priority {
    pub fn new(base: u32) -> Self {
        Self { base, attempt: 0 }
    }

    pub fn bumped(&self) -> Self {
        Self {
            base: self.base,
            attempt: self.attempt + 1,
        }
    }
}

const CANCELLED_CAUSE: &str = "cancelled";

/// Structured failure attached to an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub message: String,
    pub cause: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: cause.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            message: "request cancelled before execution".to_string(),
            cause: CANCELLED_CAUSE.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause == CANCELLED_CAUSE
    }
}

/// One attempt to execute a task kind against one provider.
///
/// Multiple assignments may exist for the same kind (original plus its
/// fallback); only the one that reaches `completed` contributes to the
/// final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub id: Uuid,
    pub request_id: Uuid,
    pub provider_id: String,
    pub kind: TaskKind,
    pub status: AssignmentStatus,
    pub priority: Priority,
    pub output: Option<GenerationOutput>,
    pub error: Option<ExecutionError>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskAssignment {
    pub fn new(request_id: Uuid, kind: TaskKind, provider_id: String, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            provider_id,
            kind,
            status: AssignmentStatus::Pending,
            priority,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Derives the single replacement attempt for a failed assignment.
    pub fn fallback(&self, provider_id: String) -> Self {
        Self::new(self.request_id, self.kind, provider_id, self.priority.bumped())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            AssignmentStatus::Completed | AssignmentStatus::Failed
        )
    }
}

/// Why a task kind (or the request itself, when `task` is absent) produced
/// no result. Unserviceable kinds never had an assignment; execution-failed
/// kinds exhausted their fallback; cancelled kinds were stopped before they
/// started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    Unserviceable,
    ExecutionFailed,
    Cancelled,
    NoTasks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task: Option<TaskKind>,
    pub cause: FailureCause,
}

/// How assignments for one request are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
}

/// The combined outcome reported for a request after every assignment has
/// reached a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub status: RequestStatus,
    pub per_task: BTreeMap<TaskKind, GenerationOutput>,
    pub final_artifact: Option<ArtifactRef>,
    pub failures: Vec<TaskFailure>,
}

/// Errors surfaced by the router's public methods. Request-domain failures
/// (unserviceable tasks, provider errors, cancellation) never appear here;
/// they are reported inside [`AggregatedResult`].
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
