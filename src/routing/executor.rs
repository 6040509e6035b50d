use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{AssignmentStatus, ExecutionError, TaskAssignment};
use crate::providers::{PromptContext, ProviderClient};
use crate::storage::{AssignmentStore, RouterStore, StoreError};

/// Runs one assignment against one provider under a bounded timeout.
///
/// Owns the assignment state machine: `pending -> in_progress` before the
/// provider call, then `completed` or `failed`. Both transitions are
/// persisted. The provider call is the only suspension point.
pub struct TaskExecutor {
    client: Arc<dyn ProviderClient>,
    store: Arc<dyn RouterStore>,
    timeout: Duration,
}

impl TaskExecutor {
    pub fn new(
        client: Arc<dyn ProviderClient>,
        store: Arc<dyn RouterStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            store,
            timeout,
        }
    }

    pub async fn execute(
        &self,
        mut assignment: TaskAssignment,
        ctx: &PromptContext,
    ) -> Result<TaskAssignment, StoreError> {
        assignment.status = AssignmentStatus::InProgress;
        assignment.started_at = Some(Utc::now());
        self.store.update(assignment.clone()).await?;

        let call = self
            .client
            .generate(&assignment.provider_id, assignment.kind, ctx);

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(output)) if output.detail.kind() == assignment.kind => {
                info!(
                    task = %assignment.kind,
                    provider = %assignment.provider_id,
                    artifact = %output.artifact.uri,
                    "task completed"
                );
                assignment.status = AssignmentStatus::Completed;
                assignment.output = Some(output);
            }
            Ok(Ok(output)) => {
                warn!(
                    task = %assignment.kind,
                    provider = %assignment.provider_id,
                    got = %output.detail.kind(),
                    "provider returned output for the wrong task kind"
                );
                assignment.status = AssignmentStatus::Failed;
                assignment.error = Some(ExecutionError::new(
                    format!(
                        "provider returned {} output for a {} task",
                        output.detail.kind(),
                        assignment.kind
                    ),
                    "kind_mismatch",
                ));
            }
            Ok(Err(err)) => {
                warn!(
                    task = %assignment.kind,
                    provider = %assignment.provider_id,
                    error = %err,
                    "provider call failed"
                );
                assignment.status = AssignmentStatus::Failed;
                assignment.error =
                    Some(ExecutionError::new("provider call failed", err.to_string()));
            }
            Err(_) => {
                warn!(
                    task = %assignment.kind,
                    provider = %assignment.provider_id,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "provider call timed out"
                );
                assignment.status = AssignmentStatus::Failed;
                assignment.error = Some(ExecutionError::new(
                    format!(
                        "provider call exceeded {:.1}s timeout",
                        self.timeout.as_secs_f64()
                    ),
                    "timeout",
                ));
            }
        }

        assignment.completed_at = Some(Utc::now());
        self.store.update(assignment.clone()).await?;
        Ok(assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TaskKind;
    use crate::providers::demo::DemoClient;
    use crate::providers::{ArtifactRef, GenerationOutput, OutputDetail, ProviderError};
    use crate::routing::{GenerationRequest, Priority};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct FailingClient;

    #[async_trait]
    impl ProviderClient for FailingClient {
        async fn generate(
            &self,
            _provider_id: &str,
            _kind: TaskKind,
            _ctx: &PromptContext,
        ) -> Result<GenerationOutput, ProviderError> {
            Err(ProviderError::Api("model overloaded".to_string()))
        }
    }

    struct SlowClient;

    #[async_trait]
    impl ProviderClient for SlowClient {
        async fn generate(
            &self,
            _provider_id: &str,
            _kind: TaskKind,
            _ctx: &PromptContext,
        ) -> Result<GenerationOutput, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("the executor times out first")
        }
    }

    struct WrongKindClient;

    #[async_trait]
    impl ProviderClient for WrongKindClient {
        async fn generate(
            &self,
            _provider_id: &str,
            _kind: TaskKind,
            _ctx: &PromptContext,
        ) -> Result<GenerationOutput, ProviderError> {
            Ok(GenerationOutput {
                artifact: ArtifactRef::new("demo://wrong"),
                detail: OutputDetail::Rhythm {
                    pattern: "x...".to_string(),
                },
            })
        }
    }

    async fn seeded(
        store: &MemoryStore,
        kind: TaskKind,
    ) -> (TaskAssignment, PromptContext) {
        let request = GenerationRequest::new("a tune");
        let request_id = request.id;
        store.insert_request(request).await;

        let assignment =
            TaskAssignment::new(request_id, kind, "demo".to_string(), Priority::new(0));
        store.create(assignment.clone()).await.unwrap();

        let ctx = PromptContext {
            request_id,
            prompt: "a tune".to_string(),
            attributes: HashMap::new(),
            params: HashMap::new(),
        };
        (assignment, ctx)
    }

    #[tokio::test]
    async fn success_reaches_completed_with_timestamps() {
        let store = Arc::new(MemoryStore::new());
        let (assignment, ctx) = seeded(&store, TaskKind::MelodyGeneration).await;
        let executor = TaskExecutor::new(
            Arc::new(DemoClient::with_latency(Duration::from_millis(0))),
            store.clone(),
            Duration::from_secs(5),
        );

        let done = executor.execute(assignment, &ctx).await.unwrap();
        assert_eq!(done.status, AssignmentStatus::Completed);
        assert!(done.output.is_some());
        assert!(done.error.is_none());
        assert!(done.started_at.is_some());
        assert!(done.completed_at.is_some());

        // The terminal state was persisted.
        let stored = store.list_for_request(done.request_id).await.unwrap();
        assert_eq!(stored[0].status, AssignmentStatus::Completed);
    }

    #[tokio::test]
    async fn provider_error_becomes_structured_failure() {
        let store = Arc::new(MemoryStore::new());
        let (assignment, ctx) = seeded(&store, TaskKind::MelodyGeneration).await;
        let executor =
            TaskExecutor::new(Arc::new(FailingClient), store.clone(), Duration::from_secs(5));

        let done = executor.execute(assignment, &ctx).await.unwrap();
        assert_eq!(done.status, AssignmentStatus::Failed);
        let err = done.error.unwrap();
        assert_eq!(err.message, "provider call failed");
        assert!(err.cause.contains("model overloaded"));
    }

    #[tokio::test]
    async fn timeout_is_a_failure_of_the_same_shape() {
        let store = Arc::new(MemoryStore::new());
        let (assignment, ctx) = seeded(&store, TaskKind::MelodyGeneration).await;
        let executor = TaskExecutor::new(
            Arc::new(SlowClient),
            store.clone(),
            Duration::from_millis(10),
        );

        let done = executor.execute(assignment, &ctx).await.unwrap();
        assert_eq!(done.status, AssignmentStatus::Failed);
        assert_eq!(done.error.unwrap().cause, "timeout");
    }

    #[tokio::test]
    async fn mismatched_output_kind_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (assignment, ctx) = seeded(&store, TaskKind::MelodyGeneration).await;
        let executor = TaskExecutor::new(
            Arc::new(WrongKindClient),
            store.clone(),
            Duration::from_secs(5),
        );

        let done = executor.execute(assignment, &ctx).await.unwrap();
        assert_eq!(done.status, AssignmentStatus::Failed);
        assert_eq!(done.error.unwrap().cause, "kind_mismatch");
        assert!(done.output.is_none());
    }

    #[tokio::test]
    async fn unknown_assignment_surfaces_store_error() {
        let store = Arc::new(MemoryStore::new());
        let executor = TaskExecutor::new(
            Arc::new(DemoClient::with_latency(Duration::from_millis(0))),
            store.clone(),
            Duration::from_secs(5),
        );

        // Assignment was never created in the store.
        let orphan = TaskAssignment::new(
            Uuid::new_v4(),
            TaskKind::MelodyGeneration,
            "demo".to_string(),
            Priority::new(0),
        );
        let ctx = PromptContext {
            request_id: orphan.request_id,
            prompt: String::new(),
            attributes: HashMap::new(),
            params: HashMap::new(),
        };
        assert!(executor.execute(orphan, &ctx).await.is_err());
    }
}
