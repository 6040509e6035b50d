use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info};
use uuid::Uuid;

use super::selector::ProviderSelector;
use super::status::{StatusSnapshot, StatusTracker};
use super::{
    AggregatedResult, AssignmentStatus, ExecutionError, ExecutionStrategy, FailureCause, Priority,
    RequestStatus, RouterError, TaskAssignment, TaskExecutor, TaskFailure,
};
use crate::analysis::{PromptAnalyzer, TaskBreakdown, TaskKind};
use crate::capability::CapabilityIndex;
use crate::config::RouterConfig;
use crate::providers::{ArtifactRef, PromptContext, ProviderClient};
use crate::storage::{AssignmentStore, RequestStore, RouterStore};

/// The multi-provider generation task router.
///
/// Owns the per-request lifecycle: break the prompt into tasks, assign each
/// task to the best capable provider, drive execution under the configured
/// strategy, apply one-shot fallback on failure, and aggregate partial
/// results into one reported outcome.
///
/// All collaborators (capability index, provider client, store) are injected
/// so tests run against hand-built fakes.
pub struct Router {
    analyzer: PromptAnalyzer,
    selector: ProviderSelector,
    executor: TaskExecutor,
    store: Arc<dyn RouterStore>,
    config: RouterConfig,
    cancel_flags: Mutex<HashMap<Uuid, Arc<AtomicBool>>>,
}

impl Router {
    pub fn new(
        index: Arc<CapabilityIndex>,
        client: Arc<dyn ProviderClient>,
        store: Arc<dyn RouterStore>,
        config: RouterConfig,
    ) -> Self {
        let executor = TaskExecutor::new(
            client,
            store.clone(),
            Duration::from_secs(config.task_timeout_secs),
        );
        Self {
            analyzer: PromptAnalyzer::new(),
            selector: ProviderSelector::new(index),
            executor,
            store,
            config,
            cancel_flags: Mutex::new(HashMap::new()),
        }
    }

    /// Analyzes the request's prompt and creates one pending assignment per
    /// serviceable task. Kinds with no capable provider at the primary
    /// threshold are recorded as unserviceable and never become assignments.
    /// Re-analyzing replaces the previous breakdown wholesale.
    pub async fn analyze_and_route(&self, request_id: Uuid) -> Result<TaskBreakdown, RouterError> {
        let request = self.store.load_request(request_id).await?;
        let breakdown = self.analyzer.analyze(&request.prompt);
        info!(request = %request_id, tasks = ?breakdown.tasks, "analyzed prompt");
        self.store
            .save_breakdown(request_id, breakdown.clone())
            .await?;

        let mut created = 0usize;
        for (position, kind) in breakdown.tasks.iter().enumerate() {
            match self
                .selector
                .select(*kind, self.config.primary_confidence, &[])
            {
                Some(provider_id) => {
                    let assignment = TaskAssignment::new(
                        request_id,
                        *kind,
                        provider_id,
                        Priority::new(position as u32),
                    );
                    self.store.create(assignment).await?;
                    created += 1;
                }
                None => {
                    info!(request = %request_id, task = %kind, "task is unserviceable");
                    self.store.record_unserviceable(request_id, *kind).await?;
                }
            }
        }

        if created > 0 {
            self.store
                .save_request_status(request_id, RequestStatus::Processing)
                .await?;
        }

        Ok(breakdown)
    }

    /// Runs every pending assignment (plus any fallbacks) to a terminal
    /// state under the configured strategy, then aggregates and persists the
    /// request's final status. Routes first if the request was never
    /// analyzed.
    pub async fn execute_all(&self, request_id: Uuid) -> Result<AggregatedResult, RouterError> {
        let breakdown = match self.store.load_breakdown(request_id).await? {
            Some(breakdown) => breakdown,
            None => self.analyze_and_route(request_id).await?,
        };

        let request = self.store.load_request(request_id).await?;
        let ctx = PromptContext {
            request_id,
            prompt: request.prompt,
            attributes: breakdown.attributes.clone(),
            params: request.params,
        };
        let cancel = self.cancel_flag(request_id).await;

        match self.config.strategy {
            ExecutionStrategy::Sequential => {
                self.run_sequential(request_id, &ctx, &cancel).await?
            }
            ExecutionStrategy::Parallel => self.run_parallel(request_id, &ctx, &cancel).await?,
        }

        let assignments = self.store.list_for_request(request_id).await?;
        let unserviceable = self.store.load_unserviceable(request_id).await?;
        let cancelled = cancel.load(Ordering::SeqCst);
        let result = aggregate(
            request_id,
            &breakdown.tasks,
            &unserviceable,
            &assignments,
            cancelled,
        );

        info!(
            request = %request_id,
            status = ?result.status,
            completed_tasks = result.per_task.len(),
            failures = result.failures.len(),
            "request finished"
        );
        self.store
            .save_request_status(request_id, result.status)
            .await?;
        self.cancel_flags.lock().await.remove(&request_id);

        Ok(result)
    }

    /// Flags the request for cancellation. Pending assignments fail with the
    /// cancelled cause without starting; an assignment already in flight is
    /// allowed to finish and its result stays visible, but the request's
    /// final status reflects the cancellation.
    pub async fn cancel(&self, request_id: Uuid) {
        info!(request = %request_id, "cancellation requested");
        self.cancel_flag(request_id)
            .await
            .store(true, Ordering::SeqCst);
    }

    /// Polling surface for callers that dispatched execution elsewhere.
    pub async fn get_status(&self, request_id: Uuid) -> Result<StatusSnapshot, RouterError> {
        Ok(StatusTracker::new(self.store.clone())
            .get_status(request_id)
            .await?)
    }

    async fn cancel_flag(&self, request_id: Uuid) -> Arc<AtomicBool> {
        self.cancel_flags
            .lock()
            .await
            .entry(request_id)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    // Tasks run one at a time in priority order; a fallback for task N
    // completes before task N+1 begins.
    async fn run_sequential(
        &self,
        request_id: Uuid,
        ctx: &PromptContext,
        cancel: &Arc<AtomicBool>,
    ) -> Result<(), RouterError> {
        let pending: Vec<TaskAssignment> = self
            .store
            .list_for_request(request_id)
            .await?
            .into_iter()
            .filter(|a| a.status == AssignmentStatus::Pending)
            .collect();

        for assignment in pending {
            if cancel.load(Ordering::SeqCst) {
                self.mark_cancelled(assignment).await?;
                continue;
            }
            let done = self.executor.execute(assignment, ctx).await?;
            if done.status == AssignmentStatus::Failed {
                self.attempt_fallback(done, ctx, cancel).await?;
            }
        }
        Ok(())
    }

    // All pending assignments dispatch concurrently under the semaphore
    // bound; each branch applies its own one-shot fallback. Aggregation
    // order comes from priorities, not completion order.
    async fn run_parallel(
        &self,
        request_id: Uuid,
        ctx: &PromptContext,
        cancel: &Arc<AtomicBool>,
    ) -> Result<(), RouterError> {
        let pending: Vec<TaskAssignment> = self
            .store
            .list_for_request(request_id)
            .await?
            .into_iter()
            .filter(|a| a.status == AssignmentStatus::Pending)
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let branches = pending.into_iter().map(|assignment| {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("semaphore is never closed");
                if cancel.load(Ordering::SeqCst) {
                    return self.mark_cancelled(assignment).await;
                }
                let done = self.executor.execute(assignment, ctx).await?;
                if done.status == AssignmentStatus::Failed {
                    self.attempt_fallback(done, ctx, &cancel).await?;
                }
                Ok(())
            }
        });

        for branch in join_all(branches).await {
            branch?;
        }
        Ok(())
    }

    // Exactly one replacement attempt per failed assignment, against a
    // different provider at the relaxed threshold. A fallback that fails
    // leaves the task unrecovered.
    async fn attempt_fallback(
        &self,
        failed: TaskAssignment,
        ctx: &PromptContext,
        cancel: &Arc<AtomicBool>,
    ) -> Result<(), RouterError> {
        if failed.priority.attempt > 0 {
            debug!(task = %failed.kind, "fallback already consumed, task unrecovered");
            return Ok(());
        }
        if cancel.load(Ordering::SeqCst) {
            return Ok(());
        }

        let exclude = vec![failed.provider_id.clone()];
        match self
            .selector
            .select(failed.kind, self.config.fallback_confidence, &exclude)
        {
            Some(provider_id) => {
                info!(
                    task = %failed.kind,
                    from = %failed.provider_id,
                    to = %provider_id,
                    "falling back to another provider"
                );
                let fallback = failed.fallback(provider_id);
                self.store.create(fallback.clone()).await?;
                self.executor.execute(fallback, ctx).await?;
            }
            None => {
                info!(task = %failed.kind, "no fallback provider available");
            }
        }
        Ok(())
    }

    async fn mark_cancelled(&self, mut assignment: TaskAssignment) -> Result<(), RouterError> {
        debug!(task = %assignment.kind, "assignment cancelled before starting");
        assignment.status = AssignmentStatus::Failed;
        assignment.error = Some(ExecutionError::cancelled());
        assignment.completed_at = Some(Utc::now());
        self.store.update(assignment).await?;
        Ok(())
    }
}

/// Folds terminal assignment state into the request's reported outcome.
///
/// Assignments are visited priority ascending, so the result is
/// deterministic regardless of completion order: the first completed
/// assignment per kind contributes. Unserviceable kinds, execution-failed
/// kinds, and cancelled kinds are enumerated as distinct failure causes.
pub fn aggregate(
    request_id: Uuid,
    required: &[TaskKind],
    unserviceable: &[TaskKind],
    assignments: &[TaskAssignment],
    cancelled: bool,
) -> AggregatedResult {
    let mut ordered = assignments.to_vec();
    ordered.sort_by_key(|a| a.priority);

    let mut per_task = BTreeMap::new();
    for assignment in &ordered {
        if assignment.status != AssignmentStatus::Completed {
            continue;
        }
        if let Some(output) = &assignment.output {
            per_task.entry(assignment.kind).or_insert_with(|| output.clone());
        }
    }

    let mut failures = Vec::new();
    if required.is_empty() {
        failures.push(TaskFailure {
            task: None,
            cause: FailureCause::NoTasks,
        });
    }
    for kind in required {
        if per_task.contains_key(kind) {
            continue;
        }
        if unserviceable.contains(kind) {
            failures.push(TaskFailure {
                task: Some(*kind),
                cause: FailureCause::Unserviceable,
            });
            continue;
        }
        let attempts: Vec<&TaskAssignment> =
            ordered.iter().filter(|a| a.kind == *kind).collect();
        if attempts.is_empty() {
            continue;
        }
        let all_cancelled = attempts
            .iter()
            .all(|a| a.error.as_ref().is_some_and(|e| e.is_cancelled()));
        failures.push(TaskFailure {
            task: Some(*kind),
            cause: if all_cancelled {
                FailureCause::Cancelled
            } else {
                FailureCause::ExecutionFailed
            },
        });
    }
    if cancelled {
        failures.push(TaskFailure {
            task: None,
            cause: FailureCause::Cancelled,
        });
    }

    // Cancellation intent overrides a late completion for the final status;
    // otherwise one completed task is enough for the request to count as
    // completed.
    let status = if cancelled || per_task.is_empty() {
        RequestStatus::Failed
    } else {
        RequestStatus::Completed
    };

    let final_artifact = match per_task.get(&TaskKind::PRIMARY) {
        Some(primary) => Some(primary.artifact.clone()),
        None if !per_task.is_empty() => {
            // Partial success without the primary task still surfaces what
            // was produced instead of dropping it.
            Some(ArtifactRef::new(format!("composite://{}", request_id)))
        }
        None => None,
    };

    AggregatedResult {
        status,
        per_task,
        final_artifact,
        failures,
    }
}
