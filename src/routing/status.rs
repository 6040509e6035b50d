use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::orchestrator::aggregate;
use super::{
    AggregatedResult, AssignmentStatus, ExecutionError, RequestStatus, TaskAssignment,
};
use crate::analysis::TaskKind;
use crate::providers::ArtifactRef;
use crate::storage::{AssignmentStore, RequestStore, RouterStore, StoreError};

/// Per-assignment view exposed to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusDetail {
    pub kind: TaskKind,
    pub provider_id: String,
    pub status: AssignmentStatus,
    pub attempt: u32,
    pub artifact: Option<ArtifactRef>,
    pub error: Option<ExecutionError>,
}

/// What a poller sees for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub request_id: Uuid,
    pub overall: RequestStatus,
    pub tasks: Vec<TaskStatusDetail>,
    pub aggregated: Option<AggregatedResult>,
}

/// Projects current request state from stored assignments. Read-only; the
/// projection is recomputed on every call, no cache involved.
pub struct StatusTracker {
    store: Arc<dyn RouterStore>,
}

impl StatusTracker {
    pub fn new(store: Arc<dyn RouterStore>) -> Self {
        Self { store }
    }

    pub async fn get_status(&self, request_id: Uuid) -> Result<StatusSnapshot, StoreError> {
        let assignments = self.store.list_for_request(request_id).await?;
        let breakdown = self.store.load_breakdown(request_id).await?;
        let required = breakdown.map(|b| b.tasks).unwrap_or_default();

        let tasks = assignments
            .iter()
            .map(|a| TaskStatusDetail {
                kind: a.kind,
                provider_id: a.provider_id.clone(),
                status: a.status,
                attempt: a.priority.attempt,
                artifact: a.output.as_ref().map(|o| o.artifact.clone()),
                error: a.error.clone(),
            })
            .collect();

        let aggregated = if !assignments.is_empty() && assignments.iter().all(|a| a.is_terminal())
        {
            let unserviceable = self.store.load_unserviceable(request_id).await?;
            // Cancellation intent is visible in assignment state: anything
            // the cancel path stopped carries the cancelled cause.
            let cancelled = assignments
                .iter()
                .any(|a| a.error.as_ref().is_some_and(|e| e.is_cancelled()));
            Some(aggregate(
                request_id,
                &required,
                &unserviceable,
                &assignments,
                cancelled,
            ))
        } else {
            None
        };

        Ok(StatusSnapshot {
            request_id,
            overall: overall_status(&assignments, &required),
            tasks,
            aggregated,
        })
    }
}

/// Pure projection of assignment states onto a request status:
/// all failed -> failed; every required kind completed -> completed; any
/// in progress -> processing; otherwise pending.
pub fn overall_status(assignments: &[TaskAssignment], required: &[TaskKind]) -> RequestStatus {
    if !assignments.is_empty()
        && assignments
            .iter()
            .all(|a| a.status == AssignmentStatus::Failed)
    {
        return RequestStatus::Failed;
    }

    if !required.is_empty()
        && required.iter().all(|kind| {
            assignments
                .iter()
                .any(|a| a.kind == *kind && a.status == AssignmentStatus::Completed)
        })
    {
        return RequestStatus::Completed;
    }

    if assignments
        .iter()
        .any(|a| a.status == AssignmentStatus::InProgress)
    {
        return RequestStatus::Processing;
    }

    RequestStatus::Pending
}
