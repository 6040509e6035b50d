use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::analysis::{TaskBreakdown, TaskKind};
use crate::routing::{GenerationRequest, RequestStatus, TaskAssignment};

/// Failures from the persistence collaborators. These are the only errors
/// the router's public methods propagate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("assignment not found: {0}")]
    AssignmentNotFound(Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for requests and their derived routing state. Assumed atomic
/// per single record.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn load_request(&self, id: Uuid) -> Result<GenerationRequest, StoreError>;
    async fn save_request_status(&self, id: Uuid, status: RequestStatus) -> Result<(), StoreError>;
    async fn save_breakdown(&self, id: Uuid, breakdown: TaskBreakdown) -> Result<(), StoreError>;
    async fn load_breakdown(&self, id: Uuid) -> Result<Option<TaskBreakdown>, StoreError>;
    async fn record_unserviceable(&self, id: Uuid, kind: TaskKind) -> Result<(), StoreError>;
    async fn load_unserviceable(&self, id: Uuid) -> Result<Vec<TaskKind>, StoreError>;
}

/// Persistence for assignments, atomic per record. Each assignment has a
/// single writer at any time, so no further locking is required here.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn create(&self, assignment: TaskAssignment) -> Result<(), StoreError>;
    async fn update(&self, assignment: TaskAssignment) -> Result<(), StoreError>;
    /// All assignments for a request, priority ascending.
    async fn list_for_request(&self, request_id: Uuid) -> Result<Vec<TaskAssignment>, StoreError>;
}

/// Convenience bound for stores that persist both requests and assignments,
/// so the router can hold one trait object.
pub trait RouterStore: RequestStore + AssignmentStore {}

impl<T: RequestStore + AssignmentStore> RouterStore for T {}

#[derive(Debug)]
struct RequestRecord {
    request: GenerationRequest,
    breakdown: Option<TaskBreakdown>,
    unserviceable: Vec<TaskKind>,
    assignments: Vec<TaskAssignment>,
}

/// In-memory store backing the demo binary and the test suites.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, RequestRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_request(&self, request: GenerationRequest) {
        let mut records = self.records.write().await;
        records.insert(
            request.id,
            RequestRecord {
                request,
                breakdown: None,
                unserviceable: Vec::new(),
                assignments: Vec::new(),
            },
        );
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn load_request(&self, id: Uuid) -> Result<GenerationRequest, StoreError> {
        let records = self.records.read().await;
        records
            .get(&id)
            .map(|r| r.request.clone())
            .ok_or(StoreError::RequestNotFound(id))
    }

    async fn save_request_status(&self, id: Uuid, status: RequestStatus) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::RequestNotFound(id))?;
        record.request.status = status;
        Ok(())
    }

    async fn save_breakdown(&self, id: Uuid, breakdown: TaskBreakdown) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::RequestNotFound(id))?;
        // Re-analysis replaces the breakdown wholesale, so derived routing
        // state is reset with it.
        record.breakdown = Some(breakdown);
        record.unserviceable.clear();
        Ok(())
    }

    async fn load_breakdown(&self, id: Uuid) -> Result<Option<TaskBreakdown>, StoreError> {
        let records = self.records.read().await;
        records
            .get(&id)
            .map(|r| r.breakdown.clone())
            .ok_or(StoreError::RequestNotFound(id))
    }

    async fn record_unserviceable(&self, id: Uuid, kind: TaskKind) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::RequestNotFound(id))?;
        if !record.unserviceable.contains(&kind) {
            record.unserviceable.push(kind);
        }
        Ok(())
    }

    async fn load_unserviceable(&self, id: Uuid) -> Result<Vec<TaskKind>, StoreError> {
        let records = self.records.read().await;
        records
            .get(&id)
            .map(|r| r.unserviceable.clone())
            .ok_or(StoreError::RequestNotFound(id))
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn create(&self, assignment: TaskAssignment) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&assignment.request_id)
            .ok_or(StoreError::RequestNotFound(assignment.request_id))?;
        record.assignments.push(assignment);
        Ok(())
    }

    async fn update(&self, assignment: TaskAssignment) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&assignment.request_id)
            .ok_or(StoreError::RequestNotFound(assignment.request_id))?;
        let slot = record
            .assignments
            .iter_mut()
            .find(|a| a.id == assignment.id)
            .ok_or(StoreError::AssignmentNotFound(assignment.id))?;
        *slot = assignment;
        Ok(())
    }

    async fn list_for_request(&self, request_id: Uuid) -> Result<Vec<TaskAssignment>, StoreError> {
        let records = self.records.read().await;
        let record = records
            .get(&request_id)
            .ok_or(StoreError::RequestNotFound(request_id))?;
        let mut assignments = record.assignments.clone();
        assignments.sort_by_key(|a| a.priority);
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Priority;

    #[tokio::test]
    async fn request_round_trip() {
        let store = MemoryStore::new();
        let request = GenerationRequest::new("a tune");
        let id = request.id;
        store.insert_request(request).await;

        let loaded = store.load_request(id).await.unwrap();
        assert_eq!(loaded.status, RequestStatus::Pending);

        store
            .save_request_status(id, RequestStatus::Processing)
            .await
            .unwrap();
        assert_eq!(
            store.load_request(id).await.unwrap().status,
            RequestStatus::Processing
        );
    }

    #[tokio::test]
    async fn missing_request_is_an_error() {
        let store = MemoryStore::new();
        let err = store.load_request(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::RequestNotFound(_)));
    }

    #[tokio::test]
    async fn assignments_listed_in_priority_order() {
        let store = MemoryStore::new();
        let request = GenerationRequest::new("a tune");
        let id = request.id;
        store.insert_request(request).await;

        let second = TaskAssignment::new(
            id,
            TaskKind::ChordProgression,
            "beta".to_string(),
            Priority::new(1),
        );
        let first = TaskAssignment::new(
            id,
            TaskKind::MelodyGeneration,
            "alpha".to_string(),
            Priority::new(0),
        );
        let first_retry = first.fallback("gamma".to_string());

        store.create(second.clone()).await.unwrap();
        store.create(first_retry.clone()).await.unwrap();
        store.create(first.clone()).await.unwrap();

        let listed = store.list_for_request(id).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![first.id, first_retry.id, second.id]);
    }

    #[tokio::test]
    async fn saving_breakdown_resets_unserviceable_kinds() {
        let store = MemoryStore::new();
        let request = GenerationRequest::new("a tune");
        let id = request.id;
        store.insert_request(request).await;

        let breakdown = TaskBreakdown {
            tasks: vec![TaskKind::MelodyGeneration],
            attributes: Default::default(),
        };
        store.save_breakdown(id, breakdown.clone()).await.unwrap();
        store
            .record_unserviceable(id, TaskKind::StyleTransfer)
            .await
            .unwrap();
        assert_eq!(
            store.load_unserviceable(id).await.unwrap(),
            vec![TaskKind::StyleTransfer]
        );

        store.save_breakdown(id, breakdown).await.unwrap();
        assert!(store.load_unserviceable(id).await.unwrap().is_empty());
    }
}
