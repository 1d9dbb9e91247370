use crate::config::DEFAULT_MAX_RETAINED_OPERATIONS;
use crate::error::{ForkError, Result};
use crate::model::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub source_application_id: String,
    pub target_workspace_id: String,
    pub status: OperationStatus,

    #[serde(serialize_with = "serialize_datetime")]
    pub started_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(serialize_with = "serialize_optional_datetime")]
    pub completed_at: Option<DateTime<Utc>>,

    pub forked_application_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Success | OperationStatus::Failed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperationFilters {
    pub source_application_id: Option<String>,
    pub status: Option<OperationStatus>,
}

/// In-process record of forks started through an orchestrator.
///
/// Holds at most `max_retained` records once finished ones can be evicted.
/// Pending and running operations are never evicted.
#[derive(Clone)]
pub struct OperationTracker {
    operations: Arc<RwLock<HashMap<String, Operation>>>,
    max_retained: usize,
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_RETAINED_OPERATIONS)
    }
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_retained: usize) -> Self {
        Self {
            operations: Arc::new(RwLock::new(HashMap::new())),
            max_retained,
        }
    }

    /// Record a new pending operation and return its id
    pub async fn record(&self, source_application_id: &str, target_workspace_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let operation = Operation {
            id: id.clone(),
            source_application_id: source_application_id.to_string(),
            target_workspace_id: target_workspace_id.to_string(),
            status: OperationStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            forked_application_id: None,
            error: None,
        };

        let mut operations = self.operations.write().await;
        evict_finished(&mut operations, self.max_retained);
        operations.insert(id.clone(), operation);
        id
    }

    pub async fn mark_running(&self, id: &str) {
        self.update(id, |op| op.status = OperationStatus::Running)
            .await;
    }

    pub async fn mark_success(&self, id: &str, forked_application_id: &str) {
        self.update(id, |op| {
            op.status = OperationStatus::Success;
            op.forked_application_id = Some(forked_application_id.to_string());
        })
        .await;
    }

    pub async fn mark_failed(&self, id: &str, error: &ForkError) {
        self.update(id, |op| {
            op.status = OperationStatus::Failed;
            op.error = Some(error.to_string());
        })
        .await;
    }

    /// Terminal states are final; later updates are ignored.
    async fn update(&self, id: &str, apply: impl FnOnce(&mut Operation)) {
        let mut operations = self.operations.write().await;
        let Some(operation) = operations.get_mut(id) else {
            tracing::warn!("Ignoring update for unknown fork operation {}", id);
            return;
        };
        if operation.status.is_terminal() {
            return;
        }

        apply(operation);
        if operation.status.is_terminal() {
            operation.completed_at = Some(Utc::now());
        }
    }

    pub async fn get(&self, id: &str) -> Result<Operation> {
        self.operations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ForkError::not_found(EntityKind::Operation, id))
    }

    /// Operations matching the filters, newest first
    pub async fn list(&self, filters: &OperationFilters) -> Vec<Operation> {
        let operations = self.operations.read().await;
        let mut matching: Vec<Operation> = operations
            .values()
            .filter(|op| {
                filters
                    .source_application_id
                    .as_ref()
                    .is_none_or(|id| &op.source_application_id == id)
            })
            .filter(|op| filters.status.is_none_or(|status| op.status == status))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching
    }
}

/// Make room for one more record by dropping the oldest finished operations
fn evict_finished(operations: &mut HashMap<String, Operation>, max_retained: usize) {
    if operations.len() < max_retained {
        return;
    }
    let excess = operations.len() + 1 - max_retained;

    let mut finished: Vec<(DateTime<Utc>, String)> = operations
        .values()
        .filter(|op| op.status.is_terminal())
        .map(|op| (op.completed_at.unwrap_or(op.started_at), op.id.clone()))
        .collect();
    finished.sort();

    let evicted = finished.len().min(excess);
    for (_, id) in finished.into_iter().take(excess) {
        operations.remove(&id);
    }
    tracing::debug!(
        "Evicted {} finished fork operations, {} retained",
        evicted,
        operations.len()
    );
}

// Serialize DateTime as RFC 3339 / ISO 8601 string
fn serialize_datetime<S>(dt: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&dt.to_rfc3339())
}

fn serialize_optional_datetime<S>(
    dt: &Option<DateTime<Utc>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match dt {
        Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operation_lifecycle() {
        let tracker = OperationTracker::new();
        let id = tracker.record("app-1", "ws-1").await;

        let op = tracker.get(&id).await.expect("operation should exist");
        assert_eq!(op.status, OperationStatus::Pending);
        assert!(op.completed_at.is_none());

        tracker.mark_running(&id).await;
        tracker.mark_success(&id, "app-2").await;

        let op = tracker.get(&id).await.expect("operation should exist");
        assert_eq!(op.status, OperationStatus::Success);
        assert_eq!(op.forked_application_id.as_deref(), Some("app-2"));
        assert!(op.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let tracker = OperationTracker::new();
        let id = tracker.record("app-1", "ws-1").await;

        tracker.mark_failed(&id, &ForkError::ForkingNotAllowed).await;
        tracker.mark_success(&id, "app-2").await;

        let op = tracker.get(&id).await.expect("operation should exist");
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(
            op.error.as_deref(),
            Some("Forking this application is not allowed")
        );
        assert!(op.forked_application_id.is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_source_and_status() {
        let tracker = OperationTracker::new();
        let a = tracker.record("app-a", "ws-1").await;
        let _b = tracker.record("app-b", "ws-1").await;
        tracker.mark_success(&a, "app-a-copy").await;

        let by_source = tracker
            .list(&OperationFilters {
                source_application_id: Some("app-a".to_string()),
                status: None,
            })
            .await;
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].id, a);

        let pending = tracker
            .list(&OperationFilters {
                source_application_id: None,
                status: Some(OperationStatus::Pending),
            })
            .await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].source_application_id, "app-b");
    }

    #[tokio::test]
    async fn test_unknown_operation_is_not_found() {
        let tracker = OperationTracker::new();
        let err = tracker.get("missing").await.unwrap_err();
        assert!(matches!(
            err,
            ForkError::NotFound {
                kind: EntityKind::Operation,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_finished_operations_are_evicted_oldest_first() {
        let tracker = OperationTracker::with_limit(3);

        let first = tracker.record("app-1", "ws-1").await;
        let second = tracker.record("app-2", "ws-1").await;
        let third = tracker.record("app-3", "ws-1").await;
        tracker.mark_success(&first, "copy-1").await;
        tracker.mark_failed(&second, &ForkError::ForkingNotAllowed).await;
        tracker.mark_success(&third, "copy-3").await;

        // Pin completion times: first, then third, then second
        {
            let now = Utc::now();
            let mut operations = tracker.operations.write().await;
            for (id, minutes_ago) in [(&first, 3), (&third, 2), (&second, 1)] {
                let op = operations.get_mut(id).expect("operation should exist");
                op.completed_at = Some(now - chrono::Duration::minutes(minutes_ago));
            }
        }

        let fourth = tracker.record("app-4", "ws-1").await;
        assert!(tracker.get(&first).await.is_err());
        assert!(tracker.get(&third).await.is_ok());

        let fifth = tracker.record("app-5", "ws-1").await;
        assert!(tracker.get(&third).await.is_err());

        let retained: Vec<String> = tracker
            .list(&OperationFilters::default())
            .await
            .into_iter()
            .map(|op| op.id)
            .collect();
        assert_eq!(retained.len(), 3);
        for id in [&second, &fourth, &fifth] {
            assert!(retained.contains(id));
        }
    }

    #[tokio::test]
    async fn test_in_flight_operations_are_never_evicted() {
        let tracker = OperationTracker::with_limit(2);

        let pending = tracker.record("app-1", "ws-1").await;
        let running = tracker.record("app-2", "ws-1").await;
        tracker.mark_running(&running).await;
        let third = tracker.record("app-3", "ws-1").await;

        let retained = tracker.list(&OperationFilters::default()).await;
        assert_eq!(retained.len(), 3);
        for id in [&pending, &running, &third] {
            assert!(tracker.get(id).await.is_ok());
        }
    }
}
