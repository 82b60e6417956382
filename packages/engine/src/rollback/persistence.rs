//! Durable storage for rollback points, snapshots, and operations.
//!
//! Mirrors the teacher's `storage::map_data_store::MapDataStore` /
//! `storage::datastores::null::NullDataStore` split: a narrow persistence
//! trait plus a no-op-ish in-memory implementation used when no real
//! `RelStore` is configured, and a transactional implementation for when
//! one is.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use codegraph_core::{RelStore, RollbackOperation, RollbackPoint, Snapshot};

use super::types::RollbackError;

/// Durable persistence for the rollback store's three tables:
/// `rollback_points`, `rollback_operations`, `rollback_snapshots`.
#[async_trait]
pub trait RollbackPersistence: Send + Sync {
    async fn store_point(&self, point: RollbackPoint) -> Result<(), RollbackError>;
    async fn get_point(&self, id: &str) -> Option<RollbackPoint>;
    async fn list_points(&self) -> Vec<RollbackPoint>;
    async fn list_for_session(&self, session_id: &str) -> Vec<RollbackPoint>;
    /// Cascade-deletes the point plus its snapshots and operations.
    /// Returns whether a row existed.
    async fn remove_point(&self, id: &str) -> Result<bool, RollbackError>;

    async fn store_snapshot(&self, snapshot: Snapshot) -> Result<(), RollbackError>;
    async fn snapshots_for(&self, rollback_point_id: &str) -> Vec<Snapshot>;

    async fn store_operation(&self, op: RollbackOperation) -> Result<(), RollbackError>;
    async fn update_operation(&self, op: RollbackOperation) -> Result<(), RollbackError>;
    async fn get_operation(&self, id: &str) -> Option<RollbackOperation>;
    async fn list_operations(&self) -> Vec<RollbackOperation>;

    /// Removes expired points (per `now_millis`) and terminal operations older
    /// than `now_millis - op_max_age_millis`. When `point_max_age_millis` is
    /// set, points with no explicit TTL older than that bound are removed
    /// too -- the periodic background tick passes `None` so permanent
    /// checkpoints only ever leave via their own TTL; an explicit
    /// administrative cleanup call passes `Some` to age them out as well.
    /// Returns `(removed_points, removed_operations)`.
    async fn cleanup(&self, now_millis: u64, op_max_age_millis: u64, point_max_age_millis: Option<u64>) -> (u64, u64);
}

// ---------------------------------------------------------------------------
// In-memory persistence (used when no RelStore is configured)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct InMemoryState {
    points: HashMap<String, RollbackPoint>,
    snapshots: HashMap<String, Vec<Snapshot>>,
    operations: HashMap<String, RollbackOperation>,
}

/// Fully in-memory persistence layer. Durable only for the lifetime of the
/// process -- used in tests and whenever no `RelStore` is wired in.
#[derive(Default)]
pub struct InMemoryPersistence {
    state: RwLock<InMemoryState>,
}

impl InMemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RollbackPersistence for InMemoryPersistence {
    async fn store_point(&self, point: RollbackPoint) -> Result<(), RollbackError> {
        self.state.write().points.insert(point.id.clone(), point);
        Ok(())
    }

    async fn get_point(&self, id: &str) -> Option<RollbackPoint> {
        self.state.read().points.get(id).cloned()
    }

    async fn list_points(&self) -> Vec<RollbackPoint> {
        let mut points: Vec<_> = self.state.read().points.values().cloned().collect();
        points.sort_by(|a, b| b.timestamp_millis.cmp(&a.timestamp_millis));
        points
    }

    async fn list_for_session(&self, session_id: &str) -> Vec<RollbackPoint> {
        self.list_points()
            .await
            .into_iter()
            .filter(|p| p.session_id.as_deref() == Some(session_id))
            .collect()
    }

    async fn remove_point(&self, id: &str) -> Result<bool, RollbackError> {
        let mut state = self.state.write();
        let existed = state.points.remove(id).is_some();
        state.snapshots.remove(id);
        state.operations.retain(|_, op| op.target_rollback_point_id != id);
        Ok(existed)
    }

    async fn store_snapshot(&self, snapshot: Snapshot) -> Result<(), RollbackError> {
        if !self.state.read().points.contains_key(&snapshot.rollback_point_id) {
            return Err(RollbackError::NotFound(snapshot.rollback_point_id));
        }
        self.state
            .write()
            .snapshots
            .entry(snapshot.rollback_point_id.clone())
            .or_default()
            .push(snapshot);
        Ok(())
    }

    async fn snapshots_for(&self, rollback_point_id: &str) -> Vec<Snapshot> {
        self.state.read().snapshots.get(rollback_point_id).cloned().unwrap_or_default()
    }

    async fn store_operation(&self, op: RollbackOperation) -> Result<(), RollbackError> {
        self.state.write().operations.insert(op.id.clone(), op);
        Ok(())
    }

    async fn update_operation(&self, op: RollbackOperation) -> Result<(), RollbackError> {
        let mut state = self.state.write();
        if !state.operations.contains_key(&op.id) {
            return Err(RollbackError::NotFound(op.id));
        }
        state.operations.insert(op.id.clone(), op);
        Ok(())
    }

    async fn get_operation(&self, id: &str) -> Option<RollbackOperation> {
        self.state.read().operations.get(id).cloned()
    }

    async fn list_operations(&self) -> Vec<RollbackOperation> {
        self.state.read().operations.values().cloned().collect()
    }

    async fn cleanup(&self, now_millis: u64, op_max_age_millis: u64, point_max_age_millis: Option<u64>) -> (u64, u64) {
        let mut state = self.state.write();
        let mut expired_ids: Vec<String> = state
            .points
            .values()
            .filter(|p| p.expires_at_millis.is_some_and(|exp| exp <= now_millis))
            .map(|p| p.id.clone())
            .collect();

        if let Some(point_max_age) = point_max_age_millis {
            let cutoff = now_millis.saturating_sub(point_max_age);
            for p in state.points.values() {
                if p.expires_at_millis.is_none() && p.timestamp_millis < cutoff && !expired_ids.contains(&p.id) {
                    expired_ids.push(p.id.clone());
                }
            }
        }

        for id in &expired_ids {
            state.points.remove(id);
            state.snapshots.remove(id);
        }
        let removed_points = expired_ids.len() as u64;
        state.operations.retain(|_, op| !expired_ids.contains(&op.target_rollback_point_id));

        let cutoff = now_millis.saturating_sub(op_max_age_millis);
        let before = state.operations.len();
        state.operations.retain(|_, op| !(op.status.is_terminal() && op.completed_at_millis.is_some_and(|c| c < cutoff)));
        let removed_operations = (before - state.operations.len()) as u64;

        (removed_points, removed_operations)
    }
}

// ---------------------------------------------------------------------------
// RelStore-backed transactional persistence
// ---------------------------------------------------------------------------

/// Persists rollback metadata through an injected [`RelStore`], running
/// `store`/`remove` inside a transaction per §4.1. Reads fall back to an
/// in-memory mirror so `get`/`list` stay cheap and synchronous-feeling
/// even when the relational store is slow.
pub struct RelStorePersistence {
    rel_store: Arc<dyn RelStore>,
    mirror: InMemoryPersistence,
}

impl RelStorePersistence {
    #[must_use]
    pub fn new(rel_store: Arc<dyn RelStore>) -> Self {
        Self { rel_store, mirror: InMemoryPersistence::new() }
    }
}

#[async_trait]
impl RollbackPersistence for RelStorePersistence {
    async fn store_point(&self, point: RollbackPoint) -> Result<(), RollbackError> {
        let tx = self.rel_store.begin_tx().await.map_err(|e| RollbackError::StoreFailed {
            rollback_point_id: point.id.clone(),
            cause: e.to_string(),
        })?;

        let exec_result = self
            .rel_store
            .exec(&tx, "INSERT INTO rollback_points (id, name) VALUES (:id, :name)", &[
                ("id", serde_json::Value::String(point.id.clone())),
                ("name", serde_json::Value::String(point.name.clone())),
            ])
            .await;

        match exec_result {
            Ok(_) => {
                self.rel_store.commit(tx).await.map_err(|e| RollbackError::StoreFailed {
                    rollback_point_id: point.id.clone(),
                    cause: e.to_string(),
                })?;
                self.mirror.store_point(point).await
            }
            Err(e) => {
                let _ = self.rel_store.rollback(tx).await;
                Err(RollbackError::StoreFailed { rollback_point_id: point.id, cause: e.to_string() })
            }
        }
    }

    async fn get_point(&self, id: &str) -> Option<RollbackPoint> {
        self.mirror.get_point(id).await
    }

    async fn list_points(&self) -> Vec<RollbackPoint> {
        self.mirror.list_points().await
    }

    async fn list_for_session(&self, session_id: &str) -> Vec<RollbackPoint> {
        self.mirror.list_for_session(session_id).await
    }

    async fn remove_point(&self, id: &str) -> Result<bool, RollbackError> {
        let tx = self.rel_store.begin_tx().await.map_err(|e| RollbackError::StoreFailed {
            rollback_point_id: id.to_string(),
            cause: e.to_string(),
        })?;

        let exec_result = self
            .rel_store
            .exec(&tx, "DELETE FROM rollback_points WHERE id = :id", &[("id", serde_json::Value::String(id.to_string()))])
            .await;

        match exec_result {
            Ok(_) => {
                self.rel_store.commit(tx).await.map_err(|e| RollbackError::StoreFailed {
                    rollback_point_id: id.to_string(),
                    cause: e.to_string(),
                })?;
                self.mirror.remove_point(id).await
            }
            Err(e) => {
                let _ = self.rel_store.rollback(tx).await;
                Err(RollbackError::StoreFailed { rollback_point_id: id.to_string(), cause: e.to_string() })
            }
        }
    }

    async fn store_snapshot(&self, snapshot: Snapshot) -> Result<(), RollbackError> {
        self.mirror.store_snapshot(snapshot).await
    }

    async fn snapshots_for(&self, rollback_point_id: &str) -> Vec<Snapshot> {
        self.mirror.snapshots_for(rollback_point_id).await
    }

    async fn store_operation(&self, op: RollbackOperation) -> Result<(), RollbackError> {
        self.mirror.store_operation(op).await
    }

    async fn update_operation(&self, op: RollbackOperation) -> Result<(), RollbackError> {
        self.mirror.update_operation(op).await
    }

    async fn get_operation(&self, id: &str) -> Option<RollbackOperation> {
        self.mirror.get_operation(id).await
    }

    async fn list_operations(&self) -> Vec<RollbackOperation> {
        self.mirror.list_operations().await
    }

    async fn cleanup(&self, now_millis: u64, op_max_age_millis: u64, point_max_age_millis: Option<u64>) -> (u64, u64) {
        self.mirror.cleanup(now_millis, op_max_age_millis, point_max_age_millis).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str) -> RollbackPoint {
        RollbackPoint {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            timestamp_millis: 0,
            expires_at_millis: None,
            session_id: Some("sess-1".into()),
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn store_then_get_roundtrips() {
        let store = InMemoryPersistence::new();
        store.store_point(point("p1")).await.unwrap();
        assert_eq!(store.get_point("p1").await.unwrap().id, "p1");
    }

    #[tokio::test]
    async fn remove_cascades_snapshots_and_operations() {
        let store = InMemoryPersistence::new();
        store.store_point(point("p1")).await.unwrap();
        store
            .store_snapshot(Snapshot {
                rollback_point_id: "p1".into(),
                snapshot_type: "graph".into(),
                data: vec![1, 2, 3],
                size_bytes: 3,
                checksum: None,
            })
            .await
            .unwrap();
        store
            .store_operation(RollbackOperation::new("rop1", "p1", "full", 0))
            .await
            .unwrap();

        let existed = store.remove_point("p1").await.unwrap();
        assert!(existed);
        assert!(store.get_point("p1").await.is_none());
        assert!(store.snapshots_for("p1").await.is_empty());
        assert!(store.get_operation("rop1").await.is_none());
    }

    #[tokio::test]
    async fn remove_nonexistent_returns_false() {
        let store = InMemoryPersistence::new();
        assert!(!store.remove_point("missing").await.unwrap());
    }

    #[tokio::test]
    async fn list_for_session_filters() {
        let store = InMemoryPersistence::new();
        store.store_point(point("p1")).await.unwrap();
        let mut other = point("p2");
        other.session_id = Some("sess-2".into());
        store.store_point(other).await.unwrap();

        let for_sess1 = store.list_for_session("sess-1").await;
        assert_eq!(for_sess1.len(), 1);
        assert_eq!(for_sess1[0].id, "p1");
    }

    #[tokio::test]
    async fn cleanup_removes_expired_points_and_old_terminal_operations() {
        let store = InMemoryPersistence::new();
        let mut expiring = point("p1");
        expiring.expires_at_millis = Some(1_000);
        store.store_point(expiring).await.unwrap();
        store.store_point(point("p2")).await.unwrap();

        let mut old_op = RollbackOperation::new("rop-old", "p2", "full", 0);
        old_op.status = codegraph_core::RollbackOperationStatus::Completed;
        old_op.completed_at_millis = Some(0);
        store.store_operation(old_op).await.unwrap();

        let (removed_points, removed_ops) = store.cleanup(2_000, 24 * 60 * 60 * 1000, None).await;
        assert_eq!(removed_points, 1);
        assert_eq!(removed_ops, 1);
        assert!(store.get_point("p1").await.is_none());
        assert!(store.get_point("p2").await.is_some());
    }
}
