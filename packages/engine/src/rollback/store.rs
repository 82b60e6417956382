//! Orchestrates [`super::cache::RollbackCache`] and [`super::persistence::RollbackPersistence`],
//! owning the background cleanup tick and the public rollback-point/operation contract.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;

use codegraph_core::{CancelToken, Clock, IdGen, RollbackOperation, RollbackOperationStatus, RollbackPoint, Snapshot};

use crate::config::EngineConfig;
use crate::events::EventBus;

use super::cache::{InsertOutcome, RollbackCache};
use super::persistence::RollbackPersistence;
use super::types::{RollbackError, RollbackMetrics};

/// Terminal rollback operations are retained for this long before `cleanup`
/// reclaims them, independent of any linked rollback point's own expiry.
const OPERATION_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

struct MetricsState {
    total_operations: u64,
    successful_operations: u64,
    failed_operations: u64,
    duration_sum_millis: u64,
    duration_samples: u64,
}

impl MetricsState {
    fn new() -> Self {
        Self {
            total_operations: 0,
            successful_operations: 0,
            failed_operations: 0,
            duration_sum_millis: 0,
            duration_samples: 0,
        }
    }

    fn average_duration_millis(&self) -> f64 {
        if self.duration_samples == 0 {
            0.0
        } else {
            self.duration_sum_millis as f64 / self.duration_samples as f64
        }
    }
}

/// Owns rollback point / snapshot / operation lifecycle: creation, the hot
/// LRU cache, durable persistence, per-point expiry, and the periodic
/// cleanup sweep described in §4.1.
pub struct RollbackStore {
    cache: RollbackCache,
    persistence: Arc<dyn RollbackPersistence>,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGen>,
    events: EventBus,
    cleanup_interval: Duration,
    metrics: Mutex<MetricsState>,
    cancel: CancelToken,
    background: Mutex<Option<JoinHandle<()>>>,
    expiry_tasks: AtomicU64,
}

impl RollbackStore {
    #[must_use]
    pub fn new(
        config: &EngineConfig,
        persistence: Arc<dyn RollbackPersistence>,
        clock: Arc<dyn Clock>,
        id_gen: Arc<dyn IdGen>,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache: RollbackCache::new(config.rollback_cache_capacity),
            persistence,
            clock,
            id_gen,
            events,
            cleanup_interval: config.rollback_cleanup_interval,
            metrics: Mutex::new(MetricsState::new()),
            cancel: CancelToken::new(),
            background: Mutex::new(None),
            expiry_tasks: AtomicU64::new(0),
        })
    }

    /// Starts the periodic cleanup tick. Idempotent: calling twice replaces
    /// the prior background task's handle without stopping it explicitly
    /// (the cancel token already shared by both stops the old one).
    pub fn start(self: &Arc<Self>) {
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.cleanup_interval);
            loop {
                tokio::select! {
                    () = store.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let (points, ops) = store.cleanup(None).await;
                        if points > 0 || ops > 0 {
                            tracing::debug!(removed_points = points, removed_operations = ops, "rollback cleanup tick");
                        }
                    }
                }
            }
        });
        *self.background.lock() = Some(handle);
    }

    /// Signals the background cleanup loop to stop. Does not await it --
    /// callers that need to know it has fully stopped should `.await` the
    /// handle captured at `start` time themselves if needed.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Creates and persists a new rollback point, optionally scheduling an
    /// eager expiry task when `ttl` is set.
    pub async fn store(
        self: &Arc<Self>,
        name: impl Into<String>,
        description: Option<String>,
        session_id: Option<String>,
        ttl: Option<Duration>,
        metadata: JsonMap<String, JsonValue>,
    ) -> Result<RollbackPoint, RollbackError> {
        let now = self.clock.now_millis();
        let point = RollbackPoint {
            id: self.id_gen.new_rollback_id(),
            name: name.into(),
            description,
            timestamp_millis: now,
            expires_at_millis: ttl.map(|d| now + d.as_millis() as u64),
            session_id,
            metadata,
        };

        self.persistence.store_point(point.clone()).await?;
        let outcome = self.cache.insert(point.clone());
        if let InsertOutcome::InsertedAtCapacity { evicted_id } = outcome {
            tracing::trace!(evicted_id, "rollback cache evicted entry on insert");
        }

        if let Some(ttl) = ttl {
            self.spawn_expiry_task(point.id.clone(), ttl);
        }

        self.events.publish(crate::events::EngineEvent::CheckpointCreated {
            rollback_point_id: point.id.clone(),
            operation_id: None,
        });

        Ok(point)
    }

    fn spawn_expiry_task(self: &Arc<Self>, id: String, ttl: Duration) {
        let store = Arc::clone(self);
        self.expiry_tasks.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            tokio::select! {
                () = store.cancel.cancelled() => {}
                () = tokio::time::sleep(ttl) => {
                    store.cache.remove(&id);
                }
            }
            store.expiry_tasks.fetch_sub(1, Ordering::Relaxed);
        });
    }

    /// Fetches a point, falling back to persistence on a cache miss and
    /// repopulating the cache. Returns `Expired` rather than `NotFound` for
    /// a point whose TTL has lapsed.
    pub async fn get(&self, id: &str) -> Result<RollbackPoint, RollbackError> {
        let now = self.clock.now_millis();
        if let Some(point) = self.cache.get(id, now) {
            return Ok(point);
        }

        match self.persistence.get_point(id).await {
            Some(point) => {
                if point.expires_at_millis.is_some_and(|exp| exp <= now) {
                    return Err(RollbackError::Expired(id.to_string()));
                }
                self.cache.insert(point.clone());
                Ok(point)
            }
            None => Err(RollbackError::NotFound(id.to_string())),
        }
    }

    /// All live (non-expired) rollback points, most recent first.
    pub async fn list(&self) -> Vec<RollbackPoint> {
        let now = self.clock.now_millis();
        self.persistence
            .list_points()
            .await
            .into_iter()
            .filter(|p| !p.expires_at_millis.is_some_and(|exp| exp <= now))
            .collect()
    }

    pub async fn list_for_session(&self, session_id: &str) -> Vec<RollbackPoint> {
        let now = self.clock.now_millis();
        self.persistence
            .list_for_session(session_id)
            .await
            .into_iter()
            .filter(|p| !p.expires_at_millis.is_some_and(|exp| exp <= now))
            .collect()
    }

    pub async fn remove(&self, id: &str) -> Result<(), RollbackError> {
        let existed = self.persistence.remove_point(id).await?;
        self.cache.remove(id);
        if existed {
            Ok(())
        } else {
            Err(RollbackError::NotFound(id.to_string()))
        }
    }

    pub async fn store_snapshot(
        &self,
        rollback_point_id: impl Into<String>,
        snapshot_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Snapshot, RollbackError> {
        let rollback_point_id = rollback_point_id.into();
        let snapshot = Snapshot {
            size_bytes: data.len() as u64,
            checksum: Some(checksum_of(&data)),
            rollback_point_id,
            snapshot_type: snapshot_type.into(),
            data,
        };
        self.persistence.store_snapshot(snapshot.clone()).await?;
        Ok(snapshot)
    }

    pub async fn store_operation(
        &self,
        target_rollback_point_id: impl Into<String>,
        strategy: impl Into<String>,
    ) -> Result<RollbackOperation, RollbackError> {
        let now = self.clock.now_millis();
        let op = RollbackOperation::new(self.id_gen.new_rollback_id(), target_rollback_point_id, strategy, now);
        self.persistence.store_operation(op.clone()).await?;
        self.metrics.lock().total_operations += 1;
        Ok(op)
    }

    /// Persists an updated operation, folding terminal transitions into
    /// the running metrics and publishing `RollbackExecuted` once.
    pub async fn update_operation(&self, op: RollbackOperation) -> Result<(), RollbackError> {
        let was_terminal = self
            .persistence
            .get_operation(&op.id)
            .await
            .is_some_and(|prior| prior.status.is_terminal());

        if op.status.is_terminal() && !was_terminal {
            let mut metrics = self.metrics.lock();
            match op.status {
                RollbackOperationStatus::Completed => metrics.successful_operations += 1,
                RollbackOperationStatus::Failed | RollbackOperationStatus::Cancelled => {
                    metrics.failed_operations += 1;
                }
                _ => {}
            }
            if let Some(completed_at) = op.completed_at_millis {
                metrics.duration_sum_millis += completed_at.saturating_sub(op.started_at_millis);
                metrics.duration_samples += 1;
            }
            drop(metrics);

            self.events.publish(crate::events::EngineEvent::RollbackExecuted {
                rollback_point_id: op.target_rollback_point_id.clone(),
                success: matches!(op.status, RollbackOperationStatus::Completed),
            });
        }

        self.persistence.update_operation(op).await
    }

    /// Runs one cleanup pass: TTL-expired points plus terminal operations
    /// older than [`OPERATION_RETENTION`]. Safe to call directly (e.g. from
    /// the periodic background tick); permanent (no-TTL) points are never
    /// touched by this form.
    ///
    /// Pass `max_age` for an administrative sweep that additionally ages
    /// out permanent points older than `max_age`, and uses `max_age` (in
    /// place of [`OPERATION_RETENTION`]) as the operation-retention window.
    pub async fn cleanup(&self, max_age: Option<Duration>) -> (u64, u64) {
        let now = self.clock.now_millis();
        let op_max_age_millis = max_age.map_or(OPERATION_RETENTION.as_millis() as u64, |d| d.as_millis() as u64);
        let point_max_age_millis = max_age.map(|d| d.as_millis() as u64);
        let (removed_points, removed_ops) = self.persistence.cleanup(now, op_max_age_millis, point_max_age_millis).await;

        let live_ids: std::collections::HashSet<String> =
            self.persistence.list_points().await.into_iter().map(|p| p.id).collect();
        for cached in self.cache.snapshot_live(now) {
            if !live_ids.contains(&cached.id) {
                self.cache.remove(&cached.id);
            }
        }

        (removed_points, removed_ops)
    }

    /// `total_points`/`estimated_memory_bytes` come from the durable
    /// persistence layer, not the bounded LRU cache -- the cache can hold
    /// fewer entries than exist once the point count exceeds its capacity.
    pub async fn get_metrics(&self) -> RollbackMetrics {
        let total_points = self.persistence.list_points().await.len() as u64;
        let metrics = self.metrics.lock();
        RollbackMetrics {
            total_points,
            total_operations: metrics.total_operations,
            successful_operations: metrics.successful_operations,
            failed_operations: metrics.failed_operations,
            average_rollback_duration_millis: metrics.average_duration_millis(),
            estimated_memory_bytes: estimate_memory_bytes(total_points),
        }
    }
}

fn checksum_of(data: &[u8]) -> String {
    // FNV-1a: cheap, dependency-free integrity check for in-memory snapshots.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    format!("{hash:016x}")
}

fn estimate_memory_bytes(points: u64) -> u64 {
    const ESTIMATED_BYTES_PER_POINT: u64 = 512;
    points * ESTIMATED_BYTES_PER_POINT
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64 as StdAtomicU64, Ordering as StdOrdering};

    use codegraph_core::ids::SequentialIdGen;
    use codegraph_core::SystemClock;

    use super::*;
    use crate::rollback::persistence::InMemoryPersistence;

    struct FixedClock(StdAtomicU64);

    impl FixedClock {
        fn new(start: u64) -> Self {
            Self(StdAtomicU64::new(start))
        }

        fn advance(&self, by: u64) {
            self.0.fetch_add(by, StdOrdering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now_millis(&self) -> u64 {
            self.0.load(StdOrdering::SeqCst)
        }
    }

    fn test_store(clock: Arc<dyn Clock>) -> Arc<RollbackStore> {
        test_store_with_capacity(clock, EngineConfig::default().rollback_cache_capacity)
    }

    fn test_store_with_capacity(clock: Arc<dyn Clock>, rollback_cache_capacity: usize) -> Arc<RollbackStore> {
        let config = EngineConfig { rollback_cache_capacity, ..EngineConfig::default() };
        RollbackStore::new(
            &config,
            Arc::new(InMemoryPersistence::new()),
            clock,
            Arc::new(SequentialIdGen::new()),
            EventBus::new(),
        )
    }

    #[tokio::test]
    async fn store_then_get_roundtrips() {
        let store = test_store(Arc::new(SystemClock));
        let point = store
            .store("checkpoint-1", None, None, None, JsonMap::new())
            .await
            .unwrap();
        let fetched = store.get(&point.id).await.unwrap();
        assert_eq!(fetched.id, point.id);
    }

    #[tokio::test]
    async fn get_missing_returns_not_found() {
        let store = test_store(Arc::new(SystemClock));
        assert!(matches!(store.get("nope").await, Err(RollbackError::NotFound(_))));
    }

    #[tokio::test]
    async fn get_past_ttl_returns_expired() {
        let clock = Arc::new(FixedClock::new(0));
        let store = test_store(clock.clone());
        let point = store
            .store("expiring", None, None, Some(Duration::from_millis(100)), JsonMap::new())
            .await
            .unwrap();

        clock.advance(200);
        assert!(matches!(store.get(&point.id).await, Err(RollbackError::Expired(_))));
    }

    #[tokio::test]
    async fn remove_then_get_returns_not_found() {
        let store = test_store(Arc::new(SystemClock));
        let point = store.store("p", None, None, None, JsonMap::new()).await.unwrap();
        store.remove(&point.id).await.unwrap();
        assert!(matches!(store.get(&point.id).await, Err(RollbackError::NotFound(_))));
    }

    #[tokio::test]
    async fn operation_lifecycle_updates_metrics() {
        let clock = Arc::new(FixedClock::new(0));
        let store = test_store(clock.clone());
        let point = store.store("p", None, None, None, JsonMap::new()).await.unwrap();
        let mut op = store.store_operation(&point.id, "full").await.unwrap();

        op.status = RollbackOperationStatus::Running;
        store.update_operation(op.clone()).await.unwrap();
        assert_eq!(store.get_metrics().await.successful_operations, 0);

        clock.advance(50);
        op.status = RollbackOperationStatus::Completed;
        op.completed_at_millis = Some(clock.now_millis());
        store.update_operation(op).await.unwrap();

        let metrics = store.get_metrics().await;
        assert_eq!(metrics.successful_operations, 1);
        assert!((metrics.average_rollback_duration_millis - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn get_metrics_counts_durable_points_beyond_cache_capacity() {
        let store = test_store_with_capacity(Arc::new(SystemClock), 1);
        for name in ["p1", "p2", "p3"] {
            store.store(name, None, None, None, JsonMap::new()).await.unwrap();
        }

        // The cache only holds 1 entry; all 3 points are still in persistence.
        let metrics = store.get_metrics().await;
        assert_eq!(metrics.total_points, 3);
        assert!(metrics.estimated_memory_bytes > 0);
    }

    #[tokio::test]
    async fn cleanup_evicts_expired_points_from_cache_and_persistence() {
        let clock = Arc::new(FixedClock::new(0));
        let store = test_store(clock.clone());
        store
            .store("expiring", None, None, Some(Duration::from_millis(10)), JsonMap::new())
            .await
            .unwrap();
        store.store("keeper", None, None, None, JsonMap::new()).await.unwrap();

        clock.advance(20);
        let (removed_points, _) = store.cleanup(None).await;
        assert_eq!(removed_points, 1);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn list_for_session_only_returns_matching_points() {
        let store = test_store(Arc::new(SystemClock));
        store
            .store("p1", None, Some("sess-a".to_string()), None, JsonMap::new())
            .await
            .unwrap();
        store
            .store("p2", None, Some("sess-b".to_string()), None, JsonMap::new())
            .await
            .unwrap();

        let for_a = store.list_for_session("sess-a").await;
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].name, "p1");
    }
}
