//! End-to-end coverage for the six seed scenarios: two sequential
//! completions, four failures in a row, alert resolution, rollback
//! cleanup, a cyclic DAG, and an idempotent batch resubmission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codegraph_core::ids::SequentialIdGen;
use codegraph_core::{
    ChangeFragment, Clock, Entity, EntityKind, Epoch, FragmentKind, FragmentOp, GraphStore, Relationship, SyncOperation,
    SyncOperationStatus, SyncOperationType, UpsertEntityOutcome, UpsertOptions, UpsertRelationshipOutcome,
};
use codegraph_sync_engine::batch::BatchProcessor;
use codegraph_sync_engine::config::EngineConfig;
use codegraph_sync_engine::events::EventBus;
use codegraph_sync_engine::monitoring::Monitoring;
use codegraph_sync_engine::refimpl::InMemoryRelStore;
use codegraph_sync_engine::rollback::{RelStorePersistence, RollbackStore};
use serde_json::Value as JsonValue;

/// Clock a test can step deterministically, shared with the components
/// under test via `Arc<dyn Clock>`.
struct FixedClock(AtomicU64);

impl FixedClock {
    fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    fn set(&self, millis: u64) {
        self.0.store(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Records every upsert call it receives so idempotent resubmission can be
/// asserted to have made zero further store calls.
#[derive(Default)]
struct CountingGraphStore {
    entity_calls: AtomicU64,
}

#[async_trait]
impl GraphStore for CountingGraphStore {
    async fn upsert_entities(&self, _epoch: Epoch, batch: &[Entity], _opts: &UpsertOptions) -> anyhow::Result<Vec<UpsertEntityOutcome>> {
        self.entity_calls.fetch_add(1, Ordering::SeqCst);
        Ok(batch.iter().map(|e| UpsertEntityOutcome { entity_id: e.id.clone(), created: true, conflicting_hash: None }).collect())
    }

    async fn upsert_relationships(
        &self,
        _epoch: Epoch,
        batch: &[Relationship],
        _opts: &UpsertOptions,
    ) -> anyhow::Result<Vec<UpsertRelationshipOutcome>> {
        Ok(batch.iter().map(|r| UpsertRelationshipOutcome { relationship_id: r.id.clone(), created: true }).collect())
    }

    async fn delete_entity(&self, _id: &str, _epoch: Epoch) -> anyhow::Result<()> {
        Ok(())
    }

    async fn query(&self, _q: &str, _params: &[(&str, JsonValue)]) -> anyhow::Result<JsonValue> {
        Ok(JsonValue::Null)
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

fn completed_op(id: &str, start: u64, end: u64) -> SyncOperation {
    let mut op = SyncOperation::new(id, SyncOperationType::Full, start);
    op.transition(SyncOperationStatus::Running).unwrap();
    op.transition(SyncOperationStatus::Completed).unwrap();
    op.end_time_millis = Some(end);
    op
}

fn failed_op(id: &str) -> SyncOperation {
    let mut op = SyncOperation::new(id, SyncOperationType::Full, 0);
    op.transition(SyncOperationStatus::Running).unwrap();
    op.transition(SyncOperationStatus::Failed).unwrap();
    op
}

#[test]
fn two_sequential_completions_report_average_and_throughput() {
    let monitoring = Monitoring::new(EventBus::new(), Arc::new(codegraph_core::SystemClock), Arc::new(SequentialIdGen::new()), true);

    monitoring.record_operation_complete(completed_op("op1", 0, 1000), None);
    monitoring.record_operation_complete(completed_op("op2", 1000, 3000), None);

    let report = monitoring.generate_report(None);
    assert_eq!(report.summary.operations_total, 2);
    assert_eq!(report.summary.operations_successful, 2);
    assert!(report.summary.average_sync_time_millis > 1400.0 && report.summary.average_sync_time_millis < 1600.0);
}

#[test]
fn four_failures_in_a_row_mark_the_engine_unhealthy() {
    let monitoring = Monitoring::new(EventBus::new(), Arc::new(codegraph_core::SystemClock), Arc::new(SequentialIdGen::new()), true);

    for i in 0..4 {
        monitoring.record_operation_failed(failed_op(&format!("op{i}")), "boom");
    }

    let report = monitoring.generate_report(None);
    assert_eq!(report.summary.consecutive_failures, 4);
    assert_eq!(report.health, codegraph_sync_engine::monitoring::HealthStatus::Unhealthy);
}

#[test]
fn a_resolved_alert_drops_out_of_the_active_list() {
    let monitoring = Monitoring::new(EventBus::new(), Arc::new(codegraph_core::SystemClock), Arc::new(SequentialIdGen::new()), true);

    monitoring.record_operation_failed(failed_op("op1"), "boom");
    let alert_id = monitoring.generate_report(None).active_alerts[0].id.clone();

    assert!(monitoring.resolve_alert(&alert_id, Some("fixed".to_string())));
    assert!(monitoring.generate_report(None).active_alerts.is_empty());
}

#[tokio::test]
async fn cleanup_ages_out_a_permanent_point_but_keeps_a_fresh_one_and_open_alerts() {
    let clock: Arc<FixedClock> = Arc::new(FixedClock::new(48 * 60 * 60 * 1000));
    let events = EventBus::new();
    let id_gen = Arc::new(SequentialIdGen::new());
    let rel_store = Arc::new(InMemoryRelStore::new());
    let persistence = Arc::new(RelStorePersistence::new(rel_store));
    let store = RollbackStore::new(&EngineConfig::default(), persistence, clock.clone(), id_gen.clone(), events.clone());

    store.store("old-checkpoint", None, None, None, serde_json::Map::new()).await.unwrap();

    clock.set(48 * 60 * 60 * 1000 + 1);
    let fresh = store.store("fresh-checkpoint", None, None, None, serde_json::Map::new()).await.unwrap();

    let monitoring = Monitoring::new(events, clock.clone(), id_gen, true);
    monitoring.record_operation_failed(failed_op("unrelated"), "boom");

    let (removed_points, _removed_ops) = store.cleanup(Some(Duration::from_secs(24 * 60 * 60))).await;
    assert_eq!(removed_points, 1);

    let remaining = store.list().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, fresh.id);

    assert_eq!(monitoring.generate_report(None).active_alerts.len(), 1);
}

fn entity_fragment(id: &str, deps: Vec<&str>) -> ChangeFragment {
    let entity = Entity::new(id, EntityKind::File, "hash", 0);
    ChangeFragment {
        id: id.to_string(),
        event_id: id.to_string(),
        kind: FragmentKind::Entity,
        op: FragmentOp::Add,
        data: serde_json::to_value(&entity).unwrap(),
        dependency_hints: deps.into_iter().map(str::to_string).collect(),
        confidence: 1.0,
    }
}

#[tokio::test]
async fn a_three_node_cycle_is_detected_and_processing_does_not_hang() {
    let graph_store = Arc::new(CountingGraphStore::default());
    let id_gen = Arc::new(SequentialIdGen::new());
    let clock = Arc::new(codegraph_core::SystemClock);
    let processor = BatchProcessor::new(&EngineConfig::default(), graph_store, id_gen, clock);

    let fragments = vec![entity_fragment("a", vec!["c"]), entity_fragment("b", vec!["a"]), entity_fragment("c", vec!["b"])];

    let results = processor.process_change_fragments(fragments).await.unwrap();
    assert!(results.is_empty(), "every node sits in the cycle, so no wave is ever ready");
}

#[tokio::test]
async fn resubmitting_a_batch_in_a_different_order_hits_the_idempotency_cache() {
    let graph_store = Arc::new(CountingGraphStore::default());
    let id_gen = Arc::new(SequentialIdGen::new());
    let clock = Arc::new(codegraph_core::SystemClock);
    let processor = BatchProcessor::new(&EngineConfig::default(), graph_store.clone(), id_gen, clock);

    let entities: Vec<Entity> = (0..10).map(|i| Entity::new(format!("e{i}"), EntityKind::File, "hash", 0)).collect();

    let first = processor.process_entities(entities.clone(), None).await.unwrap();
    assert_eq!(first.processed_count, 10);
    let calls_after_first = graph_store.entity_calls.load(Ordering::SeqCst);
    assert!(calls_after_first > 0);

    let mut reordered = entities;
    reordered.reverse();
    let second = processor.process_entities(reordered, None).await.unwrap();

    assert_eq!(second.processed_count, first.processed_count);
    assert_eq!(graph_store.entity_calls.load(Ordering::SeqCst), calls_after_first, "cache hit must not touch the store again");
}
