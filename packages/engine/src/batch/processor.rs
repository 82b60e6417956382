//! Micro-batches entity/relationship/change-fragment writes into a
//! [`codegraph_core::GraphStore`], with idempotency, bounded concurrency,
//! and DAG-ordered commits for change fragments.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use codegraph_core::{
    CancelToken, Clock, Entity, EpochGenerator, GraphStore, IdGen, Relationship, UpsertEntityOutcome, UpsertOptions, UpsertRelationshipOutcome,
};
use tokio::task::JoinSet;

use crate::config::EngineConfig;

use super::dag::DependencyDag;
use super::idempotency::IdempotencyCache;
use super::types::{BatchMetadata, BatchProcessingError, BatchResult};

/// RAII in-flight counter, incremented on construction and decremented on
/// drop -- `stop()` polls this down to zero rather than awaiting a handle.
struct InFlightGuard<'a>(&'a AtomicU64);

impl<'a> InFlightGuard<'a> {
    fn new(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Commits parsed entities/relationships/change-fragments to a [`GraphStore`]
/// with micro-batching, idempotency, and dependency-ordered DAG processing.
pub struct BatchProcessor {
    graph_store: Arc<dyn GraphStore>,
    idempotency: Arc<IdempotencyCache>,
    id_gen: Arc<dyn IdGen>,
    clock: Arc<dyn Clock>,
    epoch_gen: EpochGenerator,
    entity_batch_size: usize,
    relationship_batch_size: usize,
    max_concurrent_batches: usize,
    stop_drain_timeout: Duration,
    in_flight: AtomicU64,
    cancel: CancelToken,
}

impl BatchProcessor {
    #[must_use]
    pub fn new(config: &EngineConfig, graph_store: Arc<dyn GraphStore>, id_gen: Arc<dyn IdGen>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            graph_store,
            idempotency: IdempotencyCache::new(config.idempotency_ttl),
            id_gen,
            clock,
            epoch_gen: EpochGenerator::new(),
            entity_batch_size: config.entity_batch_size,
            relationship_batch_size: config.relationship_batch_size,
            max_concurrent_batches: config.max_concurrent_batches,
            stop_drain_timeout: config.stop_drain_timeout,
            in_flight: AtomicU64::new(0),
            cancel: CancelToken::new(),
        })
    }

    pub fn start(self: &Arc<Self>) {
        self.idempotency.start();
    }

    /// Waits up to `stop_drain_timeout` for in-flight batches to finish,
    /// then stops the idempotency sweeper regardless.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + self.stop_drain_timeout;
        while self.in_flight.load(Ordering::SeqCst) > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            tracing::warn!(
                in_flight = self.in_flight.load(Ordering::SeqCst),
                "stop() drain timed out with batches still in flight"
            );
        }
        self.idempotency.stop();
    }

    pub async fn process_entities(&self, entities: Vec<Entity>, namespace: Option<String>) -> Result<BatchResult, BatchProcessingError> {
        if entities.is_empty() {
            let meta = BatchMetadata::new(self.id_gen.new_batch_id(), "entities", 0, self.clock.now_millis(), 0);
            return Ok(BatchResult::empty(meta));
        }

        let key = IdempotencyCache::derive_key("entities", entities.iter().map(|e| (e.id.as_str(), "entity")));
        if let Some(cached) = self.idempotency.get(&key) {
            return Ok(cached);
        }

        let _guard = InFlightGuard::new(&self.in_flight);
        let now = self.clock.now_millis();
        let epoch = self.epoch_gen.next(now);
        let meta = BatchMetadata::new(self.id_gen.new_batch_id(), "entities", entities.len(), now, epoch.seq);
        let opts = UpsertOptions { idempotency_key: key.clone(), namespace };

        let mut processed_count = 0u64;
        let mut failed_count = 0u64;
        let mut errors = Vec::new();
        let mut entity_outcomes = Vec::new();

        for group in entities.chunks(self.entity_batch_size * self.max_concurrent_batches) {
            let mut joinset: JoinSet<Result<Vec<UpsertEntityOutcome>, (usize, String)>> = JoinSet::new();
            for chunk in group.chunks(self.entity_batch_size) {
                let chunk = chunk.to_vec();
                let store = Arc::clone(&self.graph_store);
                let opts = opts.clone();
                joinset.spawn(async move {
                    let len = chunk.len();
                    store.upsert_entities(epoch, &chunk, &opts).await.map_err(|e| (len, e.to_string()))
                });
            }
            while let Some(res) = joinset.join_next().await {
                match res {
                    Ok(Ok(outcomes)) => {
                        processed_count += outcomes.len() as u64;
                        entity_outcomes.extend(outcomes);
                    }
                    Ok(Err((len, msg))) => {
                        failed_count += len as u64;
                        errors.push(msg);
                    }
                    Err(join_err) => {
                        errors.push(format!("chunk task panicked: {join_err}"));
                    }
                }
            }
        }

        let result = BatchResult {
            batch_id: meta.id.clone(),
            success: failed_count == 0,
            processed_count,
            failed_count,
            duration_millis: self.clock.now_millis().saturating_sub(now),
            errors,
            metadata: meta,
            entity_outcomes,
            relationship_outcomes: Vec::new(),
        };
        self.idempotency.insert(key, result.clone());
        Ok(result)
    }

    pub async fn process_relationships(&self, relationships: Vec<Relationship>, namespace: Option<String>) -> Result<BatchResult, BatchProcessingError> {
        if relationships.is_empty() {
            let meta = BatchMetadata::new(self.id_gen.new_batch_id(), "relationships", 0, self.clock.now_millis(), 0);
            return Ok(BatchResult::empty(meta));
        }

        let key = IdempotencyCache::derive_key("relationships", relationships.iter().map(|r| (r.id.as_str(), "relationship")));
        if let Some(cached) = self.idempotency.get(&key) {
            return Ok(cached);
        }

        let _guard = InFlightGuard::new(&self.in_flight);
        let now = self.clock.now_millis();
        let epoch = self.epoch_gen.next(now);

        let (resolvable, mut errors): (Vec<Relationship>, Vec<String>) = {
            let mut resolvable = Vec::with_capacity(relationships.len());
            let mut errors = Vec::new();
            for rel in relationships {
                if rel.from_id.is_empty() || rel.to_id.is_empty() {
                    tracing::warn!(relationship_id = %rel.id, "dropping relationship with unresolvable endpoint");
                    errors.push(format!("relationship {} has an unresolvable endpoint", rel.id));
                } else {
                    resolvable.push(rel);
                }
            }
            (resolvable, errors)
        };
        let mut failed_count = errors.len() as u64;

        let meta = BatchMetadata::new(self.id_gen.new_batch_id(), "relationships", resolvable.len(), now, epoch.seq);
        let opts = UpsertOptions { idempotency_key: key.clone(), namespace };
        let mut processed_count = 0u64;
        let mut relationship_outcomes = Vec::new();

        for group in resolvable.chunks(self.relationship_batch_size * self.max_concurrent_batches) {
            let mut joinset: JoinSet<Result<Vec<UpsertRelationshipOutcome>, (usize, String)>> = JoinSet::new();
            for chunk in group.chunks(self.relationship_batch_size) {
                let chunk = chunk.to_vec();
                let store = Arc::clone(&self.graph_store);
                let opts = opts.clone();
                joinset.spawn(async move {
                    let len = chunk.len();
                    store.upsert_relationships(epoch, &chunk, &opts).await.map_err(|e| (len, e.to_string()))
                });
            }
            while let Some(res) = joinset.join_next().await {
                match res {
                    Ok(Ok(outcomes)) => {
                        processed_count += outcomes.len() as u64;
                        relationship_outcomes.extend(outcomes);
                    }
                    Ok(Err((len, msg))) => {
                        failed_count += len as u64;
                        errors.push(msg);
                    }
                    Err(join_err) => errors.push(format!("chunk task panicked: {join_err}")),
                }
            }
        }

        let result = BatchResult {
            batch_id: meta.id.clone(),
            success: failed_count == 0,
            processed_count,
            failed_count,
            duration_millis: self.clock.now_millis().saturating_sub(now),
            errors,
            metadata: meta,
            entity_outcomes: Vec::new(),
            relationship_outcomes,
        };
        self.idempotency.insert(key, result.clone());
        Ok(result)
    }

    /// Orders change fragments by their dependency DAG and commits them
    /// wave by wave: every wave's fragments have all in-set dependencies
    /// already committed. Cycles are reported and the remainder is
    /// abandoned once a wave comes back empty with work still queued.
    pub async fn process_change_fragments(&self, fragments: Vec<codegraph_core::ChangeFragment>) -> Result<Vec<BatchResult>, BatchProcessingError> {
        if fragments.is_empty() {
            let meta = BatchMetadata::new(self.id_gen.new_batch_id(), "fragments", 0, self.clock.now_millis(), 0);
            return Ok(vec![BatchResult::empty(meta)]);
        }

        let dag = DependencyDag::new(fragments);
        let cycles = dag.detect_cycles();
        for cycle in &cycles {
            tracing::warn!(cycle = ?cycle, "dependency cycle detected among change fragments");
        }

        let mut completed: HashSet<String> = HashSet::new();
        let mut results = Vec::new();
        let total = dag.len();

        loop {
            if completed.len() == total {
                break;
            }
            let ready = dag.ready_nodes(&completed);
            if ready.is_empty() {
                let remaining = total - completed.len();
                tracing::warn!(remaining, "change-fragment wave deadlocked, abandoning remainder");
                break;
            }

            let mut wave_entities = Vec::new();
            let mut wave_relationships = Vec::new();
            let mut conversion_errors = Vec::new();

            for id in &ready {
                let Some(fragment) = dag.fragment(id) else { continue };
                match fragment.kind {
                    codegraph_core::FragmentKind::Entity => match serde_json::from_value::<Entity>(fragment.data.clone()) {
                        Ok(entity) => wave_entities.push(entity),
                        Err(e) => conversion_errors.push(format!("fragment {id}: {e}")),
                    },
                    codegraph_core::FragmentKind::Relationship => match serde_json::from_value::<Relationship>(fragment.data.clone()) {
                        Ok(rel) => wave_relationships.push(rel),
                        Err(e) => conversion_errors.push(format!("fragment {id}: {e}")),
                    },
                }
            }

            if !wave_entities.is_empty() {
                let mut result = self.process_entities(wave_entities, None).await?;
                result.errors.extend(conversion_errors.drain(..));
                results.push(result);
            }
            if !wave_relationships.is_empty() {
                let result = self.process_relationships(wave_relationships, None).await?;
                results.push(result);
            }
            if !conversion_errors.is_empty() {
                let meta = BatchMetadata::new(self.id_gen.new_batch_id(), "fragments", 0, self.clock.now_millis(), 0);
                results.push(BatchResult {
                    batch_id: meta.id.clone(),
                    success: false,
                    processed_count: 0,
                    failed_count: conversion_errors.len() as u64,
                    duration_millis: 0,
                    errors: conversion_errors,
                    metadata: meta,
                    entity_outcomes: Vec::new(),
                    relationship_outcomes: Vec::new(),
                });
            }

            completed.extend(ready);
        }

        Ok(results)
    }
}
