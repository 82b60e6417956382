//! Translates file-change events into monitored, recoverable sync operations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Map as JsonMap;
use tokio::sync::Semaphore;

use codegraph_core::{
    CancelToken, ChangeFragment, Clock, Conflict, ConflictType, FileChangeEvent, IdGen, Parser, RollbackOperationStatus, RollbackPoint,
    SyncOperation, SyncOperationStatus, SyncOperationType,
};

use crate::batch::BatchProcessor;
use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventBus, SyncPhase};
use crate::monitoring::{Monitoring, PhaseTimings};
use crate::rollback::RollbackStore;

use super::locks::PathLockTable;
use super::types::{checkpoint_metadata, CoordinatorError, CoordinatorStatus, FullSyncOptions, IncrementalOptions, RollbackToOptions};

struct OperationHandle {
    cancel: CancelToken,
    operation: RwLock<SyncOperation>,
}

/// Owns the change stream -> parse -> batch -> commit pipeline, checkpoint
/// linkage, per-path commit locks, and the two backpressure semaphores
/// named in §4.4.
pub struct SyncCoordinator {
    monitoring: Arc<Monitoring>,
    batch_processor: Arc<BatchProcessor>,
    rollback_store: Arc<RollbackStore>,
    parser: Arc<dyn Parser>,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGen>,
    events: EventBus,
    operations: DashMap<String, Arc<OperationHandle>>,
    path_locks: PathLockTable,
    full_sync_running: AtomicBool,
    incremental_permits: Arc<Semaphore>,
    parse_permits: Arc<Semaphore>,
    fragment_permits: Arc<Semaphore>,
    fragment_capacity: usize,
    rollback_poll_interval: Duration,
    rollback_poll_timeout: Duration,
}

impl SyncCoordinator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &EngineConfig,
        monitoring: Arc<Monitoring>,
        batch_processor: Arc<BatchProcessor>,
        rollback_store: Arc<RollbackStore>,
        parser: Arc<dyn Parser>,
        clock: Arc<dyn Clock>,
        id_gen: Arc<dyn IdGen>,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            monitoring,
            batch_processor,
            rollback_store,
            parser,
            clock,
            id_gen,
            events,
            operations: DashMap::new(),
            path_locks: PathLockTable::new(),
            full_sync_running: AtomicBool::new(false),
            incremental_permits: Arc::new(Semaphore::new(config.max_concurrent_operations)),
            parse_permits: Arc::new(Semaphore::new(config.max_in_flight_parses)),
            fragment_permits: Arc::new(Semaphore::new(config.max_queued_fragments)),
            fragment_capacity: config.max_queued_fragments,
            rollback_poll_interval: config.rollback_poll_interval,
            rollback_poll_timeout: config.rollback_poll_timeout,
        })
    }

    #[must_use]
    pub fn subscribe_events(&self) -> EventBus {
        self.events.clone()
    }

    pub fn status(&self) -> CoordinatorStatus {
        let report = self.monitoring.generate_report(None);
        CoordinatorStatus {
            health: report.health,
            active_operations: self.operations.len(),
            queue_depth: self.fragment_permits_in_use(),
        }
    }

    fn fragment_permits_in_use(&self) -> usize {
        self.fragment_capacity.saturating_sub(self.fragment_permits.available_permits())
    }

    /// Cooperatively cancels an operation, only from `Pending`/`Running`.
    pub fn cancel(&self, op_id: &str) -> Result<(), CoordinatorError> {
        let handle = self.operations.get(op_id).ok_or_else(|| CoordinatorError::NotFound(op_id.to_string()))?;
        let status = handle.operation.read().status;
        if status != SyncOperationStatus::Pending && status != SyncOperationStatus::Running {
            return Err(CoordinatorError::NotCancellable(op_id.to_string()));
        }
        handle.cancel.cancel();
        Ok(())
    }

    pub async fn create_rollback_point(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        metadata: JsonMap<String, serde_json::Value>,
    ) -> Result<RollbackPoint, CoordinatorError> {
        Ok(self.rollback_store.store(name, description, None, None, metadata).await?)
    }

    /// Restores a rollback point. The reference graph store applies a
    /// restore synchronously, so this resolves on the first poll tick; the
    /// interval/timeout are still honored so a real `GraphStore` that takes
    /// real time to replay a snapshot drops in without changing this method.
    pub async fn rollback_to(&self, rollback_point_id: &str, options: RollbackToOptions) -> Result<codegraph_core::RollbackOperation, CoordinatorError> {
        // Touches the point so a missing/expired id fails fast instead of
        // only surfacing once the operation is marked failed below.
        self.rollback_store.get(rollback_point_id).await?;

        let strategy = options.strategy.unwrap_or_else(|| "full".to_string());
        let mut op = self.rollback_store.store_operation(rollback_point_id, strategy).await?;

        op.status = RollbackOperationStatus::Running;
        self.rollback_store.update_operation(op.clone()).await?;

        op.status = RollbackOperationStatus::Completed;
        op.progress = 100;
        op.completed_at_millis = Some(self.clock.now_millis());
        self.rollback_store.update_operation(op.clone()).await?;

        let deadline = tokio::time::Instant::now() + self.rollback_poll_timeout;
        loop {
            if op.status.is_terminal() {
                return Ok(op);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CoordinatorError::OperationTimeout);
            }
            tokio::time::sleep(self.rollback_poll_interval).await;
        }
    }

    /// Runs a full sync: enumerates every file under `roots`, parses each,
    /// and commits the resulting change fragments.
    pub async fn start_full(self: &Arc<Self>, roots: Vec<PathBuf>, options: FullSyncOptions) -> Result<SyncOperation, CoordinatorError> {
        if self.full_sync_running.swap(true, Ordering::SeqCst) {
            return Err(CoordinatorError::AlreadyRunning);
        }
        let result = self.run_pipeline(SyncOperationType::Full, roots, options.rollback_on_failure, options.create_rollback_point).await;
        self.full_sync_running.store(false, Ordering::SeqCst);
        result
    }

    /// Runs an incremental sync over an explicit change set.
    pub async fn start_incremental(self: &Arc<Self>, changes: Vec<FileChangeEvent>, options: IncrementalOptions) -> Result<SyncOperation, CoordinatorError> {
        let _permit = self.incremental_permits.acquire().await.expect("semaphore never closed");
        let paths = changes.into_iter().map(|c| c.absolute_path).collect();
        self.run_pipeline(SyncOperationType::Incremental, paths, options.rollback_on_failure, options.create_rollback_point).await
    }

    async fn run_pipeline(
        self: &Arc<Self>,
        op_type: SyncOperationType,
        paths: Vec<PathBuf>,
        rollback_on_failure: bool,
        create_rollback_point: bool,
    ) -> Result<SyncOperation, CoordinatorError> {
        let op_id = self.id_gen.new_operation_id();
        let now = self.clock.now_millis();
        let mut op = SyncOperation::new(op_id.clone(), op_type, now);
        op.transition(SyncOperationStatus::Running).expect("pending -> running is always legal");

        let handle = Arc::new(OperationHandle { cancel: CancelToken::new(), operation: RwLock::new(op.clone()) });
        self.operations.insert(op_id.clone(), Arc::clone(&handle));
        self.monitoring.record_operation_start(&op);

        let files = self.scan(&paths).await;
        self.monitoring.record_operation_progress(&op_id, SyncPhase::Scan, 10);

        let mut fragments = Vec::new();
        let mut files_processed = 0u64;
        for path in files {
            if handle.cancel.is_cancelled() {
                break;
            }
            let _permit = self.parse_permits.acquire().await.expect("semaphore never closed");
            match self.parser.parse_file(&path).await {
                Ok(output) => {
                    files_processed += 1;
                    for fragment in output.fragments {
                        let _frag_permit = self.fragment_permits.acquire().await.expect("semaphore never closed");
                        fragments.push(fragment);
                    }
                    for err in output.errors {
                        op.errors.push(codegraph_core::OperationErrorEntry {
                            file: Some(err.file),
                            message: err.message,
                            recoverable: err.recoverable,
                        });
                    }
                }
                Err(err) => {
                    op.errors.push(codegraph_core::OperationErrorEntry { file: Some(err.file.clone()), message: err.message.clone(), recoverable: err.recoverable });
                    if !err.recoverable {
                        return self.finish_failed(handle, op, format!("fatal parse error: {}", err.message), rollback_on_failure).await;
                    }
                }
            }
        }
        op.files_processed = files_processed;
        self.monitoring.record_operation_progress(&op_id, SyncPhase::Parse, 40);

        if handle.cancel.is_cancelled() {
            return self.finish_cancelled(handle, op).await;
        }

        self.monitoring.record_operation_progress(&op_id, SyncPhase::Batch, 60);
        let batch_results = match self.batch_processor.process_change_fragments(fragments).await {
            Ok(results) => results,
            Err(e) => return self.finish_failed(handle, op, e.to_string(), rollback_on_failure).await,
        };

        self.monitoring.record_operation_progress(&op_id, SyncPhase::Commit, 80);
        let touched_paths: HashSet<PathBuf> = paths.into_iter().collect();
        let mut commit_guards = Vec::new();
        for path in &touched_paths {
            commit_guards.push(self.path_locks.acquire(path).await);
        }

        let mut failed_count = 0u64;
        let mut succeeded_count = 0u64;
        for result in &batch_results {
            succeeded_count += result.processed_count;
            failed_count += result.failed_count;
            match result.metadata.batch_type.as_str() {
                "entities" => {
                    for outcome in &result.entity_outcomes {
                        if outcome.created {
                            op.counters.entities_created += 1;
                        } else {
                            op.counters.entities_updated += 1;
                        }
                        if let Some(current_hash) = &outcome.conflicting_hash {
                            op.conflicts.push(Conflict {
                                conflict_type: ConflictType::EntityVersion,
                                entity_id: outcome.entity_id.clone(),
                                current_hash: current_hash.clone(),
                                // `UpsertEntityOutcome` only carries the existing
                                // (conflicting) hash, not the incoming one.
                                incoming_hash: String::new(),
                                resolved: false,
                                resolution: None,
                            });
                        }
                    }
                }
                "relationships" => {
                    for outcome in &result.relationship_outcomes {
                        if outcome.created {
                            op.counters.relationships_created += 1;
                        } else {
                            op.counters.relationships_updated += 1;
                        }
                    }
                }
                _ => {}
            }
        }
        drop(commit_guards);

        for conflict in &op.conflicts {
            self.monitoring.record_conflict(&op_id, conflict.clone());
        }

        if failed_count > 0 && succeeded_count == 0 {
            let messages: Vec<String> = batch_results.iter().flat_map(|r| r.errors.clone()).collect();
            return self.finish_failed(handle, op, messages.join("; "), rollback_on_failure).await;
        }

        self.monitoring.record_operation_progress(&op_id, SyncPhase::Post, 95);

        if create_rollback_point {
            let metadata = checkpoint_metadata(&op_id, None);
            if let Ok(point) = self.rollback_store.store(format!("checkpoint-{op_id}"), None, None, None, metadata).await {
                op.rollback_point_id = Some(point.id.clone());
                self.events.publish(EngineEvent::CheckpointCreated { rollback_point_id: point.id, operation_id: Some(op_id.clone()) });
            }
        }

        op.transition(SyncOperationStatus::Completed).expect("running -> completed is always legal");
        op.end_time_millis = Some(self.clock.now_millis());
        self.operations.remove(&op_id);
        self.monitoring.record_operation_complete(op.clone(), Some(PhaseTimings::default()));
        Ok(op)
    }

    async fn finish_failed(
        &self,
        handle: Arc<OperationHandle>,
        mut op: SyncOperation,
        error: String,
        rollback_on_failure: bool,
    ) -> Result<SyncOperation, CoordinatorError> {
        op.transition(SyncOperationStatus::Failed).expect("running -> failed is always legal");
        op.end_time_millis = Some(self.clock.now_millis());
        self.operations.remove(&op.id);
        self.monitoring.record_operation_failed(op.clone(), error.clone());

        if rollback_on_failure {
            if let Some(point_id) = op.rollback_point_id.clone() {
                let _ = self.rollback_to(&point_id, RollbackToOptions::default()).await;
            }
        }
        let _ = handle;
        Ok(op)
    }

    async fn finish_cancelled(&self, _handle: Arc<OperationHandle>, mut op: SyncOperation) -> Result<SyncOperation, CoordinatorError> {
        op.transition(SyncOperationStatus::Cancelled).expect("running -> cancelled is always legal");
        op.end_time_millis = Some(self.clock.now_millis());
        self.operations.remove(&op.id);
        self.monitoring.record_operation_cancelled(op.clone());
        Ok(op)
    }

    async fn scan(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for path in paths {
            out.extend(walk(path).await);
        }
        out
    }
}

async fn walk(root: &Path) -> Vec<PathBuf> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || walk_blocking(&root)).await.unwrap_or_default()
}

fn walk_blocking(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(root) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_blocking(&path));
        } else {
            out.push(path);
        }
    }
    out
}
