//! Options, status, and error types for [`super::coordinator::SyncCoordinator`].

use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

use crate::batch::BatchProcessingError;
use crate::monitoring::HealthStatus;
use crate::rollback::RollbackError;

/// Options accepted by `start_full`.
#[derive(Debug, Clone)]
pub struct FullSyncOptions {
    pub rollback_on_failure: bool,
    pub create_rollback_point: bool,
}

impl Default for FullSyncOptions {
    fn default() -> Self {
        Self { rollback_on_failure: false, create_rollback_point: true }
    }
}

/// Options accepted by `start_incremental`.
#[derive(Debug, Clone)]
pub struct IncrementalOptions {
    pub rollback_on_failure: bool,
    pub create_rollback_point: bool,
}

impl Default for IncrementalOptions {
    fn default() -> Self {
        Self { rollback_on_failure: false, create_rollback_point: false }
    }
}

/// Options accepted by `rollback_to`.
#[derive(Debug, Clone, Default)]
pub struct RollbackToOptions {
    pub strategy: Option<String>,
    pub no_embeddings: bool,
}

/// Snapshot returned by `status()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorStatus {
    pub health: HealthStatus,
    pub active_operations: usize,
    pub queue_depth: usize,
}

/// Errors surfaced by the coordinator's public contract.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("another full sync operation is already running")]
    AlreadyRunning,
    #[error("operation {0} not found")]
    NotFound(String),
    #[error("operation {0} cannot be cancelled from its current state")]
    NotCancellable(String),
    #[error("rollback did not complete within the timeout")]
    OperationTimeout,
    #[error(transparent)]
    Batch(#[from] BatchProcessingError),
    #[error(transparent)]
    Rollback(#[from] RollbackError),
    #[error("fatal parse error: {0}")]
    Parse(String),
}

/// Metadata attached to a coordinator-created rollback point, linking it
/// back to the triggering operation and session.
#[must_use]
pub fn checkpoint_metadata(operation_id: &str, session_id: Option<&str>) -> JsonMap<String, JsonValue> {
    let mut map = JsonMap::new();
    map.insert("operation_id".to_string(), JsonValue::String(operation_id.to_string()));
    if let Some(session_id) = session_id {
        map.insert("session_id".to_string(), JsonValue::String(session_id.to_string()));
    }
    map
}
