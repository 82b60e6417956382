//! Typed errors for the rollback store, replacing exception-based rollback
//! control flow (design note 9.3).

/// Errors returned by [`super::store::RollbackStore`] operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RollbackError {
    #[error("rollback point {0} has expired")]
    Expired(String),

    #[error("rollback point or operation {0} not found")]
    NotFound(String),

    #[error("persistence failure for rollback point {rollback_point_id}: {cause}")]
    StoreFailed { rollback_point_id: String, cause: String },
}

/// Point-in-time snapshot of rollback store health, returned by `get_metrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollbackMetrics {
    pub total_points: u64,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub average_rollback_duration_millis: f64,
    pub estimated_memory_bytes: u64,
}
