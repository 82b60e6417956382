//! Batch metadata/result types, the unit the idempotency cache keys on.

use codegraph_core::{UpsertEntityOutcome, UpsertRelationshipOutcome};

/// Caller-supplied (or defaulted) metadata describing one top-level batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchMetadata {
    pub id: String,
    pub batch_type: String,
    pub size: usize,
    /// 1 (lowest) .. 10 (highest), default 5.
    pub priority: u8,
    pub created_at_millis: u64,
    pub epoch_id: u64,
    pub namespace: Option<String>,
}

impl BatchMetadata {
    #[must_use]
    pub fn new(id: impl Into<String>, batch_type: impl Into<String>, size: usize, created_at_millis: u64, epoch_id: u64) -> Self {
        Self {
            id: id.into(),
            batch_type: batch_type.into(),
            size,
            priority: 5,
            created_at_millis,
            epoch_id,
            namespace: None,
        }
    }
}

/// Result of processing one top-level batch (possibly spanning several
/// micro-batch chunks).
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub batch_id: String,
    pub success: bool,
    pub processed_count: u64,
    pub failed_count: u64,
    pub duration_millis: u64,
    pub errors: Vec<String>,
    pub metadata: BatchMetadata,
    /// Per-item outcomes, populated when `metadata.batch_type == "entities"`.
    /// Carries the `created`/`conflicting_hash` detail the coordinator needs
    /// to both tally precise counters and surface conflicts.
    pub entity_outcomes: Vec<UpsertEntityOutcome>,
    /// Per-item outcomes, populated when `metadata.batch_type == "relationships"`.
    pub relationship_outcomes: Vec<UpsertRelationshipOutcome>,
}

impl BatchResult {
    #[must_use]
    pub fn empty(metadata: BatchMetadata) -> Self {
        Self {
            batch_id: metadata.id.clone(),
            success: true,
            processed_count: 0,
            failed_count: 0,
            duration_millis: 0,
            errors: Vec::new(),
            metadata,
            entity_outcomes: Vec::new(),
            relationship_outcomes: Vec::new(),
        }
    }
}

/// Fatal error during idempotency bookkeeping or other batch-level failure
/// that cannot be isolated to a single item.
#[derive(Debug, Clone, thiserror::Error)]
#[error("batch {batch_id} failed: {message}")]
pub struct BatchProcessingError {
    pub batch_id: String,
    pub items: usize,
    pub message: String,
}
