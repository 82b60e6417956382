//! Sync operation record and conflict types owned by the `SyncCoordinator`.

use serde::{Deserialize, Serialize};

/// The kind of sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperationType {
    Full,
    Incremental,
    Partial,
}

/// Status of a [`SyncOperation`]. Transitions are monotonic except
/// `Running -> Cancelled` and `Running -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncOperationStatus {
    /// Whether this status is terminal (no further transitions are valid).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether transitioning from `self` to `next` is a legal monotonic step.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use SyncOperationStatus::{Cancelled, Completed, Failed, Pending, Running};
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

/// Running counters for a [`SyncOperation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounters {
    pub entities_created: u64,
    pub entities_updated: u64,
    pub entities_deleted: u64,
    pub relationships_created: u64,
    pub relationships_updated: u64,
    pub relationships_deleted: u64,
}

impl OperationCounters {
    /// Total entity mutations recorded (created + updated + deleted).
    #[must_use]
    pub fn total_entities_processed(&self) -> u64 {
        self.entities_created + self.entities_updated + self.entities_deleted
    }

    /// Total relationship mutations recorded (created + updated + deleted).
    #[must_use]
    pub fn total_relationships_processed(&self) -> u64 {
        self.relationships_created + self.relationships_updated + self.relationships_deleted
    }
}

/// A single recoverable error entry attached to an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationErrorEntry {
    pub file: Option<String>,
    pub message: String,
    pub recoverable: bool,
}

/// Kind of entity-version conflict detected by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    EntityVersion,
}

/// A conflict raised when the store reports an existing entity with a
/// different hash under the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_type: ConflictType,
    pub entity_id: String,
    pub current_hash: String,
    pub incoming_hash: String,
    pub resolved: bool,
    pub resolution: Option<String>,
}

/// A scheduled or in-flight sync run, owned exclusively by the `SyncCoordinator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: String,
    pub op_type: SyncOperationType,
    pub status: SyncOperationStatus,
    pub start_time_millis: u64,
    pub end_time_millis: Option<u64>,
    pub files_processed: u64,
    pub counters: OperationCounters,
    pub errors: Vec<OperationErrorEntry>,
    pub conflicts: Vec<Conflict>,
    pub rollback_point_id: Option<String>,
}

impl SyncOperation {
    /// Creates a freshly enqueued operation in `Pending` status.
    #[must_use]
    pub fn new(id: impl Into<String>, op_type: SyncOperationType, start_time_millis: u64) -> Self {
        Self {
            id: id.into(),
            op_type,
            status: SyncOperationStatus::Pending,
            start_time_millis,
            end_time_millis: None,
            files_processed: 0,
            counters: OperationCounters::default(),
            errors: Vec::new(),
            conflicts: Vec::new(),
            rollback_point_id: None,
        }
    }

    /// Attempts a status transition, enforcing monotonicity.
    ///
    /// # Errors
    /// Returns the attempted `(from, to)` pair if the transition is illegal.
    pub fn transition(&mut self, next: SyncOperationStatus) -> Result<(), (SyncOperationStatus, SyncOperationStatus)> {
        if self.status.can_transition_to(next) {
            self.status = next;
            Ok(())
        } else {
            Err((self.status, next))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_sum_matches_total() {
        let c = OperationCounters {
            entities_created: 3,
            entities_updated: 2,
            entities_deleted: 1,
            ..Default::default()
        };
        assert_eq!(c.total_entities_processed(), 6);
    }

    #[test]
    fn valid_transitions_succeed() {
        let mut op = SyncOperation::new("op1", SyncOperationType::Full, 0);
        assert!(op.transition(SyncOperationStatus::Running).is_ok());
        assert!(op.transition(SyncOperationStatus::Completed).is_ok());
    }

    #[test]
    fn terminal_status_cannot_transition_again() {
        let mut op = SyncOperation::new("op1", SyncOperationType::Full, 0);
        op.transition(SyncOperationStatus::Running).unwrap();
        op.transition(SyncOperationStatus::Completed).unwrap();
        assert!(op.transition(SyncOperationStatus::Failed).is_err());
    }

    #[test]
    fn pending_to_completed_directly_is_illegal() {
        let mut op = SyncOperation::new("op1", SyncOperationType::Full, 0);
        assert!(op.transition(SyncOperationStatus::Completed).is_err());
    }

    #[test]
    fn running_can_go_to_cancelled_or_failed() {
        assert!(SyncOperationStatus::Running.can_transition_to(SyncOperationStatus::Cancelled));
        assert!(SyncOperationStatus::Running.can_transition_to(SyncOperationStatus::Failed));
    }
}
