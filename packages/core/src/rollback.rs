//! Rollback point / operation data model, owned exclusively by the `RollbackStore`.

use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

/// A named, optionally expiring snapshot reference used to restore prior graph state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackPoint {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub timestamp_millis: u64,
    pub expires_at_millis: Option<u64>,
    pub session_id: Option<String>,
    pub metadata: JsonMap<String, JsonValue>,
}

/// A snapshot payload cascade-deleted with its owning [`RollbackPoint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub rollback_point_id: String,
    pub snapshot_type: String,
    pub data: Vec<u8>,
    pub size_bytes: u64,
    pub checksum: Option<String>,
}

/// Status of a [`RollbackOperation`]. State machine:
/// `Pending -> Running -> (Completed | Failed | Cancelled)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RollbackOperationStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// An in-progress or completed restore against a [`RollbackPoint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackOperation {
    pub id: String,
    pub target_rollback_point_id: String,
    pub op_type: String,
    pub status: RollbackOperationStatus,
    pub progress: u8,
    pub strategy: String,
    pub started_at_millis: u64,
    pub completed_at_millis: Option<u64>,
    pub error: Option<String>,
    pub log: Vec<String>,
}

impl RollbackOperation {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        target_rollback_point_id: impl Into<String>,
        strategy: impl Into<String>,
        started_at_millis: u64,
    ) -> Self {
        Self {
            id: id.into(),
            target_rollback_point_id: target_rollback_point_id.into(),
            op_type: "rollback".to_string(),
            status: RollbackOperationStatus::Pending,
            progress: 0,
            strategy: strategy.into(),
            started_at_millis,
            completed_at_millis: None,
            error: None,
            log: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rollback_operation_starts_pending() {
        let op = RollbackOperation::new("rop1", "rbp1", "full", 0);
        assert_eq!(op.status, RollbackOperationStatus::Pending);
        assert_eq!(op.progress, 0);
        assert!(!op.status.is_terminal());
    }

    #[test]
    fn terminal_statuses() {
        assert!(RollbackOperationStatus::Completed.is_terminal());
        assert!(RollbackOperationStatus::Failed.is_terminal());
        assert!(RollbackOperationStatus::Cancelled.is_terminal());
        assert!(!RollbackOperationStatus::Running.is_terminal());
    }
}
