//! Explicit subscription channels, replacing an ambient process-wide event bus.
//!
//! Design note 9.1: each event kind gets a bounded channel with drop-oldest
//! policy, except for critical events (`OperationFailed`, `ConflictDetected`)
//! which must not be silently dropped. `tokio::sync::broadcast` already drops
//! the oldest unread message for a lagging receiver, so the two channels
//! differ only in capacity: the critical channel is sized generously enough
//! that it does not drop under realistic alert/conflict volumes, while the
//! general channel stays small and is allowed to shed old progress updates.

use serde_json::Value as JsonValue;
use tokio::sync::broadcast;

use codegraph_core::{Conflict, SyncOperation};

/// Phase label reported by `SyncCoordinator::subscribe`'s `Progress` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    Scan,
    Parse,
    Batch,
    Commit,
    Post,
}

/// Every event kind the coordinator and monitoring components may publish.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    OperationStarted { operation: SyncOperation },
    OperationCompleted { operation: SyncOperation },
    OperationFailed { operation: SyncOperation, error: String },
    OperationCancelled { operation: SyncOperation },
    ConflictDetected { operation_id: String, conflict: Conflict },
    CheckpointCreated { rollback_point_id: String, operation_id: Option<String> },
    RollbackExecuted { rollback_point_id: String, success: bool },
    Progress { operation_id: String, phase: SyncPhase, progress: u8 },
    HealthCheck { status: JsonValue },
}

impl EngineEvent {
    /// Whether this event must use the non-lossy critical channel.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::OperationFailed { .. } | Self::ConflictDetected { .. })
    }
}

const NONCRITICAL_CAPACITY: usize = 256;
const CRITICAL_CAPACITY: usize = 4096;

/// Fan-out point for [`EngineEvent`]s. Cloning an `EventBus` handle shares
/// the same underlying channels.
#[derive(Clone)]
pub struct EventBus {
    critical: broadcast::Sender<EngineEvent>,
    noncritical: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (critical, _) = broadcast::channel(CRITICAL_CAPACITY);
        let (noncritical, _) = broadcast::channel(NONCRITICAL_CAPACITY);
        Self { critical, noncritical }
    }

    /// Publishes an event onto the channel appropriate to its criticality.
    /// No-ops if there are currently no subscribers.
    pub fn publish(&self, event: EngineEvent) {
        if event.is_critical() {
            let _ = self.critical.send(event);
        } else {
            let _ = self.noncritical.send(event);
        }
    }

    /// Subscribes to critical events only (`OperationFailed`, `ConflictDetected`).
    #[must_use]
    pub fn subscribe_critical(&self) -> broadcast::Receiver<EngineEvent> {
        self.critical.subscribe()
    }

    /// Subscribes to non-critical events (progress, lifecycle, checkpoints).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.noncritical.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{SyncOperation, SyncOperationType};

    #[tokio::test]
    async fn subscriber_receives_noncritical_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let op = SyncOperation::new("op1", SyncOperationType::Full, 0);
        bus.publish(EngineEvent::OperationStarted { operation: op.clone() });

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, EngineEvent::OperationStarted { operation } if operation.id == "op1"));
    }

    #[tokio::test]
    async fn critical_events_go_to_critical_channel_only() {
        let bus = EventBus::new();
        let mut noncritical_rx = bus.subscribe();
        let mut critical_rx = bus.subscribe_critical();

        let op = SyncOperation::new("op1", SyncOperationType::Full, 0);
        bus.publish(EngineEvent::OperationFailed { operation: op, error: "boom".into() });

        let got = critical_rx.recv().await.unwrap();
        assert!(matches!(got, EngineEvent::OperationFailed { .. }));

        // Nothing was published to the noncritical channel.
        assert!(noncritical_rx.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        let op = SyncOperation::new("op1", SyncOperationType::Full, 0);
        bus.publish(EngineEvent::OperationStarted { operation: op });
    }
}
