//! Operation lifecycle recording, health computation, and bounded
//! alert/log history, all behind a single `parking_lot::RwLock`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;

use codegraph_core::{CancelToken, Clock, Conflict, IdGen, SyncOperation, SyncOperationStatus};

use crate::events::{EngineEvent, EventBus, SyncPhase};

use super::types::{
    Alert, AlertType, HealthStatus, LogEntry, LogLevel, MonitoringReport, PerformanceMetrics,
    PhaseTimings, SequenceAnomalyReason, SessionSequenceAnomaly, SyncMetrics,
};

const MAX_ALERTS: usize = 100;
const MAX_LOGS: usize = 1000;
const MAX_RECENT_CONSECUTIVE: usize = 10;
const MAX_ANOMALIES: usize = 100;
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(5 * 60);
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

struct State {
    history_enabled: bool,
    operations: Vec<SyncOperation>,
    active: HashMap<String, SyncOperation>,
    recent_outcomes: VecDeque<bool>,
    alerts: VecDeque<Alert>,
    logs: VecDeque<LogEntry>,
    completion_timestamps: VecDeque<u64>,
    anomalies: VecDeque<SessionSequenceAnomaly>,
    duplicate_anomaly_count: u64,
    out_of_order_anomaly_count: u64,

    operations_total: u64,
    operations_successful: u64,
    operations_failed: u64,
    sync_time_sum_millis: u64,
    sync_time_samples: u64,
    entities_created: u64,
    entities_updated: u64,
    entities_deleted: u64,
    relationships_created: u64,
    relationships_updated: u64,
    relationships_deleted: u64,

    performance: PerformanceMetrics,
    last_checkpoint_metrics: Option<JsonValue>,
}

impl State {
    fn new(history_enabled: bool) -> Self {
        Self {
            history_enabled,
            operations: Vec::new(),
            active: HashMap::new(),
            recent_outcomes: VecDeque::with_capacity(MAX_RECENT_CONSECUTIVE),
            alerts: VecDeque::new(),
            logs: VecDeque::new(),
            completion_timestamps: VecDeque::new(),
            anomalies: VecDeque::new(),
            duplicate_anomaly_count: 0,
            out_of_order_anomaly_count: 0,
            operations_total: 0,
            operations_successful: 0,
            operations_failed: 0,
            sync_time_sum_millis: 0,
            sync_time_samples: 0,
            entities_created: 0,
            entities_updated: 0,
            entities_deleted: 0,
            relationships_created: 0,
            relationships_updated: 0,
            relationships_deleted: 0,
            performance: PerformanceMetrics::default(),
            last_checkpoint_metrics: None,
        }
    }

    fn error_rate(&self) -> f64 {
        if self.operations_total == 0 {
            0.0
        } else {
            self.operations_failed as f64 / self.operations_total as f64
        }
    }

    /// Count of the most recent contiguous failures, newest first, capped
    /// at the last `MAX_RECENT_CONSECUTIVE` outcomes.
    fn consecutive_failures(&self) -> u32 {
        let mut count = 0;
        for &succeeded in &self.recent_outcomes {
            if succeeded {
                break;
            }
            count += 1;
        }
        count
    }

    fn health(&self) -> HealthStatus {
        let consecutive = self.consecutive_failures();
        if consecutive > 3 {
            HealthStatus::Unhealthy
        } else if consecutive > 0 || self.error_rate() > 0.1 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    fn push_alert(&mut self, alert: Alert) {
        if self.alerts.len() >= MAX_ALERTS {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    fn push_log(&mut self, entry: LogEntry) {
        if self.logs.len() >= MAX_LOGS {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }

    fn push_outcome(&mut self, succeeded: bool) {
        if self.recent_outcomes.len() >= MAX_RECENT_CONSECUTIVE {
            self.recent_outcomes.pop_back();
        }
        self.recent_outcomes.push_front(succeeded);
    }

    fn throughput(&self, now_millis: u64) -> f64 {
        let window_start = now_millis.saturating_sub(THROUGHPUT_WINDOW.as_millis() as u64);
        let completions_in_window = self.completion_timestamps.iter().filter(|&&t| t >= window_start).count();
        completions_in_window as f64 / (THROUGHPUT_WINDOW.as_secs() as f64 / 60.0)
    }
}

/// Records operation lifecycle events, derives aggregate health and
/// performance metrics, and fans conflicts/errors/alerts out onto the
/// shared [`EventBus`].
pub struct Monitoring {
    state: RwLock<State>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGen>,
    cancel: CancelToken,
    background: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Monitoring {
    /// `history_enabled` gates retention of terminal operations in
    /// `generate_report`'s `recent_operations` -- counters, active-operation
    /// tracking, and events are unaffected either way.
    #[must_use]
    pub fn new(events: EventBus, clock: Arc<dyn Clock>, id_gen: Arc<dyn IdGen>, history_enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(State::new(history_enabled)),
            events,
            clock,
            id_gen,
            cancel: CancelToken::new(),
            background: parking_lot::Mutex::new(None),
        })
    }

    /// Starts the 30s background health-check loop.
    pub fn start(self: &Arc<Self>) {
        let monitoring = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            loop {
                tokio::select! {
                    () = monitoring.cancel.cancelled() => break,
                    _ = ticker.tick() => monitoring.run_health_check(),
                }
            }
        });
        *self.background.lock() = Some(handle);
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    fn run_health_check(&self) {
        let now = self.clock.now_millis();
        let health = {
            let mut state = self.state.write();
            let health = state.health();
            match health {
                HealthStatus::Unhealthy => {
                    let id = self.id_gen.new_entity_id();
                    state.push_alert(Alert {
                        id,
                        alert_type: AlertType::Error,
                        message: "health check: system unhealthy".to_string(),
                        timestamp_millis: now,
                        resolved: false,
                        resolution: None,
                        operation_id: None,
                    });
                }
                HealthStatus::Degraded => {
                    let id = self.id_gen.new_entity_id();
                    state.push_alert(Alert {
                        id,
                        alert_type: AlertType::Warning,
                        message: "health check: system degraded".to_string(),
                        timestamp_millis: now,
                        resolved: false,
                        resolution: None,
                        operation_id: None,
                    });
                }
                HealthStatus::Healthy => {}
            }
            health
        };
        self.events.publish(EngineEvent::HealthCheck { status: health_to_json(health) });
    }

    pub fn record_operation_start(&self, op: &SyncOperation) {
        let now = self.clock.now_millis();
        let mut state = self.state.write();
        state.operations_total += 1;
        state.active.insert(op.id.clone(), op.clone());
        state.push_log(LogEntry {
            timestamp_millis: now,
            level: LogLevel::Info,
            operation_id: Some(op.id.clone()),
            message: format!("operation {} started", op.id),
            data: JsonValue::Null,
        });
        drop(state);
        self.events.publish(EngineEvent::OperationStarted { operation: op.clone() });
        tracing::info!(operation_id = %op.id, "operation started");
    }

    pub fn record_operation_progress(&self, operation_id: &str, phase: SyncPhase, progress: u8) {
        self.events.publish(EngineEvent::Progress {
            operation_id: operation_id.to_string(),
            phase,
            progress,
        });
    }

    pub fn record_operation_complete(&self, op: SyncOperation, timings: Option<PhaseTimings>) {
        let now = self.clock.now_millis();
        let duration = op.end_time_millis.unwrap_or(now).saturating_sub(op.start_time_millis);

        let mut state = self.state.write();
        state.operations_successful += 1;
        state.push_outcome(true);
        state.active.remove(&op.id);
        state.completion_timestamps.push_back(now);
        state.sync_time_sum_millis += duration;
        state.sync_time_samples += 1;

        state.entities_created += op.counters.entities_created;
        state.entities_updated += op.counters.entities_updated;
        state.entities_deleted += op.counters.entities_deleted;
        state.relationships_created += op.counters.relationships_created;
        state.relationships_updated += op.counters.relationships_updated;
        state.relationships_deleted += op.counters.relationships_deleted;

        if let Some(t) = timings {
            let perf = &mut state.performance;
            if let Some(v) = t.parse_millis {
                perf.average_parse_time_millis = v;
            }
            if let Some(v) = t.graph_update_millis {
                perf.average_graph_update_time_millis = v;
            }
            if let Some(v) = t.embedding_millis {
                perf.average_embedding_time_millis = v;
            }
            if let Some(v) = t.cache_hit_rate {
                perf.cache_hit_rate = v;
            }
            if let Some(v) = t.io_wait_millis {
                perf.io_wait_time_millis = v;
            }
            if let Some(v) = t.memory_usage_bytes {
                perf.memory_usage_bytes = v;
            }
        }

        state.push_log(LogEntry {
            timestamp_millis: now,
            level: LogLevel::Info,
            operation_id: Some(op.id.clone()),
            message: format!("operation {} completed", op.id),
            data: JsonValue::Null,
        });
        if state.history_enabled {
            state.operations.push(op.clone());
        }
        drop(state);

        self.events.publish(EngineEvent::OperationCompleted { operation: op });
    }

    pub fn record_operation_failed(&self, op: SyncOperation, error: impl Into<String>) {
        let now = self.clock.now_millis();
        let error = error.into();
        let mut state = self.state.write();
        state.operations_failed += 1;
        state.push_outcome(false);
        state.active.remove(&op.id);
        let error_rate = state.error_rate();

        let alert_id = self.id_gen.new_entity_id();
        state.push_alert(Alert {
            id: alert_id,
            alert_type: AlertType::Error,
            message: format!("operation {} failed: {error}", op.id),
            timestamp_millis: now,
            resolved: false,
            resolution: None,
            operation_id: Some(op.id.clone()),
        });
        state.push_log(LogEntry {
            timestamp_millis: now,
            level: LogLevel::Error,
            operation_id: Some(op.id.clone()),
            message: format!("operation {} failed: {error}", op.id),
            data: JsonValue::Null,
        });
        if state.history_enabled {
            state.operations.push(op.clone());
        }
        drop(state);

        tracing::error!(operation_id = %op.id, %error_rate, "operation failed");
        self.events.publish(EngineEvent::OperationFailed { operation: op, error });
    }

    /// Removes a cancelled operation from the active set. Unlike completion
    /// and failure, cancellation doesn't move the success/failure counters.
    pub fn record_operation_cancelled(&self, op: SyncOperation) {
        let now = self.clock.now_millis();
        let mut state = self.state.write();
        state.active.remove(&op.id);
        state.push_log(LogEntry {
            timestamp_millis: now,
            level: LogLevel::Info,
            operation_id: Some(op.id.clone()),
            message: format!("operation {} cancelled", op.id),
            data: JsonValue::Null,
        });
        if state.history_enabled {
            state.operations.push(op.clone());
        }
        drop(state);

        tracing::info!(operation_id = %op.id, "operation cancelled");
        self.events.publish(EngineEvent::OperationCancelled { operation: op });
    }

    pub fn record_conflict(&self, operation_id: &str, conflict: Conflict) {
        let now = self.clock.now_millis();
        let mut state = self.state.write();
        state.push_log(LogEntry {
            timestamp_millis: now,
            level: LogLevel::Warn,
            operation_id: Some(operation_id.to_string()),
            message: format!("conflict detected for entity {}", conflict.entity_id),
            data: JsonValue::Null,
        });
        drop(state);
        tracing::warn!(operation_id, entity_id = %conflict.entity_id, "conflict detected");
        self.events.publish(EngineEvent::ConflictDetected { operation_id: operation_id.to_string(), conflict });
    }

    pub fn record_error(&self, operation_id: &str, err: impl Into<String>, recoverable: bool) {
        let now = self.clock.now_millis();
        let err = err.into();
        let mut state = self.state.write();
        state.push_log(LogEntry {
            timestamp_millis: now,
            level: LogLevel::Error,
            operation_id: Some(operation_id.to_string()),
            message: err.clone(),
            data: JsonValue::Null,
        });
        if !recoverable {
            let id = self.id_gen.new_entity_id();
            state.push_alert(Alert {
                id,
                alert_type: AlertType::Error,
                message: err.clone(),
                timestamp_millis: now,
                resolved: false,
                resolution: None,
                operation_id: Some(operation_id.to_string()),
            });
        }
        drop(state);
        tracing::error!(operation_id, recoverable, %err, "error recorded");
    }

    pub fn record_session_sequence_anomaly(&self, anomaly: SessionSequenceAnomaly) {
        let mut state = self.state.write();
        match anomaly.reason {
            SequenceAnomalyReason::Duplicate => state.duplicate_anomaly_count += 1,
            SequenceAnomalyReason::OutOfOrder => state.out_of_order_anomaly_count += 1,
        }
        if state.anomalies.len() >= MAX_ANOMALIES {
            state.anomalies.pop_front();
        }
        state.anomalies.push_back(anomaly);
    }

    pub fn record_checkpoint_metrics(&self, snapshot: JsonValue) {
        {
            let mut state = self.state.write();
            state.last_checkpoint_metrics = Some(snapshot.clone());
        }
        self.events.publish(EngineEvent::HealthCheck { status: snapshot });
    }

    /// Marks the first matching unresolved alert resolved. Idempotent --
    /// returns `false` if no unresolved alert with this id exists.
    pub fn resolve_alert(&self, id: &str, resolution: Option<String>) -> bool {
        let mut state = self.state.write();
        if let Some(alert) = state.alerts.iter_mut().find(|a| a.id == id && !a.resolved) {
            alert.resolved = true;
            alert.resolution = resolution;
            true
        } else {
            false
        }
    }

    /// Evicts old operation history. With `max_age_millis = None`, heuristically
    /// chooses a full reset if only old entries exist, an age-based sweep
    /// otherwise. Unresolved alerts are never removed.
    pub fn cleanup(&self, max_age_millis: Option<u64>) {
        let now = self.clock.now_millis();
        let mut state = self.state.write();

        let cutoff = match max_age_millis {
            Some(age) => now.saturating_sub(age),
            None => {
                let has_recent = state.operations.iter().any(|op| now.saturating_sub(op.start_time_millis) < Duration::from_secs(24 * 60 * 60).as_millis() as u64);
                let has_old = state.operations.iter().any(|op| now.saturating_sub(op.start_time_millis) >= Duration::from_secs(24 * 60 * 60).as_millis() as u64);
                if has_old && has_recent {
                    now.saturating_sub(Duration::from_secs(24 * 60 * 60).as_millis() as u64)
                } else {
                    u64::MAX
                }
            }
        };

        state.operations.retain(|op| op.start_time_millis >= cutoff);
        state.alerts.retain(|a| !a.resolved || a.timestamp_millis >= cutoff);
    }

    /// Builds the aggregate report. `limit` caps `recent_operations` to the
    /// `limit` most recent entries after sorting; `None` returns all of them.
    pub fn generate_report(&self, limit: Option<usize>) -> MonitoringReport {
        let now = self.clock.now_millis();
        let state = self.state.read();

        let mut recent_operations: Vec<SyncOperation> = state.operations.clone();
        recent_operations.sort_by(|a, b| b.start_time_millis.cmp(&a.start_time_millis));
        if let Some(limit) = limit {
            recent_operations.truncate(limit);
        }

        let average_sync_time_millis = if state.sync_time_samples == 0 {
            0.0
        } else {
            state.sync_time_sum_millis as f64 / state.sync_time_samples as f64
        };

        let summary = SyncMetrics {
            operations_total: state.operations_total,
            operations_successful: state.operations_successful,
            operations_failed: state.operations_failed,
            active_operations: state.active.len() as u64,
            consecutive_failures: state.consecutive_failures(),
            error_rate: state.error_rate(),
            average_sync_time_millis,
            throughput: state.throughput(now),
            entities_created: state.entities_created,
            entities_updated: state.entities_updated,
            entities_deleted: state.entities_deleted,
            relationships_created: state.relationships_created,
            relationships_updated: state.relationships_updated,
            relationships_deleted: state.relationships_deleted,
        };

        MonitoringReport {
            summary,
            performance: state.performance,
            health: state.health(),
            recent_operations,
            active_alerts: state.alerts.iter().filter(|a| !a.resolved).cloned().collect(),
        }
    }
}

fn health_to_json(health: HealthStatus) -> JsonValue {
    let label = match health {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Degraded => "degraded",
        HealthStatus::Unhealthy => "unhealthy",
    };
    serde_json::json!({ "status": label })
}

#[cfg(test)]
mod tests {
    use codegraph_core::ids::SequentialIdGen;
    use codegraph_core::{SyncOperationType, SystemClock};

    use super::*;

    fn test_monitoring() -> Arc<Monitoring> {
        Monitoring::new(EventBus::new(), Arc::new(SystemClock), Arc::new(SequentialIdGen::new()), true)
    }

    fn completed_op(id: &str, start: u64, end: u64) -> SyncOperation {
        let mut op = SyncOperation::new(id, SyncOperationType::Full, start);
        op.transition(SyncOperationStatus::Running).unwrap();
        op.transition(SyncOperationStatus::Completed).unwrap();
        op.end_time_millis = Some(end);
        op
    }

    #[test]
    fn two_sequential_completions_match_seed_scenario() {
        let monitoring = test_monitoring();
        monitoring.record_operation_complete(completed_op("op1", 0, 1000), None);
        monitoring.record_operation_complete(completed_op("op2", 1000, 3000), None);

        let report = monitoring.generate_report(None);
        assert_eq!(report.summary.operations_total, 2);
        assert_eq!(report.summary.operations_successful, 2);
        assert!(report.summary.average_sync_time_millis > 1400.0 && report.summary.average_sync_time_millis < 1600.0);
    }

    #[test]
    fn four_failures_in_a_row_yield_unhealthy() {
        let monitoring = test_monitoring();
        for i in 0..4 {
            let mut op = SyncOperation::new(format!("op{i}"), SyncOperationType::Full, 0);
            op.transition(SyncOperationStatus::Running).unwrap();
            op.transition(SyncOperationStatus::Failed).unwrap();
            monitoring.record_operation_failed(op, "boom");
        }

        let report = monitoring.generate_report(None);
        assert_eq!(report.summary.consecutive_failures, 4);
        assert_eq!(report.health, HealthStatus::Unhealthy);
    }

    #[test]
    fn alert_resolution_removes_it_from_active_alerts() {
        let monitoring = test_monitoring();
        let mut op = SyncOperation::new("op1", SyncOperationType::Full, 0);
        op.transition(SyncOperationStatus::Running).unwrap();
        op.transition(SyncOperationStatus::Failed).unwrap();
        monitoring.record_operation_failed(op, "boom");

        let alert_id = monitoring.generate_report(None).active_alerts[0].id.clone();
        assert!(monitoring.resolve_alert(&alert_id, Some("fixed".to_string())));
        assert!(monitoring.generate_report(None).active_alerts.is_empty());
        // Idempotent: resolving again returns false.
        assert!(!monitoring.resolve_alert(&alert_id, None));
    }

    #[test]
    fn alerts_cap_at_100_fifo() {
        let monitoring = test_monitoring();
        for i in 0..101 {
            let mut op = SyncOperation::new(format!("op{i}"), SyncOperationType::Full, 0);
            op.transition(SyncOperationStatus::Running).unwrap();
            op.transition(SyncOperationStatus::Failed).unwrap();
            monitoring.record_operation_failed(op, "boom");
        }
        assert_eq!(monitoring.generate_report(None).active_alerts.len(), 100);
    }

    #[test]
    fn cleanup_with_explicit_age_keeps_unresolved_alerts() {
        let monitoring = test_monitoring();
        let mut op = SyncOperation::new("op1", SyncOperationType::Full, 0);
        op.transition(SyncOperationStatus::Running).unwrap();
        op.transition(SyncOperationStatus::Failed).unwrap();
        monitoring.record_operation_failed(op, "boom");

        monitoring.cleanup(Some(0));
        assert_eq!(monitoring.generate_report(None).active_alerts.len(), 1);
    }

    #[test]
    fn cancelling_an_operation_removes_it_from_active_operations() {
        let monitoring = test_monitoring();
        let op = SyncOperation::new("op1", SyncOperationType::Full, 0);
        monitoring.record_operation_start(&op);
        assert_eq!(monitoring.generate_report(None).summary.active_operations, 1);

        let mut cancelled = op;
        cancelled.transition(SyncOperationStatus::Cancelled).unwrap();
        monitoring.record_operation_cancelled(cancelled);

        let report = monitoring.generate_report(None);
        assert_eq!(report.summary.active_operations, 0);
        assert!(report.recent_operations.iter().any(|op| op.id == "op1"));
    }

    #[test]
    fn generate_report_limit_keeps_the_most_recent_operations() {
        let monitoring = test_monitoring();
        monitoring.record_operation_complete(completed_op("op1", 0, 1000), None);
        monitoring.record_operation_complete(completed_op("op2", 1000, 2000), None);
        monitoring.record_operation_complete(completed_op("op3", 2000, 3000), None);

        let report = monitoring.generate_report(Some(2));
        assert_eq!(report.recent_operations.len(), 2);
        assert_eq!(report.recent_operations[0].id, "op3");
        assert_eq!(report.recent_operations[1].id, "op2");

        let unlimited = monitoring.generate_report(None);
        assert_eq!(unlimited.recent_operations.len(), 3);
    }

    #[test]
    fn history_disabled_keeps_recent_operations_empty_but_not_counters() {
        let monitoring = Monitoring::new(EventBus::new(), Arc::new(SystemClock), Arc::new(SequentialIdGen::new()), false);
        monitoring.record_operation_complete(completed_op("op1", 0, 1000), None);

        let mut op = SyncOperation::new("op2", SyncOperationType::Full, 0);
        op.transition(SyncOperationStatus::Running).unwrap();
        op.transition(SyncOperationStatus::Failed).unwrap();
        monitoring.record_operation_failed(op, "boom");

        let mut op3 = SyncOperation::new("op3", SyncOperationType::Full, 0);
        monitoring.record_operation_start(&op3);
        op3.transition(SyncOperationStatus::Cancelled).unwrap();
        monitoring.record_operation_cancelled(op3);

        let report = monitoring.generate_report(None);
        assert!(report.recent_operations.is_empty());
        assert_eq!(report.summary.operations_total, 2);
        assert_eq!(report.summary.operations_successful, 1);
        assert_eq!(report.summary.active_operations, 0);
    }
}
