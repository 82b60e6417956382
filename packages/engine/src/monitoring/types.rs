//! Monitoring's own bounded record types: alerts, logs, health, and the
//! aggregate report returned by `generate_report`.

use serde_json::Value as JsonValue;

use codegraph_core::SyncOperation;

/// Severity of an [`Alert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertType {
    Error,
    Warning,
    Info,
}

/// A triggered condition, resolved explicitly via `Monitoring::resolve_alert`.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub timestamp_millis: u64,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub operation_id: Option<String>,
}

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One structured log line, also mirrored to `tracing` at the matching level.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp_millis: u64,
    pub level: LogLevel,
    pub operation_id: Option<String>,
    pub message: String,
    pub data: JsonValue,
}

/// Reason a session's event sequence looked wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceAnomalyReason {
    Duplicate,
    OutOfOrder,
}

/// A single `recordSessionSequenceAnomaly` observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSequenceAnomaly {
    pub session_id: String,
    pub sequence_number: u64,
    pub previous_sequence: u64,
    pub reason: SequenceAnomalyReason,
    pub event_id: Option<String>,
}

/// Overall system health, derived from `consecutiveFailures` and `errorRate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Phase timings supplied (or omitted) by the caller on operation completion.
/// Omitted fields retain the last sampled value, per §4.2.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimings {
    pub parse_millis: Option<f64>,
    pub graph_update_millis: Option<f64>,
    pub embedding_millis: Option<f64>,
    pub cache_hit_rate: Option<f64>,
    pub io_wait_millis: Option<f64>,
    pub memory_usage_bytes: Option<u64>,
}

/// Rolling performance averages, sampled on every operation completion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceMetrics {
    pub average_parse_time_millis: f64,
    pub average_graph_update_time_millis: f64,
    pub average_embedding_time_millis: f64,
    pub cache_hit_rate: f64,
    pub io_wait_time_millis: f64,
    pub memory_usage_bytes: u64,
}

/// Aggregate sync counters, the `summary` section of [`MonitoringReport`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SyncMetrics {
    pub operations_total: u64,
    pub operations_successful: u64,
    pub operations_failed: u64,
    pub active_operations: u64,
    pub consecutive_failures: u32,
    pub error_rate: f64,
    pub average_sync_time_millis: f64,
    /// Completed operations per minute, over a trailing 5-minute window.
    pub throughput: f64,
    pub entities_created: u64,
    pub entities_updated: u64,
    pub entities_deleted: u64,
    pub relationships_created: u64,
    pub relationships_updated: u64,
    pub relationships_deleted: u64,
}

/// Full snapshot returned by `Monitoring::generate_report`.
#[derive(Debug, Clone)]
pub struct MonitoringReport {
    pub summary: SyncMetrics,
    pub performance: PerformanceMetrics,
    pub health: HealthStatus,
    pub recent_operations: Vec<SyncOperation>,
    pub active_alerts: Vec<Alert>,
}
