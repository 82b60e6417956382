//! Operation lifecycle tracking, health/alerting, and bounded history.

pub mod monitor;
pub mod types;

pub use monitor::Monitoring;
pub use types::{
    Alert, AlertType, HealthStatus, LogEntry, LogLevel, MonitoringReport, PerformanceMetrics,
    PhaseTimings, SequenceAnomalyReason, SessionSequenceAnomaly, SyncMetrics,
};
