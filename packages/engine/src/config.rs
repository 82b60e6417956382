//! Engine-wide configuration, with an environment-variable override layer.
//!
//! Shaped like the teacher's `service::config::ServerConfig`: a plain
//! struct with a `Default` impl, plus a `from_env` constructor that only
//! overrides fields an environment variable is actually set for.

use std::env;
use std::time::Duration;

/// Tunables for the coordinator, batch processor, and rollback store.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Unique identifier for this engine instance.
    pub node_id: String,
    /// Whether sync operation history is retained by `Monitoring`.
    pub history_enabled: bool,
    /// Window (days) used to derive the rollback store's default cleanup cutoff.
    pub doc_freshness_window_days: u32,
    /// Interval between periodic `RollbackStore::cleanup()` ticks.
    pub rollback_cleanup_interval: Duration,
    /// TTL for cached idempotent batch results.
    pub idempotency_ttl: Duration,
    /// Fixed-size chunk for entity micro-batches.
    pub entity_batch_size: usize,
    /// Fixed-size chunk for relationship micro-batches.
    pub relationship_batch_size: usize,
    /// Number of micro-batch chunks run concurrently per group.
    pub max_concurrent_batches: usize,
    /// Maximum number of `incremental` operations that may run concurrently.
    pub max_concurrent_operations: usize,
    /// Capacity of the in-flight-parse-task semaphore.
    pub max_in_flight_parses: usize,
    /// Capacity of the queued-fragments semaphore.
    pub max_queued_fragments: usize,
    /// Default timeout applied to a single store call.
    pub store_call_timeout: Duration,
    /// How long `BatchProcessor::stop` waits for in-flight batches to drain.
    pub stop_drain_timeout: Duration,
    /// Poll interval while awaiting rollback completion.
    pub rollback_poll_interval: Duration,
    /// Maximum time to await rollback completion before `OperationTimeout`.
    pub rollback_poll_timeout: Duration,
    /// Rollback point capacity before LRU cache eviction (durable copy retained).
    pub rollback_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            history_enabled: true,
            doc_freshness_window_days: 30,
            rollback_cleanup_interval: Duration::from_millis(300_000),
            idempotency_ttl: Duration::from_millis(600_000),
            entity_batch_size: 100,
            relationship_batch_size: 100,
            max_concurrent_batches: 4,
            max_concurrent_operations: 8,
            max_in_flight_parses: 16,
            max_queued_fragments: 10_000,
            store_call_timeout: Duration::from_secs(30),
            stop_drain_timeout: Duration::from_secs(30),
            rollback_poll_interval: Duration::from_secs(1),
            rollback_poll_timeout: Duration::from_secs(300),
            rollback_cache_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Builds a config starting from [`Default`], then applying any of the
    /// documented environment variables that are present: `HISTORY_ENABLED`,
    /// `DOC_FRESHNESS_WINDOW_DAYS`, `ROLLBACK_CLEANUP_INTERVAL_MS`,
    /// `IDEMPOTENCY_TTL_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        let lookup = |key: &str| env::var(key).ok();
        Self::from_lookup(lookup)
    }

    /// Builds a config from an arbitrary key-lookup function.
    ///
    /// Split out from [`Self::from_env`] so the override logic can be unit
    /// tested without mutating real process environment variables.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("HISTORY_ENABLED").and_then(|s| s.parse().ok()) {
            config.history_enabled = v;
        }
        if let Some(v) = lookup("DOC_FRESHNESS_WINDOW_DAYS").and_then(|s| s.parse().ok()) {
            config.doc_freshness_window_days = v;
        }
        if let Some(v) = lookup("ROLLBACK_CLEANUP_INTERVAL_MS").and_then(|s| s.parse::<u64>().ok()) {
            config.rollback_cleanup_interval = Duration::from_millis(v);
        }
        if let Some(v) = lookup("IDEMPOTENCY_TTL_MS").and_then(|s| s.parse::<u64>().ok()) {
            config.idempotency_ttl = Duration::from_millis(v);
        }

        config
    }
}
