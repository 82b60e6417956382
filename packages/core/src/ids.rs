//! Injectable identifier generation.
//!
//! Production code mints ids via [`UuidIdGen`]; tests inject a sequential
//! generator so operation/batch/rollback ids are predictable.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh identifiers for batches, operations, and rollback points.
pub trait IdGen: Send + Sync {
    /// Generates an id for a new batch.
    fn new_batch_id(&self) -> String;
    /// Generates an id for a new sync operation.
    fn new_operation_id(&self) -> String;
    /// Generates an id for a new rollback point or rollback operation.
    fn new_rollback_id(&self) -> String;
    /// Generates an id for a generic entity/relationship/fragment.
    fn new_entity_id(&self) -> String;
}

/// Default id generator backed by UUIDv4.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn new_batch_id(&self) -> String {
        format!("batch-{}", uuid::Uuid::new_v4())
    }

    fn new_operation_id(&self) -> String {
        format!("op-{}", uuid::Uuid::new_v4())
    }

    fn new_rollback_id(&self) -> String {
        format!("rbp-{}", uuid::Uuid::new_v4())
    }

    fn new_entity_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic, sequential id generator for tests.
#[derive(Debug, Default)]
pub struct SequentialIdGen {
    counter: AtomicU64,
}

impl SequentialIdGen {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }
}

impl IdGen for SequentialIdGen {
    fn new_batch_id(&self) -> String {
        format!("batch-{}", self.next())
    }

    fn new_operation_id(&self) -> String {
        format!("op-{}", self.next())
    }

    fn new_rollback_id(&self) -> String {
        format!("rbp-{}", self.next())
    }

    fn new_entity_id(&self) -> String {
        format!("ent-{}", self.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_id_gen_produces_unique_ids() {
        let gen = UuidIdGen;
        let a = gen.new_operation_id();
        let b = gen.new_operation_id();
        assert_ne!(a, b);
        assert!(a.starts_with("op-"));
    }

    #[test]
    fn sequential_id_gen_is_deterministic() {
        let gen = SequentialIdGen::new();
        assert_eq!(gen.new_batch_id(), "batch-0");
        assert_eq!(gen.new_batch_id(), "batch-1");
        assert_eq!(gen.new_operation_id(), "op-2");
    }
}
