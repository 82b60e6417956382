//! Narrow contracts for every external collaborator the core consumes.
//!
//! Everything in this module is out of scope for the ingestion engine
//! itself: the concrete parser, graph/vector/relational stores, and
//! file-watcher are all external systems. The engine only ever depends
//! on these trait objects, never a concrete implementation -- that is
//! what lets `codegraph-sync-engine` run against a fake store in tests
//! and a real one in production without touching the core pipeline.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::entity::Entity;
use crate::epoch::Epoch;
use crate::fragment::ChangeFragment;
use crate::relationship::Relationship;

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// A single recoverable or fatal parse error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error in {file}: {message}")]
pub struct ParseError {
    pub file: String,
    pub error_type: String,
    pub message: String,
    pub recoverable: bool,
    pub timestamp_millis: u64,
}

/// The result of parsing a single file: whatever entities/relationships/
/// fragments were extracted, plus any per-file errors encountered.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub errors: Vec<ParseError>,
    pub fragments: Vec<ChangeFragment>,
}

/// Language-specific source parser. Pure: no I/O beyond the file read.
#[async_trait]
pub trait Parser: Send + Sync {
    /// Parses a single file, returning extracted entities/relationships/
    /// fragments and any recoverable errors encountered.
    async fn parse_file(&self, path: &Path) -> Result<ParseOutput, ParseError>;
}

// ---------------------------------------------------------------------------
// GraphStore
// ---------------------------------------------------------------------------

/// Options accompanying an upsert call: idempotency key and optional namespace.
#[derive(Debug, Clone)]
pub struct UpsertOptions {
    pub idempotency_key: String,
    pub namespace: Option<String>,
}

/// Outcome of a single entity upsert as reported by the store, used by the
/// coordinator to detect version conflicts.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertEntityOutcome {
    pub entity_id: String,
    pub created: bool,
    /// Set when the store already held this id under a different hash.
    pub conflicting_hash: Option<String>,
}

/// Outcome of a relationship upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRelationshipOutcome {
    pub relationship_id: String,
    pub created: bool,
}

/// The opaque graph persistence backend. Parameters are passed by name;
/// the adapter is responsible for escaping if the backing store lacks
/// parameterization -- unsafe string substitution is forbidden.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_entities(
        &self,
        epoch: Epoch,
        batch: &[Entity],
        opts: &UpsertOptions,
    ) -> anyhow::Result<Vec<UpsertEntityOutcome>>;

    async fn upsert_relationships(
        &self,
        epoch: Epoch,
        batch: &[Relationship],
        opts: &UpsertOptions,
    ) -> anyhow::Result<Vec<UpsertRelationshipOutcome>>;

    async fn delete_entity(&self, id: &str, epoch: Epoch) -> anyhow::Result<()>;

    async fn query(&self, q: &str, params: &[(&str, JsonValue)]) -> anyhow::Result<JsonValue>;

    async fn health_check(&self) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// VectorStore (optional)
// ---------------------------------------------------------------------------

/// Optional embedding index. Out of scope: embedding generation itself.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert_embeddings(&self, ids: &[String], vectors: &[Vec<f32>]) -> anyhow::Result<()>;

    async fn search(&self, vector: &[f32], k: usize, filter: Option<&JsonValue>) -> anyhow::Result<Vec<(String, f32)>>;
}

// ---------------------------------------------------------------------------
// RelStore (optional, rollback metadata persistence)
// ---------------------------------------------------------------------------

/// A handle to an open transaction against a [`RelStore`]. The inner id is
/// opaque to callers; only a `RelStore` implementation interprets it.
pub struct Transaction(u64);

impl Transaction {
    /// Wraps a raw transaction id minted by a `RelStore` implementation.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw transaction id for the implementation that minted it.
    #[must_use]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Relational store used only by the rollback store to persist its own
/// `rollback_points` / `rollback_operations` / `rollback_snapshots` tables.
#[async_trait]
pub trait RelStore: Send + Sync {
    async fn begin_tx(&self) -> anyhow::Result<Transaction>;
    async fn exec(&self, tx: &Transaction, stmt: &str, params: &[(&str, JsonValue)]) -> anyhow::Result<u64>;
    async fn commit(&self, tx: Transaction) -> anyhow::Result<()>;
    async fn rollback(&self, tx: Transaction) -> anyhow::Result<()>;
    async fn query(&self, stmt: &str, params: &[(&str, JsonValue)]) -> anyhow::Result<JsonValue>;
}

// ---------------------------------------------------------------------------
// FileWatcher (upstream, out of scope; consumed via a bounded channel)
// ---------------------------------------------------------------------------

/// The kind of filesystem change a [`FileChangeEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Create,
    Modify,
    Delete,
}

/// A single filesystem change emitted by the (out-of-scope) file watcher.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub change_type: FileChangeKind,
    pub absolute_path: PathBuf,
    pub timestamp_millis: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_output_default_is_empty() {
        let out = ParseOutput::default();
        assert!(out.entities.is_empty());
        assert!(out.relationships.is_empty());
        assert!(out.errors.is_empty());
        assert!(out.fragments.is_empty());
    }

    #[test]
    fn file_change_event_is_constructible() {
        let evt = FileChangeEvent {
            path: PathBuf::from("src/lib.rs"),
            change_type: FileChangeKind::Modify,
            absolute_path: PathBuf::from("/repo/src/lib.rs"),
            timestamp_millis: 0,
        };
        assert_eq!(evt.change_type, FileChangeKind::Modify);
    }
}
