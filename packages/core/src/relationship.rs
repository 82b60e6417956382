//! Graph relationship primitive.

use serde::{Deserialize, Serialize};

/// The kind of edge a [`Relationship`] represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Imports,
    Calls,
    Defines,
    References,
    Implements,
    Extends,
    Tests,
    DependsOn,
    /// Extension point for relationship kinds not enumerated above.
    Custom(String),
}

/// A piece of supporting evidence for a relationship (e.g. a call site).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub description: String,
    pub site_hash: Option<String>,
}

/// An edge in the code knowledge graph.
///
/// Identity is `(from_id, to_id, type, site_hash)`. Invariant: if
/// `active == false` then `valid_to` must be set, and `last_seen_at >=
/// first_seen_at` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub rel_type: RelationshipType,
    pub created_millis: u64,
    pub last_modified_millis: u64,
    pub version: u32,
    pub active: bool,
    pub first_seen_at_millis: u64,
    pub last_seen_at_millis: u64,
    pub confidence: Option<f64>,
    pub evidence: Vec<Evidence>,
    pub valid_from_millis: Option<u64>,
    pub valid_to_millis: Option<u64>,
}

/// Error returned by [`Relationship::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RelationshipInvariantError {
    #[error("inactive relationship must have valid_to set")]
    InactiveMissingValidTo,
    #[error("last_seen_at must be >= first_seen_at")]
    SeenOutOfOrder,
    #[error("version must be >= 1")]
    ZeroVersion,
}

impl Relationship {
    /// Checks the invariants from the data model: `active == false` implies
    /// `valid_to` is set, and `last_seen_at >= first_seen_at`.
    pub fn validate(&self) -> Result<(), RelationshipInvariantError> {
        if self.version < 1 {
            return Err(RelationshipInvariantError::ZeroVersion);
        }
        if !self.active && self.valid_to_millis.is_none() {
            return Err(RelationshipInvariantError::InactiveMissingValidTo);
        }
        if self.last_seen_at_millis < self.first_seen_at_millis {
            return Err(RelationshipInvariantError::SeenOutOfOrder);
        }
        Ok(())
    }

    /// Identity tuple used for dedup/merge: `(from_id, to_id, type, site_hash)`.
    #[must_use]
    pub fn identity_key(&self) -> (String, String, RelationshipType, Option<String>) {
        let site_hash = self.evidence.first().and_then(|e| e.site_hash.clone());
        (self.from_id.clone(), self.to_id.clone(), self.rel_type.clone(), site_hash)
    }
}
