//! Change fragments: the unit of work handed from parsing into the batch processor.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Whether a fragment describes an entity or a relationship change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Entity,
    Relationship,
}

/// The operation a fragment applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentOp {
    Add,
    Update,
    Remove,
}

/// A single change event inside a sync operation, tagged with the
/// triggering file-watcher event and its dependency hints for DAG ordering.
///
/// Consumed exactly once per epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeFragment {
    pub id: String,
    pub event_id: String,
    pub kind: FragmentKind,
    pub op: FragmentOp,
    pub data: JsonValue,
    /// Ids of other fragments this fragment depends on (must commit first).
    pub dependency_hints: Vec<String>,
    pub confidence: f64,
}
