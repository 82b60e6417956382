//! Graph entity primitive.

use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

/// Discriminant for the kind of source artifact an [`Entity`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    Symbol,
    Module,
    Doc,
    Test,
    Spec,
    Change,
}

/// A node in the code knowledge graph.
///
/// `id` is unique process-wide. `hash` changes iff the entity's semantic
/// content changes; insertion order is not significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    pub path: Option<String>,
    pub language: Option<String>,
    pub signature: Option<String>,
    pub hash: String,
    pub last_modified_millis: u64,
    pub attrs: JsonMap<String, JsonValue>,
}

impl Entity {
    /// Constructs an entity with empty attrs.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: EntityKind, hash: impl Into<String>, last_modified_millis: u64) -> Self {
        Self {
            id: id.into(),
            kind,
            path: None,
            language: None,
            signature: None,
            hash: hash.into(),
            last_modified_millis,
            attrs: JsonMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entity_has_empty_attrs() {
        let e = Entity::new("e1", EntityKind::File, "deadbeef", 0);
        assert!(e.attrs.is_empty());
        assert_eq!(e.kind, EntityKind::File);
    }

    #[test]
    fn serde_roundtrip_preserves_fields() {
        let mut e = Entity::new("e1", EntityKind::Symbol, "abc123", 42);
        e.path = Some("src/lib.rs".to_string());
        e.attrs.insert("visibility".to_string(), JsonValue::String("pub".to_string()));

        let json = serde_json::to_string(&e).unwrap();
        let decoded: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(e, decoded);
    }
}
