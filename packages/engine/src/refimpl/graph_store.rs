//! In-memory [`GraphStore`], the reference adapter used by the CLI and
//! integration tests when no real graph backend is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;

use codegraph_core::{Entity, Epoch, GraphStore, Relationship, UpsertEntityOutcome, UpsertOptions, UpsertRelationshipOutcome};

/// Keeps every entity/relationship it has seen in a process-local map,
/// reporting a conflicting hash whenever an upsert targets an id already
/// held under a different hash. Writes are last-epoch-wins.
#[derive(Default)]
pub struct InMemoryGraphStore {
    entities: RwLock<HashMap<String, Entity>>,
    relationships: RwLock<HashMap<String, Relationship>>,
    last_epoch: RwLock<Option<Epoch>>,
}

impl InMemoryGraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.relationships.read().len()
    }

    #[must_use]
    pub fn get_entity(&self, id: &str) -> Option<Entity> {
        self.entities.read().get(id).cloned()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_entities(&self, epoch: Epoch, batch: &[Entity], _opts: &UpsertOptions) -> anyhow::Result<Vec<UpsertEntityOutcome>> {
        self.check_epoch_order(epoch)?;
        let mut entities = self.entities.write();
        let outcomes = batch
            .iter()
            .map(|entity| {
                let conflicting_hash = entities.get(&entity.id).filter(|existing| existing.hash != entity.hash).map(|existing| existing.hash.clone());
                let created = !entities.contains_key(&entity.id);
                entities.insert(entity.id.clone(), entity.clone());
                UpsertEntityOutcome { entity_id: entity.id.clone(), created, conflicting_hash }
            })
            .collect();
        Ok(outcomes)
    }

    async fn upsert_relationships(&self, epoch: Epoch, batch: &[Relationship], _opts: &UpsertOptions) -> anyhow::Result<Vec<UpsertRelationshipOutcome>> {
        self.check_epoch_order(epoch)?;
        let mut relationships = self.relationships.write();
        let outcomes = batch
            .iter()
            .map(|rel| {
                let created = !relationships.contains_key(&rel.id);
                relationships.insert(rel.id.clone(), rel.clone());
                UpsertRelationshipOutcome { relationship_id: rel.id.clone(), created }
            })
            .collect();
        Ok(outcomes)
    }

    async fn delete_entity(&self, id: &str, epoch: Epoch) -> anyhow::Result<()> {
        self.check_epoch_order(epoch)?;
        self.entities.write().remove(id);
        Ok(())
    }

    async fn query(&self, _q: &str, _params: &[(&str, JsonValue)]) -> anyhow::Result<JsonValue> {
        let entities = self.entities.read();
        let values: Vec<JsonValue> = entities.values().map(|e| serde_json::to_value(e).unwrap_or(JsonValue::Null)).collect();
        Ok(JsonValue::Array(values))
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl InMemoryGraphStore {
    /// Rejects writes that arrive out of epoch order, per the data model's
    /// write-ordering invariant (§3).
    fn check_epoch_order(&self, epoch: Epoch) -> anyhow::Result<()> {
        let mut last = self.last_epoch.write();
        if let Some(prior) = *last {
            if epoch < prior {
                anyhow::bail!("epoch {epoch:?} arrived after already-observed epoch {prior:?}");
            }
        }
        *last = Some(epoch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use codegraph_core::EntityKind;

    use super::*;

    fn entity(id: &str, hash: &str) -> Entity {
        Entity::new(id, EntityKind::File, hash, 0)
    }

    #[tokio::test]
    async fn upsert_reports_created_on_first_insert() {
        let store = InMemoryGraphStore::new();
        let opts = UpsertOptions { idempotency_key: "k".into(), namespace: None };
        let outcomes = store.upsert_entities(Epoch { seq: 0, minted_at_millis: 0 }, &[entity("e1", "h1")], &opts).await.unwrap();
        assert!(outcomes[0].created);
        assert!(outcomes[0].conflicting_hash.is_none());
    }

    #[tokio::test]
    async fn upsert_with_changed_hash_reports_conflict() {
        let store = InMemoryGraphStore::new();
        let opts = UpsertOptions { idempotency_key: "k".into(), namespace: None };
        store.upsert_entities(Epoch { seq: 0, minted_at_millis: 0 }, &[entity("e1", "h1")], &opts).await.unwrap();
        let outcomes = store.upsert_entities(Epoch { seq: 1, minted_at_millis: 0 }, &[entity("e1", "h2")], &opts).await.unwrap();
        assert!(!outcomes[0].created);
        assert_eq!(outcomes[0].conflicting_hash.as_deref(), Some("h1"));
    }

    #[tokio::test]
    async fn out_of_order_epoch_is_rejected() {
        let store = InMemoryGraphStore::new();
        let opts = UpsertOptions { idempotency_key: "k".into(), namespace: None };
        store.upsert_entities(Epoch { seq: 5, minted_at_millis: 0 }, &[entity("e1", "h1")], &opts).await.unwrap();
        let result = store.upsert_entities(Epoch { seq: 2, minted_at_millis: 0 }, &[entity("e2", "h1")], &opts).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_removes_entity() {
        let store = InMemoryGraphStore::new();
        let opts = UpsertOptions { idempotency_key: "k".into(), namespace: None };
        store.upsert_entities(Epoch { seq: 0, minted_at_millis: 0 }, &[entity("e1", "h1")], &opts).await.unwrap();
        store.delete_entity("e1", Epoch { seq: 1, minted_at_millis: 0 }).await.unwrap();
        assert!(store.get_entity("e1").is_none());
    }
}
