//! No-op [`VectorStore`], matching the role `NullDataStore` plays in the
//! teacher: the default when no real embedding index is configured.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use codegraph_core::VectorStore;

/// Discards every upsert and returns an empty result set for every search.
pub struct NullVectorStore;

#[async_trait]
impl VectorStore for NullVectorStore {
    async fn upsert_embeddings(&self, _ids: &[String], _vectors: &[Vec<f32>]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn search(&self, _vector: &[f32], _k: usize, _filter: Option<&JsonValue>) -> anyhow::Result<Vec<(String, f32)>> {
        Ok(Vec::new())
    }
}
