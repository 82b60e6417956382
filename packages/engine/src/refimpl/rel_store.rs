//! In-memory [`RelStore`]: the reference relational backend consumed only
//! by `rollback::persistence::RelStorePersistence` in tests and the CLI.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use codegraph_core::{RelStore, Transaction};

#[derive(Default)]
struct PendingTx {
    statements: Vec<(String, Vec<(String, JsonValue)>)>,
}

/// Buffers writes per open transaction and only applies them to the
/// committed table on `commit`; `rollback` discards the buffer untouched.
#[derive(Default)]
pub struct InMemoryRelStore {
    next_tx_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingTx>>,
    committed: Mutex<Vec<(String, Vec<(String, JsonValue)>)>>,
}

impl InMemoryRelStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn committed_statement_count(&self) -> usize {
        self.committed.lock().len()
    }
}

#[async_trait]
impl RelStore for InMemoryRelStore {
    async fn begin_tx(&self) -> anyhow::Result<Transaction> {
        let id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().insert(id, PendingTx::default());
        Ok(Transaction::new(id))
    }

    async fn exec(&self, tx: &Transaction, stmt: &str, params: &[(&str, JsonValue)]) -> anyhow::Result<u64> {
        let mut pending = self.pending.lock();
        let entry = pending.get_mut(&tx.raw()).ok_or_else(|| anyhow::anyhow!("unknown transaction"))?;
        entry.statements.push((stmt.to_string(), params.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()));
        Ok(1)
    }

    async fn commit(&self, tx: Transaction) -> anyhow::Result<()> {
        let pending_tx = self.pending.lock().remove(&tx.raw()).ok_or_else(|| anyhow::anyhow!("unknown transaction"))?;
        self.committed.lock().extend(pending_tx.statements);
        Ok(())
    }

    async fn rollback(&self, tx: Transaction) -> anyhow::Result<()> {
        self.pending.lock().remove(&tx.raw());
        Ok(())
    }

    async fn query(&self, _stmt: &str, _params: &[(&str, JsonValue)]) -> anyhow::Result<JsonValue> {
        Ok(JsonValue::Array(Vec::new()))
    }
}
