//! Explicit composition root (design note 9.4), replacing ambient
//! process-wide singletons: `Engine::new`/`EngineBuilder` wire
//! `RollbackStore`, `Monitoring`, `BatchProcessor`, and `SyncCoordinator`
//! together behind a single handle. Tests and the CLI both go through here.

use std::sync::Arc;

use codegraph_core::{Clock, IdGen, Parser, RelStore, SystemClock, UuidIdGen};

use crate::batch::BatchProcessor;
use crate::config::EngineConfig;
use crate::coordinator::SyncCoordinator;
use crate::events::EventBus;
use crate::monitoring::Monitoring;
use crate::refimpl::{InMemoryGraphStore, InMemoryRelStore, PassthroughParser};
use crate::rollback::{RelStorePersistence, RollbackStore};

/// Owns every long-lived component and the shared [`EventBus`] they
/// publish/subscribe through. Construct via [`EngineBuilder`].
pub struct Engine {
    pub config: EngineConfig,
    pub events: EventBus,
    pub monitoring: Arc<Monitoring>,
    pub batch_processor: Arc<BatchProcessor>,
    pub rollback_store: Arc<RollbackStore>,
    pub coordinator: Arc<SyncCoordinator>,
}

impl Engine {
    /// Builds an `Engine` wired with the in-memory reference adapters
    /// (`InMemoryGraphStore`, `InMemoryRelStore`, `PassthroughParser`) and
    /// production clock/id sources.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        EngineBuilder::new(config).build()
    }

    /// Starts every component's background task (rollback cleanup tick,
    /// monitoring health check, idempotency sweep).
    pub fn start(&self) {
        self.rollback_store.start();
        self.monitoring.start();
        self.batch_processor.start();
    }

    /// Stops every component, draining in-flight batch work up to its
    /// configured timeout.
    pub async fn stop(&self) {
        self.rollback_store.stop();
        self.monitoring.stop();
        self.batch_processor.stop().await;
    }
}

/// Builds an [`Engine`], letting callers substitute any adapter (a real
/// `GraphStore`, a Postgres-backed `RelStore`, a language-aware `Parser`)
/// in place of the in-memory reference implementation.
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGen>,
    graph_store: Option<Arc<dyn codegraph_core::GraphStore>>,
    rel_store: Option<Arc<dyn RelStore>>,
    parser: Option<Arc<dyn Parser>>,
}

impl EngineBuilder {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            id_gen: Arc::new(UuidIdGen),
            graph_store: None,
            rel_store: None,
            parser: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_id_gen(mut self, id_gen: Arc<dyn IdGen>) -> Self {
        self.id_gen = id_gen;
        self
    }

    #[must_use]
    pub fn with_graph_store(mut self, graph_store: Arc<dyn codegraph_core::GraphStore>) -> Self {
        self.graph_store = Some(graph_store);
        self
    }

    #[must_use]
    pub fn with_rel_store(mut self, rel_store: Arc<dyn RelStore>) -> Self {
        self.rel_store = Some(rel_store);
        self
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    #[must_use]
    pub fn build(self) -> Engine {
        let events = EventBus::new();
        let graph_store = self.graph_store.unwrap_or_else(|| Arc::new(InMemoryGraphStore::new()));
        let rel_store = self.rel_store.unwrap_or_else(|| Arc::new(InMemoryRelStore::new()));
        let parser = self.parser.unwrap_or_else(|| Arc::new(PassthroughParser));

        let persistence = Arc::new(RelStorePersistence::new(rel_store));
        let rollback_store = RollbackStore::new(&self.config, persistence, self.clock.clone(), self.id_gen.clone(), events.clone());
        let monitoring = Monitoring::new(events.clone(), self.clock.clone(), self.id_gen.clone(), self.config.history_enabled);
        let batch_processor = BatchProcessor::new(&self.config, graph_store, self.id_gen.clone(), self.clock.clone());
        let coordinator = SyncCoordinator::new(
            &self.config,
            Arc::clone(&monitoring),
            Arc::clone(&batch_processor),
            Arc::clone(&rollback_store),
            parser,
            self.clock,
            self.id_gen,
            events.clone(),
        );

        Engine { config: self.config, events, monitoring, batch_processor, rollback_store, coordinator }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_and_runs_a_trivial_full_sync() {
        let engine = Engine::new(EngineConfig::default());
        engine.start();
        let op = engine
            .coordinator
            .start_full(vec![], crate::coordinator::FullSyncOptions { rollback_on_failure: false, create_rollback_point: false })
            .await
            .unwrap();
        assert_eq!(op.status, codegraph_core::SyncOperationStatus::Completed);
        engine.stop().await;
    }
}
