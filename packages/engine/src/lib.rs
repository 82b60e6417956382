//! codegraph-sync-engine -- coordinator, batch processor, rollback store,
//! and monitoring for the code-knowledge-graph ingestion pipeline.
//!
//! - [`coordinator`]: translates file changes into monitored sync operations
//! - [`batch`]: micro-batches, idempotency, and DAG-ordered commits
//! - [`rollback`]: rollback point/operation lifecycle and persistence
//! - [`monitoring`]: operation lifecycle recording and health
//! - [`refimpl`]: in-memory reference adapters for tests and the CLI
//! - [`engine`]: the `Engine`/`EngineBuilder` composition root

pub mod batch;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod events;
pub mod monitoring;
pub mod refimpl;
pub mod rollback;
pub mod telemetry;

pub use engine::{Engine, EngineBuilder};
