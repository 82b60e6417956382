//! Micro-batching, idempotency, and dependency-DAG commit of parsed
//! entities/relationships/change-fragments into a `GraphStore`.

pub mod dag;
pub mod idempotency;
pub mod processor;
pub mod types;

pub use dag::{DagNode, DependencyDag};
pub use idempotency::IdempotencyCache;
pub use processor::BatchProcessor;
pub use types::{BatchMetadata, BatchProcessingError, BatchResult};
