//! Rollback point / operation lifecycle: cache, durable persistence, and
//! the orchestrating [`store::RollbackStore`].

pub mod cache;
pub mod persistence;
pub mod store;
pub mod types;

pub use persistence::{InMemoryPersistence, RelStorePersistence, RollbackPersistence};
pub use store::RollbackStore;
pub use types::{RollbackError, RollbackMetrics};
