//! Pipeline orchestration: translates file changes into monitored,
//! recoverable sync operations against a `GraphStore`.

pub mod coordinator;
pub mod locks;
pub mod types;

pub use coordinator::SyncCoordinator;
pub use locks::PathLockTable;
pub use types::{CoordinatorError, CoordinatorStatus, FullSyncOptions, IncrementalOptions, RollbackToOptions};
