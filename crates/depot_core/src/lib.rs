//! Depot Core Library
//!
//! Offline-first persistence and synchronization: a durable key/value store,
//! an outbox of pending mutations, the manager that drains it against the
//! backend, the connectivity signal that triggers drains, and per-entity
//! repositories on top.

pub mod connectivity;
pub mod context;
pub mod manager;
pub mod queue;
pub mod remote;
pub mod repository;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use connectivity::{
    ConnectivityMonitor, ConnectivityReporter, ConnectivityState, NetworkSource, TcpProbe,
};
pub use context::{SyncContext, SyncStatus};
pub use manager::{
    DrainOutcome, DrainReport, RemoteApi, SkipReason, SyncEvent, SyncManager,
    DEFAULT_MAX_RETRIES, LAST_SYNC_KEY,
};
pub use queue::{MutationRecord, Operation, RetryState, SyncQueue, QUEUE_KEY};
pub use remote::{HttpRemote, SnapshotSource};
pub use repository::Repository;
pub use store::{DurableStore, MemoryStore, SqliteStore, Store, Transaction};
