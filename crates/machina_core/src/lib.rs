#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// CRDT codec abstraction (yrs-backed by default)
pub mod codec;

/// Engine configuration
pub mod config;

/// Snapshot comparison
pub mod diff;

/// Facade wiring all components together
pub mod engine;

/// Error (common error types)
pub mod error;

/// In-memory storage backend
pub mod memory_storage;

/// Restore with automatic backup
pub mod restore;

/// Snapshot capture and retention
pub mod snapshot;

/// SQLite storage backend
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

/// Live machine state and versioning
pub mod state;

/// Storage abstraction
pub mod storage;

/// Machine and snapshot record types
pub mod types;

pub use codec::{Projection, StateCodec, YrsCodec};
pub use config::EngineConfig;
pub use diff::{Comparison, DiffEngine, SnapshotView};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use memory_storage::MemoryStorage;
pub use restore::{RestoreCoordinator, Restored};
pub use snapshot::SnapshotManager;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
pub use state::MachineStateStore;
pub use storage::{MachineStorage, StorageResult};
pub use types::{CaptureOptions, MachineKind, MachineRecord, SnapshotRecord};
