//! Facade wiring the engine components over one storage and codec.

use std::sync::Arc;

use crate::codec::{StateCodec, YrsCodec};
use crate::config::EngineConfig;
use crate::diff::DiffEngine;
use crate::memory_storage::MemoryStorage;
use crate::restore::RestoreCoordinator;
use crate::snapshot::SnapshotManager;
use crate::state::MachineStateStore;
use crate::storage::MachineStorage;

/// The versioned machine/snapshot engine.
///
/// Bundles the four components over a shared storage backend and codec so
/// callers wire dependencies once. The engine is `Send + Sync`; share one
/// instance behind an `Arc` across request handlers.
pub struct Engine {
    state: Arc<MachineStateStore>,
    snapshots: Arc<SnapshotManager>,
    restore: RestoreCoordinator,
    diff: DiffEngine,
}

impl Engine {
    /// Build an engine over the given storage and codec with default
    /// configuration.
    pub fn new(storage: Arc<dyn MachineStorage>, codec: Arc<dyn StateCodec>) -> Self {
        Self::with_config(storage, codec, EngineConfig::default())
    }

    /// Build an engine with explicit configuration.
    pub fn with_config(
        storage: Arc<dyn MachineStorage>,
        codec: Arc<dyn StateCodec>,
        config: EngineConfig,
    ) -> Self {
        let state = Arc::new(MachineStateStore::with_config(
            storage.clone(),
            codec.clone(),
            config.clone(),
        ));
        let snapshots = Arc::new(SnapshotManager::with_config(
            storage.clone(),
            codec.clone(),
            config,
        ));
        let restore = RestoreCoordinator::new(state.clone(), snapshots.clone(), codec.clone());
        let diff = DiffEngine::new(storage, codec);

        Self {
            state,
            snapshots,
            restore,
            diff,
        }
    }

    /// Engine over in-memory storage and the yrs codec. Handy for tests
    /// and ephemeral embedding.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(YrsCodec::new()))
    }

    /// Live state store and machine lifecycle.
    pub fn state(&self) -> &MachineStateStore {
        &self.state
    }

    /// Snapshot capture, history, and retention.
    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    /// Backup-then-overwrite restores.
    pub fn restore(&self) -> &RestoreCoordinator {
        &self.restore
    }

    /// Snapshot comparison.
    pub fn diff(&self) -> &DiffEngine {
        &self.diff
    }
}
