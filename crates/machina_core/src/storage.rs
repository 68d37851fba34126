//! Storage abstraction for machine and snapshot persistence.
//!
//! This module defines the [`MachineStorage`] trait which abstracts over
//! different storage backends (SQLite, in-memory) for persisting machine
//! records and their snapshots.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineError;
use crate::types::{MachineRecord, SnapshotRecord};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, EngineError>;

/// Trait for machine/snapshot storage backends.
///
/// # Storage model
///
/// Backends persist two collections:
/// 1. **Machines**: live CRDT state plus a version counter and metadata
/// 2. **Snapshots**: immutable captures, each owned by one machine
///
/// Each method is atomic on its own; the engine composes them so that no
/// sequence ever leaves a state persisted without its matching version.
/// Backend-specific failures are reported as
/// [`EngineError::Storage`](crate::error::EngineError::Storage).
pub trait MachineStorage: Send + Sync {
    // ==================== Machines ====================

    /// Persist a new machine record.
    fn insert_machine(&self, machine: &MachineRecord) -> StorageResult<()>;

    /// Fetch a machine by id.
    ///
    /// Returns `None` if the machine doesn't exist.
    fn get_machine(&self, id: Uuid) -> StorageResult<Option<MachineRecord>>;

    /// Atomically replace a machine's state if its version still equals
    /// `expected_version`, incrementing the version by one and stamping
    /// `updated_at`.
    ///
    /// Returns `false` when the version check fails or the machine is
    /// gone; the caller decides whether to reload and retry.
    fn compare_and_set_state(
        &self,
        id: Uuid,
        expected_version: u64,
        state: &[u8],
        updated_at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Update name and/or description without touching state or version.
    ///
    /// Returns `false` if the machine doesn't exist.
    fn update_machine_meta(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> StorageResult<bool>;

    /// Set the archived flag.
    ///
    /// Returns `false` if the machine doesn't exist.
    fn set_archived(&self, id: Uuid, archived: bool) -> StorageResult<bool>;

    /// Delete a machine and all of its snapshots.
    ///
    /// Returns `false` if the machine didn't exist.
    fn delete_machine(&self, id: Uuid) -> StorageResult<bool>;

    // ==================== Snapshots ====================

    /// Persist a new snapshot record.
    fn insert_snapshot(&self, snapshot: &SnapshotRecord) -> StorageResult<()>;

    /// Fetch a snapshot by id.
    ///
    /// Returns `None` if the snapshot doesn't exist.
    fn get_snapshot(&self, id: Uuid) -> StorageResult<Option<SnapshotRecord>>;

    /// List a machine's snapshots, most recently created first.
    ///
    /// Ordering is by creation time with snapshot version as tiebreaker,
    /// so captures within the same instant still list deterministically.
    fn list_snapshots(
        &self,
        machine_id: Uuid,
        limit: Option<usize>,
    ) -> StorageResult<Vec<SnapshotRecord>>;

    /// Highest snapshot version assigned for a machine.
    ///
    /// Returns 0 if the machine has no snapshots.
    fn latest_snapshot_version(&self, machine_id: Uuid) -> StorageResult<u64>;

    /// Delete the given snapshots by id.
    ///
    /// Missing ids are ignored. Returns the number actually deleted.
    fn delete_snapshots(&self, ids: &[Uuid]) -> StorageResult<usize>;
}

#[cfg(test)]
mod tests {
    // Tests are in memory_storage.rs using MemoryStorage
}
