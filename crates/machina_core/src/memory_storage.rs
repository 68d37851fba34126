//! In-memory storage implementation for testing.
//!
//! This provides a simple in-memory implementation of [`MachineStorage`]
//! for use in unit tests and lightweight embedding.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::storage::{MachineStorage, StorageResult};
use crate::types::{MachineRecord, SnapshotRecord};

/// In-memory machine storage for testing.
///
/// This implementation stores all data in memory using `HashMap`.
/// It's thread-safe via `RwLock` but data is lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    /// Machine records by id
    machines: RwLock<HashMap<Uuid, MachineRecord>>,

    /// Snapshot records by id
    snapshots: RwLock<HashMap<Uuid, SnapshotRecord>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MachineStorage for MemoryStorage {
    fn insert_machine(&self, machine: &MachineRecord) -> StorageResult<()> {
        let mut machines = self.machines.write().unwrap();
        machines.insert(machine.id, machine.clone());
        Ok(())
    }

    fn get_machine(&self, id: Uuid) -> StorageResult<Option<MachineRecord>> {
        let machines = self.machines.read().unwrap();
        Ok(machines.get(&id).cloned())
    }

    fn compare_and_set_state(
        &self,
        id: Uuid,
        expected_version: u64,
        state: &[u8],
        updated_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut machines = self.machines.write().unwrap();

        match machines.get_mut(&id) {
            Some(machine) if machine.version == expected_version => {
                machine.state = state.to_vec();
                machine.version += 1;
                machine.updated_at = updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn update_machine_meta(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> StorageResult<bool> {
        let mut machines = self.machines.write().unwrap();

        match machines.get_mut(&id) {
            Some(machine) => {
                if let Some(name) = name {
                    machine.name = name.to_string();
                }
                if let Some(description) = description {
                    machine.description = Some(description.to_string());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_archived(&self, id: Uuid, archived: bool) -> StorageResult<bool> {
        let mut machines = self.machines.write().unwrap();

        match machines.get_mut(&id) {
            Some(machine) => {
                machine.archived = archived;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_machine(&self, id: Uuid) -> StorageResult<bool> {
        let mut machines = self.machines.write().unwrap();
        let mut snapshots = self.snapshots.write().unwrap();

        let existed = machines.remove(&id).is_some();
        snapshots.retain(|_, snapshot| snapshot.machine_id != id);
        Ok(existed)
    }

    fn insert_snapshot(&self, snapshot: &SnapshotRecord) -> StorageResult<()> {
        let mut snapshots = self.snapshots.write().unwrap();
        snapshots.insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    fn get_snapshot(&self, id: Uuid) -> StorageResult<Option<SnapshotRecord>> {
        let snapshots = self.snapshots.read().unwrap();
        Ok(snapshots.get(&id).cloned())
    }

    fn list_snapshots(
        &self,
        machine_id: Uuid,
        limit: Option<usize>,
    ) -> StorageResult<Vec<SnapshotRecord>> {
        let snapshots = self.snapshots.read().unwrap();

        let mut listed: Vec<SnapshotRecord> = snapshots
            .values()
            .filter(|snapshot| snapshot.machine_id == machine_id)
            .cloned()
            .collect();

        listed.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.version.cmp(&a.version))
        });

        if let Some(limit) = limit {
            listed.truncate(limit);
        }

        Ok(listed)
    }

    fn latest_snapshot_version(&self, machine_id: Uuid) -> StorageResult<u64> {
        let snapshots = self.snapshots.read().unwrap();

        Ok(snapshots
            .values()
            .filter(|snapshot| snapshot.machine_id == machine_id)
            .map(|snapshot| snapshot.version)
            .max()
            .unwrap_or(0))
    }

    fn delete_snapshots(&self, ids: &[Uuid]) -> StorageResult<usize> {
        let mut snapshots = self.snapshots.write().unwrap();

        let mut deleted = 0;
        for id in ids {
            if snapshots.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
