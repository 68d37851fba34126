//! Snapshot-to-snapshot comparison.
//!
//! [`DiffEngine`] decodes two snapshots into independent documents and
//! returns their canonical projections side by side. Structural diffing
//! and rendering of the pair is the caller's responsibility; this engine
//! only guarantees that the two views are comparable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{Projection, StateCodec};
use crate::error::{EngineError, Result};
use crate::storage::MachineStorage;
use crate::types::SnapshotRecord;

/// One side of a comparison: snapshot identity plus its projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotView {
    /// Snapshot id
    pub id: Uuid,

    /// Snapshot name
    pub name: String,

    /// Canonical projection of the captured state
    pub projection: Projection,
}

/// Result of comparing two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    /// First snapshot, as requested by the caller
    pub a: SnapshotView,

    /// Second snapshot, as requested by the caller
    pub b: SnapshotView,
}

/// Engine for pairing two snapshots into comparable projections.
pub struct DiffEngine {
    storage: Arc<dyn MachineStorage>,
    codec: Arc<dyn StateCodec>,
}

impl DiffEngine {
    /// Create a diff engine over the given storage and codec.
    pub fn new(storage: Arc<dyn MachineStorage>, codec: Arc<dyn StateCodec>) -> Self {
        Self { storage, codec }
    }

    /// Decode two snapshots into independent canonical projections.
    ///
    /// Each snapshot is materialized on its own; neither depends on the
    /// live machine or on the other. The snapshots may belong to
    /// different machines.
    pub fn compare(&self, snapshot_a: Uuid, snapshot_b: Uuid) -> Result<Comparison> {
        let a = self.fetch(snapshot_a)?;
        let b = self.fetch(snapshot_b)?;

        Ok(Comparison {
            a: self.view(a)?,
            b: self.view(b)?,
        })
    }

    fn fetch(&self, snapshot_id: Uuid) -> Result<SnapshotRecord> {
        self.storage
            .get_snapshot(snapshot_id)?
            .ok_or(EngineError::SnapshotNotFound(snapshot_id))
    }

    fn view(&self, snapshot: SnapshotRecord) -> Result<SnapshotView> {
        Ok(SnapshotView {
            id: snapshot.id,
            name: snapshot.name,
            projection: self.codec.project(&snapshot.state)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::YrsCodec;
    use crate::memory_storage::MemoryStorage;
    use crate::snapshot::SnapshotManager;
    use crate::state::MachineStateStore;
    use crate::types::{CaptureOptions, MachineKind};
    use yrs::{Doc, Map, ReadTxn, StateVector, Transact};

    struct Fixture {
        state: MachineStateStore,
        snapshots: SnapshotManager,
        diff: DiffEngine,
    }

    fn setup() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let codec = Arc::new(YrsCodec::new());
        Fixture {
            state: MachineStateStore::new(storage.clone(), codec.clone()),
            snapshots: SnapshotManager::new(storage.clone(), codec.clone()),
            diff: DiffEngine::new(storage, codec),
        }
    }

    fn definition_update(key: &str, value: &str) -> Vec<u8> {
        let doc = Doc::new();
        let map = doc.get_or_insert_map("definition");
        {
            let mut txn = doc.transact_mut();
            map.insert(&mut txn, key, value.to_string());
        }
        let txn = doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    #[test]
    fn test_compare_pairs_projections() {
        let f = setup();
        let actor = Uuid::new_v4();
        let machine = f.state.create("m", None, MachineKind::Afd, actor).unwrap();

        f.state
            .merge(machine.id, &definition_update("q0", "initial"))
            .unwrap();
        let s1 = f
            .snapshots
            .capture(machine.id, CaptureOptions::unnamed(actor))
            .unwrap();

        f.state
            .merge(machine.id, &definition_update("q1", "accepting"))
            .unwrap();
        let s2 = f
            .snapshots
            .capture(machine.id, CaptureOptions::unnamed(actor))
            .unwrap();

        let comparison = f.diff.compare(s1.id, s2.id).unwrap();

        assert_eq!(comparison.a.id, s1.id);
        assert_eq!(comparison.a.name, "Versión 1");
        assert_eq!(comparison.b.id, s2.id);

        assert!(comparison.a.projection["definition"].get("q1").is_none());
        assert_eq!(comparison.b.projection["definition"]["q1"], "accepting");
    }

    #[test]
    fn test_compare_is_symmetric() {
        let f = setup();
        let actor = Uuid::new_v4();
        let machine = f.state.create("m", None, MachineKind::Turing, actor).unwrap();

        f.state
            .merge(machine.id, &definition_update("q0", "x"))
            .unwrap();
        let s1 = f
            .snapshots
            .capture(machine.id, CaptureOptions::unnamed(actor))
            .unwrap();
        f.state
            .merge(machine.id, &definition_update("q1", "y"))
            .unwrap();
        let s2 = f
            .snapshots
            .capture(machine.id, CaptureOptions::unnamed(actor))
            .unwrap();

        let forward = f.diff.compare(s1.id, s2.id).unwrap();
        let backward = f.diff.compare(s2.id, s1.id).unwrap();

        assert_eq!(forward.a.projection, backward.b.projection);
        assert_eq!(forward.b.projection, backward.a.projection);
    }

    #[test]
    fn test_compare_snapshot_with_itself() {
        let f = setup();
        let actor = Uuid::new_v4();
        let machine = f.state.create("m", None, MachineKind::Pda, actor).unwrap();

        f.state
            .merge(machine.id, &definition_update("q0", "x"))
            .unwrap();
        let s1 = f
            .snapshots
            .capture(machine.id, CaptureOptions::unnamed(actor))
            .unwrap();

        let comparison = f.diff.compare(s1.id, s1.id).unwrap();
        assert_eq!(comparison.a.projection, comparison.b.projection);
    }

    #[test]
    fn test_compare_across_machines() {
        let f = setup();
        let actor = Uuid::new_v4();
        let m1 = f.state.create("m1", None, MachineKind::Afd, actor).unwrap();
        let m2 = f.state.create("m2", None, MachineKind::Afnd, actor).unwrap();

        let s1 = f
            .snapshots
            .capture(m1.id, CaptureOptions::unnamed(actor))
            .unwrap();
        let s2 = f
            .snapshots
            .capture(m2.id, CaptureOptions::unnamed(actor))
            .unwrap();

        // Comparison is read-only and machine-agnostic
        let comparison = f.diff.compare(s1.id, s2.id).unwrap();
        assert_eq!(comparison.a.id, s1.id);
        assert_eq!(comparison.b.id, s2.id);
    }

    #[test]
    fn test_compare_missing_snapshot() {
        let f = setup();
        let actor = Uuid::new_v4();
        let machine = f.state.create("m", None, MachineKind::Afd, actor).unwrap();
        let s1 = f
            .snapshots
            .capture(machine.id, CaptureOptions::unnamed(actor))
            .unwrap();

        let err = f.diff.compare(s1.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, EngineError::SnapshotNotFound(_)));

        let err = f.diff.compare(Uuid::new_v4(), s1.id).unwrap_err();
        assert!(matches!(err, EngineError::SnapshotNotFound(_)));
    }
}
