//! Snapshot capture, history, and bounded retention.
//!
//! [`SnapshotManager`] captures immutable point-in-time snapshots of a
//! machine's live state and keeps at most
//! [`retention_cap`](crate::config::EngineConfig::retention_cap) of them
//! per machine, evicting oldest-first by creation time.
//!
//! Capture is serialized per machine: snapshot versions are assigned
//! under a document-scoped lock, so version order and creation order
//! never diverge even under concurrent captures. Retention runs after the
//! snapshot has committed; an enforcement failure is logged and surfaced
//! nowhere else, because the primary effect (the new snapshot) already
//! succeeded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use uuid::Uuid;

use crate::codec::StateCodec;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::storage::MachineStorage;
use crate::types::{CaptureOptions, SnapshotRecord};

/// Manager for machine snapshots and their retention window.
pub struct SnapshotManager {
    storage: Arc<dyn MachineStorage>,
    codec: Arc<dyn StateCodec>,
    config: EngineConfig,
    /// Per-machine capture locks, created lazily on first capture.
    capture_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SnapshotManager {
    /// Create a snapshot manager with default configuration.
    pub fn new(storage: Arc<dyn MachineStorage>, codec: Arc<dyn StateCodec>) -> Self {
        Self::with_config(storage, codec, EngineConfig::default())
    }

    /// Create a snapshot manager with explicit configuration.
    pub fn with_config(
        storage: Arc<dyn MachineStorage>,
        codec: Arc<dyn StateCodec>,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            codec,
            config,
            capture_locks: RwLock::new(HashMap::new()),
        }
    }

    /// Capture a snapshot of a machine's current state.
    ///
    /// The snapshot is a consolidated, self-sufficient capture, not the
    /// raw operation log. Unnamed captures default to `"Versión {n}"`
    /// where `n` continues the machine's snapshot sequence. After the
    /// snapshot commits, retention is enforced; an enforcement failure
    /// never rolls the capture back.
    pub fn capture(&self, machine_id: Uuid, options: CaptureOptions) -> Result<SnapshotRecord> {
        let lock = self.capture_lock(machine_id);
        let _guard = lock.lock().unwrap();

        let machine = self
            .storage
            .get_machine(machine_id)?
            .ok_or(EngineError::MachineNotFound(machine_id))?;

        let capture = self.codec.snapshot(&machine.state)?;
        let version = self.storage.latest_snapshot_version(machine_id)? + 1;

        let record = SnapshotRecord {
            id: Uuid::new_v4(),
            machine_id,
            state: capture,
            version,
            name: options
                .name
                .unwrap_or_else(|| format!("Versión {}", version)),
            description: options.description,
            created_by: options.created_by,
            created_at: Utc::now(),
        };

        self.storage.insert_snapshot(&record)?;

        if let Err(e) = self.enforce_retention(machine_id) {
            log::warn!(
                "retention enforcement failed for machine {}: {}",
                machine_id,
                e
            );
        }

        Ok(record)
    }

    /// Evict snapshots beyond the retention cap, oldest by creation time
    /// first. Returns the number of snapshots evicted.
    pub fn enforce_retention(&self, machine_id: Uuid) -> Result<usize> {
        let snapshots = self.storage.list_snapshots(machine_id, None)?;

        if snapshots.len() <= self.config.retention_cap {
            return Ok(0);
        }

        let evict: Vec<Uuid> = snapshots[self.config.retention_cap..]
            .iter()
            .map(|snapshot| snapshot.id)
            .collect();

        let evicted = self.storage.delete_snapshots(&evict)?;
        log::debug!(
            "evicted {} snapshot(s) of machine {} past the cap of {}",
            evicted,
            machine_id,
            self.config.retention_cap
        );
        Ok(evicted)
    }

    /// Fetch a snapshot by id.
    pub fn get(&self, snapshot_id: Uuid) -> Result<SnapshotRecord> {
        self.storage
            .get_snapshot(snapshot_id)?
            .ok_or(EngineError::SnapshotNotFound(snapshot_id))
    }

    /// List a machine's snapshots, most recently created first.
    pub fn history(
        &self,
        machine_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<SnapshotRecord>> {
        self.storage.list_snapshots(machine_id, limit)
    }

    fn capture_lock(&self, machine_id: Uuid) -> Arc<Mutex<()>> {
        // Fast path: lock already exists
        {
            let locks = self.capture_locks.read().unwrap();
            if let Some(lock) = locks.get(&machine_id) {
                return Arc::clone(lock);
            }
        }

        let mut locks = self.capture_locks.write().unwrap();
        Arc::clone(locks.entry(machine_id).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::YrsCodec;
    use crate::memory_storage::MemoryStorage;
    use crate::state::MachineStateStore;
    use crate::types::MachineKind;
    use yrs::{Doc, Map, ReadTxn, StateVector, Transact};

    fn setup() -> (Arc<MemoryStorage>, MachineStateStore, SnapshotManager) {
        let storage = Arc::new(MemoryStorage::new());
        let codec = Arc::new(YrsCodec::new());
        let state = MachineStateStore::new(storage.clone(), codec.clone());
        let snapshots = SnapshotManager::new(storage.clone(), codec);
        (storage, state, snapshots)
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
    fn test_capture_defaults_to_versioned_name() {
        let (_, state, snapshots) = setup();
        let actor = Uuid::new_v4();
        let machine = state.create("m", None, MachineKind::Afd, actor).unwrap();

        let s1 = snapshots
            .capture(machine.id, CaptureOptions::unnamed(actor))
            .unwrap();
        assert_eq!(s1.version, 1);
        assert_eq!(s1.name, "Versión 1");

        let s2 = snapshots
            .capture(machine.id, CaptureOptions::unnamed(actor))
            .unwrap();
        assert_eq!(s2.version, 2);
        assert_eq!(s2.name, "Versión 2");
    }

    #[test]
    fn test_capture_keeps_explicit_name() {
        let (_, state, snapshots) = setup();
        let actor = Uuid::new_v4();
        let machine = state.create("m", None, MachineKind::Pda, actor).unwrap();

        let snapshot = snapshots
            .capture(
                machine.id,
                CaptureOptions::named("Antes del examen", actor)
                    .with_description("Estado estable"),
            )
            .unwrap();

        assert_eq!(snapshot.name, "Antes del examen");
        assert_eq!(snapshot.description.as_deref(), Some("Estado estable"));
        // Explicit names still consume a version slot
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn test_capture_missing_machine() {
        let (_, _, snapshots) = setup();
        let err = snapshots
            .capture(Uuid::new_v4(), CaptureOptions::unnamed(Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, EngineError::MachineNotFound(_)));
    }

    #[test]
    fn test_capture_is_point_in_time() {
        let (_, state, snapshots) = setup();
        let actor = Uuid::new_v4();
        let machine = state.create("m", None, MachineKind::Afd, actor).unwrap();

        state
            .merge(machine.id, &definition_update("q0", "initial"))
            .unwrap();
        let snapshot = snapshots
            .capture(machine.id, CaptureOptions::unnamed(actor))
            .unwrap();

        // Later edits must not leak into the captured state
        state
            .merge(machine.id, &definition_update("q1", "accepting"))
            .unwrap();

        let codec = YrsCodec::new();
        let captured = codec.project(&snapshot.state).unwrap();
        assert_eq!(captured["definition"]["q0"], "initial");
        assert!(captured["definition"].get("q1").is_none());
    }

    #[test]
    fn test_retention_evicts_oldest_by_creation() {
        let (_, state, snapshots) = setup();
        let actor = Uuid::new_v4();
        let machine = state.create("m", None, MachineKind::Turing, actor).unwrap();

        let first = snapshots
            .capture(machine.id, CaptureOptions::unnamed(actor))
            .unwrap();

        for _ in 0..10 {
            snapshots
                .capture(machine.id, CaptureOptions::unnamed(actor))
                .unwrap();
        }

        let history = snapshots.history(machine.id, None).unwrap();
        assert_eq!(history.len(), 10);
        // The first capture ever made is the one evicted
        assert!(history.iter().all(|s| s.id != first.id));
        // Versions keep counting past the eviction window
        assert_eq!(history[0].version, 11);
        assert_eq!(history[9].version, 2);
    }

    #[test]
    fn test_retention_cap_is_configurable() {
        let storage = Arc::new(MemoryStorage::new());
        let codec = Arc::new(YrsCodec::new());
        let state = MachineStateStore::new(storage.clone(), codec.clone());
        let snapshots = SnapshotManager::with_config(
            storage,
            codec,
            EngineConfig {
                retention_cap: 2,
                ..EngineConfig::default()
            },
        );

        let actor = Uuid::new_v4();
        let machine = state.create("m", None, MachineKind::Afnd, actor).unwrap();

        for _ in 0..5 {
            snapshots
                .capture(machine.id, CaptureOptions::unnamed(actor))
                .unwrap();
        }

        let history = snapshots.history(machine.id, None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 5);
        assert_eq!(history[1].version, 4);
    }

    #[test]
    fn test_enforce_retention_under_cap_is_noop() {
        let (_, state, snapshots) = setup();
        let actor = Uuid::new_v4();
        let machine = state.create("m", None, MachineKind::Afd, actor).unwrap();

        snapshots
            .capture(machine.id, CaptureOptions::unnamed(actor))
            .unwrap();

        assert_eq!(snapshots.enforce_retention(machine.id).unwrap(), 0);
        assert_eq!(snapshots.history(machine.id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_history_limit() {
        let (_, state, snapshots) = setup();
        let actor = Uuid::new_v4();
        let machine = state.create("m", None, MachineKind::Afd, actor).unwrap();

        for _ in 0..4 {
            snapshots
                .capture(machine.id, CaptureOptions::unnamed(actor))
                .unwrap();
        }

        let recent = snapshots.history(machine.id, Some(2)).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].version, 4);
        assert_eq!(recent[1].version, 3);
    }

    #[test]
    fn test_get_missing_snapshot() {
        let (_, _, snapshots) = setup();
        let err = snapshots.get(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, EngineError::SnapshotNotFound(_)));
    }

    #[test]
    fn test_concurrent_captures_assign_distinct_versions() {
        let (storage, state, _) = setup();
        let actor = Uuid::new_v4();
        let machine = state.create("m", None, MachineKind::Afd, actor).unwrap();

        let snapshots = Arc::new(SnapshotManager::new(
            storage,
            Arc::new(YrsCodec::new()),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let snapshots = Arc::clone(&snapshots);
            let machine_id = machine.id;
            handles.push(std::thread::spawn(move || {
                snapshots
                    .capture(machine_id, CaptureOptions::unnamed(actor))
                    .unwrap()
                    .version
            }));
        }

        let mut versions: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        versions.sort_unstable();
        assert_eq!(versions, (1..=8).collect::<Vec<u64>>());
    }
}
