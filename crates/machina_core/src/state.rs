//! Live machine state and version sequencing.
//!
//! [`MachineStateStore`] owns every write to a machine's live CRDT state.
//! A write is a read-merge-write (or read-replace-write) sequence guarded
//! by an optimistic version check in storage: two concurrent writers can
//! never both observe version V and both commit V+1. The CRDT merge is
//! order-independent for content, but version assignment is not, so the
//! losing writer reloads and retries a bounded number of times before
//! surfacing [`EngineError::Conflict`].

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::codec::StateCodec;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::storage::MachineStorage;
use crate::types::{MachineKind, MachineRecord};

/// Store for live machine state, versions, and machine lifecycle.
pub struct MachineStateStore {
    storage: Arc<dyn MachineStorage>,
    codec: Arc<dyn StateCodec>,
    config: EngineConfig,
}

impl MachineStateStore {
    /// Create a state store with default configuration.
    pub fn new(storage: Arc<dyn MachineStorage>, codec: Arc<dyn StateCodec>) -> Self {
        Self::with_config(storage, codec, EngineConfig::default())
    }

    /// Create a state store with explicit configuration.
    pub fn with_config(
        storage: Arc<dyn MachineStorage>,
        codec: Arc<dyn StateCodec>,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            codec,
            config,
        }
    }

    // ==================== Lifecycle ====================

    /// Create a machine with an empty definition at version 1.
    pub fn create(
        &self,
        name: &str,
        description: Option<&str>,
        kind: MachineKind,
        created_by: Uuid,
    ) -> Result<MachineRecord> {
        self.create_record(name, description, kind, self.codec.empty_state(), created_by)
    }

    /// Create a machine seeded from a caller-provided initial state.
    ///
    /// The blob is validated by merging it into an empty document, so a
    /// machine is never persisted with undecodable state.
    pub fn create_with_state(
        &self,
        name: &str,
        description: Option<&str>,
        kind: MachineKind,
        initial_state: &[u8],
        created_by: Uuid,
    ) -> Result<MachineRecord> {
        let state = self.codec.merge(&self.codec.empty_state(), initial_state)?;
        self.create_record(name, description, kind, state, created_by)
    }

    fn create_record(
        &self,
        name: &str,
        description: Option<&str>,
        kind: MachineKind,
        state: Vec<u8>,
        created_by: Uuid,
    ) -> Result<MachineRecord> {
        let now = Utc::now();
        let record = MachineRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            kind,
            state,
            version: 1,
            created_by,
            archived: false,
            created_at: now,
            updated_at: now,
        };

        self.storage.insert_machine(&record)?;
        Ok(record)
    }

    /// Fetch a machine record.
    pub fn get(&self, machine_id: Uuid) -> Result<MachineRecord> {
        self.storage
            .get_machine(machine_id)?
            .ok_or(EngineError::MachineNotFound(machine_id))
    }

    /// Load a machine's live state and current version.
    pub fn load(&self, machine_id: Uuid) -> Result<(Vec<u8>, u64)> {
        let record = self.get(machine_id)?;
        Ok((record.state, record.version))
    }

    /// Update name and/or description. Metadata writes do not bump the
    /// state version.
    pub fn update_meta(
        &self,
        machine_id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        if self
            .storage
            .update_machine_meta(machine_id, name, description)?
        {
            Ok(())
        } else {
            Err(EngineError::MachineNotFound(machine_id))
        }
    }

    /// Hide a machine from active listings.
    pub fn archive(&self, machine_id: Uuid) -> Result<()> {
        self.set_archived(machine_id, true)
    }

    /// Bring an archived machine back.
    pub fn unarchive(&self, machine_id: Uuid) -> Result<()> {
        self.set_archived(machine_id, false)
    }

    fn set_archived(&self, machine_id: Uuid, archived: bool) -> Result<()> {
        if self.storage.set_archived(machine_id, archived)? {
            Ok(())
        } else {
            Err(EngineError::MachineNotFound(machine_id))
        }
    }

    /// Delete a machine and all of its snapshots.
    pub fn delete(&self, machine_id: Uuid) -> Result<()> {
        if self.storage.delete_machine(machine_id)? {
            Ok(())
        } else {
            Err(EngineError::MachineNotFound(machine_id))
        }
    }

    // ==================== State writes ====================

    /// Merge an incoming CRDT update into a machine's live state.
    ///
    /// Returns the new version. The merge itself converges regardless of
    /// delivery order; the version check serializes counter assignment.
    pub fn merge(&self, machine_id: Uuid, update: &[u8]) -> Result<u64> {
        self.write_state(machine_id, |codec, current| codec.merge(current, update))
    }

    /// Replace a machine's live state wholesale (no merge).
    ///
    /// Same version discipline as [`merge`](Self::merge). Used by restore
    /// to apply a materialized snapshot.
    pub fn replace_state(&self, machine_id: Uuid, new_state: &[u8]) -> Result<u64> {
        self.write_state(machine_id, |_, _| Ok(new_state.to_vec()))
    }

    /// Version-checked write loop shared by merge and replace.
    fn write_state<F>(&self, machine_id: Uuid, next_state: F) -> Result<u64>
    where
        F: Fn(&dyn StateCodec, &[u8]) -> Result<Vec<u8>>,
    {
        for _ in 0..self.config.write_retries {
            let record = self.get(machine_id)?;
            let state = next_state(self.codec.as_ref(), &record.state)?;

            if self
                .storage
                .compare_and_set_state(machine_id, record.version, &state, Utc::now())?
            {
                return Ok(record.version + 1);
            }
            // Lost the race: reload and try again against the new version.
        }

        Err(EngineError::Conflict(machine_id))
    }
}
