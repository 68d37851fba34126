//! Rollback to a prior snapshot with automatic backup.
//!
//! A restore runs REQUESTED → AUTO_BACKUP → APPLY → DONE and fails closed
//! at either intermediate step:
//!
//! 1. The target snapshot is fetched and checked against the machine; a
//!    snapshot belonging to another machine is rejected with state
//!    untouched.
//! 2. AUTO_BACKUP captures the current live state as a regular snapshot.
//!    If the backup fails, the restore aborts before any live mutation.
//! 3. APPLY materializes the target snapshot into a full state and
//!    replaces the live state under the normal version discipline. If
//!    this fails, live state is unchanged and the backup snapshot remains
//!    usable for a manual retry.
//!
//! The backup is durable before the overwrite is attempted, so no restore
//! can silently destroy unsaved work. Each restore consumes one slot of
//! the machine's retention window.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::StateCodec;
use crate::error::{EngineError, Result};
use crate::snapshot::SnapshotManager;
use crate::state::MachineStateStore;
use crate::types::{CaptureOptions, SnapshotRecord};

/// Description attached to every automatic pre-restore backup.
const AUTO_BACKUP_DESCRIPTION: &str = "Guardado automático antes de restore";

/// Outcome of a successful restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restored {
    /// Name of the snapshot the machine was restored from
    pub restored_from: String,

    /// Machine version after the rollback write
    pub version: u64,

    /// The automatic backup taken before the rollback
    pub backup: SnapshotRecord,
}

/// Coordinator for backup-then-overwrite restores.
pub struct RestoreCoordinator {
    state: Arc<MachineStateStore>,
    snapshots: Arc<SnapshotManager>,
    codec: Arc<dyn StateCodec>,
}

impl RestoreCoordinator {
    /// Create a restore coordinator over the given components.
    pub fn new(
        state: Arc<MachineStateStore>,
        snapshots: Arc<SnapshotManager>,
        codec: Arc<dyn StateCodec>,
    ) -> Self {
        Self {
            state,
            snapshots,
            codec,
        }
    }

    /// Roll a machine back to a prior snapshot.
    ///
    /// The current live state is always captured as
    /// `"Auto-save antes de restaurar {snapshot.name}"` before the
    /// overwrite; see the module docs for the failure semantics.
    pub fn restore(
        &self,
        machine_id: Uuid,
        snapshot_id: Uuid,
        created_by: Uuid,
    ) -> Result<Restored> {
        let snapshot = self.snapshots.get(snapshot_id)?;
        if snapshot.machine_id != machine_id {
            return Err(EngineError::SnapshotMismatch {
                snapshot_id,
                machine_id,
            });
        }

        // AUTO_BACKUP: abort the whole restore if this fails
        let backup = self.snapshots.capture(
            machine_id,
            CaptureOptions::named(
                format!("Auto-save antes de restaurar {}", snapshot.name),
                created_by,
            )
            .with_description(AUTO_BACKUP_DESCRIPTION),
        )?;

        // APPLY: materialize the capture and overwrite live state
        let full_state = self.codec.materialize(&snapshot.state)?;
        let version = self.state.replace_state(machine_id, &full_state)?;

        Ok(Restored {
            restored_from: snapshot.name,
            version,
            backup,
        })
    }
}
