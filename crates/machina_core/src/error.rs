use thiserror::Error;
use uuid::Uuid;

/// Unified error type for machina operations
#[derive(Debug, Error)]
pub enum EngineError {
    // Missing records
    #[error("machine {0} not found")]
    MachineNotFound(Uuid),

    #[error("snapshot {0} not found")]
    SnapshotNotFound(Uuid),

    /// The snapshot exists but belongs to a different machine. Restores
    /// across machines are rejected without touching any state.
    #[error("snapshot {snapshot_id} does not belong to machine {machine_id}")]
    SnapshotMismatch { snapshot_id: Uuid, machine_id: Uuid },

    // Write races
    /// A version-checked write lost the race too many times. The caller
    /// may retry the whole operation.
    #[error("version conflict on machine {0}: concurrent write, retry")]
    Conflict(Uuid),

    // Codec failures
    /// A persisted blob could not be decoded. Unrecoverable for that
    /// record; never silently repaired.
    #[error("corrupt machine state: {0}")]
    Corrupt(String),

    // Persistence failures
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type alias for machina operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl EngineError {
    /// Whether this error indicates a missing record (machine or snapshot).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::MachineNotFound(_)
                | EngineError::SnapshotNotFound(_)
                | EngineError::SnapshotMismatch { .. }
        )
    }

    /// Whether the caller may retry the operation after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }
}
