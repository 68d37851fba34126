//! Core record types for machines and snapshots.
//!
//! This module defines the persisted shape of an abstract machine and its
//! snapshots. Records are plain data: all behavior lives in the engine
//! components ([`state`](crate::state), [`snapshot`](crate::snapshot),
//! [`restore`](crate::restore), [`diff`](crate::diff)).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The family of abstract machine a document describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineKind {
    /// Turing machine
    Turing,
    /// Deterministic finite automaton
    Afd,
    /// Non-deterministic finite automaton
    Afnd,
    /// Pushdown automaton
    Pda,
}

impl std::fmt::Display for MachineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineKind::Turing => write!(f, "TURING"),
            MachineKind::Afd => write!(f, "AFD"),
            MachineKind::Afnd => write!(f, "AFND"),
            MachineKind::Pda => write!(f, "PDA"),
        }
    }
}

impl std::str::FromStr for MachineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TURING" => Ok(MachineKind::Turing),
            "AFD" => Ok(MachineKind::Afd),
            "AFND" => Ok(MachineKind::Afnd),
            "PDA" => Ok(MachineKind::Pda),
            _ => Err(format!("Unknown machine kind: {}", s)),
        }
    }
}

/// A collaboratively edited abstract machine document.
///
/// The live definition is `state`, an opaque CRDT encoding that only a
/// [`StateCodec`](crate::codec::StateCodec) interprets. `version` starts
/// at 1 and increments by exactly one per successful state write; the
/// engine never persists a state without its matching version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Unique machine identifier
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Machine family (Turing, AFD, AFND, PDA)
    pub kind: MachineKind,

    /// Merged CRDT state of the machine definition
    pub state: Vec<u8>,

    /// Strictly increasing write counter, starts at 1
    pub version: u64,

    /// Actor that created the machine
    pub created_by: Uuid,

    /// Whether the machine is hidden from active listings
    pub archived: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last state write
    pub updated_at: DateTime<Utc>,
}

/// An immutable point-in-time capture of a machine's state.
///
/// `state` is self-sufficient: it decodes into a full machine definition
/// without the live document or any other snapshot. `version` is a
/// per-machine sequence independent of the machine's own version counter,
/// assigned at capture time and used for default naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Unique snapshot identifier
    pub id: Uuid,

    /// Owning machine. Never repointed after creation.
    pub machine_id: Uuid,

    /// Self-sufficient capture of the machine state
    pub state: Vec<u8>,

    /// Per-machine snapshot sequence, starts at 1
    pub version: u64,

    /// Snapshot name, defaults to "Versión {version}"
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Actor that requested the capture
    pub created_by: Uuid,

    /// Creation timestamp; retention evicts oldest-first by this field
    pub created_at: DateTime<Utc>,
}

/// Options for capturing a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Snapshot name; when absent the capture is named "Versión {n}"
    pub name: Option<String>,

    /// Optional description
    pub description: Option<String>,

    /// Actor requesting the capture
    pub created_by: Uuid,
}

impl CaptureOptions {
    /// Capture with the default "Versión {n}" name.
    pub fn unnamed(created_by: Uuid) -> Self {
        Self {
            name: None,
            description: None,
            created_by,
        }
    }

    /// Capture with an explicit name.
    pub fn named(name: impl Into<String>, created_by: Uuid) -> Self {
        Self {
            name: Some(name.into()),
            description: None,
            created_by,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
