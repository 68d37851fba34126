//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Maximum number of snapshots retained per machine by default.
pub const DEFAULT_RETENTION_CAP: usize = 10;

/// Default number of attempts for a version-checked write before
/// surfacing a conflict to the caller.
pub const DEFAULT_WRITE_RETRIES: u32 = 5;

/// Tunables for the versioning engine.
///
/// The defaults match the production behavior: ten snapshots per machine,
/// five optimistic-write attempts before giving up with a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum snapshots kept per machine. Older snapshots (by creation
    /// time) are evicted when a capture pushes the count past the cap.
    pub retention_cap: usize,

    /// Attempts for a version-checked state write before returning
    /// [`EngineError::Conflict`](crate::error::EngineError::Conflict).
    pub write_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention_cap: DEFAULT_RETENTION_CAP,
            write_retries: DEFAULT_WRITE_RETRIES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.retention_cap, 10);
        assert_eq!(config.write_retries, 5);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig = serde_json::from_str(r#"{"retention_cap": 3}"#).unwrap();
        assert_eq!(config.retention_cap, 3);
        assert_eq!(config.write_retries, DEFAULT_WRITE_RETRIES);
    }
}
