//! SQLite-backed storage implementation for machine persistence.
//!
//! This module provides a persistent storage backend using SQLite for
//! machine records and their snapshots. The version check of
//! [`compare_and_set_state`](crate::storage::MachineStorage::compare_and_set_state)
//! maps onto a single conditional `UPDATE`, so the check-and-increment is
//! atomic at the database level.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::EngineError;
use crate::storage::{MachineStorage, StorageResult};
use crate::types::{MachineRecord, SnapshotRecord};

/// SQLite-backed machine storage.
///
/// # Thread Safety
///
/// The connection is wrapped in a `Mutex` for thread-safe access.
/// SQLite itself is used in serialized threading mode.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

/// Raw machine row: everything as SQL-native types, converted in
/// [`machine_from_row`].
type MachineRow = (
    String,
    String,
    Option<String>,
    String,
    Vec<u8>,
    i64,
    String,
    i64,
    i64,
    i64,
);

/// Raw snapshot row, same idea.
type SnapshotRow = (
    String,
    String,
    Vec<u8>,
    i64,
    String,
    Option<String>,
    String,
    i64,
);

impl SqliteStorage {
    /// Open or create a SQLite database at the given path.
    ///
    /// This will create the necessary tables if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database for testing.
    ///
    /// Data is lost when the storage is dropped.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            -- Live machine records
            CREATE TABLE IF NOT EXISTS machines (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                kind TEXT NOT NULL,
                state BLOB NOT NULL,
                version INTEGER NOT NULL,
                created_by TEXT NOT NULL,
                archived INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Immutable snapshots, owned by one machine each
            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                machine_id TEXT NOT NULL,
                state BLOB NOT NULL,
                version INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                created_by TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            -- Index for retention and history queries
            CREATE INDEX IF NOT EXISTS idx_snapshots_machine_created
                ON snapshots(machine_id, created_at DESC, version DESC);
            "#,
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

fn parse_uuid(text: &str) -> StorageResult<Uuid> {
    text.parse()
        .map_err(|e| EngineError::Storage(format!("invalid uuid '{}': {}", text, e)))
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn machine_from_row(row: MachineRow) -> StorageResult<MachineRecord> {
    let (id, name, description, kind, state, version, created_by, archived, created_at, updated_at) =
        row;

    Ok(MachineRecord {
        id: parse_uuid(&id)?,
        name,
        description,
        kind: kind
            .parse()
            .map_err(|e: String| EngineError::Storage(e))?,
        state,
        version: version as u64,
        created_by: parse_uuid(&created_by)?,
        archived: archived != 0,
        created_at: millis_to_datetime(created_at),
        updated_at: millis_to_datetime(updated_at),
    })
}

fn snapshot_from_row(row: SnapshotRow) -> StorageResult<SnapshotRecord> {
    let (id, machine_id, state, version, name, description, created_by, created_at) = row;

    Ok(SnapshotRecord {
        id: parse_uuid(&id)?,
        machine_id: parse_uuid(&machine_id)?,
        state,
        version: version as u64,
        name,
        description,
        created_by: parse_uuid(&created_by)?,
        created_at: millis_to_datetime(created_at),
    })
}

impl MachineStorage for SqliteStorage {
    fn insert_machine(&self, machine: &MachineRecord) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO machines (id, name, description, kind, state, version, created_by, archived, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                machine.id.to_string(),
                machine.name,
                machine.description,
                machine.kind.to_string(),
                machine.state,
                machine.version as i64,
                machine.created_by.to_string(),
                machine.archived as i32,
                machine.created_at.timestamp_millis(),
                machine.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn get_machine(&self, id: Uuid) -> StorageResult<Option<MachineRecord>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<MachineRow> = conn
            .query_row(
                "SELECT id, name, description, kind, state, version, created_by, archived, created_at, updated_at
                 FROM machines WHERE id = ?",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                    ))
                },
            )
            .optional()?;

        row.map(machine_from_row).transpose()
    }

    fn compare_and_set_state(
        &self,
        id: Uuid,
        expected_version: u64,
        state: &[u8],
        updated_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE machines SET state = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
            params![
                state,
                updated_at.timestamp_millis(),
                id.to_string(),
                expected_version as i64,
            ],
        )?;
        Ok(changed > 0)
    }

    fn update_machine_meta(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE machines SET name = COALESCE(?, name), description = COALESCE(?, description)
             WHERE id = ?",
            params![name, description, id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn set_archived(&self, id: Uuid, archived: bool) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE machines SET archived = ? WHERE id = ?",
            params![archived as i32, id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn delete_machine(&self, id: Uuid) -> StorageResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM snapshots WHERE machine_id = ?",
            params![id.to_string()],
        )?;
        let deleted = tx.execute("DELETE FROM machines WHERE id = ?", params![id.to_string()])?;

        tx.commit()?;
        Ok(deleted > 0)
    }

    fn insert_snapshot(&self, snapshot: &SnapshotRecord) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO snapshots (id, machine_id, state, version, name, description, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                snapshot.id.to_string(),
                snapshot.machine_id.to_string(),
                snapshot.state,
                snapshot.version as i64,
                snapshot.name,
                snapshot.description,
                snapshot.created_by.to_string(),
                snapshot.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn get_snapshot(&self, id: Uuid) -> StorageResult<Option<SnapshotRecord>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<SnapshotRow> = conn
            .query_row(
                "SELECT id, machine_id, state, version, name, description, created_by, created_at
                 FROM snapshots WHERE id = ?",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()?;

        row.map(snapshot_from_row).transpose()
    }

    fn list_snapshots(
        &self,
        machine_id: Uuid,
        limit: Option<usize>,
    ) -> StorageResult<Vec<SnapshotRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, machine_id, state, version, name, description, created_by, created_at
             FROM snapshots WHERE machine_id = ?
             ORDER BY created_at DESC, version DESC
             LIMIT ?",
        )?;

        let rows: Vec<SnapshotRow> = stmt
            .query_map(
                params![
                    machine_id.to_string(),
                    limit.map(|l| l as i64).unwrap_or(-1)
                ],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )?
            .collect::<Result<_, _>>()?;

        rows.into_iter().map(snapshot_from_row).collect()
    }

    fn latest_snapshot_version(&self, machine_id: Uuid) -> StorageResult<u64> {
        let conn = self.conn.lock().unwrap();
        let version: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM snapshots WHERE machine_id = ?",
            params![machine_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(version as u64)
    }

    fn delete_snapshots(&self, ids: &[Uuid]) -> StorageResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut deleted = 0;
        for id in ids {
            deleted += tx.execute(
                "DELETE FROM snapshots WHERE id = ?",
                params![id.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(deleted)
    }
}
