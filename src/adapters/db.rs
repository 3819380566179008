use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::domain::bin_record::BinRecord;

pub const LATEST_SCHEMA_VERSION: u32 = 2;
pub const RETAINED_SNAPSHOTS: u32 = 20;

const MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        r#"
CREATE TABLE IF NOT EXISTS bin_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload_json TEXT NOT NULL,
    saved_at TEXT NOT NULL
);
"#,
    ),
    (
        2,
        r#"
ALTER TABLE bin_snapshots ADD COLUMN bin_count INTEGER NOT NULL DEFAULT 0;

CREATE INDEX IF NOT EXISTS idx_bin_snapshots_saved_at_desc
ON bin_snapshots (saved_at DESC);
"#,
    ),
];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("cached snapshot is not valid JSON: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("database lock poisoned")]
    LockPoisoned,
}

/// Offline copy of the last canonical bin list.
pub trait BinCache: Send + Sync + 'static {
    fn load(&self) -> Result<Option<Vec<BinRecord>>, DbError>;
    fn save(&self, bins: &[BinRecord]) -> Result<(), DbError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub id: i64,
    pub saved_at: String,
    pub bin_count: i64,
    pub payload_json: String,
}

#[derive(Clone)]
pub struct SqliteBinCache {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteBinCache {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    pub fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| DbError::LockPoisoned)?;
        op(&connection)
    }
}

impl BinCache for SqliteBinCache {
    fn load(&self) -> Result<Option<Vec<BinRecord>>, DbError> {
        self.with_connection(load_latest_bins)
    }

    fn save(&self, bins: &[BinRecord]) -> Result<(), DbError> {
        let saved_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.with_connection(|connection| {
            insert_snapshot(connection, bins, &saved_at)?;
            prune_snapshots(connection, RETAINED_SNAPSHOTS)?;
            Ok(())
        })
    }
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

pub fn insert_snapshot(
    connection: &Connection,
    bins: &[BinRecord],
    saved_at: &str,
) -> Result<i64, DbError> {
    let payload_json = serde_json::to_string(bins)?;
    let bin_count = i64::try_from(bins.len()).unwrap_or(i64::MAX);

    connection.execute(
        "INSERT INTO bin_snapshots (payload_json, saved_at, bin_count) VALUES (?1, ?2, ?3)",
        params![payload_json, saved_at, bin_count],
    )?;

    Ok(connection.last_insert_rowid())
}

pub fn get_latest_snapshot(connection: &Connection) -> Result<Option<SnapshotRecord>, DbError> {
    connection
        .query_row(
            "SELECT id, saved_at, bin_count, payload_json
             FROM bin_snapshots
             ORDER BY id DESC
             LIMIT 1",
            [],
            |row| {
                Ok(SnapshotRecord {
                    id: row.get(0)?,
                    saved_at: row.get(1)?,
                    bin_count: row.get(2)?,
                    payload_json: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(DbError::from)
}

pub fn count_snapshots(connection: &Connection) -> Result<i64, DbError> {
    let count = connection.query_row("SELECT COUNT(*) FROM bin_snapshots", [], |row| row.get(0))?;
    Ok(count)
}

pub fn prune_snapshots(connection: &Connection, keep: u32) -> Result<usize, DbError> {
    let removed = connection.execute(
        "DELETE FROM bin_snapshots
         WHERE id NOT IN (SELECT id FROM bin_snapshots ORDER BY id DESC LIMIT ?1)",
        params![i64::from(keep)],
    )?;
    Ok(removed)
}

pub fn load_latest_bins(connection: &Connection) -> Result<Option<Vec<BinRecord>>, DbError> {
    match get_latest_snapshot(connection)? {
        Some(snapshot) => Ok(Some(serde_json::from_str(&snapshot.payload_json)?)),
        None => Ok(None),
    }
}
