//! SQLite-backed row store.
//!
//! Axis values are persisted raw (unscaled integers), matching the decoder's
//! wire representation, so scaling can change without a migration.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, params_from_iter, Connection};
use tracing::debug;

use contracts::{AxisTriple, BufferedReading, RowStore, StoredReading, TelemetryError};

pub struct SqliteRowStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteRowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRowStore").finish_non_exhaustive()
    }
}

fn sql_err(kind: &str, e: rusqlite::Error) -> TelemetryError {
    match kind {
        "write" => TelemetryError::storage_write(e.to_string()),
        _ => TelemetryError::storage_query(e.to_string()),
    }
}

impl SqliteRowStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let conn = Connection::open(path).map_err(|e| sql_err("write", e))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, TelemetryError> {
        let conn = Connection::open_in_memory().map_err(|e| sql_err("write", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, TelemetryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                ppg INTEGER,
                acc_x INTEGER, acc_y INTEGER, acc_z INTEGER,
                gyro_x INTEGER, gyro_y INTEGER, gyro_z INTEGER,
                synced INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_readings_synced ON readings(synced, id);
            "#,
        )
        .map_err(|e| sql_err("write", e))?;
        debug!("row store schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, TelemetryError> {
        self.conn
            .lock()
            .map_err(|_| TelemetryError::storage_query("connection lock poisoned"))
    }

    fn update_synced(&self, ids: &[i64], synced: bool) -> Result<(), TelemetryError> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.lock()?;
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "UPDATE readings SET synced = {} WHERE id IN ({placeholders})",
            synced as i64
        );
        conn.execute(&sql, params_from_iter(ids.iter()))
            .map_err(|e| sql_err("write", e))?;
        Ok(())
    }
}

impl RowStore for SqliteRowStore {
    fn insert_batch(&self, readings: &[BufferedReading]) -> Result<(), TelemetryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| sql_err("write", e))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO readings \
                     (timestamp, ppg, acc_x, acc_y, acc_z, gyro_x, gyro_y, gyro_z) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(|e| sql_err("write", e))?;
            for r in readings {
                stmt.execute(params![
                    r.timestamp_ms,
                    r.ppg,
                    r.acc.map(|a| a.x),
                    r.acc.map(|a| a.y),
                    r.acc.map(|a| a.z),
                    r.gyro.map(|g| g.x),
                    r.gyro.map(|g| g.y),
                    r.gyro.map(|g| g.z),
                ])
                .map_err(|e| sql_err("write", e))?;
            }
        }
        tx.commit().map_err(|e| sql_err("write", e))
    }

    fn unsynced_count(&self) -> Result<u64, TelemetryError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM readings WHERE synced = 0",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .map_err(|e| sql_err("query", e))
    }

    fn unsynced_time_range(&self) -> Result<Option<(i64, i64)>, TelemetryError> {
        let conn = self.lock()?;
        let (lo, hi): (Option<i64>, Option<i64>) = conn
            .query_row(
                "SELECT MIN(timestamp), MAX(timestamp) FROM readings WHERE synced = 0",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| sql_err("query", e))?;
        Ok(lo.zip(hi))
    }

    fn fetch_unsynced(&self, limit: usize) -> Result<Vec<StoredReading>, TelemetryError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, timestamp, ppg, acc_x, acc_y, acc_z, gyro_x, gyro_y, gyro_z \
                 FROM readings WHERE synced = 0 ORDER BY id ASC LIMIT ?1",
            )
            .map_err(|e| sql_err("query", e))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let acc = match (
                    row.get::<_, Option<i16>>(3)?,
                    row.get::<_, Option<i16>>(4)?,
                    row.get::<_, Option<i16>>(5)?,
                ) {
                    (Some(x), Some(y), Some(z)) => Some(AxisTriple::new(x, y, z)),
                    _ => None,
                };
                let gyro = match (
                    row.get::<_, Option<i16>>(6)?,
                    row.get::<_, Option<i16>>(7)?,
                    row.get::<_, Option<i16>>(8)?,
                ) {
                    (Some(x), Some(y), Some(z)) => Some(AxisTriple::new(x, y, z)),
                    _ => None,
                };
                Ok(StoredReading {
                    id: row.get(0)?,
                    reading: BufferedReading {
                        timestamp_ms: row.get(1)?,
                        ppg: row.get(2)?,
                        acc,
                        gyro,
                    },
                    synced: false,
                })
            })
            .map_err(|e| sql_err("query", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| sql_err("query", e))?;
        Ok(rows)
    }

    fn mark_synced(&self, ids: &[i64]) -> Result<(), TelemetryError> {
        self.update_synced(ids, true)
    }

    fn reset_synced(&self, ids: &[i64]) -> Result<(), TelemetryError> {
        self.update_synced(ids, false)
    }
}
