//! SQLite-backed bucket store
//!
//! Uses a single `buckets` table with the full identity tuple as primary key,
//! so seeding races collapse onto the table's uniqueness constraint:
//! `INSERT OR IGNORE` either creates the row or reports the conflict through
//! the affected-row count.
//!
//! The connection sits behind a `std::sync::Mutex` because SQLite connections
//! are not `Sync`; every statement is short-lived, so the mutex is never held
//! across an await point.

use crate::store::error::{StoreError, StoreResult};
use crate::store::types::{BucketKey, BucketRow, Resolution};
use crate::store::BucketStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Sentinel stored in place of an absent group key, keeping the primary key
/// total (SQLite treats NULLs as distinct in unique constraints).
const NO_GROUP: &str = "";

/// Durable bucket store over a single SQLite database.
pub struct SqliteBucketStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteBucketStore {
    /// Create or open the bucket database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// In-memory store, used by tests and benchmarks.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS buckets (
                chart        TEXT NOT NULL,
                resolution   TEXT NOT NULL,
                group_key    TEXT NOT NULL DEFAULT '',
                bucket_start INTEGER NOT NULL,
                payload      TEXT NOT NULL,
                PRIMARY KEY (chart, resolution, group_key, bucket_start)
            )",
            [],
        )?;
        Ok(())
    }

    /// Path of the backing database file, if file-based.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(format!("bucket store mutex poisoned: {}", e)))
    }

    fn decode_row(bucket_start: i64, payload: &str) -> StoreResult<BucketRow> {
        let bucket_start = DateTime::from_timestamp(bucket_start, 0).ok_or_else(|| {
            StoreError::Corruption(format!("invalid bucket timestamp {}", bucket_start))
        })?;

        Ok(BucketRow {
            bucket_start,
            payload: serde_json::from_str(payload)?,
        })
    }
}

fn group_column(group: Option<&str>) -> &str {
    group.unwrap_or(NO_GROUP)
}

#[async_trait]
impl BucketStore for SqliteBucketStore {
    async fn get(&self, key: &BucketKey) -> StoreResult<Option<Value>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT payload FROM buckets
             WHERE chart = ? AND resolution = ? AND group_key = ? AND bucket_start = ?",
        )?;

        let payload: Option<String> = stmt
            .query_row(
                params![
                    key.chart,
                    key.resolution.as_str(),
                    group_column(key.group.as_deref()),
                    key.bucket_start.timestamp(),
                ],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn insert_if_absent(&self, key: &BucketKey, payload: &Value) -> StoreResult<bool> {
        let text = serde_json::to_string(payload)?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "INSERT OR IGNORE INTO buckets (chart, resolution, group_key, bucket_start, payload)
             VALUES (?, ?, ?, ?, ?)",
        )?;

        let inserted = stmt.execute(params![
            key.chart,
            key.resolution.as_str(),
            group_column(key.group.as_deref()),
            key.bucket_start.timestamp(),
            text,
        ])?;

        Ok(inserted == 1)
    }

    async fn put(&self, key: &BucketKey, payload: &Value) -> StoreResult<()> {
        let text = serde_json::to_string(payload)?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "INSERT OR REPLACE INTO buckets (chart, resolution, group_key, bucket_start, payload)
             VALUES (?, ?, ?, ?, ?)",
        )?;

        stmt.execute(params![
            key.chart,
            key.resolution.as_str(),
            group_column(key.group.as_deref()),
            key.bucket_start.timestamp(),
            text,
        ])?;

        Ok(())
    }

    async fn latest_before(
        &self,
        chart: &str,
        resolution: Resolution,
        group: Option<&str>,
        before: DateTime<Utc>,
    ) -> StoreResult<Option<BucketRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT bucket_start, payload FROM buckets
             WHERE chart = ? AND resolution = ? AND group_key = ? AND bucket_start < ?
             ORDER BY bucket_start DESC
             LIMIT 1",
        )?;

        let row: Option<(i64, String)> = stmt
            .query_row(
                params![
                    chart,
                    resolution.as_str(),
                    group_column(group),
                    before.timestamp(),
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((bucket_start, payload)) => Ok(Some(Self::decode_row(bucket_start, &payload)?)),
            None => Ok(None),
        }
    }

    async fn list_until(
        &self,
        chart: &str,
        resolution: Resolution,
        group: Option<&str>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<BucketRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT bucket_start, payload FROM buckets
             WHERE chart = ? AND resolution = ? AND group_key = ? AND bucket_start <= ?
             ORDER BY bucket_start DESC
             LIMIT ?",
        )?;

        let rows = stmt.query_map(
            params![
                chart,
                resolution.as_str(),
                group_column(group),
                until.timestamp(),
                limit as i64,
            ],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )?;

        let mut out = Vec::new();
        for row in rows {
            let (bucket_start, payload) = row?;
            out.push(Self::decode_row(bucket_start, &payload)?);
        }

        Ok(out)
    }

    async fn groups_at(
        &self,
        chart: &str,
        resolution: Resolution,
        bucket_start: DateTime<Utc>,
    ) -> StoreResult<Vec<Option<String>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT group_key FROM buckets
             WHERE chart = ? AND resolution = ? AND bucket_start = ?
             ORDER BY group_key",
        )?;

        let rows = stmt.query_map(
            params![chart, resolution.as_str(), bucket_start.timestamp()],
            |row| row.get::<_, String>(0),
        )?;

        let mut out = Vec::new();
        for row in rows {
            let group = row?;
            out.push(if group == NO_GROUP { None } else { Some(group) });
        }

        Ok(out)
    }
}
