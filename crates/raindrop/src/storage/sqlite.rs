//! SQLite-based bookmark storage

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::{debug, info, warn};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{BatchOutcome, KeyPolicy, RecordStore, SaveOutcome, UpdatePolicy};
use crate::error::{Error, Result};
use crate::models::{Record, RecordKey, StoredRecord, timestamp};

/// Columns that only exist in the pre-metadata bookmarks table
const LEGACY_COLUMNS: &[&str] = &["tags", "metadata", "fetched_at"];

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Bookmarks keyed by Raindrop id with the raw item as JSON.
        // IF NOT EXISTS adopts tables created before user_version was tracked.
        M::up(
            r#"
            CREATE TABLE IF NOT EXISTS bookmarks (
                raindrop_id INTEGER PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                raindrop_metadata TEXT NOT NULL
            );
            "#,
        ),
    ])
}

/// SQLite-based bookmark storage
///
/// First write wins: a record whose key is already stored is never updated.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    key_policy: KeyPolicy,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database at `db_path`
    ///
    /// Call [`RecordStore::initialize`] before use.
    pub fn open(db_path: impl AsRef<Path>, key_policy: KeyPolicy) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path).map_err(|e| {
            Error::storage(format!("Failed to open database at {}: {}", db_path.display(), e))
        })?;

        // WAL keeps readers unblocked while a batch transaction is open
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            key_policy,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::storage("Database connection lock poisoned"))
    }

    /// Column names of the bookmarks table (empty if the table is missing)
    pub fn columns(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        table_columns(&conn)
    }

    /// Whether `initialize` would drop the existing bookmarks table
    pub fn has_legacy_schema(&self) -> Result<bool> {
        Ok(is_legacy_schema(&self.columns()?))
    }
}

/// Column names of the bookmarks table
fn table_columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA table_info(bookmarks)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// A table with old columns, or without the raw item column, is legacy
fn is_legacy_schema(columns: &[String]) -> bool {
    if columns.is_empty() {
        return false;
    }
    let has_legacy = columns.iter().any(|c| LEGACY_COLUMNS.contains(&c.as_str()));
    let has_metadata = columns.iter().any(|c| c == "raindrop_metadata");
    has_legacy || !has_metadata
}

/// Drop a bookmarks table that predates the metadata schema
///
/// Legacy rows have no raw Raindrop item to rebuild from, so they are
/// discarded rather than backfilled. Returns whether a table was dropped.
fn drop_legacy_table(conn: &Connection) -> Result<bool> {
    let columns = table_columns(conn)?;
    if !is_legacy_schema(&columns) {
        return Ok(false);
    }

    let rows: i64 = conn.query_row("SELECT COUNT(*) FROM bookmarks", [], |row| row.get(0))?;
    warn!(
        "Bookmarks table has a legacy schema ({}); dropping it and discarding {} rows",
        columns.join(", "),
        rows
    );

    conn.execute_batch("DROP TABLE bookmarks;")?;
    // Let the migration recreate the table
    conn.pragma_update(None, "user_version", 0)?;

    Ok(true)
}

/// Insert a record unless its key is taken
fn insert_record(conn: &Connection, record: &Record, key_policy: KeyPolicy) -> Result<SaveOutcome> {
    let metadata = serde_json::to_string(&record.raw)?;

    // A conflict on the other unique column is an error, not a skip
    let sql = match key_policy {
        KeyPolicy::ExternalId => {
            "INSERT INTO bookmarks (raindrop_id, url, title, raindrop_metadata)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(raindrop_id) DO NOTHING"
        }
        KeyPolicy::Url => {
            "INSERT INTO bookmarks (raindrop_id, url, title, raindrop_metadata)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(url) DO NOTHING"
        }
    };

    let changed = conn.execute(sql, params![record.id, record.url, record.title, metadata])?;

    Ok(if changed > 0 {
        SaveOutcome::Inserted
    } else {
        SaveOutcome::Skipped
    })
}

/// Build a StoredRecord from raw column values
fn stored_record(id: i64, url: String, title: String, metadata: String) -> Result<StoredRecord> {
    let metadata = serde_json::from_str(&metadata).map_err(|e| {
        Error::storage(format!("Corrupt metadata for bookmark {}: {}", id, e))
    })?;
    Ok(StoredRecord {
        id,
        url,
        title,
        metadata,
    })
}

impl RecordStore for SqliteRecordStore {
    fn initialize(&self) -> Result<()> {
        let mut conn = self.conn()?;

        if drop_legacy_table(&conn)? {
            info!("Recreating bookmarks table with the current schema");
        }

        migrations().to_latest(&mut conn)?;
        Ok(())
    }

    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::FirstWriteWins
    }

    fn save_one(&self, record: &Record) -> Result<SaveOutcome> {
        let conn = self.conn()?;
        insert_record(&conn, record, self.key_policy)
    }

    fn save_batch(&self, records: &[Record]) -> Result<BatchOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut outcome = BatchOutcome::default();

        for record in records {
            match insert_record(&tx, record, self.key_policy) {
                Ok(result) => outcome.record(result),
                Err(e) => {
                    // SQLite rolls back only the failed statement
                    warn!("Failed to save bookmark {} ({}): {}", record.id, record.url, e);
                    outcome.skipped += 1;
                }
            }
        }

        tx.commit()?;
        debug!(
            "Saved batch: {} saved, {} skipped",
            outcome.saved, outcome.skipped
        );
        Ok(outcome)
    }

    fn exists(&self, key: &RecordKey) -> Result<bool> {
        let conn = self.conn()?;

        let found: bool = match key {
            RecordKey::Id(id) => conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM bookmarks WHERE raindrop_id = ?)",
                [id],
                |row| row.get(0),
            )?,
            RecordKey::Url(url) => conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM bookmarks WHERE url = ?)",
                [url],
                |row| row.get(0),
            )?,
        };

        Ok(found)
    }

    fn get(&self, key: &RecordKey) -> Result<Option<StoredRecord>> {
        let conn = self.conn()?;

        let map_row = |row: &rusqlite::Row<'_>| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        };

        let row = match key {
            RecordKey::Id(id) => conn
                .query_row(
                    "SELECT raindrop_id, url, title, raindrop_metadata
                     FROM bookmarks WHERE raindrop_id = ?",
                    [id],
                    map_row,
                )
                .optional()?,
            RecordKey::Url(url) => conn
                .query_row(
                    "SELECT raindrop_id, url, title, raindrop_metadata
                     FROM bookmarks WHERE url = ?",
                    [url],
                    map_row,
                )
                .optional()?,
        };

        let Some((id, url, title, metadata)) = row else {
            return Ok(None);
        };

        stored_record(id, url, title, metadata).map(Some)
    }

    fn get_all(&self) -> Result<Vec<StoredRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT raindrop_id, url, title, raindrop_metadata
             FROM bookmarks
             ORDER BY raindrop_id DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, url, title, metadata)| stored_record(id, url, title, metadata))
            .collect()
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM bookmarks", [], |row| row.get(0))?;

        Ok(count as usize)
    }

    fn most_recent_modification(&self) -> Result<Option<String>> {
        let conn = self.conn()?;

        let mut stmt =
            conn.prepare("SELECT json_extract(raindrop_metadata, '$.lastUpdate') FROM bookmarks")?;

        let values = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(timestamp::latest(values.iter().flatten().map(String::as_str)).map(str::to_string))
    }
}
