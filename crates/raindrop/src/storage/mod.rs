//! Storage traits and implementations
//!
//! This module defines the storage abstraction for synced bookmarks. The
//! trait-based design lets configuration choose between a SQLite table and
//! one JSON file per bookmark.

mod file;
mod sqlite;
mod traits;

use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use file::FileRecordStore;
pub use sqlite::SqliteRecordStore;
pub use traits::{BatchOutcome, KeyPolicy, RecordStore, SaveOutcome, UpdatePolicy};

use crate::error::{Error, Result};

/// Available storage backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageBackend {
    /// `bookmarks` table in a SQLite database
    #[default]
    Sqlite,
    /// Directory of `{id}.json` files
    Files,
}

impl StorageBackend {
    /// Storage location for one account under `root`
    pub fn location(&self, root: &Path, account: &str) -> PathBuf {
        match self {
            StorageBackend::Sqlite => root.join(format!("{}.sqlite", account)),
            StorageBackend::Files => root.join(account),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "db" => Ok(StorageBackend::Sqlite),
            "files" | "file" | "json" => Ok(StorageBackend::Files),
            other => Err(Error::config(format!("Unknown storage backend: {}", other))),
        }
    }
}

/// Open and initialize a store at `location`
///
/// `key_policy` only applies to the SQLite backend; files are always named by id.
pub fn open_store(
    backend: StorageBackend,
    location: &Path,
    key_policy: KeyPolicy,
) -> Result<Box<dyn RecordStore>> {
    let store: Box<dyn RecordStore> = match backend {
        StorageBackend::Sqlite => Box::new(SqliteRecordStore::open(location, key_policy)?),
        StorageBackend::Files => Box::new(FileRecordStore::new(location)),
    };
    store.initialize()?;
    Ok(store)
}

/// State of an existing store, read without creating or migrating anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    /// Nothing at the location yet
    Missing,
    /// SQLite table in a pre-metadata schema; dropped by the next `initialize`
    LegacySchema,
    Ready {
        count: usize,
        cursor: Option<String>,
    },
}

/// Read a store's state without initializing it
pub fn inspect_store(
    backend: StorageBackend,
    location: &Path,
    key_policy: KeyPolicy,
) -> Result<StoreStatus> {
    if !location.exists() {
        return Ok(StoreStatus::Missing);
    }

    let store: Box<dyn RecordStore> = match backend {
        StorageBackend::Sqlite => {
            let store = SqliteRecordStore::open(location, key_policy)?;
            if store.has_legacy_schema()? {
                return Ok(StoreStatus::LegacySchema);
            }
            if store.columns()?.is_empty() {
                return Ok(StoreStatus::Ready {
                    count: 0,
                    cursor: None,
                });
            }
            Box::new(store)
        }
        StorageBackend::Files => Box::new(FileRecordStore::new(location)),
    };

    Ok(StoreStatus::Ready {
        count: store.count()?,
        cursor: store.most_recent_modification()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use tempfile::tempdir;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("sqlite".parse::<StorageBackend>().unwrap(), StorageBackend::Sqlite);
        assert_eq!("Files".parse::<StorageBackend>().unwrap(), StorageBackend::Files);
        assert!("redis".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_location_per_account() {
        let root = Path::new("/data");
        assert_eq!(
            StorageBackend::Sqlite.location(root, "work"),
            PathBuf::from("/data/work.sqlite")
        );
        assert_eq!(StorageBackend::Files.location(root, "work"), PathBuf::from("/data/work"));
    }

    #[test]
    fn test_open_store_backends_share_semantics() {
        let dir = tempdir().unwrap();

        for backend in [StorageBackend::Sqlite, StorageBackend::Files] {
            let location = backend.location(dir.path(), "acct");
            let store = open_store(backend, &location, KeyPolicy::ExternalId).unwrap();
            let batch = vec![
                Record::new(1, "https://a.com", "A", "2023-01-01T10:00:00Z"),
                Record::new(2, "https://b.com", "B", "2023-01-01T20:00:00Z"),
            ];

            assert_eq!(store.save_batch(&batch).unwrap(), BatchOutcome { saved: 2, skipped: 0 });
            assert_eq!(store.save_batch(&batch).unwrap(), BatchOutcome { saved: 0, skipped: 2 });
            assert_eq!(
                store.most_recent_modification().unwrap().as_deref(),
                Some("2023-01-01T20:00:00Z"),
                "{:?}",
                backend
            );
        }
    }

    #[test]
    fn test_inspect_store_leaves_legacy_table_alone() {
        let dir = tempdir().unwrap();
        let location = StorageBackend::Sqlite.location(dir.path(), "old");
        {
            let conn = rusqlite::Connection::open(&location).unwrap();
            conn.execute_batch(
                "CREATE TABLE bookmarks (url TEXT PRIMARY KEY, title TEXT NOT NULL, tags TEXT);
                 INSERT INTO bookmarks (url, title, tags) VALUES ('https://old.com', 'Old', '[]');",
            )
            .unwrap();
        }

        let status = inspect_store(StorageBackend::Sqlite, &location, KeyPolicy::ExternalId);
        assert_eq!(status.unwrap(), StoreStatus::LegacySchema);

        let conn = rusqlite::Connection::open(&location).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM bookmarks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        let tags: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('bookmarks') WHERE name = 'tags'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tags, 1);
    }

    #[test]
    fn test_inspect_store_states() {
        let dir = tempdir().unwrap();

        for backend in [StorageBackend::Sqlite, StorageBackend::Files] {
            let location = backend.location(dir.path(), "acct");
            assert_eq!(
                inspect_store(backend, &location, KeyPolicy::ExternalId).unwrap(),
                StoreStatus::Missing
            );

            let store = open_store(backend, &location, KeyPolicy::ExternalId).unwrap();
            store
                .save_one(&Record::new(1, "https://a.com", "A", "2023-01-01T10:00:00Z"))
                .unwrap();

            assert_eq!(
                inspect_store(backend, &location, KeyPolicy::ExternalId).unwrap(),
                StoreStatus::Ready {
                    count: 1,
                    cursor: Some("2023-01-01T10:00:00Z".to_string()),
                },
                "{:?}",
                backend
            );
        }
    }

    #[test]
    fn test_inspect_store_empty_database() {
        let dir = tempdir().unwrap();
        let location = StorageBackend::Sqlite.location(dir.path(), "blank");
        rusqlite::Connection::open(&location).unwrap();

        assert_eq!(
            inspect_store(StorageBackend::Sqlite, &location, KeyPolicy::ExternalId).unwrap(),
            StoreStatus::Ready {
                count: 0,
                cursor: None,
            }
        );
    }
}
