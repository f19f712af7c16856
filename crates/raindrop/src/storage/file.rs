//! File-based bookmark storage
//!
//! Directory structure:
//! ```text
//! bookmarks/
//!   123.json     # raw Raindrop item with _id 123
//!   456.json
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_json::Value;

use super::traits::{BatchOutcome, RecordStore, SaveOutcome, UpdatePolicy};
use crate::error::{Error, Result};
use crate::models::{Record, RecordKey, StoredRecord, timestamp};

/// One JSON file per bookmark, named by Raindrop id
///
/// Unlike the SQLite store, a record whose `lastUpdate` changed replaces the
/// stored file.
pub struct FileRecordStore {
    root: PathBuf,
}

impl FileRecordStore {
    /// Create a store rooted at `root`
    ///
    /// Call [`RecordStore::initialize`] before use.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the file path for a bookmark id
    fn record_path(&self, id: i64) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    /// Read a stored item; `None` if the file is missing
    fn read_raw(&self, path: &Path) -> Result<Option<Value>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_str(&content).map_err(|e| {
            Error::storage(format!("Corrupt bookmark file {}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }

    fn write_raw(&self, path: &Path, raw: &Value) -> Result<()> {
        let content = serde_json::to_string_pretty(raw)?;

        // Write atomically (write to temp, then rename)
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// All readable stored records, unordered
    ///
    /// Unreadable files are logged and left out.
    fn load_all(&self) -> Result<Vec<StoredRecord>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let raw = match self.read_raw(&path) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping unreadable bookmark file: {}", e);
                    continue;
                }
            };

            match Record::from_value(raw) {
                Ok(record) => records.push(StoredRecord::from(&record)),
                Err(e) => warn!("Skipping bookmark file {}: {}", path.display(), e),
            }
        }

        Ok(records)
    }
}

impl RecordStore for FileRecordStore {
    fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            Error::storage(format!(
                "Failed to create bookmark directory {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::OverwriteOnChange
    }

    fn save_one(&self, record: &Record) -> Result<SaveOutcome> {
        let path = self.record_path(record.id);

        let outcome = match self.read_raw(&path)? {
            Some(existing) => {
                let stored_update = existing.get("lastUpdate").and_then(Value::as_str);
                if stored_update == Some(record.last_modified.as_str()) {
                    return Ok(SaveOutcome::Skipped);
                }
                SaveOutcome::Overwritten
            }
            None => SaveOutcome::Inserted,
        };

        self.write_raw(&path, &record.raw)?;
        debug!("{:?} bookmark file {}", outcome, path.display());
        Ok(outcome)
    }

    fn save_batch(&self, records: &[Record]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for record in records {
            match self.save_one(record) {
                Ok(result) => outcome.record(result),
                Err(e) => {
                    warn!("Failed to save bookmark {} ({}): {}", record.id, record.url, e);
                    outcome.skipped += 1;
                }
            }
        }

        Ok(outcome)
    }

    fn exists(&self, key: &RecordKey) -> Result<bool> {
        match key {
            RecordKey::Id(id) => Ok(self.record_path(*id).exists()),
            RecordKey::Url(url) => Ok(self.load_all()?.iter().any(|r| &r.url == url)),
        }
    }

    fn get(&self, key: &RecordKey) -> Result<Option<StoredRecord>> {
        match key {
            RecordKey::Id(id) => {
                let Some(raw) = self.read_raw(&self.record_path(*id))? else {
                    return Ok(None);
                };
                let record = Record::from_value(raw)?;
                Ok(Some(StoredRecord::from(&record)))
            }
            RecordKey::Url(url) => Ok(self.load_all()?.into_iter().find(|r| &r.url == url)),
        }
    }

    fn get_all(&self) -> Result<Vec<StoredRecord>> {
        let mut records = self.load_all()?;
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.load_all()?.len())
    }

    fn most_recent_modification(&self) -> Result<Option<String>> {
        let records = self.load_all()?;
        let latest = timestamp::latest(records.iter().filter_map(StoredRecord::last_modified));
        Ok(latest.map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_store() -> (FileRecordStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = FileRecordStore::new(dir.path().join("bookmarks"));
        store.initialize().unwrap();
        (store, dir)
    }

    #[test]
    fn test_save_writes_raw_item() {
        let (store, _dir) = create_test_store();
        let record = Record::new(123, "https://example.com", "Example", "2023-01-01T00:00:00Z");

        assert_eq!(store.save_one(&record).unwrap(), SaveOutcome::Inserted);

        let path = store.root().join("123.json");
        let on_disk: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(on_disk, record.raw);
    }

    #[test]
    fn test_unchanged_record_is_skipped() {
        let (store, _dir) = create_test_store();
        let record = Record::new(1, "https://example.com", "Example", "2023-01-01T00:00:00Z");

        store.save_one(&record).unwrap();
        assert_eq!(store.save_one(&record).unwrap(), SaveOutcome::Skipped);
    }

    #[test]
    fn test_changed_record_is_overwritten() {
        let (store, _dir) = create_test_store();
        let original = Record::new(1, "https://example.com", "Before", "2023-01-01T00:00:00Z");
        let edited = Record::new(1, "https://example.com", "After", "2023-02-01T00:00:00Z");

        store.save_one(&original).unwrap();
        assert_eq!(store.save_one(&edited).unwrap(), SaveOutcome::Overwritten);

        let stored = store.get(&RecordKey::Id(1)).unwrap().unwrap();
        assert_eq!(stored.title, "After");
    }

    #[test]
    fn test_save_batch_counts() {
        let (store, _dir) = create_test_store();
        let batch: Vec<Record> = (1..=3)
            .map(|i| Record::new(i, format!("https://e{}.com", i), "E", "2023-01-01T00:00:00Z"))
            .collect();

        assert_eq!(store.save_batch(&batch).unwrap(), BatchOutcome { saved: 3, skipped: 0 });
        assert_eq!(store.save_batch(&batch).unwrap(), BatchOutcome { saved: 0, skipped: 3 });
    }

    #[test]
    fn test_exists_and_get_by_url() {
        let (store, _dir) = create_test_store();
        store
            .save_one(&Record::new(9, "https://nine.com", "Nine", "2023-01-01T00:00:00Z"))
            .unwrap();

        assert!(store.exists(&RecordKey::Id(9)).unwrap());
        assert!(store.exists(&"https://nine.com".into()).unwrap());
        assert!(!store.exists(&RecordKey::Id(10)).unwrap());
        assert_eq!(store.get(&"https://nine.com".into()).unwrap().unwrap().id, 9);
    }

    #[test]
    fn test_get_all_ignores_other_files() {
        let (store, _dir) = create_test_store();
        store
            .save_one(&Record::new(1, "https://a.com", "A", "2023-01-01T00:00:00Z"))
            .unwrap();
        store
            .save_one(&Record::new(2, "https://b.com", "B", "2023-01-01T00:00:00Z"))
            .unwrap();
        fs::write(store.root().join("notes.txt"), "ignore me").unwrap();
        fs::write(store.root().join("broken.json"), "{").unwrap();

        let ids: Vec<i64> = store.get_all().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_most_recent_modification() {
        let (store, _dir) = create_test_store();
        assert!(store.most_recent_modification().unwrap().is_none());

        store
            .save_one(&Record::new(1, "https://a.com", "A", "2023-01-01T10:00:00Z"))
            .unwrap();
        store
            .save_one(&Record::new(2, "https://b.com", "B", "2023-01-01T20:00:00Z"))
            .unwrap();

        assert_eq!(
            store.most_recent_modification().unwrap().as_deref(),
            Some("2023-01-01T20:00:00Z")
        );
    }

    #[test]
    fn test_missing_root_reads_as_empty() {
        let dir = tempdir().unwrap();
        let store = FileRecordStore::new(dir.path().join("not-created"));

        assert!(store.get_all().unwrap().is_empty());
        assert!(store.most_recent_modification().unwrap().is_none());
    }
}
