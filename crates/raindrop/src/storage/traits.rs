//! Storage trait definitions

use crate::error::Result;
use crate::models::{Record, RecordKey, StoredRecord};

/// Result of saving a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// No record with this key existed
    Inserted,
    /// An existing record was replaced (overwrite-on-change backends only)
    Overwritten,
    /// Nothing was written
    Skipped,
}

impl SaveOutcome {
    /// Whether anything was written
    pub fn is_saved(self) -> bool {
        !matches!(self, SaveOutcome::Skipped)
    }
}

/// Counts from saving a batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub saved: usize,
    /// Includes records whose save failed
    pub skipped: usize,
}

impl BatchOutcome {
    pub fn record(&mut self, outcome: SaveOutcome) {
        if outcome.is_saved() {
            self.saved += 1;
        } else {
            self.skipped += 1;
        }
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.saved += other.saved;
        self.skipped += other.skipped;
    }
}

/// How a backend treats a record whose key is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Keep the stored record; later saves for the key are no-ops
    FirstWriteWins,
    /// Replace the stored record when its `lastUpdate` differs
    OverwriteOnChange,
}

/// Which field identifies a stored record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Provider id (`_id`)
    #[default]
    ExternalId,
    /// Bookmarked URL, for stores created by older versions
    Url,
}

/// Trait for bookmark storage operations
///
/// Implementations are selected by configuration and must agree on the
/// semantics documented here, except for [`UpdatePolicy`].
pub trait RecordStore: Send + Sync {
    /// Ensure the storage target exists with the current schema
    ///
    /// Safe to call repeatedly.
    fn initialize(&self) -> Result<()>;

    /// Policy applied when a key is already stored
    fn update_policy(&self) -> UpdatePolicy;

    /// Save one record according to the backend's update policy
    fn save_one(&self, record: &Record) -> Result<SaveOutcome>;

    /// Save records as one unit of work
    ///
    /// A failure on one record is logged and counted as skipped; the rest of
    /// the batch is still written.
    fn save_batch(&self, records: &[Record]) -> Result<BatchOutcome>;

    /// Check if a record with this key is stored
    fn exists(&self, key: &RecordKey) -> Result<bool>;

    /// Get one stored record
    fn get(&self, key: &RecordKey) -> Result<Option<StoredRecord>>;

    /// All stored records, highest id first
    fn get_all(&self) -> Result<Vec<StoredRecord>>;

    /// Count stored records
    fn count(&self) -> Result<usize>;

    /// Latest `lastUpdate` across stored records; `None` when empty
    ///
    /// This is the incremental sync cursor.
    fn most_recent_modification(&self) -> Result<Option<String>>;
}
