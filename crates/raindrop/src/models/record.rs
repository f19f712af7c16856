//! Bookmark records as fetched from the provider and as stored locally

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A bookmark as returned by the list endpoint
///
/// The raw provider JSON is kept alongside the extracted fields so storage
/// backends can persist the item unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Provider-assigned id (`_id`), unique within an account
    pub id: i64,
    /// Bookmarked URL (`link`); the provider allows saving the same URL twice
    pub url: String,
    pub title: String,
    /// ISO-8601 modification timestamp (`lastUpdate`)
    pub last_modified: String,
    /// ISO-8601 creation timestamp (`created`)
    pub created: Option<String>,
    pub raw: Value,
}

/// Fields we read out of a provider item
#[derive(Deserialize)]
struct RecordFields {
    #[serde(rename = "_id")]
    id: i64,
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "lastUpdate", default)]
    last_update: String,
    #[serde(default)]
    created: Option<String>,
}

impl Record {
    /// Build a record with a minimal provider payload
    pub fn new(
        id: i64,
        url: impl Into<String>,
        title: impl Into<String>,
        last_modified: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let title = title.into();
        let last_modified = last_modified.into();
        let raw = json!({
            "_id": id,
            "link": url,
            "title": title,
            "lastUpdate": last_modified,
        });
        Self {
            id,
            url,
            title,
            last_modified,
            created: None,
            raw,
        }
    }

    /// Decode a provider item, keeping the full JSON as metadata
    pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
        let fields = RecordFields::deserialize(&raw)?;
        Ok(Self {
            id: fields.id,
            url: fields.link,
            title: fields.title,
            last_modified: fields.last_update,
            created: fields.created,
            raw,
        })
    }

    /// Title for display, falling back to "Untitled"
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Untitled"
        } else {
            &self.title
        }
    }
}

/// Lookup key for stored records
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// Provider id (the preferred primary key)
    Id(i64),
    /// Bookmarked URL (legacy primary key)
    Url(String),
}

impl From<i64> for RecordKey {
    fn from(id: i64) -> Self {
        RecordKey::Id(id)
    }
}

impl From<&str> for RecordKey {
    fn from(url: &str) -> Self {
        RecordKey::Url(url.to_string())
    }
}

/// Durable projection of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    pub url: String,
    pub title: String,
    /// Raw provider item as it was when first stored
    pub metadata: Value,
}

impl StoredRecord {
    /// `lastUpdate` of the stored metadata, if present
    pub fn last_modified(&self) -> Option<&str> {
        self.metadata.get("lastUpdate").and_then(Value::as_str)
    }
}

impl From<&Record> for StoredRecord {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            url: record.url.clone(),
            title: record.title.clone(),
            metadata: record.raw.clone(),
        }
    }
}
