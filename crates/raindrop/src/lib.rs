//! Raindrop crate - incremental bookmark sync for Raindrop.io
//!
//! This crate provides:
//! - Domain models (Record, TokenSet, Account)
//! - Raindrop API client and OAuth token handling
//! - Storage trait abstractions with SQLite and per-file backends
//! - Incremental, multi-account sync engine
//!
//! All I/O is blocking. Paths are passed in by the caller; default locations
//! are resolved by the binary.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod sync;

pub use api::{BookmarkSource, OAuthEndpoint, RaindropClient};
pub use auth::{TokenManager, TokenStore, ValidToken};
pub use config::{AccountEntry, MultiAccountConfig, StorageConfig, SyncConfig, SyncSettings};
pub use error::{Error, Result};
pub use models::{Account, Credentials, Record, RecordKey, StoredRecord, TokenSet};
pub use storage::{
    BatchOutcome, FileRecordStore, KeyPolicy, RecordStore, SaveOutcome, SqliteRecordStore,
    StorageBackend, StoreStatus, UpdatePolicy, inspect_store, open_store,
};
pub use sync::{
    AccountReport, AccountStats, FetchError, FetchOutcome, PaginatedFetcher, RunOutcome,
    RunSummary, SyncOrchestrator,
};
