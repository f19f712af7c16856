//! Sync engine for fetching and storing bookmarks
//!
//! Runs are incremental: each account's store supplies the cursor, and only
//! records modified after it are fetched. Re-running a sync is safe.

mod fetcher;
mod orchestrator;

pub use fetcher::{FetchError, FetchOutcome, PaginatedFetcher};
pub use orchestrator::{
    AccountReport, AccountStats, DEFAULT_ACCOUNT_ID, RunOutcome, RunSummary, SyncOrchestrator,
};
