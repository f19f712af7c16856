//! Sync runs across one or more accounts

use std::time::Instant;

use log::{debug, error, info, warn};

use super::fetcher::{FetchError, PaginatedFetcher};
use crate::api::{BookmarkSource, OAuthEndpoint};
use crate::auth::TokenStore;
use crate::config::{SyncConfig, SyncSettings};
use crate::error::{Error, Result};
use crate::models::{Account, Record};
use crate::storage::{BatchOutcome, RecordStore, open_store};

/// Account id used when no account list is configured
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Records kept per account for previews
const SAMPLE_SIZE: usize = 5;

/// Statistics from syncing one account
#[derive(Debug, Default, Clone)]
pub struct AccountStats {
    /// Number of records returned by the fetcher
    pub fetched: usize,
    /// Number of records written
    pub saved: usize,
    /// Number of records already stored or failing to save
    pub skipped: usize,
    /// Batches that failed as a whole; their records count as skipped
    pub failed_batches: usize,
    /// Cursor the fetch started from, if any
    pub cursor: Option<String>,
    /// First few fetched records
    pub samples: Vec<Record>,
    /// Duration of the sync operation
    pub duration_ms: u64,
}

/// Result of one account in a run
#[derive(Debug, Clone)]
pub struct AccountReport {
    pub account_id: String,
    /// Stats on success, error message on failure
    pub result: std::result::Result<AccountStats, String>,
}

impl AccountReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn stats(&self) -> Option<&AccountStats> {
        self.result.as_ref().ok()
    }
}

/// How a run ended overall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every account synced
    Complete,
    /// Some accounts failed
    Partial,
    /// No account synced
    Failed,
}

/// Per-account breakdown and totals of one run
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub accounts: Vec<AccountReport>,
}

impl RunSummary {
    fn successes(&self) -> impl Iterator<Item = &AccountStats> {
        self.accounts.iter().filter_map(AccountReport::stats)
    }

    pub fn fetched(&self) -> usize {
        self.successes().map(|s| s.fetched).sum()
    }

    pub fn saved(&self) -> usize {
        self.successes().map(|s| s.saved).sum()
    }

    pub fn skipped(&self) -> usize {
        self.successes().map(|s| s.skipped).sum()
    }

    pub fn failures(&self) -> usize {
        self.accounts.iter().filter(|a| !a.is_success()).count()
    }

    pub fn outcome(&self) -> RunOutcome {
        let failures = self.failures();
        if failures == 0 && !self.accounts.is_empty() {
            RunOutcome::Complete
        } else if failures < self.accounts.len() {
            RunOutcome::Partial
        } else {
            RunOutcome::Failed
        }
    }
}

/// Drives accounts through token validation, fetching and persistence
///
/// Accounts run one after another; a failing account is logged and does not
/// stop the others.
pub struct SyncOrchestrator<'a> {
    oauth: &'a dyn OAuthEndpoint,
    source: &'a dyn BookmarkSource,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(oauth: &'a dyn OAuthEndpoint, source: &'a dyn BookmarkSource) -> Self {
        Self { oauth, source }
    }

    /// Run one sync
    ///
    /// Per-account failures are recorded in the summary. An error is returned
    /// only when single-account mode has no credentials or no stored tokens.
    pub fn run_once(&self, config: &SyncConfig) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        if let Some(list) = config.accounts.as_ref().filter(|a| !a.is_empty()) {
            let accounts = list.to_accounts();
            info!("Syncing {} accounts", accounts.len());

            for account in &accounts {
                let token_store = TokenStore::new(config.account_token_path(account));
                let report = self.report(account, &token_store, config);
                summary.accounts.push(report);
            }
        } else {
            let credentials = config.credentials.clone().ok_or_else(|| {
                Error::config("No account list and no client credentials configured")
            })?;
            let account = Account::new(DEFAULT_ACCOUNT_ID, credentials);
            let token_store = TokenStore::new(&config.token_path);

            if !token_store.exists() {
                return Err(Error::authentication(format!(
                    "No tokens found at {}; run the auth flow first",
                    token_store.path().display()
                )));
            }

            let report = self.report(&account, &token_store, config);
            summary.accounts.push(report);
        }

        info!(
            "Sync finished: {} fetched, {} saved, {} skipped, {} failed accounts",
            summary.fetched(),
            summary.saved(),
            summary.skipped(),
            summary.failures()
        );
        Ok(summary)
    }

    fn report(&self, account: &Account, token_store: &TokenStore, config: &SyncConfig) -> AccountReport {
        let result = self.sync_account(account, token_store, config).map_err(|e| {
            error!("Account {} failed: {}", account.id, e);
            e.to_string()
        });

        AccountReport {
            account_id: account.id.clone(),
            result,
        }
    }

    /// Sync one account into its own store
    ///
    /// Tokens are read from `token_store` first, then from the account
    /// definition. Refreshed tokens are written back to `token_store`, also
    /// when the fetch fails after a refresh.
    pub fn sync_account(
        &self,
        account: &Account,
        token_store: &TokenStore,
        config: &SyncConfig,
    ) -> Result<AccountStats> {
        let start = Instant::now();

        let tokens = match token_store.load()? {
            Some(tokens) => tokens,
            None => account.tokens.clone().ok_or_else(|| {
                Error::authentication(format!("No tokens for account {}", account.id))
            })?,
        };

        let location = config.storage.location(account);
        let store = open_store(config.storage.backend, &location, config.storage.key_policy)?;
        let cursor = store.most_recent_modification()?;
        match &cursor {
            Some(c) => info!("Account {}: fetching bookmarks modified after {}", account.id, c),
            None => info!("Account {}: fetching all bookmarks", account.id),
        }

        let fetcher = PaginatedFetcher::new(self.oauth, self.source).with_settings(&config.settings);
        let fetched = match fetcher.fetch_all(&account.credentials, &tokens, cursor.as_deref()) {
            Ok(fetched) => fetched,
            Err(FetchError {
                error,
                updated_tokens,
            }) => {
                if let Some(refreshed) = updated_tokens
                    && let Err(e) = token_store.save(&refreshed)
                {
                    warn!("Failed to save refreshed tokens for {}: {}", account.id, e);
                }
                return Err(error);
            }
        };

        if let Some(refreshed) = &fetched.updated_tokens {
            token_store.save(refreshed)?;
            debug!("Saved refreshed tokens to {}", token_store.path().display());
        }

        let batches = save_in_batches(store.as_ref(), &fetched.records, &config.settings);
        if batches.failed > 0 {
            warn!(
                "Account {}: {} of {} batches failed, {} committed",
                account.id,
                batches.failed,
                batches.committed + batches.failed,
                batches.committed
            );
        }

        let stats = AccountStats {
            fetched: fetched.records.len(),
            saved: batches.outcome.saved,
            skipped: batches.outcome.skipped,
            failed_batches: batches.failed,
            cursor,
            samples: fetched.records.iter().take(SAMPLE_SIZE).cloned().collect(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Account {}: {} fetched, {} saved, {} skipped",
            account.id, stats.fetched, stats.saved, stats.skipped
        );
        Ok(stats)
    }
}

/// Totals of one `save_in_batches` call
#[derive(Debug, Default, PartialEq, Eq)]
struct BatchRun {
    outcome: BatchOutcome,
    committed: usize,
    failed: usize,
}

/// Save `records` in chunks of `batch_size`, pausing between chunks
///
/// A chunk whose save fails is logged, its records are counted as skipped,
/// and the remaining chunks are still saved.
fn save_in_batches(store: &dyn RecordStore, records: &[Record], settings: &SyncSettings) -> BatchRun {
    let mut run = BatchRun::default();
    let batch_size = settings.batch_size.max(1);
    let batches = records.len().div_ceil(batch_size);

    for (index, batch) in records.chunks(batch_size).enumerate() {
        match store.save_batch(batch) {
            Ok(outcome) => {
                debug!(
                    "Batch {}/{}: {} saved, {} skipped",
                    index + 1,
                    batches,
                    outcome.saved,
                    outcome.skipped
                );
                run.outcome.merge(outcome);
                run.committed += 1;
            }
            Err(e) => {
                error!("Batch {}/{} failed: {}", index + 1, batches, e);
                run.outcome.skipped += batch.len();
                run.failed += 1;
            }
        }

        if index + 1 < batches && !settings.batch_pause.is_zero() {
            std::thread::sleep(settings.batch_pause);
        }
    }

    run
}
