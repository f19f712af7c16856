//! Paginated bookmark fetching with incremental cutoff

use log::{debug, info, warn};

use crate::api::{BookmarkSource, OAuthEndpoint};
use crate::auth::TokenManager;
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::models::{Credentials, Record, TokenSet, timestamp};

/// Records collected by [`PaginatedFetcher::fetch_all`]
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Newest-created first, in page order
    pub records: Vec<Record>,
    /// Tokens from the last refresh during the fetch, if any
    pub updated_tokens: Option<TokenSet>,
    /// Number of pages requested
    pub pages: u32,
}

impl FetchOutcome {
    /// Drop collected records, keeping refreshed tokens
    fn into_error(self, error: Error) -> FetchError {
        FetchError {
            error,
            updated_tokens: self.updated_tokens,
        }
    }
}

/// A failed fetch
///
/// Records collected before the failure are discarded, but tokens refreshed
/// along the way are kept so a rotated refresh token is not lost.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct FetchError {
    pub error: Error,
    pub updated_tokens: Option<TokenSet>,
}

/// Walks the list endpoint page by page
pub struct PaginatedFetcher<'a> {
    tokens: TokenManager<'a>,
    source: &'a dyn BookmarkSource,
    page_size: u32,
    max_pages: u32,
}

impl<'a> PaginatedFetcher<'a> {
    pub fn new(oauth: &'a dyn OAuthEndpoint, source: &'a dyn BookmarkSource) -> Self {
        let defaults = SyncSettings::default();
        Self {
            tokens: TokenManager::new(oauth),
            source,
            page_size: defaults.page_size,
            max_pages: defaults.max_pages,
        }
    }

    /// Use page size and page cap from `settings`
    pub fn with_settings(mut self, settings: &SyncSettings) -> Self {
        self.page_size = settings.page_size.max(1);
        self.max_pages = settings.max_pages;
        self
    }

    /// Fetch every page, or only records modified after `since`
    ///
    /// With a cursor, a page where some records are not newer than the cursor
    /// is the last one requested. Without one, paging stops when the reported
    /// total is reached or after `max_pages` pages.
    ///
    /// Pages are sorted by creation while the cursor is a modification time,
    /// so an old bookmark edited since the last run is only picked up if it
    /// sits on a page that is requested.
    pub fn fetch_all(
        &self,
        credentials: &Credentials,
        tokens: &TokenSet,
        since: Option<&str>,
    ) -> std::result::Result<FetchOutcome, FetchError> {
        let mut current = tokens.clone();
        let mut outcome = FetchOutcome::default();

        for page in 0..self.max_pages {
            let valid = match self.tokens.ensure_valid(credentials, &current) {
                Ok(valid) => valid,
                Err(error) => return Err(outcome.into_error(error)),
            };
            if let Some(refreshed) = valid.updated_tokens {
                current = refreshed.clone();
                outcome.updated_tokens = Some(refreshed);
            }

            let fetched = match self.fetch_page(&valid.access_token, page) {
                Ok(fetched) => fetched,
                Err(error) => return Err(outcome.into_error(error)),
            };
            outcome.pages += 1;

            let page_len = fetched.records.len();
            let survivors: Vec<Record> = match since {
                Some(cursor) => fetched
                    .records
                    .into_iter()
                    // No modification time means the item can't be placed behind the cursor
                    .filter(|r| {
                        r.last_modified.is_empty() || timestamp::is_after(&r.last_modified, cursor)
                    })
                    .collect(),
                None => fetched.records,
            };
            let reached_cursor = survivors.len() < page_len;
            outcome.records.extend(survivors);

            debug!(
                "Page {}: {} items, {} kept, {} total reported",
                page,
                page_len,
                outcome.records.len(),
                fetched.count
            );

            if reached_cursor {
                debug!("Reached sync cursor on page {}", page);
                break;
            }

            let seen = (u64::from(page) + 1) * u64::from(self.page_size);
            if seen >= fetched.count {
                break;
            }

            if page + 1 == self.max_pages {
                warn!("Stopped after {} pages", self.max_pages);
            }
        }

        info!(
            "Fetched {} bookmarks in {} pages",
            outcome.records.len(),
            outcome.pages
        );
        Ok(outcome)
    }

    fn fetch_page(&self, access_token: &str, page: u32) -> Result<Page> {
        let response = self.source.list_page(access_token, page, self.page_size)?;

        let records = response
            .items
            .into_iter()
            .map(Record::from_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::api(200, format!("Malformed bookmark on page {}: {}", page, e)))?;

        Ok(Page {
            records,
            count: response.count,
        })
    }
}

struct Page {
    records: Vec<Record>,
    count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ListResponse;
    use serde_json::json;
    use std::sync::Mutex;

    /// Far enough out that no refresh happens
    const FRESH: i64 = i64::MAX / 2;

    struct FakeOAuth {
        refreshes: Mutex<u32>,
        fail: bool,
    }

    impl FakeOAuth {
        fn new() -> Self {
            Self {
                refreshes: Mutex::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                refreshes: Mutex::new(0),
                fail: true,
            }
        }

        fn refresh_count(&self) -> u32 {
            *self.refreshes.lock().unwrap()
        }
    }

    impl OAuthEndpoint for FakeOAuth {
        fn exchange_code(&self, _credentials: &Credentials, _code: &str) -> Result<TokenSet> {
            unreachable!("fetching never exchanges codes")
        }

        /// Every refreshed token is already expired, so each page refreshes again
        fn refresh(&self, _credentials: &Credentials, _refresh_token: &str) -> Result<TokenSet> {
            if self.fail {
                return Err(Error::authentication("invalid_grant"));
            }
            let mut n = self.refreshes.lock().unwrap();
            *n += 1;
            Ok(TokenSet::new(format!("access-{}", n), format!("refresh-{}", n), 0))
        }
    }

    /// Serves pre-built pages and records every request
    struct FakeSource {
        pages: Vec<Vec<serde_json::Value>>,
        count: u64,
        fail_on: Option<u32>,
        requests: Mutex<Vec<(String, u32, u32)>>,
    }

    impl FakeSource {
        fn new(pages: Vec<Vec<serde_json::Value>>, count: u64) -> Self {
            Self {
                pages,
                count,
                fail_on: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requested_pages(&self) -> Vec<u32> {
            self.requests.lock().unwrap().iter().map(|r| r.1).collect()
        }

        fn access_tokens(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|r| r.0.clone()).collect()
        }
    }

    impl BookmarkSource for FakeSource {
        fn list_page(&self, access_token: &str, page: u32, per_page: u32) -> Result<ListResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((access_token.to_string(), page, per_page));
            if self.fail_on == Some(page) {
                return Err(Error::api(500, "Internal error"));
            }
            Ok(ListResponse {
                result: true,
                items: self.pages.get(page as usize).cloned().unwrap_or_default(),
                count: self.count,
                collection_id: Some(0),
            })
        }
    }

    fn item(id: i64, last_update: &str) -> serde_json::Value {
        json!({
            "_id": id,
            "link": format!("https://example.com/{}", id),
            "title": format!("Bookmark {}", id),
            "lastUpdate": last_update,
        })
    }

    fn full_page(start: i64, size: usize) -> Vec<serde_json::Value> {
        (0..size as i64)
            .map(|i| item(start + i, "2023-01-01T00:00:00Z"))
            .collect()
    }

    fn creds() -> Credentials {
        Credentials::new("id", "secret", "http://localhost:3000/callback")
    }

    #[test]
    fn test_cutoff_stops_before_next_page() {
        let oauth = FakeOAuth::new();
        let source = FakeSource::new(
            vec![
                vec![
                    item(1, "2023-07-01T00:00:00Z"),
                    item(2, "2023-06-15T00:00:00Z"),
                    item(3, "2023-05-01T00:00:00Z"),
                    item(4, "2023-04-01T00:00:00Z"),
                ],
                full_page(100, 50),
            ],
            500,
        );
        let fetcher = PaginatedFetcher::new(&oauth, &source);
        let tokens = TokenSet::new("access", "refresh", FRESH);

        let outcome = fetcher
            .fetch_all(&creds(), &tokens, Some("2023-06-01T00:00:00Z"))
            .unwrap();

        let ids: Vec<i64> = outcome.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(source.requested_pages(), vec![0]);
        assert!(outcome.updated_tokens.is_none());
    }

    #[test]
    fn test_cursor_with_all_newer_keeps_paging() {
        let oauth = FakeOAuth::new();
        let newer: Vec<_> = (0..50).map(|i| item(i, "2023-08-01T00:00:00Z")).collect();
        let source = FakeSource::new(vec![newer, vec![item(99, "2023-01-01T00:00:00Z")]], 51);
        let fetcher = PaginatedFetcher::new(&oauth, &source);
        let tokens = TokenSet::new("access", "refresh", FRESH);

        let outcome = fetcher
            .fetch_all(&creds(), &tokens, Some("2023-06-01T00:00:00Z"))
            .unwrap();

        assert_eq!(outcome.records.len(), 50);
        assert_eq!(source.requested_pages(), vec![0, 1]);
    }

    #[test]
    fn test_item_without_last_update_does_not_end_run() {
        let oauth = FakeOAuth::new();
        let mut first: Vec<_> = (0..49).map(|i| item(i, "2023-08-01T00:00:00Z")).collect();
        first.insert(10, item(500, ""));
        let source = FakeSource::new(vec![first, vec![item(99, "2023-07-01T00:00:00Z")]], 51);
        let fetcher = PaginatedFetcher::new(&oauth, &source);
        let tokens = TokenSet::new("access", "refresh", FRESH);

        let outcome = fetcher
            .fetch_all(&creds(), &tokens, Some("2023-06-01T00:00:00Z"))
            .unwrap();

        assert_eq!(outcome.records.len(), 51);
        assert!(outcome.records.iter().any(|r| r.id == 500));
        assert!(outcome.records.iter().any(|r| r.id == 99));
        assert_eq!(source.requested_pages(), vec![0, 1]);
    }

    #[test]
    fn test_natural_end() {
        let oauth = FakeOAuth::new();
        let source = FakeSource::new(vec![full_page(0, 50), full_page(50, 50), full_page(100, 20)], 120);
        let fetcher = PaginatedFetcher::new(&oauth, &source);
        let tokens = TokenSet::new("access", "refresh", FRESH);

        let outcome = fetcher.fetch_all(&creds(), &tokens, None).unwrap();

        assert_eq!(outcome.records.len(), 120);
        assert_eq!(outcome.pages, 3);
        assert_eq!(source.requested_pages(), vec![0, 1, 2]);
        assert!(source.requests.lock().unwrap().iter().all(|r| r.2 == 50));
    }

    #[test]
    fn test_exact_multiple_of_page_size() {
        let oauth = FakeOAuth::new();
        let source = FakeSource::new(vec![full_page(0, 50), full_page(50, 50)], 100);
        let fetcher = PaginatedFetcher::new(&oauth, &source);
        let tokens = TokenSet::new("access", "refresh", FRESH);

        fetcher.fetch_all(&creds(), &tokens, None).unwrap();
        assert_eq!(source.requested_pages(), vec![0, 1]);
    }

    #[test]
    fn test_hard_cap() {
        let oauth = FakeOAuth::new();
        // The provider claims far more than 100 pages; empty pages do not stop paging
        let source = FakeSource::new(Vec::new(), 1_000_000);
        let fetcher = PaginatedFetcher::new(&oauth, &source);
        let tokens = TokenSet::new("access", "refresh", FRESH);

        let outcome = fetcher.fetch_all(&creds(), &tokens, None).unwrap();

        assert_eq!(outcome.pages, 100);
        assert_eq!(source.requested_pages().len(), 100);
        assert_eq!(source.requested_pages().last(), Some(&99));
    }

    #[test]
    fn test_custom_page_settings() {
        let oauth = FakeOAuth::new();
        let source = FakeSource::new(Vec::new(), 1_000_000);
        let settings = SyncSettings {
            page_size: 25,
            max_pages: 3,
            ..SyncSettings::default()
        };
        let fetcher = PaginatedFetcher::new(&oauth, &source).with_settings(&settings);
        let tokens = TokenSet::new("access", "refresh", FRESH);

        fetcher.fetch_all(&creds(), &tokens, None).unwrap();

        let requests = source.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.2 == 25));
    }

    #[test]
    fn test_last_refresh_is_reported() {
        let oauth = FakeOAuth::new();
        let source = FakeSource::new(vec![full_page(0, 50), full_page(50, 50), full_page(100, 10)], 110);
        let fetcher = PaginatedFetcher::new(&oauth, &source);
        let expired = TokenSet::new("stale", "refresh-0", 0);

        let outcome = fetcher.fetch_all(&creds(), &expired, None).unwrap();

        assert_eq!(oauth.refresh_count(), 3);
        assert_eq!(
            source.access_tokens(),
            vec!["access-1", "access-2", "access-3"]
        );
        let updated = outcome.updated_tokens.unwrap();
        assert_eq!(updated.access_token, "access-3");
        assert_eq!(updated.refresh_token, "refresh-3");
    }

    #[test]
    fn test_page_failure_discards_records_keeps_tokens() {
        let oauth = FakeOAuth::new();
        let mut source = FakeSource::new(vec![full_page(0, 50), full_page(50, 50)], 200);
        source.fail_on = Some(1);
        let fetcher = PaginatedFetcher::new(&oauth, &source);
        let expired = TokenSet::new("stale", "refresh-0", 0);

        let err = fetcher.fetch_all(&creds(), &expired, None).unwrap_err();

        assert!(matches!(err.error, Error::Api { status: 500, .. }));
        // The refresh before the failing request is kept
        assert_eq!(err.updated_tokens.unwrap().refresh_token, "refresh-2");
    }

    #[test]
    fn test_refresh_failure_aborts_before_request() {
        let oauth = FakeOAuth::failing();
        let source = FakeSource::new(vec![full_page(0, 10)], 10);
        let fetcher = PaginatedFetcher::new(&oauth, &source);
        let expired = TokenSet::new("stale", "refresh", 0);

        let err = fetcher.fetch_all(&creds(), &expired, None).unwrap_err();

        assert!(matches!(err.error, Error::Authentication { .. }));
        assert!(err.updated_tokens.is_none());
        assert!(source.requested_pages().is_empty());
    }

    #[test]
    fn test_malformed_item_is_api_error() {
        let oauth = FakeOAuth::new();
        let source = FakeSource::new(vec![vec![json!({"title": "no id"})]], 1);
        let fetcher = PaginatedFetcher::new(&oauth, &source);
        let tokens = TokenSet::new("access", "refresh", FRESH);

        let err = fetcher.fetch_all(&creds(), &tokens, None).unwrap_err();
        assert!(matches!(err.error, Error::Api { .. }));
    }
}
