//! Configuration loading for the sync engine
//!
//! Credentials come from environment variables (a `.env` file is loaded by
//! the binary first). Multiple accounts are described in a JSON file:
//!
//! ```json
//! {
//!   "accounts": [
//!     { "id": "work", "clientId": "...", "clientSecret": "...",
//!       "accessToken": "...", "refreshToken": "...", "expiresAt": 1700000000000 }
//!   ]
//! }
//! ```
//!
//! Nothing here resolves default paths on its own; callers pass them in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Account, Credentials, TokenSet};
use crate::storage::{KeyPolicy, StorageBackend};

/// Account list filename in the config directory
pub const ACCOUNTS_FILE: &str = "accounts.json";

/// Subdirectory next to the token file holding per-account token files
pub const ACCOUNT_TOKENS_DIR: &str = "tokens";

/// Redirect URI used when `RAINDROP_REDIRECT_URI` is unset
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/callback";

pub const CLIENT_ID_VAR: &str = "RAINDROP_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "RAINDROP_CLIENT_SECRET";
pub const REDIRECT_URI_VAR: &str = "RAINDROP_REDIRECT_URI";
pub const ACCOUNTS_FILE_VAR: &str = "RAINDROP_ACCOUNTS_FILE";
pub const STORAGE_VAR: &str = "RAINDROP_STORAGE";

impl Credentials {
    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load credentials through `lookup`, which maps a variable name to its value
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::config(format!("{} environment variable not set", key)))
        };

        let client_id = required(CLIENT_ID_VAR)?;
        let client_secret = required(CLIENT_SECRET_VAR)?;
        let redirect_uri = lookup(REDIRECT_URI_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

        Ok(Self::new(client_id, client_secret, redirect_uri))
    }
}

/// One entry of the account list file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntry {
    pub id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl AccountEntry {
    /// Tokens inlined in the entry, if all three fields are present
    pub fn tokens(&self) -> Option<TokenSet> {
        match (&self.access_token, &self.refresh_token, self.expires_at) {
            (Some(access), Some(refresh), Some(expires_at)) => {
                Some(TokenSet::new(access, refresh, expires_at))
            }
            _ => None,
        }
    }

    pub fn to_account(&self) -> Account {
        let redirect_uri = self
            .redirect_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        let credentials = Credentials::new(&self.client_id, &self.client_secret, redirect_uri);

        let account = Account::new(&self.id, credentials);
        match self.tokens() {
            Some(tokens) => account.with_tokens(tokens),
            None => account,
        }
    }
}

/// Account list for multi-account sync
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiAccountConfig {
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

impl MultiAccountConfig {
    /// Parse an account list from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(json).context("Failed to parse accounts JSON")?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Load an account list from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let parsed: Self = config::load_json_file(path)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Load the account list at `path` if the file exists
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::from_file(path).map(Some)
    }

    /// Default account list path (~/.config/raindrop-sync/accounts.json)
    pub fn default_path() -> Option<PathBuf> {
        config::config_path(ACCOUNTS_FILE)
    }

    /// Account list path from `RAINDROP_ACCOUNTS_FILE`, else the default
    pub fn path_from_env() -> Option<PathBuf> {
        std::env::var_os(ACCOUNTS_FILE_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(Self::default_path)
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn to_accounts(&self) -> Vec<Account> {
        self.accounts.iter().map(AccountEntry::to_account).collect()
    }

    fn validate(&self) -> Result<()> {
        for (index, entry) in self.accounts.iter().enumerate() {
            if entry.id.trim().is_empty() {
                return Err(Error::config(format!("Account #{} has an empty id", index)));
            }
            if entry.client_id.is_empty() || entry.client_secret.is_empty() {
                return Err(Error::config(format!(
                    "Account '{}' is missing clientId or clientSecret",
                    entry.id
                )));
            }
        }

        let mut names: Vec<String> = self.to_accounts().iter().map(Account::storage_name).collect();
        names.sort();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(Error::config(format!(
                "Two accounts share the storage name '{}'",
                pair[0]
            )));
        }

        Ok(())
    }
}

/// Where and how bookmarks are stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory holding one store per account
    pub root: PathBuf,
    pub key_policy: KeyPolicy,
}

impl StorageConfig {
    pub fn new(backend: StorageBackend, root: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            root: root.into(),
            key_policy: KeyPolicy::default(),
        }
    }

    pub fn with_key_policy(mut self, key_policy: KeyPolicy) -> Self {
        self.key_policy = key_policy;
        self
    }

    /// Backend from `RAINDROP_STORAGE`; SQLite when unset
    pub fn backend_from_env() -> Result<StorageBackend> {
        match std::env::var(STORAGE_VAR) {
            Ok(value) if !value.trim().is_empty() => value.parse(),
            _ => Ok(StorageBackend::default()),
        }
    }

    /// Store location for one account
    pub fn location(&self, account: &Account) -> PathBuf {
        self.backend.location(&self.root, &account.storage_name())
    }
}

/// Tunables for one sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Records per storage batch
    pub batch_size: usize,
    /// Pause between storage batches
    pub batch_pause: Duration,
    /// Records requested per page
    pub page_size: u32,
    /// Hard cap on pages per account
    pub max_pages: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_pause: Duration::from_millis(500),
            page_size: 50,
            max_pages: 100,
        }
    }
}

/// Everything one sync run needs
///
/// With a non-empty account list each account syncs independently, reading
/// tokens from `tokens_dir/<account>.json` first and its inline tokens second.
/// Otherwise a single account is built from `credentials` and `token_path`.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub credentials: Option<Credentials>,
    pub accounts: Option<MultiAccountConfig>,
    /// Token file for single-account mode
    pub token_path: PathBuf,
    /// Directory of per-account token files
    pub tokens_dir: PathBuf,
    pub storage: StorageConfig,
    pub settings: SyncSettings,
}

impl SyncConfig {
    /// Single-account configuration
    pub fn single(
        credentials: Credentials,
        token_path: impl Into<PathBuf>,
        storage: StorageConfig,
    ) -> Self {
        let token_path = token_path.into();
        let tokens_dir = Self::default_tokens_dir(&token_path);

        Self {
            credentials: Some(credentials),
            accounts: None,
            token_path,
            tokens_dir,
            storage,
            settings: SyncSettings::default(),
        }
    }

    /// Per-account token directory next to the single-account token file
    pub fn default_tokens_dir(token_path: &Path) -> PathBuf {
        token_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
            .join(ACCOUNT_TOKENS_DIR)
    }

    pub fn with_accounts(mut self, accounts: MultiAccountConfig) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn with_tokens_dir(mut self, tokens_dir: impl Into<PathBuf>) -> Self {
        self.tokens_dir = tokens_dir.into();
        self
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Whether this run syncs an account list
    pub fn is_multi_account(&self) -> bool {
        self.accounts.as_ref().is_some_and(|a| !a.is_empty())
    }

    /// Token file for a listed account
    pub fn account_token_path(&self, account: &Account) -> PathBuf {
        self.tokens_dir
            .join(format!("{}.json", account.storage_name()))
    }
}
