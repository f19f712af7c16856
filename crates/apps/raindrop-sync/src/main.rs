//! raindrop-sync - incremental Raindrop.io bookmark sync
//!
//! This is the command-line entry point: interactive OAuth setup, sync runs,
//! and token housekeeping.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use log::{debug, error, warn};
use raindrop::{
    Account, Credentials, MultiAccountConfig, RaindropClient, RunOutcome, RunSummary,
    StorageBackend, StorageConfig, StoreStatus, SyncConfig, SyncOrchestrator, SyncSettings,
    TokenManager, TokenStore, inspect_store,
};
use url::Url;

mod callback;

/// Token filename in the config directory
const TOKENS_FILE: &str = "tokens.json";

/// Sample bookmarks printed after a fetch
const SAMPLE_COUNT: usize = 5;

#[derive(Parser)]
#[command(name = "raindrop-sync", version)]
#[command(about = "Incremental Raindrop.io bookmark sync", long_about = None)]
struct Cli {
    /// Token file for single-account mode
    #[arg(long, global = true)]
    tokens: Option<PathBuf>,

    /// Directory holding the bookmark stores
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage backend: sqlite or files [env: RAINDROP_STORAGE]
    #[arg(long, global = true)]
    storage: Option<StorageBackend>,

    /// Account list for multi-account sync [env: RAINDROP_ACCOUNTS_FILE]
    #[arg(long, global = true)]
    accounts: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize access and save tokens
    Auth {
        /// Opaque state passed through the authorize URL
        #[arg(long)]
        state: Option<String>,

        /// Authorize a listed account instead of the environment credentials
        #[arg(long)]
        account: Option<String>,

        /// Print the authorize URL without opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Fetch new bookmarks into local storage
    Fetch,
    /// Show token and storage state
    Status,
    /// Delete saved tokens
    Logout {
        /// Log out a listed account
        #[arg(long)]
        account: Option<String>,
    },
}

/// Locations resolved from flags, environment and defaults
struct Paths {
    tokens: PathBuf,
    data_dir: PathBuf,
    accounts: Option<PathBuf>,
    backend: StorageBackend,
}

impl Paths {
    fn resolve(cli: &Cli) -> Result<Self> {
        let tokens = match &cli.tokens {
            Some(path) => path.clone(),
            None => config::config_path(TOKENS_FILE).context("Could not determine config directory")?,
        };
        let data_dir = match &cli.data_dir {
            Some(path) => path.clone(),
            None => config::data_dir().context("Could not determine data directory")?,
        };
        let backend = match cli.storage {
            Some(backend) => backend,
            None => StorageConfig::backend_from_env()?,
        };

        Ok(Self {
            tokens,
            data_dir,
            accounts: cli.accounts.clone().or_else(MultiAccountConfig::path_from_env),
            backend,
        })
    }

    fn load_accounts(&self) -> Result<Option<MultiAccountConfig>> {
        let Some(path) = &self.accounts else {
            return Ok(None);
        };
        let accounts = MultiAccountConfig::load_optional(path)?;
        Ok(accounts.filter(|a| !a.is_empty()))
    }

    fn sync_config(
        &self,
        credentials: Option<Credentials>,
        accounts: Option<MultiAccountConfig>,
    ) -> SyncConfig {
        SyncConfig {
            credentials,
            accounts,
            token_path: self.tokens.clone(),
            tokens_dir: SyncConfig::default_tokens_dir(&self.tokens),
            storage: StorageConfig::new(self.backend, &self.data_dir),
            settings: SyncSettings::default(),
        }
    }

    /// Account named `id` and its token file
    fn listed_account(&self, id: &str) -> Result<(Account, PathBuf)> {
        let accounts = self
            .load_accounts()?
            .context("--account needs an account list (--accounts or RAINDROP_ACCOUNTS_FILE)")?;
        let account = accounts
            .to_accounts()
            .into_iter()
            .find(|a| a.id == id)
            .with_context(|| format!("No account '{}' in the account list", id))?;
        let token_path = self.sync_config(None, None).account_token_path(&account);
        Ok((account, token_path))
    }
}

fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match dotenv {
        Ok(path) => debug!("Loaded .env from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Failed to load .env: {}", e),
    }

    let cli = Cli::parse();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let paths = Paths::resolve(&cli)?;

    match cli.command {
        Commands::Auth {
            state,
            account,
            no_browser,
        } => auth(&paths, state.as_deref(), account.as_deref(), !no_browser),
        Commands::Fetch => fetch(&paths),
        Commands::Status => status(&paths),
        Commands::Logout { account } => logout(&paths, account.as_deref()),
    }
}

fn auth(
    paths: &Paths,
    state: Option<&str>,
    account: Option<&str>,
    open_browser: bool,
) -> Result<ExitCode> {
    let (credentials, token_path) = match account {
        Some(id) => {
            let (account, token_path) = paths.listed_account(id)?;
            (account.credentials, token_path)
        }
        None => (Credentials::from_env()?, paths.tokens.clone()),
    };

    let client = RaindropClient::new();
    let auth_url = client.authorize_url(&credentials, state)?;

    let redirect = Url::parse(&credentials.redirect_uri)
        .with_context(|| format!("Invalid redirect URI: {}", credentials.redirect_uri))?;
    let host = redirect.host_str().unwrap_or("localhost").to_string();
    let port = redirect.port_or_known_default().unwrap_or(80);
    let listener = TcpListener::bind((host.as_str(), port))
        .with_context(|| format!("Failed to listen on {}:{}", host, port))?;

    println!("Open this URL in your browser:");
    println!("{}", auth_url);
    if open_browser && let Err(e) = open::that(&auth_url) {
        eprintln!("Failed to open browser: {}. Please open the URL manually.", e);
    }
    println!("Waiting for authorization on http://{}:{}{} ...", host, port, redirect.path());

    let manager = TokenManager::new(&client);
    let store = TokenStore::new(&token_path);
    callback::serve(&listener, redirect.path(), |code| {
        let tokens = manager.exchange_code(&credentials, code)?;
        store.save(&tokens)
    })?;

    println!("Authentication complete! Tokens saved to {}", token_path.display());
    println!("You can now run: raindrop-sync fetch");
    Ok(ExitCode::SUCCESS)
}

fn fetch(paths: &Paths) -> Result<ExitCode> {
    let accounts = paths.load_accounts()?;
    let credentials = match accounts {
        Some(_) => Credentials::from_env().ok(),
        None => Some(Credentials::from_env()?),
    };
    let config = paths.sync_config(credentials, accounts);

    println!("Fetching bookmarks from Raindrop.io...");
    let client = RaindropClient::new();
    let summary = SyncOrchestrator::new(&client, &client).run_once(&config)?;
    print_summary(&summary);

    Ok(match summary.outcome() {
        RunOutcome::Failed => ExitCode::FAILURE,
        RunOutcome::Complete | RunOutcome::Partial => ExitCode::SUCCESS,
    })
}

fn print_summary(summary: &RunSummary) {
    let multi = summary.accounts.len() > 1;

    for report in &summary.accounts {
        let stats = match &report.result {
            Ok(stats) => stats,
            Err(message) => {
                println!("Account {} failed: {}", report.account_id, message);
                continue;
            }
        };

        if multi {
            println!("\nAccount {}:", report.account_id);
        }
        println!("Fetched {} bookmarks", stats.fetched);
        println!("Added {} new bookmarks", stats.saved);
        if stats.skipped > 0 {
            println!("Skipped {} existing bookmarks", stats.skipped);
        }
        if stats.failed_batches > 0 {
            println!(
                "{} batches failed to save; their bookmarks are counted as skipped",
                stats.failed_batches
            );
        }

        if !stats.samples.is_empty() {
            println!("\nSample bookmarks:");
            for (i, record) in stats.samples.iter().enumerate() {
                println!("  {}. {} - {}", i + 1, record.display_title(), record.url);
            }
            if stats.fetched > SAMPLE_COUNT {
                println!("  ... and {} more", stats.fetched - SAMPLE_COUNT);
            }
        }
    }

    if multi {
        println!(
            "\nTotal: {} fetched, {} added, {} skipped, {} failed accounts",
            summary.fetched(),
            summary.saved(),
            summary.skipped(),
            summary.failures()
        );
    }
}

fn status(paths: &Paths) -> Result<ExitCode> {
    let config = paths.sync_config(None, None);

    match paths.load_accounts()? {
        Some(accounts) => {
            for account in accounts.to_accounts() {
                println!("Account {}:", account.id);
                let token_path = config.account_token_path(&account);
                let tokens = TokenStore::new(&token_path).load()?.or(account.tokens.clone());
                print_token_status(tokens.as_ref(), &token_path);
                print_store_status(&config, &account)?;
            }
        }
        None => {
            let tokens = TokenStore::new(&paths.tokens).load()?;
            print_token_status(tokens.as_ref(), &paths.tokens);
            if let Ok(credentials) = Credentials::from_env() {
                let account = Account::new(raindrop::sync::DEFAULT_ACCOUNT_ID, credentials);
                print_store_status(&config, &account)?;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_token_status(tokens: Option<&raindrop::TokenSet>, path: &Path) {
    let Some(tokens) = tokens else {
        println!("  Not authenticated (no tokens at {})", path.display());
        println!("  Run: raindrop-sync auth");
        return;
    };

    let expires = DateTime::from_timestamp_millis(tokens.expires_at)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| tokens.expires_at.to_string());
    if tokens.is_expired() {
        println!("  Access token expired ({}); it is refreshed on the next fetch", expires);
    } else {
        println!("  Authenticated, access token valid until {}", expires);
    }
}

fn print_store_status(config: &SyncConfig, account: &Account) -> Result<()> {
    let location = config.storage.location(account);
    match inspect_store(config.storage.backend, &location, config.storage.key_policy)? {
        StoreStatus::Missing => println!("  No bookmarks stored yet"),
        StoreStatus::LegacySchema => println!(
            "  {} has a legacy schema; it is migrated on the next fetch",
            location.display()
        ),
        StoreStatus::Ready { count, cursor } => {
            println!("  {} bookmarks in {}", count, location.display());
            if let Some(cursor) = cursor {
                println!("  Last modification seen: {}", cursor);
            }
        }
    }
    Ok(())
}

fn logout(paths: &Paths, account: Option<&str>) -> Result<ExitCode> {
    let token_path = match account {
        Some(id) => paths.listed_account(id)?.1,
        None => paths.tokens.clone(),
    };

    let store = TokenStore::new(&token_path);
    if store.exists() {
        store.clear()?;
        println!("Removed tokens at {}", token_path.display());
    } else {
        println!("No tokens at {}", token_path.display());
    }
    Ok(ExitCode::SUCCESS)
}
