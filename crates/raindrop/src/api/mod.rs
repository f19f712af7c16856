//! Raindrop.io API integration
//!
//! This module provides:
//! - The network seams used by the sync engine ([`OAuthEndpoint`], [`BookmarkSource`])
//! - A blocking HTTP client implementing both
//! - Wire types for the token and list endpoints

mod client;

pub use client::RaindropClient;

use crate::error::Result;
use crate::models::{Credentials, TokenSet};

/// OAuth token endpoint operations
pub trait OAuthEndpoint: Send + Sync {
    /// Exchange an authorization code for tokens (`grant_type=authorization_code`)
    fn exchange_code(&self, credentials: &Credentials, code: &str) -> Result<TokenSet>;

    /// Exchange a refresh token for new tokens (`grant_type=refresh_token`)
    ///
    /// A missing `refresh_token` in the response keeps the one passed in.
    fn refresh(&self, credentials: &Credentials, refresh_token: &str) -> Result<TokenSet>;
}

/// Paginated bookmark listing
pub trait BookmarkSource: Send + Sync {
    /// Fetch one page of bookmarks, newest-created first
    fn list_page(&self, access_token: &str, page: u32, per_page: u32) -> Result<types::ListResponse>;
}

/// Raindrop API wire types
pub mod types {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    /// Response from the raindrops list endpoint
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListResponse {
        pub result: bool,
        #[serde(default)]
        pub items: Vec<Value>,
        #[serde(default)]
        pub count: u64,
        pub collection_id: Option<i64>,
    }

    /// Response from the OAuth token endpoint
    #[derive(Debug, Deserialize)]
    pub struct TokenResponse {
        pub access_token: String,
        pub refresh_token: Option<String>,
        pub expires_in: u64,
    }
}
