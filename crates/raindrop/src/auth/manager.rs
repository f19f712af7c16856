//! Access token validity and refresh

use chrono::Utc;
use log::{debug, info};

use crate::api::OAuthEndpoint;
use crate::error::{Error, Result};
use crate::models::{Credentials, TokenSet};

/// An access token that is safe to use right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidToken {
    pub access_token: String,
    /// Set when a refresh happened; the caller must persist it
    pub updated_tokens: Option<TokenSet>,
}

/// Hands out valid access tokens, refreshing through the OAuth endpoint when needed
///
/// Never mutates or persists tokens itself.
pub struct TokenManager<'a> {
    endpoint: &'a dyn OAuthEndpoint,
}

impl<'a> TokenManager<'a> {
    pub fn new(endpoint: &'a dyn OAuthEndpoint) -> Self {
        Self { endpoint }
    }

    /// Return a usable access token for `tokens`, refreshing if expired
    pub fn ensure_valid(&self, credentials: &Credentials, tokens: &TokenSet) -> Result<ValidToken> {
        self.ensure_valid_at(credentials, tokens, Utc::now().timestamp_millis())
    }

    /// Same as [`ensure_valid`](Self::ensure_valid) against an explicit clock
    ///
    /// Refresh failures are not retried.
    pub fn ensure_valid_at(
        &self,
        credentials: &Credentials,
        tokens: &TokenSet,
        now_millis: i64,
    ) -> Result<ValidToken> {
        if !tokens.is_expired_at(now_millis) {
            return Ok(ValidToken {
                access_token: tokens.access_token.clone(),
                updated_tokens: None,
            });
        }

        debug!("Access token expired or expiring soon, refreshing");
        let refreshed = self
            .endpoint
            .refresh(credentials, &tokens.refresh_token)
            .map_err(|e| as_authentication("Token refresh failed", e))?;
        info!("Refreshed access token");

        Ok(ValidToken {
            access_token: refreshed.access_token.clone(),
            updated_tokens: Some(refreshed),
        })
    }

    /// Exchange an authorization code from the interactive flow for tokens
    pub fn exchange_code(&self, credentials: &Credentials, code: &str) -> Result<TokenSet> {
        self.endpoint
            .exchange_code(credentials, code)
            .map_err(|e| as_authentication("OAuth token exchange failed", e))
    }
}

/// Any token endpoint failure is an authentication failure
fn as_authentication(context: &str, err: Error) -> Error {
    match err {
        Error::Authentication { .. } => err,
        other => Error::authentication(format!("{}: {}", context, other)),
    }
}
