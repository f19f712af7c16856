//! OAuth credentials and token sets

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// OAuth client registration for one account
///
/// Supplied from the environment or the account list and never mutated by
/// the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        }
    }
}

/// Access/refresh token pair with its expiry instant
///
/// Serialized as `{accessToken, refreshToken, expiresAt}` so token files
/// written by earlier versions of the tool keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch milliseconds after which the access token is invalid
    pub expires_at: i64,
}

impl TokenSet {
    /// Tokens are treated as expired this long before `expires_at`
    pub const EXPIRY_MARGIN_MS: i64 = 5 * 60 * 1000;

    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Build a token set from an OAuth `expires_in` (seconds) relative to `now_millis`
    pub fn expiring_in(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: u64,
        now_millis: i64,
    ) -> Self {
        let lifetime = i64::try_from(expires_in_secs)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        Self::new(access_token, refresh_token, now_millis.saturating_add(lifetime))
    }

    /// Check expiry against an explicit clock
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at.saturating_sub(Self::EXPIRY_MARGIN_MS)
    }

    /// Check expiry against the wall clock
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }
}
