//! Raindrop.io HTTP client
//!
//! Implements the OAuth token endpoint and the bookmark list endpoint.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use std::time::Duration;

use chrono::Utc;
use log::debug;
use serde_json::Value;
use ureq::Agent;
use url::Url;

use super::types::{ListResponse, TokenResponse};
use super::{BookmarkSource, OAuthEndpoint};
use crate::error::{Error, Result};
use crate::models::{Credentials, TokenSet};

/// HTTP client for Raindrop.io
#[derive(Clone)]
pub struct RaindropClient {
    agent: Agent,
    oauth_base: String,
    api_base: String,
}

impl RaindropClient {
    /// Base URL of the OAuth endpoints
    pub const OAUTH_BASE_URL: &'static str = "https://raindrop.io";
    /// Base URL of the REST API
    pub const API_BASE_URL: &'static str = "https://api.raindrop.io/rest/v1";

    const TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a client against the production endpoints
    pub fn new() -> Self {
        Self::with_base_urls(Self::OAUTH_BASE_URL, Self::API_BASE_URL)
    }

    /// Create a client against custom endpoints
    pub fn with_base_urls(oauth_base: impl Into<String>, api_base: impl Into<String>) -> Self {
        // Non-2xx responses are read so the provider's error message can be reported
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Self::TIMEOUT))
            .build();
        let agent: Agent = config.into();

        Self {
            agent,
            oauth_base: oauth_base.into().trim_end_matches('/').to_string(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the URL the user visits to grant access
    pub fn authorize_url(&self, credentials: &Credentials, state: Option<&str>) -> Result<String> {
        let base = format!("{}/oauth/authorize", self.oauth_base);
        let mut url = Url::parse(&base)
            .map_err(|e| Error::config(format!("Invalid OAuth base URL {}: {}", base, e)))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &credentials.client_id)
                .append_pair("redirect_uri", &credentials.redirect_uri)
                .append_pair("response_type", "code");
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }

        Ok(url.into())
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/access_token", self.oauth_base)
    }

    /// URL of one page of the "all bookmarks" collection
    pub fn list_url(&self, page: u32, per_page: u32) -> Result<Url> {
        let base = format!("{}/raindrops/0", self.api_base);
        let mut url = Url::parse(&base)
            .map_err(|e| Error::config(format!("Invalid API base URL {}: {}", base, e)))?;

        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("perpage", &per_page.to_string())
            .append_pair("sort", "-created");

        Ok(url)
    }

    /// POST a form to the token endpoint and decode the token response
    ///
    /// Every failure is reported as an authentication error prefixed with `what`.
    fn post_token_form(&self, form: Vec<(&str, &str)>, what: &str) -> Result<TokenResponse> {
        let mut response = self
            .agent
            .post(&self.token_url())
            .header("Accept", "application/json")
            .send_form(form)
            .map_err(|e| Error::authentication(format!("{}: {}", what, e)))?;

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::authentication(format!("{}: {}", what, e)))?;

        if !status.is_success() {
            let reason = provider_message(&body, "error")
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(Error::authentication(format!("{}: {}", what, reason)));
        }

        parse_token_response(&body)
            .map_err(|e| Error::authentication(format!("{}: malformed response: {}", what, e)))
    }
}

impl Default for RaindropClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthEndpoint for RaindropClient {
    fn exchange_code(&self, credentials: &Credentials, code: &str) -> Result<TokenSet> {
        let token = self.post_token_form(
            vec![
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("redirect_uri", credentials.redirect_uri.as_str()),
            ],
            "OAuth token exchange failed",
        )?;

        token_set_from_response(token, None, Utc::now().timestamp_millis())
    }

    fn refresh(&self, credentials: &Credentials, refresh_token: &str) -> Result<TokenSet> {
        let token = self.post_token_form(
            vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ],
            "Token refresh failed",
        )?;

        token_set_from_response(token, Some(refresh_token), Utc::now().timestamp_millis())
    }
}

impl BookmarkSource for RaindropClient {
    fn list_page(&self, access_token: &str, page: u32, per_page: u32) -> Result<ListResponse> {
        let url = self.list_url(page, per_page)?;
        debug!("GET {}", url);

        let mut response = self
            .agent
            .get(url.as_str())
            .header("Authorization", &format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .call()
            .map_err(|e| Error::network(format!("Failed to send list request: {}", e)))?;

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::network(format!("Failed to read list response: {}", e)))?;

        if !status.is_success() {
            let reason = provider_message(&body, "errorMessage")
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(Error::api(status.as_u16(), reason));
        }

        parse_list_response(status.as_u16(), &body)
    }
}

/// Decode a successful token endpoint body
fn parse_token_response(body: &str) -> std::result::Result<TokenResponse, serde_json::Error> {
    serde_json::from_str(body)
}

/// Turn a token response into a token set, keeping `previous_refresh` if none was returned
fn token_set_from_response(
    token: TokenResponse,
    previous_refresh: Option<&str>,
    now_millis: i64,
) -> Result<TokenSet> {
    let refresh_token = match (token.refresh_token, previous_refresh) {
        (Some(rotated), _) => rotated,
        (None, Some(previous)) => previous.to_string(),
        (None, None) => {
            return Err(Error::authentication(
                "Token response did not include a refresh token",
            ));
        }
    };

    Ok(TokenSet::expiring_in(
        token.access_token,
        refresh_token,
        token.expires_in,
        now_millis,
    ))
}

/// Decode a list endpoint body, rejecting `result: false`
fn parse_list_response(status: u16, body: &str) -> Result<ListResponse> {
    let list: ListResponse = serde_json::from_str(body)
        .map_err(|e| Error::api(status, format!("Failed to parse list response: {}", e)))?;

    if !list.result {
        let reason = provider_message(body, "errorMessage")
            .unwrap_or_else(|| "provider reported result=false".to_string());
        return Err(Error::api(status, reason));
    }

    Ok(list)
}

/// Extract a provider error message from a JSON error body
fn provider_message(body: &str, key: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
