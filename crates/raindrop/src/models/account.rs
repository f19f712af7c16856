//! Account model: one set of credentials, tokens and isolated storage

use super::{Credentials, TokenSet};

/// A Raindrop account to sync
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// Identifier used for storage and token file names
    pub id: String,
    pub credentials: Credentials,
    /// Tokens supplied with the account definition, if any
    pub tokens: Option<TokenSet>,
}

impl Account {
    pub fn new(id: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            id: id.into(),
            credentials,
            tokens: None,
        }
    }

    /// Attach tokens from the account definition
    pub fn with_tokens(mut self, tokens: TokenSet) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Id reduced to characters that are safe in a file name
    pub fn storage_name(&self) -> String {
        let name: String = self
            .id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        if name.is_empty() || name.chars().all(|c| c == '.') {
            "default".to_string()
        } else {
            name
        }
    }
}
