//! Token file persistence
//!
//! One JSON document per account: `{accessToken, refreshToken, expiresAt}`.
//! A missing file means the account has not been authenticated yet.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::models::TokenSet;

/// Reads and writes a token set at a fixed path
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored tokens; `None` when no token file exists
    pub fn load(&self) -> Result<Option<TokenSet>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::storage(format!(
                    "Failed to load tokens from {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let tokens = serde_json::from_str(&content).map_err(|e| {
            Error::storage(format!(
                "Failed to parse tokens in {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(tokens))
    }

    /// Replace the stored tokens
    pub fn save(&self, tokens: &TokenSet) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(tokens)?;

        // Write atomically (write to temp, then rename)
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, content).map_err(|e| {
            Error::storage(format!("Failed to save tokens to {}: {}", self.path.display(), e))
        })?;
        fs::rename(&temp_path, &self.path)?;

        debug!("Saved tokens to {}", self.path.display());
        Ok(())
    }

    /// Delete the token file; a missing file is not an error
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!(
                "Failed to clear tokens at {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Check if a token file is present
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));

        assert!(store.load().unwrap().is_none());
        assert!(!store.exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested").join("tokens.json"));
        let tokens = TokenSet::new("access", "refresh", 1_700_000_000_000);

        store.save(&tokens).unwrap();

        assert!(store.exists());
        assert_eq!(store.load().unwrap(), Some(tokens));
    }

    #[test]
    fn test_save_replaces_existing() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));

        store.save(&TokenSet::new("a1", "r1", 1)).unwrap();
        store.save(&TokenSet::new("a2", "r2", 2)).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "a2");
        assert_eq!(loaded.refresh_token, "r2");
    }

    #[test]
    fn test_reads_original_file_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(
            &path,
            r#"{ "accessToken": "abc", "refreshToken": "def", "expiresAt": 1700000000000 }"#,
        )
        .unwrap();

        let tokens = TokenStore::new(&path).load().unwrap().unwrap();
        assert_eq!(tokens.access_token, "abc");
        assert_eq!(tokens.expires_at, 1_700_000_000_000);
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "{ not json").unwrap();

        let err = TokenStore::new(&path).load().unwrap_err();
        assert!(err.is_storage());
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));

        // Clearing a missing file is fine
        store.clear().unwrap();

        store.save(&TokenSet::new("a", "r", 1)).unwrap();
        store.clear().unwrap();
        assert!(!store.exists());
    }
}
