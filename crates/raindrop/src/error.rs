//! Error taxonomy for the sync engine
//!
//! Every fallible operation in this crate returns [`Result`]. The variants
//! decide how far a failure propagates: authentication and fetch errors abort
//! one account, storage errors on a single record are counted as skips.

/// Errors raised by token handling, fetching and persistence
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("API request failed ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn authentication(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Error::Network {
            message: message.into(),
        }
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Error::Api {
            status,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Whether this error came from the persistence layer
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage { .. })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::storage(format!("SQLite: {}", e))
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::storage(format!("Failed to run database migrations: {}", e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::storage(format!("I/O: {}", e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::storage(format!("JSON: {}", e))
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        // anyhow only reaches us from the config crate
        Error::config(format!("{:#}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_status() {
        let err = Error::api(401, "Invalid token");
        assert_eq!(err.to_string(), "API request failed (401): Invalid token");
    }

    #[test]
    fn test_io_error_is_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(err.is_storage());
    }

    #[test]
    fn test_anyhow_error_is_config() {
        let err: Error = anyhow::anyhow!("missing file").into();
        assert!(matches!(err, Error::Config { .. }));
    }
}
