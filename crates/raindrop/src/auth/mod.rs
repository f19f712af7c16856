//! OAuth token lifecycle
//!
//! This module provides:
//! - File persistence for token sets
//! - Expiry checks and refresh-token exchange

mod manager;
mod token_store;

pub use manager::{TokenManager, ValidToken};
pub use token_store::TokenStore;
