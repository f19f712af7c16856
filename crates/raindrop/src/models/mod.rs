//! Domain models for the sync engine

mod account;
mod record;
pub mod timestamp;
mod token;

pub use account::Account;
pub use record::{Record, RecordKey, StoredRecord};
pub use token::{Credentials, TokenSet};
