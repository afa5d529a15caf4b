//! Storage trait definitions

use std::path::PathBuf;

use crate::models::{Account, NewReceivedEmail, ReceivedEmail};

/// Failures surfaced by a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No usable backend (remote required but unreachable)
    #[error("No storage backend available: {0}")]
    Unavailable(String),

    #[error("Account {0} not found")]
    AccountNotFound(i64),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[cfg(feature = "mysql")]
    #[error("Database error: {0}")]
    MySql(#[from] mysql::Error),

    #[error("Stored timestamp {value:?} is not valid: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a valid account store: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence contract for accounts, tokens and received messages
///
/// Every backend (relational, local file, in-memory) implements the same
/// operations with the same semantics. Lookups return `Ok(None)` rather than
/// an error when nothing matches.
pub trait AccountStore: Send + Sync {
    /// Insert an account or overwrite the password of an existing one.
    ///
    /// Returns the account id; saving an address twice never creates a
    /// second account.
    fn save_account(&self, email: &str, password: &str) -> StorageResult<i64>;

    /// Store a token valid for `ttl_hours` from now
    fn save_token(&self, account_id: i64, token: &str, ttl_hours: i64) -> StorageResult<()>;

    /// Token of the account if one is stored and not yet expired.
    ///
    /// Expired tokens are left in place.
    fn get_valid_token(&self, account_id: i64) -> StorageResult<Option<String>> {
        Ok(self
            .get_account_by_id(account_id)?
            .and_then(|account| account.valid_token().map(str::to_string)))
    }

    /// Remove token and expiry
    fn clear_token(&self, account_id: i64) -> StorageResult<()>;

    /// All accounts, newest first
    fn get_all_accounts(&self) -> StorageResult<Vec<Account>>;

    fn get_account_by_email(&self, email: &str) -> StorageResult<Option<Account>>;

    fn get_account_by_id(&self, account_id: i64) -> StorageResult<Option<Account>>;

    /// Insert a received message.
    ///
    /// When the message carries a provider id already stored for the same
    /// account nothing is written and `Ok(None)` is returned.
    fn save_received_email(&self, email: NewReceivedEmail) -> StorageResult<Option<i64>>;

    /// Whether `(account_id, message_id)` is already stored
    fn has_received_email(&self, account_id: i64, message_id: &str) -> StorageResult<bool>;

    /// All received messages, newest first
    fn get_all_received_emails(&self) -> StorageResult<Vec<ReceivedEmail>>;

    /// Messages of one account, newest first
    fn get_received_emails_by_account(&self, account_id: i64) -> StorageResult<Vec<ReceivedEmail>>;

    fn get_received_email_by_id(&self, id: i64) -> StorageResult<Option<ReceivedEmail>>;
}
