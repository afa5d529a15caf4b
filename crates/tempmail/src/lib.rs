//! Tempmail crate - Business logic for disposable mailboxes
//!
//! This crate provides the presentation-independent core:
//! - Domain models (Account, ReceivedEmail)
//! - mail.tm compatible provider client
//! - Connection manager for the optional relational database
//! - Storage contract with SQLite, MySQL, local-file and in-memory backends
//! - Session controller (account creation, token refresh, message fetch)
//! - Runtime configuration

pub mod config;
pub mod connection;
pub mod models;
pub mod provider;
pub mod session;
pub mod storage;

pub use config::{DatabaseConfig, TempmailConfig};
pub use connection::{ConnectionManager, DatabaseHandle, ProbeError, ProbeReason, probe_network};
pub use models::{Account, NewReceivedEmail, ReceivedEmail};
pub use provider::{MailProvider, MailTmClient, ProviderError};
pub use session::{
    CreatedAccount, FetchStats, Session, SessionError, TokenRefresh, TokenStatus,
};
pub use storage::{
    AccountStore, BackendKind, InMemoryStore, LocalFileStore, SqliteStore, Storage, StorageError,
    StorageResult,
};

/// Session over the mail.tm client and the selected storage
pub type DefaultSession = Session<MailTmClient, Storage>;

/// Build the provider client, probe the database and select storage from `config`
pub fn open_session(config: &TempmailConfig) -> anyhow::Result<(DefaultSession, ConnectionManager)> {
    let manager = ConnectionManager::new(config.database.clone());
    let storage = Storage::open(&manager, config.data_file_path()?, config.require_remote);
    let client = MailTmClient::new(config.api_base_url.clone(), config.request_timeout());
    let session = Session::new(client, storage).with_token_ttl_hours(config.token_ttl_hours);
    Ok((session, manager))
}
