//! Session controller
//!
//! Ties the mail provider to the account store: account creation, token
//! refresh and idempotent message fetching.

mod controller;
mod credentials;

pub use controller::{CreatedAccount, FetchStats, Session, TokenRefresh, TokenStatus};
pub use credentials::{random_local_part, random_password};

use crate::provider::ProviderError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("The provider offers no active domain")]
    NoDomainAvailable,

    #[error("No stored account with id {0}")]
    AccountNotFound(i64),

    #[error("No stored account for {0}")]
    UnknownAccount(String),
}
