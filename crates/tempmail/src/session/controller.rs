//! Session operations over a provider and a store

use std::time::Instant;

use log::{debug, info, warn};

use super::SessionError;
use super::credentials::{random_local_part, random_password};
use crate::config::DEFAULT_TOKEN_TTL_HOURS;
use crate::models::{Account, NewReceivedEmail};
use crate::provider::api::ProviderAccount;
use crate::provider::{MailProvider, ProviderError};
use crate::storage::AccountStore;

/// Result of a successful account creation
#[derive(Debug, Clone)]
pub struct CreatedAccount {
    /// Identifier assigned by the store
    pub account_id: i64,
    /// The provider's representation of the mailbox
    pub account: ProviderAccount,
    pub password: String,
    /// `None` when the best-effort token request failed
    pub token: Option<String>,
}

/// Outcome of [`Session::refresh_token_if_needed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRefresh {
    AlreadyValid,
    Refreshed,
}

/// Statistics from a message fetch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchStats {
    /// Messages listed by the provider
    pub listed: usize,
    /// Newly stored messages
    pub stored: usize,
    /// Messages already stored
    pub skipped: usize,
    /// Messages whose content could not be fetched
    pub failed: usize,
    pub duration_ms: u64,
}

/// An account and whether it currently holds a usable token
#[derive(Debug, Clone)]
pub struct TokenStatus {
    pub account: Account,
    pub has_valid_token: bool,
}

/// Drives provider calls and persists their results
///
/// Holds its storage handle explicitly; nothing is shared through globals.
pub struct Session<P, S> {
    provider: P,
    store: S,
    token_ttl_hours: i64,
}

impl<P: MailProvider, S: AccountStore> Session<P, S> {
    pub fn new(provider: P, store: S) -> Self {
        Self {
            provider,
            store,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
        }
    }

    /// Lifetime recorded for tokens obtained by this session
    pub fn with_token_ttl_hours(mut self, hours: i64) -> Self {
        self.token_ttl_hours = hours;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register a new random mailbox and persist it.
    ///
    /// Token acquisition afterwards is best effort: a failure is logged and
    /// the account is still returned.
    pub fn create_account(&self) -> Result<CreatedAccount, SessionError> {
        let domains = self.provider.list_domains()?;
        let domain = domains
            .iter()
            .find(|d| d.is_active)
            .ok_or(SessionError::NoDomainAvailable)?;

        let address = format!("{}@{}", random_local_part(), domain.domain);
        let password = random_password();

        let account = self.provider.create_account(&address, &password)?;
        let account_id = self.store.save_account(&account.address, &password)?;
        info!("Created account {} (id {})", account.address, account_id);

        let token = match self.provider.acquire_token(&account.address, &password) {
            Ok(token) => match self
                .store
                .save_token(account_id, &token, self.token_ttl_hours)
            {
                Ok(()) => Some(token),
                Err(e) => {
                    warn!("Could not store token for {}: {}", account.address, e);
                    None
                }
            },
            Err(e) => {
                warn!("Could not get token for {}: {}", account.address, e);
                None
            }
        };

        Ok(CreatedAccount {
            account_id,
            account,
            password,
            token,
        })
    }

    /// Make sure the account holds a valid token, authenticating again if not
    pub fn refresh_token_if_needed(&self, account_id: i64) -> Result<TokenRefresh, SessionError> {
        let account = self.account(account_id)?;
        if account.valid_token().is_some() {
            return Ok(TokenRefresh::AlreadyValid);
        }
        self.reauthenticate(&account)?;
        Ok(TokenRefresh::Refreshed)
    }

    /// Look up a stored account by address and guarantee it a valid token
    pub fn restore_account(&self, email: &str) -> Result<Account, SessionError> {
        let account = self
            .store
            .get_account_by_email(email)?
            .ok_or_else(|| SessionError::UnknownAccount(email.to_string()))?;

        if account.valid_token().is_none() {
            self.reauthenticate(&account)?;
        }

        // Reload to pick up the new token
        self.account(account.id)
    }

    /// Download and store every message not stored yet.
    ///
    /// Messages whose content can't be fetched are counted and skipped;
    /// storage errors abort the run.
    pub fn fetch_and_store_messages(&self, account_id: i64) -> Result<FetchStats, SessionError> {
        let start = Instant::now();
        let mut stats = FetchStats::default();

        let account = self.account(account_id)?;
        let token = self.ensure_token(&account)?;

        let summaries = self.provider.list_messages(&token)?;
        stats.listed = summaries.len();

        for summary in summaries {
            if self.store.has_received_email(account_id, &summary.id)? {
                stats.skipped += 1;
                continue;
            }

            let detail = match self.provider.fetch_message(&token, &summary.id) {
                Ok(Some(detail)) => detail,
                Ok(None) => {
                    warn!("Message {} not available, skipping", summary.id);
                    stats.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Failed to fetch message {}: {}", summary.id, e);
                    stats.failed += 1;
                    continue;
                }
            };

            let mut email = NewReceivedEmail::new(
                account_id,
                detail.from.address.as_str(),
                detail.subject.as_str(),
                detail.body(),
            )
            .message_id(summary.id.as_str());
            if let Some(recipient) = detail.recipient() {
                email = email.recipient(recipient);
            }
            if let Some(created_at) = detail.created_at.or(summary.created_at) {
                email = email.received_at(created_at);
            }

            match self.store.save_received_email(email)? {
                Some(id) => {
                    debug!("Stored message {} as {}", summary.id, id);
                    stats.stored += 1;
                }
                None => stats.skipped += 1,
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Fetched {} for account {}: {} new, {} skipped, {} failed in {}ms",
            stats.listed, account_id, stats.stored, stats.skipped, stats.failed, stats.duration_ms
        );
        Ok(stats)
    }

    /// Every stored account with its token state
    pub fn token_overview(&self) -> Result<Vec<TokenStatus>, SessionError> {
        Ok(self
            .store
            .get_all_accounts()?
            .into_iter()
            .map(|account| TokenStatus {
                has_valid_token: account.has_valid_token(),
                account,
            })
            .collect())
    }

    fn account(&self, account_id: i64) -> Result<Account, SessionError> {
        self.store
            .get_account_by_id(account_id)?
            .ok_or(SessionError::AccountNotFound(account_id))
    }

    fn ensure_token(&self, account: &Account) -> Result<String, SessionError> {
        match account.valid_token() {
            Some(token) => Ok(token.to_string()),
            None => self.reauthenticate(account),
        }
    }

    /// Fetch and persist a new token; a rejected login clears the stored one
    fn reauthenticate(&self, account: &Account) -> Result<String, SessionError> {
        match self.provider.acquire_token(&account.email, &account.password) {
            Ok(token) => {
                self.store
                    .save_token(account.id, &token, self.token_ttl_hours)?;
                info!("Refreshed token for {}", account.email);
                Ok(token)
            }
            Err(e @ ProviderError::AuthenticationFailed(_)) => {
                if let Err(clear_err) = self.store.clear_token(account.id) {
                    warn!("Could not clear token for {}: {}", account.email, clear_err);
                }
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
