//! Account document shared by the local-file and in-memory stores
//!
//! Both entity collections live in one value together with the next id
//! counters. The file store serializes this document as a whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::traits::{StorageError, StorageResult};
use crate::models::{Account, NewReceivedEmail, ReceivedEmail};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StoreDocument {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub received_emails: Vec<ReceivedEmail>,
    #[serde(default = "first_id")]
    pub next_account_id: i64,
    #[serde(default = "first_id")]
    pub next_email_id: i64,
}

fn first_id() -> i64 {
    1
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            received_emails: Vec::new(),
            next_account_id: first_id(),
            next_email_id: first_id(),
        }
    }
}

impl StoreDocument {
    pub fn upsert_account(&mut self, email: &str, password: &str, now: DateTime<Utc>) -> i64 {
        if let Some(existing) = self.accounts.iter_mut().find(|a| a.email == email) {
            existing.password = password.to_string();
            return existing.id;
        }

        let id = self.next_account_id;
        self.next_account_id += 1;

        let mut account = Account::new(id, email, password);
        account.created_at = now;
        self.accounts.push(account);
        id
    }

    /// Replace (or clear, with `None`) the token of an account
    pub fn set_token(
        &mut self,
        account_id: i64,
        token: Option<(&str, DateTime<Utc>)>,
    ) -> StorageResult<()> {
        let account = self
            .accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or(StorageError::AccountNotFound(account_id))?;

        match token {
            Some((token, expires_at)) => {
                account.token = Some(token.to_string());
                account.token_expiry = Some(expires_at);
            }
            None => {
                account.token = None;
                account.token_expiry = None;
            }
        }
        Ok(())
    }

    pub fn account_by_id(&self, account_id: i64) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == account_id)
    }

    pub fn account_by_email(&self, email: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.email == email)
    }

    pub fn accounts_newest_first(&self) -> Vec<Account> {
        let mut accounts = self.accounts.clone();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        accounts
    }

    pub fn has_email(&self, account_id: i64, message_id: &str) -> bool {
        self.received_emails
            .iter()
            .any(|e| e.account_id == account_id && e.message_id.as_deref() == Some(message_id))
    }

    pub fn insert_email(&mut self, email: NewReceivedEmail) -> StorageResult<Option<i64>> {
        if self.account_by_id(email.account_id).is_none() {
            return Err(StorageError::AccountNotFound(email.account_id));
        }

        if let Some(message_id) = email.message_id.as_deref()
            && self.has_email(email.account_id, message_id)
        {
            return Ok(None);
        }

        let id = self.next_email_id;
        self.next_email_id += 1;
        self.received_emails.push(email.into_stored(id));
        Ok(Some(id))
    }

    /// Received messages, optionally restricted to one account, newest first
    pub fn emails_newest_first(&self, account_id: Option<i64>) -> Vec<ReceivedEmail> {
        let mut emails: Vec<ReceivedEmail> = self
            .received_emails
            .iter()
            .filter(|e| account_id.is_none_or(|id| e.account_id == id))
            .cloned()
            .collect();
        emails.sort_by(|a, b| b.received_at.cmp(&a.received_at).then(b.id.cmp(&a.id)));
        emails
    }

    pub fn email_by_id(&self, id: i64) -> Option<&ReceivedEmail> {
        self.received_emails.iter().find(|e| e.id == id)
    }
}
