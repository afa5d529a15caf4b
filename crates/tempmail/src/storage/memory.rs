//! In-memory storage implementation
//!
//! Keeps the whole account document behind a RwLock. Used by tests and as a
//! substitute backend where nothing should touch the disk.

use chrono::Utc;
use std::sync::RwLock;

use super::document::StoreDocument;
use super::token_expiry;
use super::traits::{AccountStore, StorageResult};
use crate::models::{Account, NewReceivedEmail, ReceivedEmail};

/// In-memory implementation of AccountStore
#[derive(Default)]
pub struct InMemoryStore {
    doc: RwLock<StoreDocument>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for InMemoryStore {
    fn save_account(&self, email: &str, password: &str) -> StorageResult<i64> {
        let mut doc = self.doc.write().unwrap();
        Ok(doc.upsert_account(email, password, Utc::now()))
    }

    fn save_token(&self, account_id: i64, token: &str, ttl_hours: i64) -> StorageResult<()> {
        let mut doc = self.doc.write().unwrap();
        doc.set_token(account_id, Some((token, token_expiry(ttl_hours))))
    }

    fn clear_token(&self, account_id: i64) -> StorageResult<()> {
        let mut doc = self.doc.write().unwrap();
        doc.set_token(account_id, None)
    }

    fn get_all_accounts(&self) -> StorageResult<Vec<Account>> {
        Ok(self.doc.read().unwrap().accounts_newest_first())
    }

    fn get_account_by_email(&self, email: &str) -> StorageResult<Option<Account>> {
        Ok(self.doc.read().unwrap().account_by_email(email).cloned())
    }

    fn get_account_by_id(&self, account_id: i64) -> StorageResult<Option<Account>> {
        Ok(self.doc.read().unwrap().account_by_id(account_id).cloned())
    }

    fn save_received_email(&self, email: NewReceivedEmail) -> StorageResult<Option<i64>> {
        let mut doc = self.doc.write().unwrap();
        doc.insert_email(email)
    }

    fn has_received_email(&self, account_id: i64, message_id: &str) -> StorageResult<bool> {
        Ok(self.doc.read().unwrap().has_email(account_id, message_id))
    }

    fn get_all_received_emails(&self) -> StorageResult<Vec<ReceivedEmail>> {
        Ok(self.doc.read().unwrap().emails_newest_first(None))
    }

    fn get_received_emails_by_account(&self, account_id: i64) -> StorageResult<Vec<ReceivedEmail>> {
        Ok(self.doc.read().unwrap().emails_newest_first(Some(account_id)))
    }

    fn get_received_email_by_id(&self, id: i64) -> StorageResult<Option<ReceivedEmail>> {
        Ok(self.doc.read().unwrap().email_by_id(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;

    #[test]
    fn test_upsert_keeps_single_account() {
        let store = InMemoryStore::new();
        let first = store.save_account("a@x.com", "p1").unwrap();
        let second = store.save_account("a@x.com", "p2").unwrap();

        assert_eq!(first, second);
        let accounts = store.get_all_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].password, "p2");
    }

    #[test]
    fn test_token_lifecycle() {
        let store = InMemoryStore::new();
        let id = store.save_account("a@x.com", "p").unwrap();
        assert!(store.get_valid_token(id).unwrap().is_none());

        store.save_token(id, "tok", 24).unwrap();
        assert_eq!(store.get_valid_token(id).unwrap().as_deref(), Some("tok"));

        store.clear_token(id).unwrap();
        assert!(store.get_valid_token(id).unwrap().is_none());
        let account = store.get_account_by_id(id).unwrap().unwrap();
        assert!(account.token.is_none());
        assert!(account.token_expiry.is_none());
    }

    #[test]
    fn test_expired_token_is_not_cleared() {
        let store = InMemoryStore::new();
        let id = store.save_account("a@x.com", "p").unwrap();
        store.save_token(id, "old", -1).unwrap();

        assert!(store.get_valid_token(id).unwrap().is_none());
        let account = store.get_account_by_id(id).unwrap().unwrap();
        assert_eq!(account.token.as_deref(), Some("old"));
    }

    #[test]
    fn test_save_token_unknown_account() {
        let store = InMemoryStore::new();
        let result = store.save_token(7, "tok", 24);
        assert!(matches!(result, Err(StorageError::AccountNotFound(7))));
    }
}
