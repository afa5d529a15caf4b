//! Account model representing a registered disposable mailbox

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A disposable mailbox registered with the provider
///
/// The token fields are the only ones that change after creation; the
/// password is overwritten when the same address is saved again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Backend-assigned identifier
    pub id: i64,
    /// Full email address (unique across accounts)
    pub email: String,
    /// Provider password, stored in plaintext
    pub password: String,
    /// Bearer token from the provider's token endpoint
    pub token: Option<String>,
    /// When the stored token stops being usable
    pub token_expiry: Option<DateTime<Utc>>,
    /// When the account was first saved
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create an account record without a token
    pub fn new(id: i64, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            password: password.into(),
            token: None,
            token_expiry: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a token and its expiry
    pub fn with_token(mut self, token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        self.token = Some(token.into());
        self.token_expiry = Some(expires_at);
        self
    }

    /// The stored token if it is still valid at `now`.
    ///
    /// A token is valid only while `expiry > now`; a token without an
    /// expiry is never valid.
    pub fn valid_token_at(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.token, self.token_expiry) {
            (Some(token), Some(expiry)) if expiry > now => Some(token.as_str()),
            _ => None,
        }
    }

    /// The stored token if it is valid right now
    pub fn valid_token(&self) -> Option<&str> {
        self.valid_token_at(Utc::now())
    }

    pub fn has_valid_token(&self) -> bool {
        self.valid_token().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_account_new_has_no_token() {
        let account = Account::new(1, "a@x.com", "p1");
        assert_eq!(account.id, 1);
        assert!(account.token.is_none());
        assert!(account.valid_token().is_none());
    }

    #[test]
    fn test_token_valid_before_expiry() {
        let now = Utc::now();
        let account = Account::new(1, "a@x.com", "p1").with_token("tok", now + Duration::seconds(1));
        assert_eq!(account.valid_token_at(now), Some("tok"));
    }

    #[test]
    fn test_token_invalid_at_exact_expiry() {
        let now = Utc::now();
        let account = Account::new(1, "a@x.com", "p1").with_token("tok", now);
        assert_eq!(account.valid_token_at(now), None);
    }

    #[test]
    fn test_token_invalid_after_expiry() {
        let now = Utc::now();
        let account = Account::new(1, "a@x.com", "p1").with_token("tok", now - Duration::hours(1));
        assert_eq!(account.valid_token_at(now), None);
    }

    #[test]
    fn test_token_without_expiry_is_invalid() {
        let mut account = Account::new(1, "a@x.com", "p1");
        account.token = Some("legacy".to_string());
        assert!(!account.has_valid_token());
    }
}
