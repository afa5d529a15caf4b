//! Disposable mail provider integration
//!
//! This module provides:
//! - The `MailProvider` contract the session layer depends on
//! - A mail.tm compatible HTTP client
//! - Response types for the provider's JSON API

mod client;

pub use client::MailTmClient;

use api::{Domain, MessageDetail, MessageSummary, ProviderAccount};

/// Failures at the provider boundary
///
/// Transport errors and unexpected statuses are converted here so callers
/// never see raw HTTP failures.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network error, timeout or a non-2xx answer on a read endpoint
    #[error("Mail provider unavailable: {0}")]
    Unavailable(String),
    /// The provider refused to register the address
    #[error("Account creation failed: {0}")]
    AccountCreationFailed(String),
    /// The provider refused the credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
}

/// Operations consumed from the disposable mail provider
///
/// Implementations must bound every network call with a timeout and must not
/// retry; retrying is left to whoever drives the session.
pub trait MailProvider {
    /// Domains currently accepting registrations
    fn list_domains(&self) -> Result<Vec<Domain>, ProviderError>;

    /// Register `address` with `password`
    fn create_account(&self, address: &str, password: &str)
    -> Result<ProviderAccount, ProviderError>;

    /// Exchange credentials for a bearer token
    fn acquire_token(&self, address: &str, password: &str) -> Result<String, ProviderError>;

    /// Summaries of the messages in the mailbox owning `token`
    fn list_messages(&self, token: &str) -> Result<Vec<MessageSummary>, ProviderError>;

    /// Full message, or `None` when the provider does not answer 200.
    ///
    /// A single missing message must not abort a batch, so only transport
    /// failures are reported as errors.
    fn fetch_message(
        &self,
        token: &str,
        message_id: &str,
    ) -> Result<Option<MessageDetail>, ProviderError>;
}

/// Provider API response types
pub mod api {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    /// List endpoints answer either a JSON-LD collection or a bare array
    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    pub enum Listing<T> {
        Collection {
            #[serde(rename = "hydra:member")]
            member: Vec<T>,
        },
        Plain(Vec<T>),
    }

    impl<T> Listing<T> {
        pub fn into_items(self) -> Vec<T> {
            match self {
                Listing::Collection { member } => member,
                Listing::Plain(items) => items,
            }
        }
    }

    /// A mail domain offered by the provider
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Domain {
        #[serde(default)]
        pub id: String,
        pub domain: String,
        #[serde(default = "default_true")]
        pub is_active: bool,
        #[serde(default)]
        pub is_private: bool,
    }

    fn default_true() -> bool {
        true
    }

    /// Account as represented by the provider after registration
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProviderAccount {
        #[serde(default)]
        pub id: String,
        pub address: String,
        #[serde(default)]
        pub quota: u64,
        #[serde(default)]
        pub used: u64,
        #[serde(default)]
        pub is_disabled: bool,
        #[serde(default)]
        pub created_at: Option<DateTime<Utc>>,
    }

    /// Response of the token endpoint
    #[derive(Debug, Deserialize)]
    pub struct TokenResponse {
        pub token: String,
    }

    /// Sender or recipient
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Address {
        pub address: String,
        #[serde(default)]
        pub name: String,
    }

    /// Entry of the message listing
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageSummary {
        pub id: String,
        #[serde(default)]
        pub from: Address,
        #[serde(default)]
        pub to: Vec<Address>,
        #[serde(default)]
        pub subject: String,
        #[serde(default)]
        pub intro: String,
        #[serde(default)]
        pub seen: bool,
        #[serde(default)]
        pub created_at: Option<DateTime<Utc>>,
    }

    /// Full message including bodies
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageDetail {
        pub id: String,
        #[serde(default)]
        pub from: Address,
        #[serde(default)]
        pub to: Vec<Address>,
        #[serde(default)]
        pub subject: String,
        #[serde(default)]
        pub text: Option<String>,
        #[serde(default)]
        pub html: Vec<String>,
        #[serde(default)]
        pub created_at: Option<DateTime<Utc>>,
    }

    impl MessageDetail {
        /// Plain-text body, falling back to the HTML parts
        pub fn body(&self) -> String {
            match self.text.as_deref() {
                Some(text) if !text.trim().is_empty() => text.to_string(),
                _ => self.html.join("\n"),
            }
        }

        /// First recipient address, if any
        pub fn recipient(&self) -> Option<&str> {
            self.to.first().map(|a| a.address.as_str())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_hydra_collection() {
            let json = r#"{
                "hydra:member": [
                    {"id": "d1", "domain": "dollicons.com", "isActive": true, "isPrivate": false},
                    {"id": "d2", "domain": "old.example", "isActive": false}
                ],
                "hydra:totalItems": 2
            }"#;

            let domains = serde_json::from_str::<Listing<Domain>>(json)
                .unwrap()
                .into_items();
            assert_eq!(domains.len(), 2);
            assert_eq!(domains[0].domain, "dollicons.com");
            assert!(!domains[1].is_active);
        }

        #[test]
        fn test_parse_plain_array() {
            let json = r#"[{"domain": "dollicons.com"}]"#;
            let domains = serde_json::from_str::<Listing<Domain>>(json)
                .unwrap()
                .into_items();
            assert_eq!(domains.len(), 1);
            assert!(domains[0].is_active);
        }

        #[test]
        fn test_message_body_prefers_text() {
            let json = r#"{
                "id": "m1",
                "from": {"address": "a@b.c", "name": "A"},
                "to": [{"address": "me@x.com", "name": ""}],
                "subject": "Hi",
                "text": "plain body",
                "html": ["<p>html body</p>"],
                "createdAt": "2025-03-01T10:00:00+00:00"
            }"#;

            let message: MessageDetail = serde_json::from_str(json).unwrap();
            assert_eq!(message.body(), "plain body");
            assert_eq!(message.recipient(), Some("me@x.com"));
            assert!(message.created_at.is_some());
        }

        #[test]
        fn test_message_body_falls_back_to_html() {
            let json = r#"{"id": "m1", "text": "  ", "html": ["<p>one</p>", "<p>two</p>"]}"#;
            let message: MessageDetail = serde_json::from_str(json).unwrap();
            assert_eq!(message.body(), "<p>one</p>\n<p>two</p>");
            assert_eq!(message.recipient(), None);
        }
    }
}
