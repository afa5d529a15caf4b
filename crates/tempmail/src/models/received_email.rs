//! Messages pulled from the provider and kept locally

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored copy of a message received by one of our accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedEmail {
    pub id: i64,
    /// Owning account
    pub account_id: i64,
    /// Provider-side message id; `(account_id, message_id)` is unique when present
    pub message_id: Option<String>,
    pub sender: String,
    pub recipient: Option<String>,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// Fields for inserting a received message
#[derive(Debug, Clone, PartialEq)]
pub struct NewReceivedEmail {
    pub account_id: i64,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub recipient: Option<String>,
    pub message_id: Option<String>,
    /// Provider timestamp; insert time is used when absent
    pub received_at: Option<DateTime<Utc>>,
}

impl NewReceivedEmail {
    pub fn new(
        account_id: i64,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
            recipient: None,
            message_id: None,
            received_at: None,
        }
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    /// Materialize the stored record once the backend has assigned an id
    pub fn into_stored(self, id: i64) -> ReceivedEmail {
        ReceivedEmail {
            id,
            account_id: self.account_id,
            message_id: self.message_id,
            sender: self.sender,
            recipient: self.recipient,
            subject: self.subject,
            body: self.body,
            received_at: self.received_at.unwrap_or_else(Utc::now),
        }
    }
}
