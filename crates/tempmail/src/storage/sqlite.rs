//! SQLite account storage
//!
//! Two tables: `accounts` and `received_emails`, the latter cascading on
//! account deletion. Timestamps are stored as RFC 3339 text.

use std::path::Path;
use std::sync::{Arc, Mutex};

use log::debug;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{AccountStore, StorageError, StorageResult};
use super::{parse_db_timestamp, to_db_timestamp, token_expiry};
use crate::models::{Account, NewReceivedEmail, ReceivedEmail};

/// Database migrations
///
/// Applied in order; the user_version pragma tracks progress.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        CREATE TABLE accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            token TEXT,
            token_expiry TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE received_emails (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            message_id TEXT,
            sender TEXT NOT NULL,
            recipient TEXT,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            received_at TEXT NOT NULL,
            UNIQUE (account_id, message_id),
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_received_emails_lookup
            ON received_emails(account_id, sender, subject);
        CREATE INDEX idx_received_emails_received_at
            ON received_emails(received_at DESC);
        "#,
    )])
}

const ACCOUNT_COLUMNS: &str = "id, email, password, token, token_expiry, created_at";
const EMAIL_COLUMNS: &str =
    "id, account_id, message_id, sender, recipient, subject, body, received_at";

/// SQLite implementation of AccountStore
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(db_path.as_ref())?;
        Self::from_shared(Arc::new(Mutex::new(conn)))
    }

    /// Private in-memory database, mostly for tests
    pub fn in_memory() -> StorageResult<Self> {
        Self::from_shared(Arc::new(Mutex::new(Connection::open_in_memory()?)))
    }

    /// Build on a connection owned by the connection manager
    pub fn from_shared(conn: Arc<Mutex<Connection>>) -> StorageResult<Self> {
        {
            let mut guard = conn.lock().unwrap();
            // journal_mode reports the resulting mode as a row, so it can't go
            // through execute_batch on every SQLite build
            guard.pragma_update(None, "foreign_keys", "ON")?;
            let mode: String = guard.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            debug!("SQLite journal mode: {}", mode);
            migrations().to_latest(&mut guard)?;
        }
        Ok(Self { conn })
    }
}

/// Read a timestamp column, failing the row if the text is not RFC 3339
fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_db_timestamp(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let token_expiry = match row.get::<_, Option<String>>(4)? {
        Some(_) => Some(timestamp_at(row, 4)?),
        None => None,
    };
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        token: row.get(3)?,
        token_expiry,
        created_at: timestamp_at(row, 5)?,
    })
}

fn email_from_row(row: &Row<'_>) -> rusqlite::Result<ReceivedEmail> {
    Ok(ReceivedEmail {
        id: row.get(0)?,
        account_id: row.get(1)?,
        message_id: row.get(2)?,
        sender: row.get(3)?,
        recipient: row.get(4)?,
        subject: row.get(5)?,
        body: row.get(6)?,
        received_at: timestamp_at(row, 7)?,
    })
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

impl AccountStore for SqliteStore {
    fn save_account(&self, email: &str, password: &str) -> StorageResult<i64> {
        let conn = self.conn.lock().unwrap();
        let id = conn.query_row(
            "INSERT INTO accounts (email, password, created_at) VALUES (?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET password = excluded.password
             RETURNING id",
            params![email, password, to_db_timestamp(&chrono::Utc::now())],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn save_token(&self, account_id: i64, token: &str, ttl_hours: i64) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE accounts SET token = ?, token_expiry = ? WHERE id = ?",
            params![token, to_db_timestamp(&token_expiry(ttl_hours)), account_id],
        )?;
        if updated == 0 {
            return Err(StorageError::AccountNotFound(account_id));
        }
        Ok(())
    }

    fn clear_token(&self, account_id: i64) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE accounts SET token = NULL, token_expiry = NULL WHERE id = ?",
            [account_id],
        )?;
        if updated == 0 {
            return Err(StorageError::AccountNotFound(account_id));
        }
        Ok(())
    }

    fn get_all_accounts(&self) -> StorageResult<Vec<Account>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at DESC, id DESC"
        ))?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn get_account_by_email(&self, email: &str) -> StorageResult<Option<Account>> {
        let conn = self.conn.lock().unwrap();
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?"),
                [email],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    fn get_account_by_id(&self, account_id: i64) -> StorageResult<Option<Account>> {
        let conn = self.conn.lock().unwrap();
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"),
                [account_id],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    fn save_received_email(&self, email: NewReceivedEmail) -> StorageResult<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let account_id = email.account_id;
        let received_at = email.received_at.unwrap_or_else(chrono::Utc::now);

        let inserted = conn
            .execute(
                "INSERT INTO received_emails
                 (account_id, message_id, sender, recipient, subject, body, received_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(account_id, message_id) DO NOTHING",
                params![
                    account_id,
                    email.message_id,
                    email.sender,
                    email.recipient,
                    email.subject,
                    email.body,
                    to_db_timestamp(&received_at),
                ],
            )
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StorageError::AccountNotFound(account_id)
                } else {
                    e.into()
                }
            })?;

        if inserted == 0 {
            debug!(
                "Message {:?} already stored for account {}",
                email.message_id, account_id
            );
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    fn has_received_email(&self, account_id: i64, message_id: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM received_emails WHERE account_id = ? AND message_id = ?",
            params![account_id, message_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn get_all_received_emails(&self) -> StorageResult<Vec<ReceivedEmail>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EMAIL_COLUMNS} FROM received_emails ORDER BY received_at DESC, id DESC"
        ))?;
        let emails = stmt
            .query_map([], email_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(emails)
    }

    fn get_received_emails_by_account(&self, account_id: i64) -> StorageResult<Vec<ReceivedEmail>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EMAIL_COLUMNS} FROM received_emails WHERE account_id = ?
             ORDER BY received_at DESC, id DESC"
        ))?;
        let emails = stmt
            .query_map([account_id], email_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(emails)
    }

    fn get_received_email_by_id(&self, id: i64) -> StorageResult<Option<ReceivedEmail>> {
        let conn = self.conn.lock().unwrap();
        let email = conn
            .query_row(
                &format!("SELECT {EMAIL_COLUMNS} FROM received_emails WHERE id = ?"),
                [id],
                email_from_row,
            )
            .optional()?;
        Ok(email)
    }
}
