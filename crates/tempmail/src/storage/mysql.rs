//! MySQL account storage
//!
//! Same two-table layout as the SQLite store. Only built with the `mysql`
//! feature.

use chrono::{DateTime, Utc};
use log::debug;
use mysql::prelude::Queryable;
use mysql::{Pool, PooledConn, Row, params};

use super::traits::{AccountStore, StorageError, StorageResult};
use super::{parse_db_timestamp, to_db_timestamp, token_expiry};
use crate::models::{Account, NewReceivedEmail, ReceivedEmail};

const ER_DUP_ENTRY: u16 = 1062;
const ER_NO_REFERENCED_ROW_2: u16 = 1452;

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        email VARCHAR(255) NOT NULL UNIQUE,
        password VARCHAR(255) NOT NULL,
        token TEXT NULL,
        token_expiry VARCHAR(40) NULL,
        created_at VARCHAR(40) NOT NULL
    ) CHARACTER SET utf8mb4
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS received_emails (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        account_id BIGINT NOT NULL,
        message_id VARCHAR(255) NULL,
        sender VARCHAR(255) NOT NULL,
        recipient VARCHAR(255) NULL,
        subject TEXT NOT NULL,
        body LONGTEXT NOT NULL,
        received_at VARCHAR(40) NOT NULL,
        UNIQUE KEY uniq_account_message (account_id, message_id),
        KEY idx_account_sender_subject (account_id, sender, subject(191)),
        CONSTRAINT fk_received_emails_account FOREIGN KEY (account_id)
            REFERENCES accounts(id) ON DELETE CASCADE
    ) CHARACTER SET utf8mb4
    "#,
];

const ACCOUNT_COLUMNS: &str = "id, email, password, token, token_expiry, created_at";
const EMAIL_COLUMNS: &str =
    "id, account_id, message_id, sender, recipient, subject, body, received_at";

/// MySQL implementation of AccountStore
pub struct MySqlStore {
    pool: Pool,
}

impl MySqlStore {
    /// Wrap a pool and make sure both tables exist
    pub fn new(pool: Pool) -> StorageResult<Self> {
        let store = Self { pool };
        let mut conn = store.conn()?;
        for statement in SCHEMA {
            conn.query_drop(statement)?;
        }
        Ok(store)
    }

    fn conn(&self) -> StorageResult<PooledConn> {
        Ok(self.pool.get_conn()?)
    }
}

fn server_error_code(err: &mysql::Error) -> Option<u16> {
    match err {
        mysql::Error::MySqlError(e) => Some(e.code),
        _ => None,
    }
}

/// A rejected message insert: duplicates are a no-op, a missing account is reported as such
fn insert_failure(err: mysql::Error, account_id: i64) -> StorageResult<Option<i64>> {
    match server_error_code(&err) {
        Some(ER_DUP_ENTRY) => Ok(None),
        Some(ER_NO_REFERENCED_ROW_2) => Err(StorageError::AccountNotFound(account_id)),
        _ => Err(err.into()),
    }
}

fn timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    parse_db_timestamp(value).map_err(|source| StorageError::InvalidTimestamp {
        value: value.to_string(),
        source,
    })
}

fn account_from_row(row: Row) -> StorageResult<Account> {
    let (id, email, password, token, token_expiry, created_at): (
        i64,
        String,
        String,
        Option<String>,
        Option<String>,
        String,
    ) = mysql::from_row_opt(row).map_err(mysql::Error::from)?;
    Ok(Account {
        id,
        email,
        password,
        token,
        token_expiry: token_expiry.as_deref().map(timestamp).transpose()?,
        created_at: timestamp(&created_at)?,
    })
}

fn email_from_row(row: Row) -> StorageResult<ReceivedEmail> {
    let (id, account_id, message_id, sender, recipient, subject, body, received_at): (
        i64,
        i64,
        Option<String>,
        String,
        Option<String>,
        String,
        String,
        String,
    ) = mysql::from_row_opt(row).map_err(mysql::Error::from)?;
    Ok(ReceivedEmail {
        id,
        account_id,
        message_id,
        sender,
        recipient,
        subject,
        body,
        received_at: timestamp(&received_at)?,
    })
}

impl AccountStore for MySqlStore {
    fn save_account(&self, email: &str, password: &str) -> StorageResult<i64> {
        let mut conn = self.conn()?;
        // LAST_INSERT_ID(id) makes the existing id visible on the update path
        conn.exec_drop(
            "INSERT INTO accounts (email, password, created_at)
             VALUES (:email, :password, :created_at)
             ON DUPLICATE KEY UPDATE password = VALUES(password), id = LAST_INSERT_ID(id)",
            params! {
                "email" => email,
                "password" => password,
                "created_at" => to_db_timestamp(&Utc::now()),
            },
        )?;
        Ok(conn.last_insert_id() as i64)
    }

    fn save_token(&self, account_id: i64, token: &str, ttl_hours: i64) -> StorageResult<()> {
        if self.get_account_by_id(account_id)?.is_none() {
            return Err(StorageError::AccountNotFound(account_id));
        }
        let mut conn = self.conn()?;
        conn.exec_drop(
            "UPDATE accounts SET token = ?, token_expiry = ? WHERE id = ?",
            (token, to_db_timestamp(&token_expiry(ttl_hours)), account_id),
        )?;
        Ok(())
    }

    fn clear_token(&self, account_id: i64) -> StorageResult<()> {
        if self.get_account_by_id(account_id)?.is_none() {
            return Err(StorageError::AccountNotFound(account_id));
        }
        let mut conn = self.conn()?;
        conn.exec_drop(
            "UPDATE accounts SET token = NULL, token_expiry = NULL WHERE id = ?",
            (account_id,),
        )?;
        Ok(())
    }

    fn get_all_accounts(&self) -> StorageResult<Vec<Account>> {
        let mut conn = self.conn()?;
        let rows: Vec<Row> = conn.query(format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at DESC, id DESC"
        ))?;
        rows.into_iter().map(account_from_row).collect()
    }

    fn get_account_by_email(&self, email: &str) -> StorageResult<Option<Account>> {
        let mut conn = self.conn()?;
        let row: Option<Row> = conn.exec_first(
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?"),
            (email,),
        )?;
        row.map(account_from_row).transpose()
    }

    fn get_account_by_id(&self, account_id: i64) -> StorageResult<Option<Account>> {
        let mut conn = self.conn()?;
        let row: Option<Row> = conn.exec_first(
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"),
            (account_id,),
        )?;
        row.map(account_from_row).transpose()
    }

    fn save_received_email(&self, email: NewReceivedEmail) -> StorageResult<Option<i64>> {
        let mut conn = self.conn()?;
        let account_id = email.account_id;
        let received_at = email.received_at.unwrap_or_else(Utc::now);

        let result = conn.exec_drop(
            "INSERT INTO received_emails
             (account_id, message_id, sender, recipient, subject, body, received_at)
             VALUES (:account_id, :message_id, :sender, :recipient, :subject, :body, :received_at)",
            params! {
                "account_id" => account_id,
                "message_id" => email.message_id.clone(),
                "sender" => email.sender.clone(),
                "recipient" => email.recipient.clone(),
                "subject" => email.subject.clone(),
                "body" => email.body.clone(),
                "received_at" => to_db_timestamp(&received_at),
            },
        );

        match result {
            Ok(()) => Ok(Some(conn.last_insert_id() as i64)),
            Err(e) => {
                let outcome = insert_failure(e, account_id);
                if let Ok(None) = outcome {
                    debug!(
                        "Message {:?} already stored for account {}",
                        email.message_id, account_id
                    );
                }
                outcome
            }
        }
    }

    fn has_received_email(&self, account_id: i64, message_id: &str) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let count: Option<i64> = conn.exec_first(
            "SELECT COUNT(*) FROM received_emails WHERE account_id = ? AND message_id = ?",
            (account_id, message_id),
        )?;
        Ok(count.unwrap_or(0) > 0)
    }

    fn get_all_received_emails(&self) -> StorageResult<Vec<ReceivedEmail>> {
        let mut conn = self.conn()?;
        let rows: Vec<Row> = conn.query(format!(
            "SELECT {EMAIL_COLUMNS} FROM received_emails ORDER BY received_at DESC, id DESC"
        ))?;
        rows.into_iter().map(email_from_row).collect()
    }

    fn get_received_emails_by_account(&self, account_id: i64) -> StorageResult<Vec<ReceivedEmail>> {
        let mut conn = self.conn()?;
        let rows: Vec<Row> = conn.exec(
            format!(
                "SELECT {EMAIL_COLUMNS} FROM received_emails WHERE account_id = ?
                 ORDER BY received_at DESC, id DESC"
            ),
            (account_id,),
        )?;
        rows.into_iter().map(email_from_row).collect()
    }

    fn get_received_email_by_id(&self, id: i64) -> StorageResult<Option<ReceivedEmail>> {
        let mut conn = self.conn()?;
        let row: Option<Row> = conn.exec_first(
            format!("SELECT {EMAIL_COLUMNS} FROM received_emails WHERE id = ?"),
            (id,),
        )?;
        row.map(email_from_row).transpose()
    }
}
