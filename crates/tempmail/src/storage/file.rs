//! Local JSON file storage
//!
//! The whole document is read, changed and written back on every mutating
//! call. Writes go to a sibling temporary file that is then renamed over the
//! store, so a crash mid-write leaves the previous version intact. There is
//! no cross-process locking.

use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::document::StoreDocument;
use super::token_expiry;
use super::traits::{AccountStore, StorageError, StorageResult};
use crate::models::{Account, NewReceivedEmail, ReceivedEmail};

/// Single-file implementation of AccountStore
pub struct LocalFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

/// Accepted on-disk layouts
#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk {
    Current(StoreDocument),
    /// Earlier flat list of saved credentials
    Legacy(Vec<LegacyAccount>),
    /// Earliest layout: a single credential record
    LegacySingle(LegacyAccount),
}

#[derive(Deserialize)]
struct LegacyAccount {
    email: String,
    password: String,
    #[serde(default)]
    token: Option<String>,
}

impl LocalFileStore {
    /// Use the document at `path`; nothing is read or created until the first call
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StorageResult<StoreDocument> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreDocument::default()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(StoreDocument::default());
        }

        let on_disk: OnDisk =
            serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        Ok(match on_disk {
            OnDisk::Current(doc) => doc,
            OnDisk::Legacy(entries) => {
                info!(
                    "Importing {} legacy account entries from {}",
                    entries.len(),
                    self.path.display()
                );
                import_legacy(entries)
            }
            OnDisk::LegacySingle(entry) => {
                info!("Importing legacy account record from {}", self.path.display());
                import_legacy(vec![entry])
            }
        })
    }

    fn save(&self, doc: &StoreDocument) -> StorageResult<()> {
        let io_err = |source: std::io::Error| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(doc).map_err(|e| io_err(e.into()))?;
        let tmp = self.temp_path();
        fs::write(&tmp, content).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        debug!(
            "Wrote {} accounts and {} messages to {}",
            doc.accounts.len(),
            doc.received_emails.len(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load, apply `change`, write back
    fn update<T>(
        &self,
        change: impl FnOnce(&mut StoreDocument) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let _guard = self.write_lock.lock().unwrap();
        let mut doc = self.load()?;
        let result = change(&mut doc)?;
        self.save(&doc)?;
        Ok(result)
    }
}

/// Convert the flat credential list; later duplicates win like an upsert
fn import_legacy(entries: Vec<LegacyAccount>) -> StoreDocument {
    let mut doc = StoreDocument::default();
    let now = Utc::now();
    for entry in entries {
        let id = doc.upsert_account(&entry.email, &entry.password, now);
        // Legacy tokens carry no expiry, so they are kept but never considered valid
        if let Some(account) = doc.accounts.iter_mut().find(|a| a.id == id) {
            account.token = entry.token;
            account.token_expiry = None;
        }
    }
    doc
}

impl AccountStore for LocalFileStore {
    fn save_account(&self, email: &str, password: &str) -> StorageResult<i64> {
        self.update(|doc| Ok(doc.upsert_account(email, password, Utc::now())))
    }

    fn save_token(&self, account_id: i64, token: &str, ttl_hours: i64) -> StorageResult<()> {
        self.update(|doc| doc.set_token(account_id, Some((token, token_expiry(ttl_hours)))))
    }

    fn clear_token(&self, account_id: i64) -> StorageResult<()> {
        self.update(|doc| doc.set_token(account_id, None))
    }

    fn get_all_accounts(&self) -> StorageResult<Vec<Account>> {
        Ok(self.load()?.accounts_newest_first())
    }

    fn get_account_by_email(&self, email: &str) -> StorageResult<Option<Account>> {
        Ok(self.load()?.account_by_email(email).cloned())
    }

    fn get_account_by_id(&self, account_id: i64) -> StorageResult<Option<Account>> {
        Ok(self.load()?.account_by_id(account_id).cloned())
    }

    fn save_received_email(&self, email: NewReceivedEmail) -> StorageResult<Option<i64>> {
        let _guard = self.write_lock.lock().unwrap();
        let mut doc = self.load()?;
        let id = doc.insert_email(email)?;
        // Duplicates leave the file untouched
        if id.is_some() {
            self.save(&doc)?;
        }
        Ok(id)
    }

    fn has_received_email(&self, account_id: i64, message_id: &str) -> StorageResult<bool> {
        Ok(self.load()?.has_email(account_id, message_id))
    }

    fn get_all_received_emails(&self) -> StorageResult<Vec<ReceivedEmail>> {
        Ok(self.load()?.emails_newest_first(None))
    }

    fn get_received_emails_by_account(&self, account_id: i64) -> StorageResult<Vec<ReceivedEmail>> {
        Ok(self.load()?.emails_newest_first(Some(account_id)))
    }

    fn get_received_email_by_id(&self, id: i64) -> StorageResult<Option<ReceivedEmail>> {
        Ok(self.load()?.email_by_id(id).cloned())
    }
}
