//! Backend selection
//!
//! [`Storage`] picks its implementation once, at construction, from the
//! connection manager's verdict. A fallback to the local file is never
//! revisited for the lifetime of the value.

use std::fmt;
use std::path::PathBuf;

use log::{info, warn};

use super::file::LocalFileStore;
#[cfg(feature = "mysql")]
use super::mysql::MySqlStore;
use super::sqlite::SqliteStore;
use super::traits::{AccountStore, StorageError, StorageResult};
use crate::connection::{ConnectionManager, DatabaseHandle, ProbeReason};
use crate::models::{Account, NewReceivedEmail, ReceivedEmail};

/// Which implementation a [`Storage`] ended up with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    MySql,
    LocalFile,
    /// Remote was required but could not be used
    Unavailable,
}

impl BackendKind {
    pub fn is_remote(self) -> bool {
        matches!(self, BackendKind::Sqlite | BackendKind::MySql)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::MySql => "mysql",
            BackendKind::LocalFile => "local file",
            BackendKind::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// Why the relational backend was not selected
#[derive(Debug, Clone)]
pub struct RemoteProblem {
    /// Probe classification; `None` when the probe passed but the store failed to initialize
    pub reason: Option<ProbeReason>,
    pub message: String,
}

/// The storage handle held by the session
pub struct Storage {
    backend: Option<Box<dyn AccountStore>>,
    kind: BackendKind,
    problem: Option<RemoteProblem>,
}

impl Storage {
    /// Select a backend.
    ///
    /// Never fails: when the database is unusable and `require_remote` is
    /// set, the returned value is non-functional and every operation returns
    /// [`StorageError::Unavailable`] until [`recover`](Self::recover) succeeds.
    /// Otherwise the local file at `data_file` is used.
    pub fn open(
        manager: &ConnectionManager,
        data_file: impl Into<PathBuf>,
        require_remote: bool,
    ) -> Self {
        match remote_store(manager) {
            Ok((backend, kind)) => {
                info!("Using {} storage", kind);
                Self {
                    backend: Some(backend),
                    kind,
                    problem: None,
                }
            }
            Err(problem) if require_remote => {
                warn!(
                    "Remote storage required but unavailable: {}",
                    problem.message
                );
                Self {
                    backend: None,
                    kind: BackendKind::Unavailable,
                    problem: Some(problem),
                }
            }
            Err(problem) => {
                let store = LocalFileStore::new(data_file);
                info!(
                    "Using local file storage at {} ({})",
                    store.path().display(),
                    problem.message
                );
                Self {
                    backend: Some(Box::new(store)),
                    kind: BackendKind::LocalFile,
                    problem: Some(problem),
                }
            }
        }
    }

    /// Local-file storage without consulting any database
    pub fn local_file(path: impl Into<PathBuf>) -> Self {
        Self::with_backend(Box::new(LocalFileStore::new(path)), BackendKind::LocalFile)
    }

    /// Wrap an existing store, e.g. an in-memory substitute
    pub fn with_backend(backend: Box<dyn AccountStore>, kind: BackendKind) -> Self {
        Self {
            backend: Some(backend),
            kind,
            problem: None,
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    pub fn is_remote(&self) -> bool {
        self.kind.is_remote()
    }

    /// Why the relational backend is not in use, if it isn't
    pub fn problem(&self) -> Option<&RemoteProblem> {
        self.problem.as_ref()
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.problem.as_ref().map(|p| p.message.as_str())
    }

    /// Retry remote selection after a required database was unavailable.
    ///
    /// Any other state is returned unchanged.
    pub fn recover(&mut self, manager: &ConnectionManager) -> StorageResult<BackendKind> {
        if self.kind != BackendKind::Unavailable {
            return Ok(self.kind);
        }

        match remote_store(manager) {
            Ok((backend, kind)) => {
                info!("Recovered {} storage", kind);
                self.backend = Some(backend);
                self.kind = kind;
                self.problem = None;
                Ok(kind)
            }
            Err(problem) => {
                let message = problem.message.clone();
                self.problem = Some(problem);
                Err(StorageError::Unavailable(message))
            }
        }
    }

    fn backend(&self) -> StorageResult<&dyn AccountStore> {
        self.backend.as_deref().ok_or_else(|| {
            StorageError::Unavailable(
                self.diagnostic()
                    .unwrap_or("no backend selected")
                    .to_string(),
            )
        })
    }
}

fn remote_store(
    manager: &ConnectionManager,
) -> Result<(Box<dyn AccountStore>, BackendKind), RemoteProblem> {
    let handle = manager.acquire_connection().map_err(|e| RemoteProblem {
        reason: Some(e.reason()),
        message: e.to_string(),
    })?;

    let opened: StorageResult<(Box<dyn AccountStore>, BackendKind)> = match handle {
        DatabaseHandle::Sqlite(conn) => SqliteStore::from_shared(conn)
            .map(|store| (Box::new(store) as Box<dyn AccountStore>, BackendKind::Sqlite)),
        #[cfg(feature = "mysql")]
        DatabaseHandle::MySql(pool) => MySqlStore::new(pool)
            .map(|store| (Box::new(store) as Box<dyn AccountStore>, BackendKind::MySql)),
    };

    opened.map_err(|e| {
        manager.invalidate();
        RemoteProblem {
            reason: None,
            message: e.to_string(),
        }
    })
}

impl AccountStore for Storage {
    fn save_account(&self, email: &str, password: &str) -> StorageResult<i64> {
        self.backend()?.save_account(email, password)
    }

    fn save_token(&self, account_id: i64, token: &str, ttl_hours: i64) -> StorageResult<()> {
        self.backend()?.save_token(account_id, token, ttl_hours)
    }

    fn get_valid_token(&self, account_id: i64) -> StorageResult<Option<String>> {
        self.backend()?.get_valid_token(account_id)
    }

    fn clear_token(&self, account_id: i64) -> StorageResult<()> {
        self.backend()?.clear_token(account_id)
    }

    fn get_all_accounts(&self) -> StorageResult<Vec<Account>> {
        self.backend()?.get_all_accounts()
    }

    fn get_account_by_email(&self, email: &str) -> StorageResult<Option<Account>> {
        self.backend()?.get_account_by_email(email)
    }

    fn get_account_by_id(&self, account_id: i64) -> StorageResult<Option<Account>> {
        self.backend()?.get_account_by_id(account_id)
    }

    fn save_received_email(&self, email: NewReceivedEmail) -> StorageResult<Option<i64>> {
        self.backend()?.save_received_email(email)
    }

    fn has_received_email(&self, account_id: i64, message_id: &str) -> StorageResult<bool> {
        self.backend()?.has_received_email(account_id, message_id)
    }

    fn get_all_received_emails(&self) -> StorageResult<Vec<ReceivedEmail>> {
        self.backend()?.get_all_received_emails()
    }

    fn get_received_emails_by_account(&self, account_id: i64) -> StorageResult<Vec<ReceivedEmail>> {
        self.backend()?.get_received_emails_by_account(account_id)
    }

    fn get_received_email_by_id(&self, id: i64) -> StorageResult<Option<ReceivedEmail>> {
        self.backend()?.get_received_email_by_id(id)
    }
}
