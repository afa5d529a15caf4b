//! Relational database reachability and connection handles
//!
//! A probe runs in two steps. A raw TCP connect with a bounded timeout comes
//! first, and the protocol-level check (`SELECT 1`) runs only if it succeeds.
//! Network failures (DNS, firewall, host down) and protocol failures (bad
//! credentials, missing database) end up as different [`ProbeReason`]s.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use rusqlite::Connection;

use crate::config::DatabaseConfig;

/// Why the relational backend can't be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeReason {
    NotConfigured,
    ModuleMissing,
    NetworkUnreachable,
    QueryFailed,
    DriverError,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("No database configured")]
    NotConfigured,

    #[error("Support for {0} is not compiled in (rebuild with the `mysql` feature)")]
    ModuleMissing(String),

    #[error("Cannot reach database server at {host}:{port}")]
    NetworkUnreachable { host: String, port: u16 },

    #[error("Database check query failed: {0}")]
    QueryFailed(String),

    #[error("Database driver error: {0}")]
    DriverError(String),
}

impl ProbeError {
    pub fn reason(&self) -> ProbeReason {
        match self {
            ProbeError::NotConfigured => ProbeReason::NotConfigured,
            ProbeError::ModuleMissing(_) => ProbeReason::ModuleMissing,
            ProbeError::NetworkUnreachable { .. } => ProbeReason::NetworkUnreachable,
            ProbeError::QueryFailed(_) => ProbeReason::QueryFailed,
            ProbeError::DriverError(_) => ProbeReason::DriverError,
        }
    }
}

/// A live connection to the configured database
#[derive(Clone)]
pub enum DatabaseHandle {
    Sqlite(Arc<Mutex<Connection>>),
    #[cfg(feature = "mysql")]
    MySql(mysql::Pool),
}

impl std::fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseHandle::Sqlite(_) => f.write_str("DatabaseHandle::Sqlite"),
            #[cfg(feature = "mysql")]
            DatabaseHandle::MySql(_) => f.write_str("DatabaseHandle::MySql"),
        }
    }
}

/// Whether a TCP connection to `host:port` can be opened within `timeout`.
///
/// Every resolved address is tried in turn. No bytes are exchanged.
pub fn probe_network(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("Cannot resolve {}: {}", host, e);
            return false;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => {
                debug!("Reached {} ({})", host, addr);
                return true;
            }
            Err(e) => debug!("Connect to {} failed: {}", addr, e),
        }
    }
    false
}

/// Probes the configured database and caches a handle once it works
pub struct ConnectionManager {
    database: Option<DatabaseConfig>,
    handle: Mutex<Option<DatabaseHandle>>,
}

impl ConnectionManager {
    pub fn new(database: Option<DatabaseConfig>) -> Self {
        Self {
            database,
            handle: Mutex::new(None),
        }
    }

    pub fn database(&self) -> Option<&DatabaseConfig> {
        self.database.as_ref()
    }

    /// Run a fresh probe without touching the cached handle
    pub fn probe_database(&self) -> Result<(), ProbeError> {
        self.connect().map(|_| ())
    }

    /// The cached handle, or a new one if the probe succeeds.
    ///
    /// Once built, the handle is reused until [`invalidate`](Self::invalidate).
    pub fn acquire_connection(&self) -> Result<DatabaseHandle, ProbeError> {
        let mut cached = self.handle.lock().unwrap();
        if let Some(handle) = cached.as_ref() {
            return Ok(handle.clone());
        }

        let handle = self.connect()?;
        info!(
            "Connected to {}",
            self.database
                .as_ref()
                .map(DatabaseConfig::describe)
                .unwrap_or_default()
        );
        *cached = Some(handle.clone());
        Ok(handle)
    }

    /// Drop the cached handle so the next acquire probes again
    pub fn invalidate(&self) {
        if self.handle.lock().unwrap().take().is_some() {
            debug!("Database handle invalidated");
        }
    }

    fn connect(&self) -> Result<DatabaseHandle, ProbeError> {
        let Some(database) = &self.database else {
            return Err(ProbeError::NotConfigured);
        };

        let result = match database {
            DatabaseConfig::Sqlite { path } => connect_sqlite(path),
            DatabaseConfig::Mysql { .. } => connect_mysql(database),
        };

        if let Err(e) = &result {
            warn!("Database probe for {} failed: {}", database.describe(), e);
        }
        result
    }
}

fn connect_sqlite(path: &std::path::Path) -> Result<DatabaseHandle, ProbeError> {
    let conn = Connection::open(path).map_err(|e| ProbeError::DriverError(e.to_string()))?;
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map_err(|e| ProbeError::QueryFailed(e.to_string()))?;
    Ok(DatabaseHandle::Sqlite(Arc::new(Mutex::new(conn))))
}

#[cfg(not(feature = "mysql"))]
fn connect_mysql(_database: &DatabaseConfig) -> Result<DatabaseHandle, ProbeError> {
    Err(ProbeError::ModuleMissing("mysql".to_string()))
}

#[cfg(feature = "mysql")]
fn connect_mysql(database: &DatabaseConfig) -> Result<DatabaseHandle, ProbeError> {
    use mysql::prelude::Queryable;
    use mysql::{OptsBuilder, Pool, PoolConstraints, PoolOpts};

    let (
        Some((host, port)),
        DatabaseConfig::Mysql {
            user,
            password,
            database: db_name,
            connect_timeout_secs,
            ..
        },
    ) = (database.endpoint(), database)
    else {
        return Err(ProbeError::NotConfigured);
    };

    let timeout = Duration::from_secs(*connect_timeout_secs);
    if !probe_network(host, port, timeout) {
        return Err(ProbeError::NetworkUnreachable {
            host: host.to_string(),
            port,
        });
    }

    let constraints = PoolConstraints::new(1, 4).unwrap_or_default();
    let opts = OptsBuilder::new()
        .ip_or_hostname(Some(host))
        .tcp_port(port)
        .user(Some(user.as_str()))
        .pass(Some(password.as_str()))
        .db_name(Some(db_name.as_str()))
        .tcp_connect_timeout(Some(timeout))
        .pool_opts(PoolOpts::default().with_constraints(constraints));

    let pool = Pool::new(opts).map_err(|e| ProbeError::DriverError(e.to_string()))?;
    let mut conn = pool
        .get_conn()
        .map_err(|e| ProbeError::DriverError(e.to_string()))?;
    conn.query_drop("SELECT 1")
        .map_err(|e| ProbeError::QueryFailed(e.to_string()))?;

    Ok(DatabaseHandle::MySql(pool))
}
