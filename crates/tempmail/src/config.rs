//! Runtime configuration for the tempmail core
//!
//! Loaded in order of priority:
//! 1. Environment variables (override individual fields)
//! 2. JSON file (~/.config/tempmail/config.json)
//! 3. Built-in defaults

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::provider::MailTmClient;

/// Config filename in the tempmail config directory
const CONFIG_FILE: &str = "config.json";

/// Local account file in the tempmail data directory
const DATA_FILE: &str = "accounts.json";

/// Accepted bounds for provider request timeouts, in seconds
const MIN_TIMEOUT_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 15;

/// Token lifetime assumed when a token is stored
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Tempmail settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempmailConfig {
    /// Base URL of the mail provider API
    pub api_base_url: String,
    /// Per-request timeout, clamped to 10..=15 seconds
    pub request_timeout_secs: u64,
    /// Lifetime assigned to freshly issued tokens
    pub token_ttl_hours: i64,
    /// Refuse the local-file fallback when the database is unusable
    pub require_remote: bool,
    /// Local-file store location (defaults to the data directory)
    pub data_file: Option<PathBuf>,
    /// Relational database, if one is configured
    pub database: Option<DatabaseConfig>,
}

/// Relational database settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// Embedded SQLite database file
    Sqlite { path: PathBuf },
    /// MariaDB/MySQL server (requires the `mysql` feature)
    Mysql {
        host: String,
        #[serde(default = "default_mysql_port")]
        port: u16,
        user: String,
        #[serde(default)]
        password: String,
        database: String,
        #[serde(default = "default_connect_timeout")]
        connect_timeout_secs: u64,
    },
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_connect_timeout() -> u64 {
    10
}

impl DatabaseConfig {
    /// Network endpoint to probe before talking to the database, if any
    pub fn endpoint(&self) -> Option<(&str, u16)> {
        match self {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Mysql { host, port, .. } => Some((host.as_str(), *port)),
        }
    }

    /// Short human description, without credentials
    pub fn describe(&self) -> String {
        match self {
            DatabaseConfig::Sqlite { path } => format!("sqlite:{}", path.display()),
            DatabaseConfig::Mysql {
                host,
                port,
                database,
                ..
            } => format!("mysql://{}:{}/{}", host, port, database),
        }
    }
}

impl Default for TempmailConfig {
    fn default() -> Self {
        Self {
            api_base_url: MailTmClient::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: MAX_TIMEOUT_SECS,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            require_remote: false,
            data_file: None,
            database: None,
        }
    }
}

impl TempmailConfig {
    /// Load the config file (if any), then apply environment overrides
    pub fn load() -> Result<Self> {
        let base = if config::config_exists(CONFIG_FILE) {
            config::load_json(CONFIG_FILE)?
        } else {
            Self::default()
        };

        let config = base.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    ///
    /// Recognized: `TEMPMAIL_API_URL`, `TEMPMAIL_DATA_FILE`,
    /// `TEMPMAIL_REQUIRE_REMOTE`, `TEMPMAIL_SQLITE_PATH` and the
    /// `TEMPMAIL_DB_HOST`/`_PORT`/`_USER`/`_PASSWORD`/`_NAME` group.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("TEMPMAIL_API_URL") {
            self.api_base_url = url;
        }
        if let Some(path) = lookup("TEMPMAIL_DATA_FILE") {
            self.data_file = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup("TEMPMAIL_REQUIRE_REMOTE") {
            self.require_remote = matches!(flag.trim(), "1" | "true" | "yes");
        }
        if let Some(path) = lookup("TEMPMAIL_SQLITE_PATH") {
            self.database = Some(DatabaseConfig::Sqlite {
                path: PathBuf::from(path),
            });
        }
        if let Some(host) = lookup("TEMPMAIL_DB_HOST") {
            let port = match lookup("TEMPMAIL_DB_PORT") {
                Some(port) => port
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid TEMPMAIL_DB_PORT: {}", port))?,
                None => default_mysql_port(),
            };
            self.database = Some(DatabaseConfig::Mysql {
                host,
                port,
                user: lookup("TEMPMAIL_DB_USER").unwrap_or_else(|| "root".to_string()),
                password: lookup("TEMPMAIL_DB_PASSWORD").unwrap_or_default(),
                database: lookup("TEMPMAIL_DB_NAME").unwrap_or_else(|| "tempmail".to_string()),
                connect_timeout_secs: default_connect_timeout(),
            });
        }
        Ok(self)
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid api_base_url: {}", self.api_base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("api_base_url must be http or https, got {}", url.scheme());
        }
        if self.token_ttl_hours <= 0 {
            bail!("token_ttl_hours must be positive");
        }
        Ok(())
    }

    /// Provider request timeout within the accepted bounds
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS),
        )
    }

    /// Where the local-file store lives
    pub fn data_file_path(&self) -> Result<PathBuf> {
        match &self.data_file {
            Some(path) => Ok(path.clone()),
            None => config::data_path(DATA_FILE).context("Could not determine data directory"),
        }
    }

    /// Persist these settings to the config directory
    pub fn save(&self) -> Result<PathBuf> {
        config::save_json(CONFIG_FILE, self)
    }

    /// Default config file location
    pub fn default_config_path() -> Option<PathBuf> {
        config::config_path(CONFIG_FILE)
    }
}
