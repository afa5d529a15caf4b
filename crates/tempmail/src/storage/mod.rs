//! Storage trait and implementations
//!
//! Every backend implements [`AccountStore`]. [`Storage`] selects between the
//! relational stores and the local file once, at construction.

mod backend;
mod document;
mod file;
mod memory;
#[cfg(feature = "mysql")]
mod mysql;
mod sqlite;
mod traits;

use chrono::{DateTime, Duration, SecondsFormat, Utc};

pub use backend::{BackendKind, RemoteProblem, Storage};
pub use file::LocalFileStore;
pub use memory::InMemoryStore;
#[cfg(feature = "mysql")]
pub use self::mysql::MySqlStore;
pub use sqlite::SqliteStore;
pub use traits::{AccountStore, StorageError, StorageResult};

/// Expiry for a token issued now
pub(crate) fn token_expiry(ttl_hours: i64) -> DateTime<Utc> {
    Utc::now() + Duration::hours(ttl_hours)
}

/// Fixed-width UTC text so lexical order matches time order
pub(crate) fn to_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_db_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_timestamps_sort_lexically() {
        let early = Utc::now();
        let late = early + Duration::milliseconds(1500);
        assert!(to_db_timestamp(&early) < to_db_timestamp(&late));
    }

    #[test]
    fn test_db_timestamp_roundtrip_keeps_micros() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:20:30.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_db_timestamp(&to_db_timestamp(&ts)).unwrap(), ts);
    }

    #[test]
    fn test_db_timestamp_rejects_garbage() {
        assert!(parse_db_timestamp("yesterday").is_err());
    }
}
