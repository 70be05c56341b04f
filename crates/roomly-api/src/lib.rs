pub mod auth;
pub mod conversations;
pub mod error;
pub mod matching;
pub mod middleware;

use chrono::{DateTime, Utc};
use tracing::warn;

/// Parse a timestamp column. SQLite's datetime('now') default stores
/// "YYYY-MM-DD HH:MM:SS" without timezone; message rows store RFC 3339.
pub(crate) fn parse_db_time(value: &str, context: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", value, context, e);
            DateTime::default()
        })
}

/// Parse an id column written by roomly-db as a UUID string.
pub(crate) fn parse_db_uuid(value: &str, context: &str) -> uuid::Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}' on {}: {}", value, context, e);
        uuid::Uuid::nil()
    })
}
