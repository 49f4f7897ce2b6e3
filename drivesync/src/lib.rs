use std::cmp;

use chrono::{DateTime, DurationRound, Utc};

pub mod config;
pub mod entry;
pub mod error;
pub mod loc;
pub mod oauth2;

pub use crate::config::RunConfig;
pub use crate::entry::{FileId, LocalEntry, Outcome, RemoteEntry, FOLDER_MIMETYPE};
pub use crate::error::{Error, Result};

/// Rounds `mtime` to the nearest whole second.
/// Drive reports milliseconds, local file systems often nanoseconds.
pub fn round_mtime(mtime: DateTime<Utc>) -> DateTime<Utc> {
    mtime
        .duration_round(chrono::Duration::seconds(1))
        .unwrap_or(mtime)
}

/// Parses a Drive `modifiedTime` (RFC 3339).
/// Returns `None` for anything that doesn't parse.
pub fn parse_mtime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Compares a local and a remote modification time at one second resolution.
/// An unknown remote time compares as equal.
pub fn compare_mtime(local: DateTime<Utc>, remote: Option<DateTime<Utc>>) -> cmp::Ordering {
    match remote {
        Some(remote) => round_mtime(local).cmp(&round_mtime(remote)),
        None => cmp::Ordering::Equal,
    }
}
