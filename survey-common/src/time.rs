//! Timestamp utilities
//!
//! Records carry UTC timestamps in three textual shapes:
//! - RFC 3339 in document payloads and new relational rows
//! - `%Y-%m-%dT%H-%M-%SZ` as the sortable prefix of document keys
//! - `%Y-%m-%d %H:%M:%S%.f` in relational rows written by earlier editions

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};

const KEY_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";
const KEY_PREFIX_LEN: usize = "2024-01-01T00-00-00Z".len();

/// Current UTC time at the precision timestamps are stored with
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Sortable, filename-safe rendering used as the document key prefix
pub fn key_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(KEY_FORMAT).to_string()
}

/// Recover the submission time from a document key such as
/// `responses/2024-05-29T10-11-12Z-<uuid>.json`
pub fn parse_key_timestamp(key: &str) -> Option<DateTime<Utc>> {
    let name = key.rsplit('/').next()?;
    let prefix = name.get(..KEY_PREFIX_LEN)?;
    NaiveDateTime::parse_from_str(prefix, KEY_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Canonical storage rendering (RFC 3339, microsecond precision)
pub fn to_storage(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp in any of the shapes written over time
pub fn parse_stored(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
