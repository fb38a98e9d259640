//! Column conversion helpers shared by the per-entity row mappers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use uuid::Uuid;

fn conv_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn uuid_col(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conv_err(idx, e))
}

pub(crate) fn timestamp_col(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conv_err(idx, e))
}

pub(crate) fn opt_timestamp_col(
    idx: usize,
    s: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| timestamp_col(idx, &s)).transpose()
}

/// Parse one of the closed vocabulary enums (role, category, audience).
pub(crate) fn enum_col<T>(idx: usize, s: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = varsity_shared::ParseEnumError>,
{
    s.parse().map_err(|e| conv_err(idx, e))
}

/// Deserialize a JSON-encoded column (audience lists, tags, attachments).
pub(crate) fn json_col<T: DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s).map_err(|e| conv_err(idx, e))
}
