//! Id and timestamp helpers.

use chrono::Utc;
use uuid::Uuid;

/// Generates a time-ordered correlation id for a run.
#[must_use]
pub fn generate_request_id() -> String {
    Uuid::now_v7().to_string()
}

/// Returns the current UTC time as an RFC 3339 string with microseconds.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}
