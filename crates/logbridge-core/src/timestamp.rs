//! Timestamp extraction for the live resume cursor.

use chrono::{DateTime, Utc};

// RFC3339 with nanoseconds is at most ~35 chars
const MAX_TIMESTAMP_LEN: usize = 35;

/// Pull an RFC3339 timestamp (with or without sub-second precision) off the
/// start of a log line. The timestamp must be followed by a space or tab
/// within 35 characters; anything else yields `None`.
pub fn extract_timestamp(line: &str) -> Option<DateTime<Utc>> {
    if line.len() < 20 {
        return None;
    }

    let sep = line.find(|c| c == ' ' || c == '\t')?;
    if sep > MAX_TIMESTAMP_LEN {
        return None;
    }

    let candidate = line[..sep].trim();
    DateTime::parse_from_rfc3339(candidate)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
