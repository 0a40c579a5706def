//! Date/time parsing for heterogeneous RSS/Atom timestamp formats.
//!
//! Every value the pipeline stores or compares is naive UTC: a `NaiveDateTime`
//! with no attached timezone. Any tz-aware input is converted to UTC first and
//! then stripped of its offset.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimeError {
    #[error("unsupported datetime format: {0}")]
    BadDate(String),
}

/// Parse an RSS/Atom-style datetime string into a naive UTC instant.
///
/// Accepts RFC 822 (`Wed, 21 Oct 2015 07:28:00 +0000`), the same with a
/// trailing `GMT`, and ISO-8601 (including a trailing `Z`). An empty string
/// returns "now" in naive UTC.
pub fn parse_feed_datetime(raw: &str) -> Result<NaiveDateTime, TimeError> {
    if raw.is_empty() {
        return Ok(Utc::now().naive_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Ok(dt.with_timezone(&Utc).naive_utc());
    }

    if let Some(stripped) = raw.strip_suffix("GMT") {
        let rewritten = format!("{}+0000", stripped.trim_end());
        if let Ok(dt) = DateTime::parse_from_rfc2822(&rewritten) {
            return Ok(dt.with_timezone(&Utc).naive_utc());
        }
    }

    let iso_candidate = raw.replace('Z', "+00:00");
    if let Ok(dt) = DateTime::parse_from_rfc3339(&iso_candidate) {
        return Ok(dt.with_timezone(&Utc).naive_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive);
    }

    Err(TimeError::BadDate(raw.to_string()))
}

/// Normalize a possibly tz-aware datetime read back from the catalog into
/// naive UTC. Rows migrated from an older tz-aware representation are
/// normalized here rather than at write time.
pub fn normalize_to_naive_utc(dt: DateTime<Utc>) -> NaiveDateTime {
    dt.naive_utc()
}

/// Sentinel "needs full sync" watermark: the Unix epoch, naive UTC.
pub fn epoch() -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp(0, 0)
        .expect("epoch timestamp is always valid")
        .naive_utc()
}
