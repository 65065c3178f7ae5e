//! Date derivation and timestamp coercion for partition columns.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Serialized-datetime fragment embedded in shipment details,
/// e.g. `{'date': datetime.datetime(2024, 3, 5, 9, 30, 0), ...}`.
static DATETIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"datetime\.datetime\((.*?)\)").expect("datetime pattern is a valid regex")
});

/// Timestamp format accepted by the warehouse CSV loader.
pub const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// A partition value that could not be parsed. Never fatal: the value is
/// loaded as null.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable timestamp '{value}'")]
pub struct DateParseSoftFailure {
    pub value: String,
}

/// Derive a `YYYY-MM-DD HH:MM:SS` timestamp from shipment details text.
///
/// Returns `None` when the text has no `datetime.datetime(...)` fragment,
/// when the fragment has fewer than six components or when one of the first
/// six is not an integer.
pub fn extract_shipment_date(details: &str) -> Option<String> {
    let captures = DATETIME_PATTERN.captures(details)?;
    let parts: Vec<&str> = captures[1].split(',').map(str::trim).take(6).collect();
    if parts.len() < 6 {
        return None;
    }

    let n: Vec<u32> = parts
        .iter()
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;

    Some(format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        n[0], n[1], n[2], n[3], n[4], n[5]
    ))
}

/// Parse a raw timestamp into a UTC instant.
///
/// Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive = value
        .strip_suffix("UTC")
        .or_else(|| value.strip_suffix('Z'))
        .unwrap_or(value)
        .trim_end();
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Coerce a raw partition value into the warehouse wire format.
///
/// Empty values stay null without counting as a failure.
pub fn coerce_timestamp(raw: &str) -> Result<Option<String>, DateParseSoftFailure> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_timestamp(raw)
        .map(|dt| Some(dt.format(WIRE_FORMAT).to_string()))
        .ok_or_else(|| DateParseSoftFailure {
            value: raw.to_string(),
        })
}
