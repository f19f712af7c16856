//! Ordering of provider ISO-8601 timestamps
//!
//! Values are compared as instants when both parse as RFC 3339, so
//! `2023-01-01T10:00:00Z` and `2023-01-01T10:00:00.000Z` are equal. Anything
//! unparseable falls back to plain string ordering.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

fn parse(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Compare two timestamps
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// True if `candidate` is strictly later than `cursor`
pub fn is_after(candidate: &str, cursor: &str) -> bool {
    compare(candidate, cursor) == Ordering::Greater
}

/// Latest timestamp of `values`, returned as the original string
pub fn latest<'a, I>(values: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .filter(|v| !v.is_empty())
        .max_by(|a, b| compare(a, b))
}
