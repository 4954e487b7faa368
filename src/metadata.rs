use chrono::{DateTime, TimeZone, Utc};

pub use crate::constants::metadata::{
    META_FIELD_CONSOLE_URL, META_FIELD_TIMESTAMP, META_FIELD_URL, METADATA_DELIMITER,
};

/// Canonical identifier for metadata fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetadataKey {
    name: &'static str,
}

impl MetadataKey {
    /// Create a metadata key with a canonical static name.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Return the raw key name.
    pub const fn as_str(&self) -> &'static str {
        self.name
    }
}

/// Split a serialized `key=value` entry. Keys must be non-empty.
pub fn split_entry(entry: &str) -> Option<(&str, &str)> {
    let (key, value) = entry.split_once(METADATA_DELIMITER)?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

/// Parse a build timestamp given as epoch milliseconds or RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(millis) = raw.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_keys_round_trip_through_entries() {
        let entry = format!("{}{}https://ci.local/job/a/1/", META_FIELD_URL.as_str(), METADATA_DELIMITER);
        assert_eq!(
            split_entry(&entry),
            Some((META_FIELD_URL.as_str(), "https://ci.local/job/a/1/"))
        );
        assert_eq!(META_FIELD_CONSOLE_URL.as_str(), "console_url");
        assert_ne!(META_FIELD_TIMESTAMP, META_FIELD_URL);
    }

    #[test]
    fn split_entry_keeps_delimiters_inside_values() {
        assert_eq!(
            split_entry("url=https://ci.local/?a=b"),
            Some(("url", "https://ci.local/?a=b"))
        );
        assert_eq!(split_entry("=orphan"), None);
        assert_eq!(split_entry("no delimiter"), None);
    }

    #[test]
    fn timestamps_accept_epoch_millis_and_rfc3339() {
        let from_millis = parse_timestamp("1735732800000").unwrap();
        let from_rfc = parse_timestamp("2025-01-01T12:00:00Z").unwrap();
        assert_eq!(from_millis, from_rfc);
        assert_eq!(
            parse_timestamp("2025-01-01T13:00:00+01:00"),
            Some(from_rfc)
        );
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("  ").is_none());
    }
}
