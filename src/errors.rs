use std::io;

use thiserror::Error;

use crate::types::{Endpoint, PathString};

/// Error type for fetch, record-store, and categorization failures.
///
/// Run-level variants (`ServerUnreachable`, `ServerRejected`, `ScriptUnavailable`,
/// `StoreUnwritable`, `Configuration`) abort a run. Record-level variants
/// (`MalformedEntry`, `ConsoleUnavailable`, `UnreadableRecord`) are logged and
/// skipped by the stage that produced them.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("build server at '{endpoint}' is unreachable: {reason}")]
    ServerUnreachable { endpoint: Endpoint, reason: String },
    #[error("build server at '{endpoint}' rejected the request with status {status}")]
    ServerRejected { endpoint: Endpoint, status: u16 },
    #[error("malformed failure entry on line {line}: {details}")]
    MalformedEntry { line: usize, details: String },
    #[error("console log '{url}' is unavailable: {reason}")]
    ConsoleUnavailable { url: String, reason: String },
    #[error("failure record '{path}' is unreadable: {reason}")]
    UnreadableRecord { path: PathString, reason: String },
    #[error("query script '{path}' could not be read: {reason}")]
    ScriptUnavailable { path: PathString, reason: String },
    #[error("record store '{path}' is not writable: {reason}")]
    StoreUnwritable { path: PathString, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl TriageError {
    /// True for errors confined to a single entry or record file.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            TriageError::MalformedEntry { .. }
                | TriageError::ConsoleUnavailable { .. }
                | TriageError::UnreadableRecord { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_level_errors_are_distinguished_from_fatal_ones() {
        let malformed = TriageError::MalformedEntry {
            line: 3,
            details: "missing build number".into(),
        };
        let unreachable = TriageError::ServerUnreachable {
            endpoint: "http://ci.local/scriptText".into(),
            reason: "connection refused".into(),
        };
        assert!(malformed.is_record_level());
        assert!(!unreachable.is_record_level());
        assert!(
            unreachable
                .to_string()
                .contains("http://ci.local/scriptText")
        );
    }
}
