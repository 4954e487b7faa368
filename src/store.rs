//! File-per-record persistence shared by the fetch and categorize stages.
//!
//! Each record lives in `<dir>/<encoded id>.json` as a versioned JSON
//! envelope. Writes are atomic upserts; the directory is never cleared, so
//! records for builds that disappeared from the server stay until purged
//! externally.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::store::{
    RECORD_FILE_EXTENSION, RECORD_FORMAT_VERSION, SKIP_UNREADABLE_MSG,
};
use crate::data::FailureRecord;
use crate::errors::TriageError;
use crate::transport::fs::{ensure_dir, list_record_files, write_atomic};

/// On-disk wrapper that makes record files self-describing.
#[derive(Debug, Serialize, Deserialize)]
struct RecordEnvelope {
    format_version: u8,
    record: FailureRecord,
}

/// A record file that could not be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Offending file.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of reading the whole store.
#[derive(Clone, Debug, Default)]
pub struct StoreLoad {
    /// Valid records, ordered by id.
    pub records: Vec<FailureRecord>,
    /// Files that were skipped.
    pub skipped: Vec<SkippedRecord>,
}

/// Directory of failure records keyed by record id.
#[derive(Clone, Debug)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    /// Open a store rooted at `root` without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open a store for writing, creating the directory when needed.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, TriageError> {
        let store = Self::new(root);
        ensure_dir(&store.root)?;
        Ok(store)
    }

    /// Store directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding record `id`.
    pub fn record_path(&self, id: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", encode_file_stem(id), RECORD_FILE_EXTENSION))
    }

    /// Insert or replace `record`.
    pub fn write(&self, record: &FailureRecord) -> Result<PathBuf, TriageError> {
        let path = self.record_path(&record.id);
        let envelope = RecordEnvelope {
            format_version: RECORD_FORMAT_VERSION,
            record: record.clone(),
        };
        let bytes =
            serde_json::to_vec_pretty(&envelope).map_err(|err| TriageError::StoreUnwritable {
                path: path.display().to_string(),
                reason: format!("failed to encode record '{}': {err}", record.id),
            })?;
        write_atomic(&path, &bytes)?;
        debug!(record_id = %record.id, path = %path.display(), "[triage:store] record written");
        Ok(path)
    }

    /// Read one record file and check its invariants.
    pub fn read(&self, path: &Path) -> Result<FailureRecord, TriageError> {
        let unreadable = |reason: String| TriageError::UnreadableRecord {
            path: path.display().to_string(),
            reason,
        };
        let bytes = fs::read(path).map_err(|err| unreadable(err.to_string()))?;
        let envelope: RecordEnvelope =
            serde_json::from_slice(&bytes).map_err(|err| unreadable(err.to_string()))?;
        if envelope.format_version != RECORD_FORMAT_VERSION {
            return Err(unreadable(format!(
                "unsupported format version {} (expected {})",
                envelope.format_version, RECORD_FORMAT_VERSION
            )));
        }
        envelope.record.validate().map_err(unreadable)?;
        Ok(envelope.record)
    }

    /// Read every record; unreadable files and duplicate ids are skipped and logged.
    ///
    /// A missing directory is an error; an empty one yields an empty load.
    pub fn load_all(&self) -> Result<StoreLoad, TriageError> {
        let mut load = StoreLoad::default();
        let mut seen = HashSet::new();
        for path in list_record_files(&self.root)? {
            let record = match self.read(&path) {
                Ok(record) => record,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, SKIP_UNREADABLE_MSG);
                    load.skipped.push(SkippedRecord {
                        path,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            if !seen.insert(record.id.clone()) {
                let reason = format!("duplicate record id '{}'", record.id);
                warn!(path = %path.display(), error = %reason, SKIP_UNREADABLE_MSG);
                load.skipped.push(SkippedRecord { path, reason });
                continue;
            }
            load.records.push(record);
        }
        load.records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(load)
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9._#-]`, plus a leading `.`.
///
/// The mapping is injective, so distinct ids never share a file.
pub fn encode_file_stem(id: &str) -> String {
    let mut encoded = String::with_capacity(id.len());
    for (idx, byte) in id.bytes().enumerate() {
        let safe = byte.is_ascii_alphanumeric()
            || matches!(byte, b'_' | b'-' | b'#')
            || (byte == b'.' && idx > 0);
        if safe {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}
