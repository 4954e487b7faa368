use crate::metadata::MetadataKey;

/// Constants used by the fetch stage and its build-server transport.
pub mod fetch {
    /// Script console path appended to the build-server base URL.
    pub const SCRIPT_CONSOLE_PATH: &str = "scriptText";
    /// CSRF crumb issuer path appended to the build-server base URL.
    pub const CRUMB_ISSUER_PATH: &str = "crumbIssuer/api/json";
    /// Header used for the crumb when the issuer does not name one.
    pub const DEFAULT_CRUMB_HEADER: &str = "Jenkins-Crumb";
    /// Form field carrying the query script text.
    pub const SCRIPT_FORM_FIELD: &str = "script";
    /// Field separator for tab-separated response entries.
    pub const ENTRY_FIELD_DELIMITER: char = '\t';
    /// Default per-call timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
    /// Maximum number of response bytes read from one call (64 MiB).
    pub const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;
    /// Default excerpt cap in chars.
    pub const DEFAULT_MAX_EXCERPT_CHARS: usize = 2048;
    /// Substrings that mark a console line as failure evidence.
    pub const FAILURE_MARKERS: &[&str] = &[
        "Exception:",
        "Error:",
        "ERROR",
        "FAILURE:",
        "BUILD FAILED",
        "An exception occurred",
        "Caused by:",
    ];
    /// Prefix of a stack frame line once leading whitespace is removed.
    pub const STACK_FRAME_PREFIX: &str = "at ";
    /// Console tail length used when no failure marker matches.
    pub const CONSOLE_TAIL_LINES: usize = 20;
    /// Default build-server base URL.
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
    /// Environment variable holding the build-server base URL.
    pub const ENV_BASE_URL: &str = "TRIAGE_JENKINS_URL";
    /// Environment variable holding the build-server user.
    pub const ENV_USER: &str = "TRIAGE_JENKINS_USER";
    /// Environment variable holding the build-server API token.
    pub const ENV_TOKEN: &str = "TRIAGE_JENKINS_TOKEN";
    /// Log message used when a response entry cannot be parsed.
    pub const SKIP_MALFORMED_MSG: &str = "skipping malformed failure entry";
    /// Log message used when an entry yields no failure text.
    pub const SKIP_EMPTY_MSG: &str = "skipping failure entry without extractable text";
    /// Log message used when a console-log follow-up fails.
    pub const SKIP_CONSOLE_MSG: &str = "skipping failure entry whose console log is unavailable";
}

/// Constants used by the on-disk record store.
pub mod store {
    /// File extension of persisted records.
    pub const RECORD_FILE_EXTENSION: &str = "json";
    /// Extension of in-flight record writes.
    pub const TEMP_FILE_EXTENSION: &str = "part";
    /// Version tag written into every record file.
    pub const RECORD_FORMAT_VERSION: u8 = 1;
    /// Default record directory.
    pub const DEFAULT_RECORD_DIR: &str = "jenkins-failed";
    /// Environment variable holding the record directory.
    pub const ENV_RECORD_DIR: &str = "TRIAGE_RECORD_DIR";
    /// Separator between job name and build number in record ids.
    pub const RECORD_ID_SEPARATOR: char = '#';
    /// Log message used when unreadable records are skipped.
    pub const SKIP_UNREADABLE_MSG: &str = "skipping unreadable failure record";
}

/// Constants used by clustering and report rendering.
pub mod categorize {
    /// Default similarity threshold.
    pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;
    /// Default Sift4 look-ahead window.
    pub const DEFAULT_SIFT4_MAX_OFFSET: usize = 100;
    /// Signature chars shown per category in text and HTML reports.
    pub const SIGNATURE_DISPLAY_CHARS: usize = 120;
    /// Index page name for HTML reports.
    pub const HTML_INDEX_FILENAME: &str = "index.html";
}

/// Canonical keys stored in `FailureRecord::raw_metadata`.
pub mod metadata {
    use super::MetadataKey;

    /// Separator used for serialized metadata entries (for example `node=agent-7`).
    pub const METADATA_DELIMITER: &str = "=";
    /// Build page URL.
    pub const META_FIELD_URL: MetadataKey = MetadataKey::new("url");
    /// Console log URL followed to obtain the failure text.
    pub const META_FIELD_CONSOLE_URL: MetadataKey = MetadataKey::new("console_url");
    /// Entry timestamp as reported by the script (consumed into `timestamp`).
    pub const META_FIELD_TIMESTAMP: MetadataKey = MetadataKey::new("timestamp");
}
