use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::categorize::{DEFAULT_SIMILARITY_THRESHOLD, SIGNATURE_DISPLAY_CHARS};
use crate::constants::fetch::{DEFAULT_BASE_URL, DEFAULT_MAX_EXCERPT_CHARS, DEFAULT_TIMEOUT_SECS};
use crate::constants::store::DEFAULT_RECORD_DIR;
use crate::errors::TriageError;
use crate::similarity::SimilarityMetric;

/// How failure text is turned into an excerpt before normalization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExcerptMode {
    /// Use the failure text as delivered.
    #[default]
    Verbatim,
    /// Keep only lines carrying failure markers, else the console tail.
    FailureLines,
}

/// HTTP basic credentials for the build server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Build-server user name.
    pub user: String,
    /// API token; never logged.
    pub token: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Configuration for one fetch run.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Build-server base URL (e.g. `http://localhost:8080`).
    pub base_url: String,
    /// Record-store directory receiving one file per failure.
    pub output_dir: PathBuf,
    /// Query script submitted to the script console.
    pub script_path: PathBuf,
    /// Bound on every remote call.
    pub timeout: Duration,
    /// Excerpt cap in chars, applied after whitespace normalization.
    pub max_excerpt_chars: usize,
    /// Excerpt extraction applied before normalization.
    pub excerpt_mode: ExcerptMode,
    /// Fetch console logs for entries whose text is an `http(s)://` URL.
    pub follow_console_urls: bool,
    /// Optional basic-auth credentials.
    pub credentials: Option<Credentials>,
}

impl FetchConfig {
    /// Create a config with explicit server, output directory and script.
    pub fn new(
        base_url: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        script_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            output_dir: output_dir.into(),
            script_path: script_path.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_excerpt_chars: DEFAULT_MAX_EXCERPT_CHARS,
            excerpt_mode: ExcerptMode::default(),
            follow_console_urls: false,
            credentials: None,
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the excerpt cap.
    pub fn with_max_excerpt_chars(mut self, max_excerpt_chars: usize) -> Self {
        self.max_excerpt_chars = max_excerpt_chars;
        self
    }

    /// Override excerpt extraction.
    pub fn with_excerpt_mode(mut self, excerpt_mode: ExcerptMode) -> Self {
        self.excerpt_mode = excerpt_mode;
        self
    }

    /// Enable or disable console-log follow-up for URL entries.
    pub fn with_follow_console_urls(mut self, follow_console_urls: bool) -> Self {
        self.follow_console_urls = follow_console_urls;
        self
    }

    /// Attach basic-auth credentials.
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Base URL without trailing slashes.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), TriageError> {
        let base = self.base();
        let host = base
            .strip_prefix("http://")
            .or_else(|| base.strip_prefix("https://"))
            .ok_or_else(|| {
                TriageError::Configuration(format!(
                    "base URL '{}' must start with http:// or https://",
                    self.base_url
                ))
            })?;
        if host.is_empty() {
            return Err(TriageError::Configuration(format!(
                "base URL '{}' has no host",
                self.base_url
            )));
        }
        if self.max_excerpt_chars == 0 {
            return Err(TriageError::Configuration(
                "max excerpt chars must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(TriageError::Configuration(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_RECORD_DIR, "find-failed.groovy")
    }
}

/// Output encoding of a categorize report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Human-readable blocks (stdout by default).
    #[default]
    Text,
    /// Pretty-printed JSON document.
    Json,
    /// Directory with `index.html` plus one page per category.
    Html,
}

/// Configuration for one categorize run.
#[derive(Clone, Debug)]
pub struct CategorizeConfig {
    /// Record-store directory to read.
    pub input_dir: PathBuf,
    /// Minimum similarity for joining an existing category, in `[0, 1]`.
    pub threshold: f64,
    /// Similarity metric applied to excerpts.
    pub metric: SimilarityMetric,
    /// Report encoding.
    pub format: ReportFormat,
    /// Report destination; `None` writes to stdout (text/json only).
    pub output: Option<PathBuf>,
    /// Signature chars shown in text and HTML reports.
    pub signature_display_chars: usize,
}

impl CategorizeConfig {
    /// Create a config reading from `input_dir` with default clustering settings.
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            metric: SimilarityMetric::default(),
            format: ReportFormat::default(),
            output: None,
            signature_display_chars: SIGNATURE_DISPLAY_CHARS,
        }
    }

    /// Override the similarity threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Override the similarity metric.
    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Override the report format.
    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    /// Send the report to a file (text/json) or directory (html).
    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    /// Reject thresholds outside `[0, 1]` and HTML reports without a directory.
    pub fn validate(&self) -> Result<(), TriageError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TriageError::Configuration(format!(
                "similarity threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.format == ReportFormat::Html && self.output.is_none() {
            return Err(TriageError::Configuration(
                "html reports require an output directory".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CategorizeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RECORD_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_tolerates_trailing_slashes() {
        let plain = FetchConfig::new("http://ci.local:8080", "out", "s.groovy");
        let slashed = FetchConfig::new("http://ci.local:8080//", "out", "s.groovy");
        assert_eq!(plain.base(), "http://ci.local:8080");
        assert_eq!(slashed.base(), plain.base());
    }

    #[test]
    fn fetch_validation_rejects_bad_urls_and_limits() {
        assert!(FetchConfig::default().validate().is_ok());
        assert!(
            FetchConfig::new("ci.local", "out", "s.groovy")
                .validate()
                .is_err()
        );
        assert!(
            FetchConfig::new("https://", "out", "s.groovy")
                .validate()
                .is_err()
        );
        assert!(
            FetchConfig::default()
                .with_max_excerpt_chars(0)
                .validate()
                .is_err()
        );
        assert!(
            FetchConfig::default()
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn categorize_validation_bounds_threshold() {
        assert!(CategorizeConfig::default().validate().is_ok());
        assert!(
            CategorizeConfig::default()
                .with_threshold(1.2)
                .validate()
                .is_err()
        );
        assert!(
            CategorizeConfig::default()
                .with_threshold(f64::NAN)
                .validate()
                .is_err()
        );
        assert!(
            CategorizeConfig::default()
                .with_format(ReportFormat::Html)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn credentials_debug_redacts_token() {
        let creds = Credentials::new("triage-bot", "s3cr3t");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("triage-bot"));
        assert!(!rendered.contains("s3cr3t"));
    }
}
