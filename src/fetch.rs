//! Fetch stage: run the failure-enumeration script and persist one record per failure.
//!
//! Response entries arrive one per line, either as a JSON object
//! (`{"job": .., "build": .., "text": .., "timestamp": .., "metadata": {..}}`)
//! or tab-separated (`job<TAB>build<TAB>text[<TAB>key=value]*`, with `\n`,
//! `\t` and `\\` escapes inside `text`). Entries that cannot be parsed are
//! logged and skipped; everything that compromises the whole run is returned
//! as an error.

use std::collections::BTreeMap;
use std::fs;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{ExcerptMode, FetchConfig};
use crate::constants::fetch::{
    ENTRY_FIELD_DELIMITER, SKIP_CONSOLE_MSG, SKIP_EMPTY_MSG, SKIP_MALFORMED_MSG,
};
use crate::data::FailureRecord;
use crate::errors::TriageError;
use crate::metadata::{META_FIELD_CONSOLE_URL, META_FIELD_TIMESTAMP, parse_timestamp, split_entry};
use crate::store::RecordStore;
use crate::transport::{JenkinsScriptConsole, ScriptTransport};
use crate::types::{BuildNumber, Endpoint, JobName, MetaKey, MetaValue, RecordId};
use crate::utils::{extract_failure_lines, normalize_excerpt, unescape_field};

/// One parsed line of the script response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureEntry {
    /// 1-based response line the entry came from.
    pub line: usize,
    pub job_name: JobName,
    pub build_number: BuildNumber,
    /// Raw failure text, or a console URL when console follow-up is used.
    pub text: String,
    /// Build time reported by the script, if any.
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<MetaKey, MetaValue>,
}

#[derive(Debug, Deserialize)]
struct JsonEntry {
    job: Option<String>,
    build: Option<Value>,
    text: Option<String>,
    timestamp: Option<Value>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

/// Parse every non-blank response line; each result stands alone.
pub fn parse_entries(body: &str) -> Vec<Result<FailureEntry, TriageError>> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_entry(idx + 1, line))
        .collect()
}

/// Parse a single response line.
pub fn parse_entry(line: usize, raw: &str) -> Result<FailureEntry, TriageError> {
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    if trimmed.trim_start().starts_with('{') {
        parse_json_entry(line, trimmed)
    } else {
        parse_delimited_entry(line, trimmed)
    }
}

fn malformed(line: usize, details: impl Into<String>) -> TriageError {
    TriageError::MalformedEntry {
        line,
        details: details.into(),
    }
}

fn parse_delimited_entry(line: usize, raw: &str) -> Result<FailureEntry, TriageError> {
    let mut fields = raw.split(ENTRY_FIELD_DELIMITER);
    let job_name = fields.next().unwrap_or_default().trim().to_string();
    if job_name.is_empty() {
        return Err(malformed(line, "missing job name"));
    }
    let build_field = fields.next().map(str::trim).unwrap_or_default();
    let build_number = parse_build_number(build_field)
        .ok_or_else(|| malformed(line, format!("job '{job_name}': missing or invalid build number '{build_field}'")))?;
    let text = fields
        .next()
        .map(unescape_field)
        .ok_or_else(|| malformed(line, format!("job '{job_name}' build {build_number}: missing failure text")))?;

    let mut metadata = BTreeMap::new();
    for extra in fields {
        if extra.trim().is_empty() {
            continue;
        }
        let (key, value) = split_entry(extra).ok_or_else(|| {
            malformed(
                line,
                format!("job '{job_name}' build {build_number}: expected key=value, got '{extra}'"),
            )
        })?;
        metadata.insert(key.to_string(), unescape_field(value));
    }
    let timestamp = take_timestamp(line, &job_name, build_number, &mut metadata)?;

    Ok(FailureEntry {
        line,
        job_name,
        build_number,
        text,
        timestamp,
        metadata,
    })
}

fn parse_json_entry(line: usize, raw: &str) -> Result<FailureEntry, TriageError> {
    let entry: JsonEntry =
        serde_json::from_str(raw).map_err(|err| malformed(line, format!("invalid JSON: {err}")))?;
    let job_name = entry
        .job
        .map(|job| job.trim().to_string())
        .filter(|job| !job.is_empty())
        .ok_or_else(|| malformed(line, "missing job name"))?;
    let build_number = entry
        .build
        .as_ref()
        .and_then(|build| match build {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => parse_build_number(text),
            _ => None,
        })
        .ok_or_else(|| malformed(line, format!("job '{job_name}': missing or invalid build number")))?;
    let text = entry.text.ok_or_else(|| {
        malformed(line, format!("job '{job_name}' build {build_number}: missing failure text"))
    })?;

    let mut metadata: BTreeMap<MetaKey, MetaValue> = entry
        .metadata
        .into_iter()
        .map(|(key, value)| (key, json_scalar(value)))
        .collect();
    if let Some(timestamp) = entry.timestamp {
        metadata.insert(META_FIELD_TIMESTAMP.as_str().to_string(), json_scalar(timestamp));
    }
    let timestamp = take_timestamp(line, &job_name, build_number, &mut metadata)?;

    Ok(FailureEntry {
        line,
        job_name,
        build_number,
        text,
        timestamp,
        metadata,
    })
}

fn parse_build_number(raw: &str) -> Option<BuildNumber> {
    raw.trim().trim_start_matches('#').parse().ok()
}

fn json_scalar(value: Value) -> MetaValue {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn take_timestamp(
    line: usize,
    job_name: &str,
    build_number: BuildNumber,
    metadata: &mut BTreeMap<MetaKey, MetaValue>,
) -> Result<Option<DateTime<Utc>>, TriageError> {
    let Some(raw) = metadata.remove(META_FIELD_TIMESTAMP.as_str()) else {
        return Ok(None);
    };
    parse_timestamp(&raw).map(Some).ok_or_else(|| {
        malformed(
            line,
            format!("job '{job_name}' build {build_number}: invalid timestamp '{raw}'"),
        )
    })
}

fn is_console_url(text: &str) -> bool {
    let text = text.trim();
    (text.starts_with("http://") || text.starts_with("https://"))
        && !text.chars().any(char::is_whitespace)
}

/// Counters reported at the end of a fetch run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Script endpoint the run talked to.
    pub endpoint: Endpoint,
    /// Non-blank response lines.
    pub entries: usize,
    /// Records written (including overwrites).
    pub written: usize,
    /// Entries skipped as malformed.
    pub malformed: usize,
    /// Entries dropped for lack of failure text.
    pub empty: usize,
    /// Entries skipped because their console log could not be read.
    pub console_failures: usize,
    /// Entries that repeated an id seen earlier in the same response.
    pub duplicates: usize,
}

/// A record built from one entry, before it reaches the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectedRecord {
    pub record: FailureRecord,
    /// False when the entry had no timestamp and fetch time was used.
    pub reported_timestamp: bool,
}

/// Records and counters produced from one script response.
#[derive(Clone, Debug, Default)]
pub struct Collected {
    pub records: Vec<CollectedRecord>,
    pub summary: FetchSummary,
}

/// Builds the record store from live build-server state.
pub struct Fetcher<T: ScriptTransport> {
    config: FetchConfig,
    transport: T,
}

impl Fetcher<JenkinsScriptConsole> {
    /// Fetcher talking to the Jenkins script console named by `config`.
    pub fn over_http(config: FetchConfig) -> Self {
        let transport = JenkinsScriptConsole::new(&config);
        Self::new(config, transport)
    }
}

impl<T: ScriptTransport> Fetcher<T> {
    /// Create a fetcher with an explicit transport.
    pub fn new(config: FetchConfig, transport: T) -> Self {
        Self { config, transport }
    }

    /// Active configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Run the script, then upsert every collected record into the output directory.
    pub fn run(&self) -> Result<FetchSummary, TriageError> {
        self.config.validate()?;
        let script_path = &self.config.script_path;
        let script =
            fs::read_to_string(script_path).map_err(|err| TriageError::ScriptUnavailable {
                path: script_path.display().to_string(),
                reason: err.to_string(),
            })?;
        let store = RecordStore::create(&self.config.output_dir)?;

        info!(
            endpoint = %self.transport.endpoint(),
            output_dir = %store.root().display(),
            "[triage:fetch] querying build server for failed builds"
        );
        let body = self.transport.run_script(&script)?;
        let mut collected = self.collect(&body, Utc::now());

        for pending in &mut collected.records {
            if !pending.reported_timestamp {
                // Keep reruns byte-identical when the server reports no build time.
                let path = store.record_path(&pending.record.id);
                if let Ok(existing) = store.read(&path) {
                    pending.record.timestamp = existing.timestamp;
                }
            }
            store.write(&pending.record)?;
            collected.summary.written += 1;
        }

        let summary = collected.summary;
        info!(
            endpoint = %summary.endpoint,
            entries = summary.entries,
            written = summary.written,
            malformed = summary.malformed,
            empty = summary.empty,
            console_failures = summary.console_failures,
            duplicates = summary.duplicates,
            "[triage:fetch] fetch complete"
        );
        Ok(summary)
    }

    /// Turn a script response into records without touching the store.
    ///
    /// `fetched_at` stands in for entries without a reported timestamp.
    pub fn collect(&self, body: &str, fetched_at: DateTime<Utc>) -> Collected {
        let mut collected = Collected {
            records: Vec::new(),
            summary: FetchSummary {
                endpoint: self.transport.endpoint().to_string(),
                ..FetchSummary::default()
            },
        };
        let mut positions: BTreeMap<RecordId, usize> = BTreeMap::new();

        for parsed in parse_entries(body) {
            collected.summary.entries += 1;
            let entry = match parsed {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, SKIP_MALFORMED_MSG);
                    collected.summary.malformed += 1;
                    continue;
                }
            };
            let record = match self.build_record(entry, fetched_at) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    collected.summary.empty += 1;
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, SKIP_CONSOLE_MSG);
                    collected.summary.console_failures += 1;
                    continue;
                }
            };
            match positions.get(&record.record.id) {
                Some(&position) => {
                    collected.summary.duplicates += 1;
                    collected.records[position] = record;
                }
                None => {
                    positions.insert(record.record.id.clone(), collected.records.len());
                    collected.records.push(record);
                }
            }
        }
        collected
    }

    fn build_record(
        &self,
        entry: FailureEntry,
        fetched_at: DateTime<Utc>,
    ) -> Result<Option<CollectedRecord>, TriageError> {
        let FailureEntry {
            line,
            job_name,
            build_number,
            text,
            timestamp,
            mut metadata,
        } = entry;

        let failure_text = if self.config.follow_console_urls && is_console_url(&text) {
            let url = text.trim().to_string();
            let console = self.transport.fetch_text(&url)?;
            metadata.insert(META_FIELD_CONSOLE_URL.as_str().to_string(), url);
            console
        } else {
            text
        };
        let extracted = match self.config.excerpt_mode {
            ExcerptMode::Verbatim => failure_text,
            ExcerptMode::FailureLines => extract_failure_lines(&failure_text),
        };
        let Some(excerpt) = normalize_excerpt(&extracted, self.config.max_excerpt_chars) else {
            warn!(line, job = %job_name, build = build_number, SKIP_EMPTY_MSG);
            return Ok(None);
        };

        let mut record =
            FailureRecord::new(job_name, build_number, timestamp.unwrap_or(fetched_at), excerpt);
        record.raw_metadata = metadata;
        Ok(Some(CollectedRecord {
            record,
            reported_timestamp: timestamp.is_some(),
        }))
    }
}

/// Fetch over HTTP using `config`; the usual entry point for binaries.
pub fn fetch_failures(config: FetchConfig) -> Result<FetchSummary, TriageError> {
    Fetcher::over_http(config).run()
}
