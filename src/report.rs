//! Report rendering and output.
//!
//! Text and JSON reports go to a writer (stdout in the binaries) or to a
//! file; HTML reports go to a directory holding `index.html` plus one
//! `<category_id>.html` page per category. File and directory output is
//! staged under a `.part` name and renamed once complete.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{CategorizeConfig, ReportFormat};
use crate::constants::categorize::HTML_INDEX_FILENAME;
use crate::constants::store::TEMP_FILE_EXTENSION;
use crate::data::{CategoryReport, CategorySummary};
use crate::errors::TriageError;
use crate::metrics::category_spread;
use crate::transport::fs::{ensure_dir, write_atomic};
use crate::utils::display_signature;

/// Plain-text report, one block per category.
pub fn render_text(report: &CategoryReport, signature_chars: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== failure categories ===");
    let _ = writeln!(out, "metric: {}", report.metric);
    let _ = writeln!(out, "threshold: {}", report.threshold);
    let _ = writeln!(
        out,
        "records: {} (skipped files: {})",
        report.total_records, report.skipped_records
    );
    if report.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "No failure records found.");
        return out;
    }
    for category in &report.categories {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "--- category #{} ({} {}) ---",
            category.category_id,
            category.member_count,
            if category.member_count == 1 { "member" } else { "members" }
        );
        let _ = writeln!(
            out,
            "signature: {}",
            display_signature(&category.signature, signature_chars)
        );
        let _ = writeln!(out, "members  : {}", category.members.join(", "));
    }
    if let Some(spread) = category_spread(report) {
        let _ = writeln!(out);
        let _ = writeln!(out, "--- spread ---");
        let _ = writeln!(
            out,
            "categories={} singletons={} largest=#{} ({}, share={:.2}) mean={:.2}",
            spread.categories,
            spread.singletons,
            spread.largest_category,
            spread.largest,
            spread.largest_share,
            spread.mean
        );
    }
    out
}

/// Pretty-printed JSON report.
pub fn render_json(report: &CategoryReport) -> Result<String, TriageError> {
    serde_json::to_string_pretty(report)
        .map(|mut json| {
            json.push('\n');
            json
        })
        .map_err(|err| TriageError::Io(io::Error::other(err)))
}

/// HTML pages keyed by file name; the index comes first.
pub fn render_html(report: &CategoryReport, signature_chars: usize) -> Vec<(String, String)> {
    let mut pages = Vec::with_capacity(report.categories.len() + 1);
    pages.push((HTML_INDEX_FILENAME.to_string(), render_html_index(report, signature_chars)));
    for category in &report.categories {
        pages.push((
            category_page_name(category),
            render_html_category(report, category),
        ));
    }
    pages
}

fn category_page_name(category: &CategorySummary) -> String {
    format!("{}.html", category.category_id)
}

fn render_html_index(report: &CategoryReport, signature_chars: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html><head><meta charset=\"utf-8\"><title>Failure categories</title></head><body>");
    let _ = writeln!(
        out,
        "<p>{} records, {} categories, metric {}, threshold {}</p>",
        report.total_records,
        report.categories.len(),
        escape_html(&report.metric),
        report.threshold
    );
    let _ = writeln!(out, "<table>");
    let _ = writeln!(out, "<tr><th>Category</th><th>Signature</th><th>Count</th></tr>");
    for category in &report.categories {
        let _ = writeln!(
            out,
            "<tr><td>{id}</td><td><a href=\"{page}\">{signature}</a></td><td>{count}</td></tr>",
            id = category.category_id,
            page = category_page_name(category),
            signature = escape_html(&display_signature(&category.signature, signature_chars)),
            count = category.member_count
        );
    }
    let _ = writeln!(out, "</table>");
    let _ = writeln!(out, "</body></html>");
    out
}

fn render_html_category(report: &CategoryReport, category: &CategorySummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(
        out,
        "<html><head><meta charset=\"utf-8\"><title>Category {}</title></head><body>",
        category.category_id
    );
    let _ = writeln!(out, "<p><a href=\"{HTML_INDEX_FILENAME}\">All categories</a></p>");
    let _ = writeln!(
        out,
        "<h1>Category {} ({} members)</h1>",
        category.category_id, category.member_count
    );
    let _ = writeln!(out, "<pre>{}</pre>", escape_html(&category.signature));
    let _ = writeln!(out, "<ul>");
    for member in &category.members {
        match report.member_urls.get(member) {
            Some(url) => {
                let _ = writeln!(
                    out,
                    "<li><a href=\"{}\">{}</a></li>",
                    escape_html(url),
                    escape_html(member)
                );
            }
            None => {
                let _ = writeln!(out, "<li>{}</li>", escape_html(member));
            }
        }
    }
    let _ = writeln!(out, "</ul>");
    let _ = writeln!(out, "</body></html>");
    out
}

/// Escape text for HTML element content and double-quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Where a report ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportDestination {
    /// Written to the supplied writer.
    Stream,
    /// Written to this file.
    File(PathBuf),
    /// Written into this directory.
    Directory(PathBuf),
}

/// Render `report` in the configured format and send it to its sink.
///
/// `stream` receives text and JSON reports when no output path is set.
pub fn emit_report(
    report: &CategoryReport,
    config: &CategorizeConfig,
    stream: &mut impl Write,
) -> Result<ReportDestination, TriageError> {
    let chars = config.signature_display_chars;
    let destination = match (config.format, &config.output) {
        (ReportFormat::Html, Some(dir)) => {
            write_report_dir(dir, &render_html(report, chars))?;
            ReportDestination::Directory(dir.clone())
        }
        (ReportFormat::Html, None) => {
            return Err(TriageError::Configuration(
                "html reports require an output directory".to_string(),
            ));
        }
        (format, output) => {
            let body = match format {
                ReportFormat::Json => render_json(report)?,
                _ => render_text(report, chars),
            };
            match output {
                Some(path) => {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        ensure_dir(parent)?;
                    }
                    write_atomic(path, body.as_bytes())?;
                    ReportDestination::File(path.clone())
                }
                None => {
                    stream.write_all(body.as_bytes())?;
                    stream.flush()?;
                    ReportDestination::Stream
                }
            }
        }
    };
    if !matches!(destination, ReportDestination::Stream) {
        info!(
            destination = ?destination,
            categories = report.categories.len(),
            "[triage:report] report written"
        );
    }
    Ok(destination)
}

/// Write `pages` into `dir`, replacing a previous report there.
///
/// Pages are staged in a sibling `.part` directory first. An existing `dir`
/// is only replaced when it holds nothing but `.html` files.
pub fn write_report_dir(dir: &Path, pages: &[(String, String)]) -> Result<(), TriageError> {
    let unwritable = |path: &Path, err: io::Error| TriageError::StoreUnwritable {
        path: path.display().to_string(),
        reason: err.to_string(),
    };
    let mut staging_name = dir.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    staging_name.push(".");
    staging_name.push(TEMP_FILE_EXTENSION);
    let staging = dir.with_file_name(staging_name);

    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|err| unwritable(&staging, err))?;
    }
    ensure_dir(&staging)?;
    for (name, content) in pages {
        fs::write(staging.join(name), content).map_err(|err| unwritable(&staging, err))?;
    }

    if dir.exists() {
        if !is_replaceable_report_dir(dir)? {
            let _ = fs::remove_dir_all(&staging);
            return Err(TriageError::Configuration(format!(
                "refusing to replace '{}': it contains files other than an HTML report",
                dir.display()
            )));
        }
        fs::remove_dir_all(dir).map_err(|err| unwritable(dir, err))?;
    }
    fs::rename(&staging, dir).map_err(|err| unwritable(dir, err))
}

fn is_replaceable_report_dir(dir: &Path) -> Result<bool, TriageError> {
    if !dir.is_dir() {
        return Ok(false);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_html = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("html"));
        if !is_html {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn sample_report() -> CategoryReport {
        let mut member_urls = BTreeMap::new();
        member_urls.insert("api#101".to_string(), "https://ci/job/api/101/?a=1&b=2".to_string());
        CategoryReport {
            threshold: 0.85,
            metric: "jaro-winkler".into(),
            total_records: 3,
            skipped_records: 1,
            categories: vec![
                CategorySummary {
                    category_id: 1,
                    signature: "java.lang.NullPointerException at <init>\nsecond line".into(),
                    member_count: 2,
                    members: vec!["api#101".into(), "api#102".into()],
                },
                CategorySummary {
                    category_id: 2,
                    signature: "Timeout connecting to db".into(),
                    member_count: 1,
                    members: vec!["api#103".into()],
                },
            ],
            member_urls,
        }
    }

    #[test]
    fn text_report_lists_ids_counts_and_members() {
        let text = render_text(&sample_report(), 120);
        assert!(text.contains("--- category #1 (2 members) ---"));
        assert!(text.contains("signature: java.lang.NullPointerException at <init>…"));
        assert!(text.contains("members  : api#101, api#102"));
        assert!(text.contains("--- category #2 (1 member) ---"));
        assert!(text.contains("records: 3 (skipped files: 1)"));
        assert!(text.contains("categories=2 singletons=1 largest=#1"));
        let first = text.find("category #1").unwrap();
        let second = text.find("category #2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn empty_text_report_says_so() {
        let mut report = sample_report();
        report.categories.clear();
        report.total_records = 0;
        let text = render_text(&report, 120);
        assert!(text.contains("No failure records found."));
        assert!(!text.contains("--- spread ---"));
    }

    #[test]
    fn json_report_round_trips() {
        let report = sample_report();
        let json = render_json(&report).unwrap();
        let parsed: CategoryReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn html_pages_escape_and_link_members() {
        let pages = render_html(&sample_report(), 120);
        let names: Vec<&str> = pages.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["index.html", "1.html", "2.html"]);

        let index = &pages[0].1;
        assert!(index.contains("<a href=\"1.html\">java.lang.NullPointerException at &lt;init&gt;…</a>"));
        assert!(index.contains("<td>2</td>"));

        let first = &pages[1].1;
        assert!(first.contains("<a href=\"https://ci/job/api/101/?a=1&amp;b=2\">api#101</a>"));
        assert!(first.contains("<li>api#102</li>"));
        assert!(first.contains("second line"));
    }

    #[test]
    fn stream_output_receives_text_report() {
        let mut buffer = Vec::new();
        let config = CategorizeConfig::default();
        let destination = emit_report(&sample_report(), &config, &mut buffer).unwrap();
        assert_eq!(destination, ReportDestination::Stream);
        assert!(String::from_utf8(buffer).unwrap().starts_with("=== failure categories ==="));
    }

    #[test]
    fn file_output_creates_parents_and_leaves_no_temp_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("reports").join("triage.json");
        let config = CategorizeConfig::default()
            .with_format(ReportFormat::Json)
            .with_output(Some(path.clone()));
        let mut buffer = Vec::new();
        let destination = emit_report(&sample_report(), &config, &mut buffer).unwrap();
        assert_eq!(destination, ReportDestination::File(path.clone()));
        assert!(buffer.is_empty());
        assert!(fs::read_to_string(&path).unwrap().contains("\"category_id\": 1"));
        assert!(!temp.path().join("reports").join("triage.json.part").exists());
    }

    #[test]
    fn html_directory_replaces_previous_report() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("html");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("9.html"), "stale").unwrap();
        fs::write(dir.join("index.html"), "stale").unwrap();

        let config = CategorizeConfig::default()
            .with_format(ReportFormat::Html)
            .with_output(Some(dir.clone()));
        emit_report(&sample_report(), &config, &mut io::sink()).unwrap();

        assert!(dir.join("index.html").exists());
        assert!(dir.join("2.html").exists());
        assert!(!dir.join("9.html").exists());
        assert!(!temp.path().join("html.part").exists());
    }

    #[test]
    fn html_directory_with_foreign_files_is_left_alone() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("html");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("notes.txt"), "keep me").unwrap();

        let err = write_report_dir(&dir, &render_html(&sample_report(), 120)).unwrap_err();
        assert!(matches!(err, TriageError::Configuration(_)));
        assert!(dir.join("notes.txt").exists());
        assert!(!temp.path().join("html.part").exists());
    }
}
