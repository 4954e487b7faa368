use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum, error::ErrorKind};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::categorize::Categorizer;
use crate::config::{CategorizeConfig, Credentials, ExcerptMode, FetchConfig, ReportFormat};
use crate::constants::categorize::DEFAULT_SIFT4_MAX_OFFSET;
use crate::constants::fetch::{
    DEFAULT_BASE_URL, DEFAULT_MAX_EXCERPT_CHARS, DEFAULT_TIMEOUT_SECS, ENV_BASE_URL, ENV_TOKEN,
    ENV_USER,
};
use crate::constants::store::{DEFAULT_RECORD_DIR, ENV_RECORD_DIR};
use crate::fetch::Fetcher;
use crate::report::{ReportDestination, emit_report};
use crate::similarity::SimilarityMetric;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MetricArg {
    JaroWinkler,
    Levenshtein,
    DamerauLevenshtein,
    SorensenDice,
    Sift4,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
    Html,
}

impl From<FormatArg> for ReportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Json => ReportFormat::Json,
            FormatArg::Html => ReportFormat::Html,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "fetch_failed",
    version,
    disable_help_subcommand = true,
    about = "Fetch failed builds from a Jenkins script console",
    long_about = "Submit a failure-enumeration script to <base-url>/scriptText and store one JSON record per reported failure.",
    after_help = "Base URL, user and output directory resolve in order by explicit arg, environment variables, then project defaults. The API token is read only from TRIAGE_JENKINS_TOKEN."
)]
struct FetchCli {
    #[arg(
        long = "base-url",
        value_name = "URL",
        help = "Build-server base URL (env TRIAGE_JENKINS_URL)"
    )]
    base_url: Option<String>,
    #[arg(
        long = "output-dir",
        value_name = "DIR",
        help = "Record directory (env TRIAGE_RECORD_DIR)"
    )]
    output_dir: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Query script submitted to the server")]
    script: PathBuf,
    #[arg(long, value_name = "USER", help = "Build-server user (env TRIAGE_JENKINS_USER)")]
    user: Option<String>,
    #[arg(
        long = "timeout-secs",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = parse_positive_u64,
        help = "Per-call timeout in seconds"
    )]
    timeout_secs: u64,
    #[arg(
        long = "max-excerpt-chars",
        default_value_t = DEFAULT_MAX_EXCERPT_CHARS,
        value_parser = parse_positive_usize,
        help = "Excerpt length cap in chars"
    )]
    max_excerpt_chars: usize,
    #[arg(
        long = "failure-lines",
        help = "Keep only failure-marker lines (or the console tail) as the excerpt"
    )]
    failure_lines: bool,
    #[arg(
        long = "follow-console-urls",
        help = "Fetch console logs for entries whose text is a URL"
    )]
    follow_console_urls: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "categorize_failures",
    version,
    disable_help_subcommand = true,
    about = "Group stored build failures by textual similarity",
    long_about = "Cluster failure records with single-pass leader clustering and print categories, largest first.",
    after_help = "The input directory resolves in order by explicit arg, TRIAGE_RECORD_DIR, then the project default."
)]
struct CategorizeCli {
    #[arg(
        long = "input-dir",
        value_name = "DIR",
        help = "Record directory (env TRIAGE_RECORD_DIR)"
    )]
    input_dir: Option<PathBuf>,
    #[arg(
        long,
        value_parser = parse_threshold,
        help = "Similarity threshold in [0, 1] (default 0.85)"
    )]
    threshold: Option<f64>,
    #[arg(long, value_enum, default_value = "jaro-winkler", help = "Similarity metric")]
    metric: MetricArg,
    #[arg(
        long = "sift4-max-offset",
        default_value_t = DEFAULT_SIFT4_MAX_OFFSET,
        value_parser = parse_positive_usize,
        help = "Sift4 look-ahead window (sift4 metric only)"
    )]
    sift4_max_offset: usize,
    #[arg(long, value_enum, default_value = "text", help = "Report format")]
    format: FormatArg,
    #[arg(
        long,
        value_name = "PATH",
        help = "Report file (text/json) or directory (html); stdout when omitted"
    )]
    output: Option<PathBuf>,
}

/// Run the fetch stage from CLI arguments (program name excluded).
pub fn run_fetch<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();

    let Some(cli) =
        parse_cli::<FetchCli, _>(std::iter::once("fetch_failed".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };
    let config = fetch_config_from_cli(cli, env_lookup);
    let summary = Fetcher::over_http(config.clone()).run()?;
    println!(
        "Stored {} failure records in {} ({} entries, {} malformed, {} empty, {} console failures)",
        summary.written,
        config.output_dir.display(),
        summary.entries,
        summary.malformed,
        summary.empty,
        summary.console_failures
    );
    Ok(())
}

/// Run the categorize stage from CLI arguments (program name excluded).
pub fn run_categorize<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();

    let Some(cli) = parse_cli::<CategorizeCli, _>(
        std::iter::once("categorize_failures".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };
    let config = categorize_config_from_cli(cli, env_lookup);
    let report = Categorizer::new(config.clone()).run()?;
    let destination = emit_report(&report, &config, &mut io::stdout().lock())?;
    match destination {
        ReportDestination::File(path) | ReportDestination::Directory(path) => {
            eprintln!("Report written to {}", path.display());
        }
        ReportDestination::Stream => {}
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Explicit flag, then a non-empty environment variable, then the default.
fn resolve_setting<E>(flag: Option<String>, env: &E, key: &str, default: &str) -> String
where
    E: Fn(&str) -> Option<String>,
{
    flag.or_else(|| env(key).filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| default.to_string())
}

/// Pair a user with the API token; either one alone means anonymous access.
fn credentials_from(user: Option<String>, token: Option<String>) -> Option<Credentials> {
    match (user, token) {
        (Some(user), Some(token)) => Some(Credentials::new(user, token)),
        (Some(user), None) => {
            warn!(
                user = %user,
                token_env = ENV_TOKEN,
                "[triage:cli] user given without an API token; querying anonymously"
            );
            None
        }
        (None, Some(_)) => {
            warn!(
                user_env = ENV_USER,
                "[triage:cli] API token given without a user; querying anonymously"
            );
            None
        }
        (None, None) => None,
    }
}

fn fetch_config_from_cli<E>(cli: FetchCli, env: E) -> FetchConfig
where
    E: Fn(&str) -> Option<String>,
{
    let base_url = resolve_setting(cli.base_url, &env, ENV_BASE_URL, DEFAULT_BASE_URL);
    let output_dir = cli
        .output_dir
        .unwrap_or_else(|| PathBuf::from(resolve_setting(None, &env, ENV_RECORD_DIR, DEFAULT_RECORD_DIR)));
    let user = cli
        .user
        .or_else(|| env(ENV_USER).filter(|value| !value.trim().is_empty()));
    let token = env(ENV_TOKEN).filter(|value| !value.is_empty());
    let credentials = credentials_from(user, token);
    let excerpt_mode = if cli.failure_lines {
        ExcerptMode::FailureLines
    } else {
        ExcerptMode::Verbatim
    };

    FetchConfig::new(base_url, output_dir, cli.script)
        .with_timeout(Duration::from_secs(cli.timeout_secs))
        .with_max_excerpt_chars(cli.max_excerpt_chars)
        .with_excerpt_mode(excerpt_mode)
        .with_follow_console_urls(cli.follow_console_urls)
        .with_credentials(credentials)
}

fn categorize_config_from_cli<E>(cli: CategorizeCli, env: E) -> CategorizeConfig
where
    E: Fn(&str) -> Option<String>,
{
    let input_dir = cli
        .input_dir
        .unwrap_or_else(|| PathBuf::from(resolve_setting(None, &env, ENV_RECORD_DIR, DEFAULT_RECORD_DIR)));
    let metric = match cli.metric {
        MetricArg::JaroWinkler => SimilarityMetric::JaroWinkler,
        MetricArg::Levenshtein => SimilarityMetric::Levenshtein,
        MetricArg::DamerauLevenshtein => SimilarityMetric::DamerauLevenshtein,
        MetricArg::SorensenDice => SimilarityMetric::SorensenDice,
        MetricArg::Sift4 => SimilarityMetric::Sift4 {
            max_offset: cli.sift4_max_offset,
        },
    };
    let mut config = CategorizeConfig::new(input_dir)
        .with_metric(metric)
        .with_format(cli.format.into())
        .with_output(cli.output);
    if let Some(threshold) = cli.threshold {
        config = config.with_threshold(threshold);
    }
    config
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("invalid value '{raw}': expected a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(raw: &str) -> Result<u64, String> {
    let parsed = raw
        .parse::<u64>()
        .map_err(|_| format!("invalid value '{raw}': expected a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_threshold(raw: &str) -> Result<f64, String> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid threshold '{raw}': must be a float"))?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(format!("threshold {parsed} is outside [0, 1]"));
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn fetch_cli(args: &[&str]) -> FetchCli {
        parse_cli::<FetchCli, _>(std::iter::once("fetch_failed").chain(args.iter().copied()))
            .unwrap()
            .unwrap()
    }

    fn categorize_cli(args: &[&str]) -> CategorizeCli {
        parse_cli::<CategorizeCli, _>(
            std::iter::once("categorize_failures").chain(args.iter().copied()),
        )
        .unwrap()
        .unwrap()
    }

    #[test]
    fn fetch_flags_override_environment() {
        let env = env_from(&[
            (ENV_BASE_URL, "http://env-ci:8080"),
            (ENV_RECORD_DIR, "env-records"),
            (ENV_USER, "env-bot"),
            (ENV_TOKEN, "secret"),
        ]);
        let cli = fetch_cli(&[
            "--script",
            "find.groovy",
            "--base-url",
            "https://flag-ci",
            "--output-dir",
            "flag-records",
            "--user",
            "flag-bot",
            "--failure-lines",
        ]);
        let config = fetch_config_from_cli(cli, env);
        assert_eq!(config.base_url, "https://flag-ci");
        assert_eq!(config.output_dir, PathBuf::from("flag-records"));
        assert_eq!(config.excerpt_mode, ExcerptMode::FailureLines);
        let credentials = config.credentials.expect("credentials");
        assert_eq!(credentials.user, "flag-bot");
        assert_eq!(credentials.token, "secret");
    }

    #[test]
    fn fetch_falls_back_to_environment_then_defaults() {
        let cli = fetch_cli(&["--script", "find.groovy"]);
        let config = fetch_config_from_cli(cli, env_from(&[(ENV_BASE_URL, "http://env-ci:8080")]));
        assert_eq!(config.base_url, "http://env-ci:8080");
        assert_eq!(config.output_dir, PathBuf::from(DEFAULT_RECORD_DIR));
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(config.credentials.is_none());

        let cli = fetch_cli(&["--script", "find.groovy"]);
        let config = fetch_config_from_cli(cli, env_from(&[(ENV_BASE_URL, "  ")]));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn credentials_need_both_user_and_token() {
        let cli = fetch_cli(&["--script", "s", "--user", "bot"]);
        assert!(fetch_config_from_cli(cli, env_from(&[])).credentials.is_none());

        let cli = fetch_cli(&["--script", "s"]);
        let config = fetch_config_from_cli(cli, env_from(&[(ENV_TOKEN, "secret")]));
        assert!(config.credentials.is_none());
    }

    #[test]
    fn half_configured_credentials_fall_back_to_anonymous() {
        assert!(credentials_from(Some("bot".into()), None).is_none());
        assert!(credentials_from(None, Some("secret".into())).is_none());
        assert!(credentials_from(None, None).is_none());
        let credentials = credentials_from(Some("bot".into()), Some("secret".into())).unwrap();
        assert_eq!(credentials.user, "bot");
        assert_eq!(credentials.token, "secret");
    }

    #[test]
    fn fetch_requires_a_script_and_positive_limits() {
        assert!(parse_cli::<FetchCli, _>(["fetch_failed"]).is_err());
        assert!(
            parse_cli::<FetchCli, _>(["fetch_failed", "--script", "s", "--timeout-secs", "0"])
                .is_err()
        );
    }

    #[test]
    fn help_short_circuits_without_error() {
        assert!(
            parse_cli::<CategorizeCli, _>(["categorize_failures", "--help"])
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn categorize_threshold_override_and_metric_selection() {
        let cli = categorize_cli(&[
            "--threshold",
            "0.9",
            "--metric",
            "sift4",
            "--sift4-max-offset",
            "25",
            "--format",
            "json",
        ]);
        let config = categorize_config_from_cli(cli, env_from(&[(ENV_RECORD_DIR, "env-records")]));
        assert_eq!(config.threshold, 0.9);
        assert_eq!(config.metric, SimilarityMetric::Sift4 { max_offset: 25 });
        assert_eq!(config.format, ReportFormat::Json);
        assert_eq!(config.input_dir, PathBuf::from("env-records"));
    }

    #[test]
    fn categorize_defaults_match_library_defaults() {
        let config = categorize_config_from_cli(categorize_cli(&[]), env_from(&[]));
        let defaults = CategorizeConfig::default();
        assert_eq!(config.threshold, defaults.threshold);
        assert_eq!(config.metric, defaults.metric);
        assert_eq!(config.input_dir, defaults.input_dir);
        assert_eq!(config.format, ReportFormat::Text);
    }

    #[test]
    fn out_of_range_thresholds_are_rejected() {
        assert!(parse_threshold("1.5").is_err());
        assert!(parse_threshold("-0.1").is_err());
        assert!(parse_threshold("NaN").is_err());
        assert_eq!(parse_threshold(" 0.7 "), Ok(0.7));
    }
}
