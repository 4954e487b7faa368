#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// CLI runners backing the `fetch_failed` and `categorize_failures` binaries.
pub mod apps;
/// Greedy leader clustering and the clustering strategy seam.
pub mod categorize;
/// Fetch and categorize configuration types.
pub mod config;
/// Centralized constants used across fetch, store, and categorize.
pub mod constants;
/// Failure record and category types.
pub mod data;
/// Script-response parsing and the fetch pipeline.
pub mod fetch;
/// Metadata keys and helpers.
pub mod metadata;
/// Aggregate metrics helpers.
pub mod metrics;
/// Report rendering (text, JSON, HTML) and output.
pub mod report;
/// Normalized string-similarity metrics.
pub mod similarity;
/// File-per-record persistence.
pub mod store;
/// Build-server and filesystem transports.
pub mod transport;
/// Shared type aliases.
pub mod types;
/// Text normalization helpers.
pub mod utils;

mod errors;

pub use categorize::{Categorizer, ClusteringStrategy, GreedyLeaderClustering};
pub use config::{CategorizeConfig, Credentials, ExcerptMode, FetchConfig, ReportFormat};
pub use data::{Category, CategoryReport, CategorySummary, FailureRecord};
pub use errors::TriageError;
pub use fetch::{FetchSummary, Fetcher, fetch_failures};
pub use report::{ReportDestination, emit_report};
pub use similarity::SimilarityMetric;
pub use store::{RecordStore, StoreLoad};
pub use transport::{JenkinsScriptConsole, ScriptTransport};
pub use types::{BuildNumber, CategoryId, Excerpt, JobName, MetaValue, RecordId};
