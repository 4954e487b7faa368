//! Categorize stage: cluster stored failure records by excerpt similarity.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::config::CategorizeConfig;
use crate::data::{Category, CategoryReport, CategorySummary, FailureRecord};
use crate::errors::TriageError;
use crate::metadata::{META_FIELD_CONSOLE_URL, META_FIELD_URL};
use crate::similarity::SimilarityMetric;
use crate::store::RecordStore;
use crate::types::{CategoryId, RecordId};

/// Partitions records into categories.
///
/// Implementations must place every input record in exactly one category and
/// must be deterministic for a given input set.
pub trait ClusteringStrategy {
    /// Cluster `records`; input order carries no meaning.
    fn cluster(&self, records: &[FailureRecord]) -> Vec<Category>;
}

/// Single-pass leader clustering with fixed signatures.
///
/// Records are visited by ascending id. Each joins the category whose
/// signature scores highest against its excerpt, provided the score reaches
/// the threshold; equal scores go to the earliest category. Otherwise the
/// record founds a new category and its excerpt becomes the signature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GreedyLeaderClustering {
    pub threshold: f64,
    pub metric: SimilarityMetric,
}

impl GreedyLeaderClustering {
    pub fn new(threshold: f64, metric: SimilarityMetric) -> Self {
        Self { threshold, metric }
    }

    /// Strategy matching a categorize configuration.
    pub fn from_config(config: &CategorizeConfig) -> Self {
        Self::new(config.threshold, config.metric)
    }
}

impl ClusteringStrategy for GreedyLeaderClustering {
    fn cluster(&self, records: &[FailureRecord]) -> Vec<Category> {
        let mut ordered: Vec<&FailureRecord> = records.iter().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));

        let mut categories: Vec<Category> = Vec::new();
        for record in ordered {
            let scores = categories
                .iter()
                .map(|category| self.metric.similarity(&record.excerpt, &category.signature));
            match select_category(scores, self.threshold) {
                Some(idx) => categories[idx].members.push(record.id.clone()),
                None => {
                    let id: CategoryId = categories.len() + 1;
                    debug!(category_id = id, record_id = %record.id, "[triage:categorize] new category");
                    categories.push(Category::founded_by(id, record));
                }
            }
        }
        categories
    }
}

/// Index of the best score at or above `threshold`; the first wins ties.
///
/// A perfect score ends the scan.
pub fn select_category(scores: impl IntoIterator<Item = f64>, threshold: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, score) in scores.into_iter().enumerate() {
        if score < threshold {
            continue;
        }
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((idx, score));
        }
        if score >= 1.0 {
            break;
        }
    }
    best.map(|(idx, _)| idx)
}

/// Order categories for reporting and attach member links.
///
/// Categories are sorted by member count (descending), then id (ascending).
pub fn build_report(
    categories: Vec<Category>,
    records: &[FailureRecord],
    threshold: f64,
    metric: SimilarityMetric,
    skipped_records: usize,
) -> CategoryReport {
    let member_urls: BTreeMap<RecordId, String> = records
        .iter()
        .filter_map(|record| {
            let url = record
                .raw_metadata
                .get(META_FIELD_URL.as_str())
                .or_else(|| record.raw_metadata.get(META_FIELD_CONSOLE_URL.as_str()))?;
            Some((record.id.clone(), url.clone()))
        })
        .collect();

    let mut summaries: Vec<CategorySummary> =
        categories.into_iter().map(CategorySummary::from).collect();
    summaries.sort_by(|a, b| {
        b.member_count
            .cmp(&a.member_count)
            .then_with(|| a.category_id.cmp(&b.category_id))
    });

    CategoryReport {
        threshold,
        metric: metric.to_string(),
        total_records: records.len(),
        skipped_records,
        categories: summaries,
        member_urls,
    }
}

/// Reads the record store and produces a category report.
pub struct Categorizer {
    config: CategorizeConfig,
    strategy: Box<dyn ClusteringStrategy>,
}

impl Categorizer {
    /// Categorizer using greedy leader clustering with the configured threshold and metric.
    pub fn new(config: CategorizeConfig) -> Self {
        let strategy = Box::new(GreedyLeaderClustering::from_config(&config));
        Self { config, strategy }
    }

    /// Replace the clustering strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn ClusteringStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &CategorizeConfig {
        &self.config
    }

    /// Load every readable record and cluster it.
    ///
    /// Unreadable files are skipped and counted; an empty store yields an empty report.
    pub fn run(&self) -> Result<CategoryReport, TriageError> {
        self.config.validate()?;
        let store = RecordStore::new(&self.config.input_dir);
        let load = store.load_all()?;
        info!(
            input_dir = %store.root().display(),
            records = load.records.len(),
            skipped = load.skipped.len(),
            threshold = self.config.threshold,
            metric = %self.config.metric,
            "[triage:categorize] clustering failure records"
        );
        let report = self.categorize_records(&load.records, load.skipped.len());
        info!(
            categories = report.categories.len(),
            records = report.total_records,
            "[triage:categorize] clustering complete"
        );
        Ok(report)
    }

    /// Cluster already-loaded records.
    pub fn categorize_records(
        &self,
        records: &[FailureRecord],
        skipped_records: usize,
    ) -> CategoryReport {
        let categories = self.strategy.cluster(records);
        build_report(
            categories,
            records,
            self.config.threshold,
            self.config.metric,
            skipped_records,
        )
    }
}
