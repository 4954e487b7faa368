use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::store::RECORD_ID_SEPARATOR;
pub use crate::types::{BuildNumber, CategoryId, Excerpt, JobName, MetaKey, MetaValue, RecordId};

/// One observed build failure, created by the fetch stage and immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stable identifier, `<job_name>#<build_number>`.
    pub id: RecordId,
    /// CI job or pipeline name.
    pub job_name: JobName,
    /// Build number within the job.
    pub build_number: BuildNumber,
    /// Build completion time (or fetch time when the server reports none).
    pub timestamp: DateTime<Utc>,
    /// Normalized failure text; never empty.
    pub excerpt: Excerpt,
    /// Fields not used by clustering (URL, duration, node, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_metadata: BTreeMap<MetaKey, MetaValue>,
}

impl FailureRecord {
    /// Build a record, deriving its id from job name and build number.
    pub fn new(
        job_name: impl Into<JobName>,
        build_number: BuildNumber,
        timestamp: DateTime<Utc>,
        excerpt: impl Into<Excerpt>,
    ) -> Self {
        let job_name = job_name.into();
        Self {
            id: Self::compose_id(&job_name, build_number),
            job_name,
            build_number,
            timestamp,
            excerpt: excerpt.into(),
            raw_metadata: BTreeMap::new(),
        }
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<MetaKey>, value: impl Into<MetaValue>) -> Self {
        self.raw_metadata.insert(key.into(), value.into());
        self
    }

    /// Canonical record id for a job/build pair.
    pub fn compose_id(job_name: &str, build_number: BuildNumber) -> RecordId {
        format!("{job_name}{RECORD_ID_SEPARATOR}{build_number}")
    }

    /// Check the invariants every stored record must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if self.job_name.trim().is_empty() {
            return Err("job name is empty".to_string());
        }
        if self.excerpt.trim().is_empty() {
            return Err("excerpt is empty".to_string());
        }
        let expected = Self::compose_id(&self.job_name, self.build_number);
        if self.id != expected {
            return Err(format!(
                "id '{}' does not match job/build (expected '{}')",
                self.id, expected
            ));
        }
        Ok(())
    }
}

/// A cluster of records judged to share one root cause.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Sequential id in creation order.
    pub id: CategoryId,
    /// Excerpt of the founding member; never recomputed.
    pub signature: Excerpt,
    /// Member record ids in assignment order.
    pub members: Vec<RecordId>,
}

impl Category {
    /// Start a category founded by `record`.
    pub fn founded_by(id: CategoryId, record: &FailureRecord) -> Self {
        Self {
            id,
            signature: record.excerpt.clone(),
            members: vec![record.id.clone()],
        }
    }

    /// Number of member records.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the category has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Report entry for one category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category_id: CategoryId,
    pub signature: Excerpt,
    pub member_count: usize,
    pub members: Vec<RecordId>,
}

impl From<Category> for CategorySummary {
    fn from(category: Category) -> Self {
        Self {
            category_id: category.id,
            member_count: category.members.len(),
            signature: category.signature,
            members: category.members,
        }
    }
}

/// Output of one categorize run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    /// Similarity threshold the run used.
    pub threshold: f64,
    /// Display name of the similarity metric.
    pub metric: String,
    /// Number of records clustered.
    pub total_records: usize,
    /// Number of record files skipped as unreadable.
    pub skipped_records: usize,
    /// Categories, largest first; ties by ascending id.
    pub categories: Vec<CategorySummary>,
    /// Link targets for members that carry a build or console URL.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub member_urls: BTreeMap<RecordId, String>,
}

impl CategoryReport {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
