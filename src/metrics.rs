use crate::data::CategoryReport;
use crate::types::CategoryId;

/// How records spread across the categories of one report.
#[derive(Clone, Debug, PartialEq)]
pub struct CategorySpread {
    pub total: usize,
    pub categories: usize,
    /// Categories with a single member.
    pub singletons: usize,
    pub largest: usize,
    pub smallest: usize,
    pub mean: f64,
    /// Fraction of all records held by the largest category.
    pub largest_share: f64,
    pub largest_category: CategoryId,
}

/// Compute spread metrics for a report; `None` when it has no categories.
pub fn category_spread(report: &CategoryReport) -> Option<CategorySpread> {
    let largest_entry = report.categories.iter().min_by(|a, b| {
        b.member_count
            .cmp(&a.member_count)
            .then_with(|| a.category_id.cmp(&b.category_id))
    })?;
    let total: usize = report
        .categories
        .iter()
        .map(|category| category.member_count)
        .sum();
    let categories = report.categories.len();
    let largest = largest_entry.member_count;
    let smallest = report
        .categories
        .iter()
        .map(|category| category.member_count)
        .min()
        .unwrap_or(0);
    let singletons = report
        .categories
        .iter()
        .filter(|category| category.member_count == 1)
        .count();
    let mean = total as f64 / categories as f64;
    let largest_share = if total == 0 {
        0.0
    } else {
        largest as f64 / total as f64
    };
    Some(CategorySpread {
        total,
        categories,
        singletons,
        largest,
        smallest,
        mean,
        largest_share,
        largest_category: largest_entry.category_id,
    })
}
