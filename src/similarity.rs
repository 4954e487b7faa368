//! Normalized string-similarity metrics used for clustering.
//!
//! Every metric is evaluated with its arguments in a canonical (lexicographic)
//! order, so `similarity(a, b) == similarity(b, a)` holds bit-for-bit even for
//! algorithms whose raw form is direction-sensitive. Identical inputs always
//! score exactly `1.0` and results are clamped to `[0, 1]`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::categorize::DEFAULT_SIFT4_MAX_OFFSET;

/// Similarity metric applied to normalized excerpts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Jaro-Winkler similarity; favors shared prefixes such as exception class names.
    #[default]
    JaroWinkler,
    /// `1 - levenshtein / max_len`.
    Levenshtein,
    /// `1 - damerau_levenshtein / max_len`.
    DamerauLevenshtein,
    /// Sørensen-Dice coefficient over character bigrams.
    SorensenDice,
    /// `1 - sift4 / max_len` with a bounded look-ahead window.
    Sift4 {
        /// Look-ahead window used to resynchronize after a mismatch.
        max_offset: usize,
    },
}

impl SimilarityMetric {
    /// Sift4 with the default look-ahead window.
    pub const fn sift4() -> Self {
        Self::Sift4 {
            max_offset: DEFAULT_SIFT4_MAX_OFFSET,
        }
    }

    /// Similarity of `a` and `b` in `[0, 1]`.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let (left, right) = if a <= b { (a, b) } else { (b, a) };
        let raw = match self {
            Self::JaroWinkler => strsim::jaro_winkler(left, right),
            Self::Levenshtein => strsim::normalized_levenshtein(left, right),
            Self::DamerauLevenshtein => strsim::normalized_damerau_levenshtein(left, right),
            Self::SorensenDice => strsim::sorensen_dice(left, right),
            Self::Sift4 { max_offset } => sift4_similarity(left, right, *max_offset),
        };
        if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JaroWinkler => f.write_str("jaro-winkler"),
            Self::Levenshtein => f.write_str("levenshtein"),
            Self::DamerauLevenshtein => f.write_str("damerau-levenshtein"),
            Self::SorensenDice => f.write_str("sorensen-dice"),
            Self::Sift4 { max_offset } => write!(f, "sift4(max_offset={max_offset})"),
        }
    }
}

/// Simplest Sift4 variant: approximate edit distance with a bounded
/// resynchronization window.
pub fn sift4_distance(a: &str, b: &str, max_offset: usize) -> usize {
    let s1: Vec<char> = a.chars().collect();
    let s2: Vec<char> = b.chars().collect();
    let (l1, l2) = (s1.len(), s2.len());
    if l1 == 0 {
        return l2;
    }
    if l2 == 0 {
        return l1;
    }

    let (mut c1, mut c2) = (0usize, 0usize);
    let mut lcss = 0usize;
    let mut local_cs = 0usize;
    while c1 < l1 && c2 < l2 {
        if s1[c1] == s2[c2] {
            local_cs += 1;
        } else {
            lcss += local_cs;
            local_cs = 0;
            if c1 != c2 {
                let resync = c1.max(c2);
                c1 = resync;
                c2 = resync;
            }
            let mut offset = 0usize;
            while offset < max_offset && (c1 + offset < l1 || c2 + offset < l2) {
                if c1 + offset < l1 && c2 < l2 && s1[c1 + offset] == s2[c2] {
                    c1 += offset;
                    local_cs += 1;
                    break;
                }
                if c2 + offset < l2 && c1 < l1 && s1[c1] == s2[c2 + offset] {
                    c2 += offset;
                    local_cs += 1;
                    break;
                }
                offset += 1;
            }
        }
        c1 += 1;
        c2 += 1;
    }
    lcss += local_cs;
    l1.max(l2).saturating_sub(lcss)
}

fn sift4_similarity(a: &str, b: &str, max_offset: usize) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - sift4_distance(a, b, max_offset) as f64 / max_len as f64
}
