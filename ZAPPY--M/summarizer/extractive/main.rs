//! Extractive sentence selection and term coverage.

/// Term coverage guard.
pub mod coverage;
/// Graph centrality ranking.
pub mod textrank;

pub use coverage::{ensure_term_coverage, CoveredSelection};
pub use textrank::TextRankRanker;

use crate::text::split_sentences;

/// Sentence ranking capability.
pub trait SentenceRanker: Send + Sync {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &str;

    /// Up to `k` sentences of `content`, most representative first.
    fn rank(&self, content: &str, k: usize) -> Vec<String>;
}

/// Fallback ranker returning the first `k` sentences.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadRanker;

impl SentenceRanker for LeadRanker {
    fn name(&self) -> &str {
        "lead"
    }

    fn rank(&self, content: &str, k: usize) -> Vec<String> {
        split_sentences(content).into_iter().take(k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_ranker_keeps_document_order() {
        let ranked = LeadRanker.rank("One here. Two here. Three here.", 2);
        assert_eq!(ranked, vec!["One here.", "Two here."]);
        assert!(LeadRanker.rank("", 3).is_empty());
    }
}
