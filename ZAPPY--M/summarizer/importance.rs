use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::text::{split_sentences, word_tokens};

const MIN_IMPORTANCE: f32 = 0.5;
const MAX_IMPORTANCE: f32 = 2.0;
const COMPLEXITY_SENTENCES: f32 = 10.0;

/// Components of a section's importance multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportanceBreakdown {
    /// Unique over total lower-cased words.
    pub word_diversity: f32,
    /// `min(sentences / 10, 1)`.
    pub sentence_complexity: f32,
    /// Clamped product, or 1.0 for content without words.
    pub importance: f32,
}

/// Scales a section's share of the word budget by lexical density.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportanceScorer;

impl ImportanceScorer {
    /// Importance multiplier in `[0.5, 2.0]`.
    #[must_use]
    pub fn score(&self, content: &str) -> f32 {
        self.breakdown(content).importance
    }

    /// Full breakdown of the score.
    #[must_use]
    pub fn breakdown(&self, content: &str) -> ImportanceBreakdown {
        let words: Vec<String> = word_tokens(content).into_iter().map(str::to_lowercase).collect();
        if words.is_empty() {
            return ImportanceBreakdown {
                word_diversity: 0.0,
                sentence_complexity: 0.0,
                importance: 1.0,
            };
        }
        let unique: HashSet<&str> = words.iter().map(String::as_str).collect();
        let word_diversity = unique.len() as f32 / words.len() as f32;
        let sentence_complexity =
            (split_sentences(content).len() as f32 / COMPLEXITY_SENTENCES).min(1.0);
        ImportanceBreakdown {
            word_diversity,
            sentence_complexity,
            importance: (word_diversity * sentence_complexity).clamp(MIN_IMPORTANCE, MAX_IMPORTANCE),
        }
    }
}
