use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::text::{
    segment::{split_sentences, word_spans},
    stopwords::is_stop_word,
};

/// Raised when no n-gram survives filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// Every token was a stop word or shorter than the minimum length.
    #[error("empty vocabulary: no token survived stop-word and length filtering")]
    EmptyVocabulary,
}

/// Sparse vector with entries sorted by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(usize, f32)>,
}

impl SparseVector {
    /// Builds a vector from unordered `(index, weight)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, f32)>) -> Self {
        let mut entries: Vec<(usize, f32)> = pairs.into_iter().filter(|(_, w)| *w != 0.0).collect();
        entries.sort_by_key(|(idx, _)| *idx);
        Self { entries }
    }

    /// Non-zero entries.
    #[must_use]
    pub fn entries(&self) -> &[(usize, f32)] {
        &self.entries
    }

    /// True when the vector has no non-zero entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dot product via a merge walk.
    #[must_use]
    pub fn dot(&self, other: &Self) -> f32 {
        let (mut i, mut j, mut sum) = (0, 0, 0.0);
        while i < self.entries.len() && j < other.entries.len() {
            let (a_idx, a_val) = self.entries[i];
            let (b_idx, b_val) = other.entries[j];
            match a_idx.cmp(&b_idx) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += a_val * b_val;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Euclidean norm.
    #[must_use]
    pub fn norm(&self) -> f32 {
        self.entries.iter().map(|(_, v)| v * v).sum::<f32>().sqrt()
    }

    /// Cosine similarity; zero when either side is empty.
    #[must_use]
    pub fn cosine(&self, other: &Self) -> f32 {
        let denom = self.norm() * other.norm();
        if denom <= f32::EPSILON {
            0.0
        } else {
            self.dot(other) / denom
        }
    }

    /// Expands into a dense vector of length `dim`.
    #[must_use]
    pub fn to_dense(&self, dim: usize) -> Vec<f32> {
        let mut dense = vec![0.0; dim];
        for &(idx, value) in &self.entries {
            if idx < dim {
                dense[idx] = value;
            }
        }
        dense
    }
}

/// Document-term matrix produced by [`TfidfVectorizer::fit_transform`].
#[derive(Debug, Clone)]
pub struct TfidfMatrix {
    /// Lower-cased n-gram key -> first surface form, in first-occurrence order.
    vocabulary: IndexMap<String, String>,
    rows: Vec<SparseVector>,
}

impl TfidfMatrix {
    /// Number of distinct n-grams.
    #[must_use]
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// One L2-normalized row per input document.
    #[must_use]
    pub fn rows(&self) -> &[SparseVector] {
        &self.rows
    }

    /// Rows expanded to dense vectors.
    #[must_use]
    pub fn dense_rows(&self) -> Vec<Vec<f32>> {
        let dim = self.vocabulary.len();
        self.rows.iter().map(|row| row.to_dense(dim)).collect()
    }

    /// `(key, surface, summed score)` sorted by score, ties in first-occurrence order.
    #[must_use]
    pub fn ranked_terms(&self) -> Vec<(String, String, f32)> {
        let mut totals = vec![0.0_f32; self.vocabulary.len()];
        for row in &self.rows {
            for &(idx, weight) in row.entries() {
                totals[idx] += weight;
            }
        }
        let mut ranked: Vec<(String, String, f32)> = self
            .vocabulary
            .iter()
            .zip(totals)
            .map(|((key, surface), score)| (key.clone(), surface.clone(), score))
            .collect();
        ranked.sort_by(|a, b| b.2.total_cmp(&a.2));
        ranked
    }
}

/// TF-IDF over word n-grams with smoothed IDF and L2-normalized rows.
///
/// N-grams are built from contiguous runs of kept tokens inside one sentence,
/// so every n-gram occurs verbatim (up to case) in its document.
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    min_ngram: usize,
    max_ngram: usize,
    min_token_chars: usize,
    remove_stop_words: bool,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::unigrams()
    }
}

impl TfidfVectorizer {
    /// Vectorizer over `min_ngram..=max_ngram` word n-grams with stop words removed.
    #[must_use]
    pub fn new(min_ngram: usize, max_ngram: usize) -> Self {
        let min_ngram = min_ngram.max(1);
        Self {
            min_ngram,
            max_ngram: max_ngram.max(min_ngram),
            min_token_chars: 2,
            remove_stop_words: true,
        }
    }

    /// Unigram vectorizer.
    #[must_use]
    pub fn unigrams() -> Self {
        Self::new(1, 1)
    }

    /// Toggles stop-word removal.
    #[must_use]
    pub const fn with_stop_words_removed(mut self, remove: bool) -> Self {
        self.remove_stop_words = remove;
        self
    }

    /// Fits the vocabulary and IDF on `documents` and returns their rows.
    pub fn fit_transform(&self, documents: &[String]) -> Result<TfidfMatrix, ExtractionError> {
        let mut vocabulary: IndexMap<String, String> = IndexMap::new();
        let mut counts: Vec<HashMap<usize, f32>> = Vec::with_capacity(documents.len());
        for document in documents {
            let mut doc_counts = HashMap::new();
            for (key, surface) in self.ngrams(document) {
                let entry = vocabulary.entry(key);
                let idx = entry.index();
                entry.or_insert(surface);
                *doc_counts.entry(idx).or_insert(0.0) += 1.0;
            }
            counts.push(doc_counts);
        }
        if vocabulary.is_empty() {
            return Err(ExtractionError::EmptyVocabulary);
        }

        let n_docs = documents.len() as f32;
        let mut document_frequency = vec![0_usize; vocabulary.len()];
        for doc in &counts {
            for idx in doc.keys() {
                document_frequency[*idx] += 1;
            }
        }
        let idf: Vec<f32> = document_frequency
            .iter()
            .map(|&df| ((1.0 + n_docs) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        let rows = counts
            .into_iter()
            .map(|doc| {
                let weighted: Vec<(usize, f32)> =
                    doc.into_iter().map(|(idx, tf)| (idx, tf * idf[idx])).collect();
                let norm = weighted.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
                SparseVector::from_pairs(
                    weighted
                        .into_iter()
                        .map(|(idx, w)| (idx, if norm > 0.0 { w / norm } else { 0.0 })),
                )
            })
            .collect();

        Ok(TfidfMatrix { vocabulary, rows })
    }

    fn ngrams(&self, document: &str) -> Vec<(String, String)> {
        let mut grams = Vec::new();
        for sentence in split_sentences(document) {
            for run in self.token_runs(&sentence) {
                for n in self.min_ngram..=self.max_ngram {
                    for window in run.windows(n) {
                        let key = window
                            .iter()
                            .map(|&(s, e)| sentence[s..e].to_lowercase())
                            .collect::<Vec<_>>()
                            .join(" ");
                        let surface = sentence[window[0].0..window[n - 1].1].to_string();
                        grams.push((key, surface));
                    }
                }
            }
        }
        grams
    }

    /// Maximal runs of kept tokens separated only by whitespace.
    fn token_runs(&self, sentence: &str) -> Vec<Vec<(usize, usize)>> {
        let mut runs = Vec::new();
        let mut current: Vec<(usize, usize)> = Vec::new();
        let mut prev_end: Option<usize> = None;
        for (start, end) in word_spans(sentence) {
            let contiguous =
                prev_end.map_or(true, |p| sentence[p..start].chars().all(char::is_whitespace));
            if !contiguous && !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
            prev_end = Some(end);
            let token = &sentence[start..end];
            let dropped = token.chars().count() < self.min_token_chars
                || (self.remove_stop_words && is_stop_word(&token.to_lowercase()));
            if dropped {
                if !current.is_empty() {
                    runs.push(std::mem::take(&mut current));
                }
                continue;
            }
            current.push((start, end));
        }
        if !current.is_empty() {
            runs.push(current);
        }
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn ngrams_never_cross_stop_words_or_punctuation() {
        let matrix = TfidfVectorizer::new(1, 3)
            .fit_transform(&docs(&["The borrow checker rejects data races, memory leaks."]))
            .unwrap();
        let keys: Vec<String> = matrix.ranked_terms().into_iter().map(|t| t.0).collect();
        assert!(keys.contains(&"borrow checker rejects".to_string()));
        assert!(keys.contains(&"memory leaks".to_string()));
        assert!(!keys.iter().any(|k| k.contains("races memory")));
        assert!(!keys.iter().any(|k| k.contains("the")));
    }

    #[test]
    fn frequent_terms_rank_first_and_surface_is_kept() {
        let matrix = TfidfVectorizer::new(1, 1)
            .fit_transform(&docs(&["GPU kernels. GPU memory. Kernels matter for GPU."]))
            .unwrap();
        let ranked = matrix.ranked_terms();
        assert_eq!(ranked[0].0, "gpu");
        assert_eq!(ranked[0].1, "GPU");
    }

    #[test]
    fn stop_word_only_documents_have_empty_vocabulary() {
        let err = TfidfVectorizer::unigrams()
            .fit_transform(&docs(&["It is what it is."]))
            .unwrap_err();
        assert_eq!(err, ExtractionError::EmptyVocabulary);
    }

    #[test]
    fn rows_are_normalized_and_comparable() {
        let matrix = TfidfVectorizer::unigrams()
            .fit_transform(&docs(&[
                "Rust prevents data races.",
                "Rust prevents data races at compile time.",
                "Bananas are yellow.",
            ]))
            .unwrap();
        let rows = matrix.rows();
        assert!((rows[0].norm() - 1.0).abs() < 1e-5);
        assert!(rows[0].cosine(&rows[1]) > 0.5);
        assert!(rows[0].cosine(&rows[2]).abs() < 1e-6);
    }
}
