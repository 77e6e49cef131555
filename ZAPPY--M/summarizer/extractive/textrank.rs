use indexmap::{IndexMap, IndexSet};

use crate::{
    extractive::SentenceRanker,
    text::{is_stop_word, split_sentences, word_tokens, SparseVector},
};

/// TextRank over a cosine-similarity sentence graph.
#[derive(Debug, Clone, Copy)]
pub struct TextRankRanker {
    damping: f32,
    tolerance: f32,
    max_iterations: usize,
}

impl Default for TextRankRanker {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

impl TextRankRanker {
    /// Ranker with the usual PageRank parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the damping factor.
    #[must_use]
    pub const fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping;
        self
    }

    /// Overrides the iteration cap.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Centrality score per sentence, in input order.
    #[must_use]
    pub fn scores(&self, sentences: &[String]) -> Vec<f32> {
        let n = sentences.len();
        if n == 0 {
            return Vec::new();
        }
        let weights = similarity_matrix(sentences);
        let out_weight: Vec<f32> = weights.iter().map(|row| row.iter().sum()).collect();
        let uniform = 1.0 / n as f32;
        let mut rank = vec![uniform; n];

        for _ in 0..self.max_iterations {
            // dangling sentences share no words with any other and spread uniformly
            let dangling: f32 = rank
                .iter()
                .zip(&out_weight)
                .filter(|(_, w)| **w <= f32::EPSILON)
                .map(|(r, _)| r)
                .sum();
            let mut next = vec![(1.0 - self.damping) * uniform + self.damping * dangling * uniform; n];
            for (i, row) in weights.iter().enumerate() {
                if out_weight[i] <= f32::EPSILON {
                    continue;
                }
                let share = self.damping * rank[i] / out_weight[i];
                for (j, w) in row.iter().enumerate() {
                    next[j] += share * w;
                }
            }
            let delta: f32 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
            rank = next;
            if delta < n as f32 * self.tolerance {
                break;
            }
        }
        rank
    }
}

impl SentenceRanker for TextRankRanker {
    fn name(&self) -> &str {
        "textrank"
    }

    fn rank(&self, content: &str, k: usize) -> Vec<String> {
        let sentences = split_sentences(content);
        let scores = self.scores(&sentences);
        let mut order: Vec<usize> = (0..sentences.len()).collect();
        // stable sort keeps earlier sentences first on ties
        order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
        order
            .into_iter()
            .take(k)
            .map(|idx| sentences[idx].clone())
            .collect()
    }
}

fn similarity_matrix(sentences: &[String]) -> Vec<Vec<f32>> {
    let mut vocabulary: IndexSet<String> = IndexSet::new();
    let vectors: Vec<SparseVector> = sentences
        .iter()
        .map(|sentence| {
            let mut counts: IndexMap<usize, f32> = IndexMap::new();
            for token in word_tokens(sentence) {
                let lower = token.to_lowercase();
                if is_stop_word(&lower) {
                    continue;
                }
                let (idx, _) = vocabulary.insert_full(lower);
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
            SparseVector::from_pairs(counts)
        })
        .collect();

    let n = vectors.len();
    let mut weights = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let sim = vectors[i].cosine(&vectors[j]);
            weights[i][j] = sim;
            weights[j][i] = sim;
        }
    }
    weights
}
