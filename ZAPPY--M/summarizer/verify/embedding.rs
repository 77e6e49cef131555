use std::collections::HashMap;

use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::text::{is_stop_word, l2_normalize, word_tokens};

/// Embedding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbeddingError {
    /// The embedding backend cannot serve requests.
    #[error("embedding model unavailable: {0}")]
    VerificationUnavailable(String),
    /// The backend returned the wrong number of vectors.
    #[error("embedder returned {got} vectors for {expected} sentences")]
    CountMismatch {
        /// Sentences sent.
        expected: usize,
        /// Vectors received.
        got: usize,
    },
}

/// Sentence embedding capability.
pub trait SentenceEmbedder: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// One vector per sentence, in order.
    fn embed(&self, sentences: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Random-indexing sentence vectors.
///
/// Every token owns a sparse ternary index vector drawn from a ChaCha8 stream
/// seeded by the token's hash; a sentence is the normalized sum of its content
/// tokens. Identical inputs always embed identically.
#[derive(Debug)]
pub struct RandomIndexingEmbedder {
    dimension: usize,
    nonzeros: usize,
    cache: RwLock<HashMap<String, Vec<(usize, f32)>>>,
}

impl Default for RandomIndexingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl RandomIndexingEmbedder {
    /// Embedder producing vectors of `dimension` components.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(8);
        Self {
            dimension,
            nonzeros: (dimension / 48).clamp(4, 16),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Vector length.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    fn index_vector(&self, token: &str) -> Vec<(usize, f32)> {
        if let Some(cached) = self.cache.read().get(token) {
            return cached.clone();
        }
        let mut rng = ChaCha8Rng::seed_from_u64(fnv1a(token));
        let entries: Vec<(usize, f32)> = (0..self.nonzeros)
            .map(|_| {
                let idx = rng.gen_range(0..self.dimension);
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                (idx, sign)
            })
            .collect();
        self.cache.write().insert(token.to_string(), entries.clone());
        entries
    }

    fn embed_one(&self, sentence: &str) -> Vec<f32> {
        let tokens: Vec<String> = word_tokens(sentence).into_iter().map(str::to_lowercase).collect();
        let content: Vec<&String> = tokens.iter().filter(|t| !is_stop_word(t)).collect();
        // sentences made only of stop words still get a vector
        let selected: Vec<&String> = if content.is_empty() {
            tokens.iter().collect()
        } else {
            content
        };
        let mut vector = vec![0.0; self.dimension];
        for token in selected {
            for (idx, value) in self.index_vector(token) {
                vector[idx] += value;
            }
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl SentenceEmbedder for RandomIndexingEmbedder {
    fn name(&self) -> &str {
        "random-indexing"
    }

    fn embed(&self, sentences: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(sentences.iter().map(|s| self.embed_one(s)).collect())
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::cosine;

    fn embed(sentences: &[&str]) -> Vec<Vec<f32>> {
        let owned: Vec<String> = sentences.iter().map(ToString::to_string).collect();
        RandomIndexingEmbedder::default().embed(&owned).unwrap()
    }

    #[test]
    fn embeddings_are_deterministic_and_normalized() {
        let first = embed(&["Tokenizers split text into subwords."]);
        let second = embed(&["Tokenizers split text into subwords."]);
        assert_eq!(first, second);
        let norm: f32 = first[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_means_higher_similarity() {
        let v = embed(&[
            "The scheduler assigns GPU kernels to idle devices.",
            "The scheduler assigns GPU kernels to devices.",
            "Farmers harvest apples every autumn.",
        ]);
        assert!(cosine(&v[0], &v[1]) > 0.7);
        assert!(cosine(&v[0], &v[2]) < 0.5);
    }
}
