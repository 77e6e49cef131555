//! Fact verification: original sentences the summary does not cover are
//! appended verbatim, so verification only ever adds sentences.

/// Embedding capability and the built-in random-indexing embedder.
pub mod embedding;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

pub use embedding::{EmbeddingError, RandomIndexingEmbedder, SentenceEmbedder};

use crate::{
    config::VerificationSettings,
    telemetry::SummarizerTelemetry,
    text::{cosine, split_sentences, TfidfVectorizer},
};

/// How coverage was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// Sentence embeddings.
    Embedding,
    /// TF-IDF vectors.
    Lexical,
    /// TF-IDF vectors after the embedder failed.
    LexicalFallback,
}

/// Verifier output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedSummary {
    /// Generated sentences followed by reinserted originals.
    pub text: String,
    /// Sentences in the generated summary.
    pub generated_sentences: usize,
    /// Original sentences appended, in source order.
    pub reinserted: Vec<String>,
    /// Measurement used.
    pub method: VerificationMethod,
}

impl VerifiedSummary {
    /// Sentence count of the verified text.
    #[must_use]
    pub fn sentence_count(&self) -> usize {
        self.generated_sentences + self.reinserted.len()
    }
}

/// Fact verification capability.
pub trait FactVerifier: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Appends every sentence of `original` that no sentence of `summary` covers.
    fn verify(&self, summary: &str, original: &str) -> VerifiedSummary;
}

/// Picks the embedding verifier when an embedder is available.
#[must_use]
pub fn build_verifier(
    embedder: Option<Arc<dyn SentenceEmbedder>>,
    settings: &VerificationSettings,
    telemetry: Option<SummarizerTelemetry>,
) -> Arc<dyn FactVerifier> {
    let lexical = LexicalVerifier::new(settings.lexical_threshold);
    match embedder {
        Some(embedder) => Arc::new(EmbeddingVerifier {
            embedder,
            threshold: settings.embedding_threshold,
            fallback: lexical,
            telemetry,
        }),
        None => Arc::new(lexical),
    }
}

/// Cosine over sentence embeddings.
pub struct EmbeddingVerifier {
    embedder: Arc<dyn SentenceEmbedder>,
    threshold: f32,
    fallback: LexicalVerifier,
    telemetry: Option<SummarizerTelemetry>,
}

impl fmt::Debug for EmbeddingVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingVerifier")
            .field("embedder", &self.embedder.name())
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl EmbeddingVerifier {
    /// Verifier with an explicit threshold and lexical fallback threshold.
    #[must_use]
    pub fn new(embedder: Arc<dyn SentenceEmbedder>, threshold: f32, lexical_threshold: f32) -> Self {
        Self {
            embedder,
            threshold,
            fallback: LexicalVerifier::new(lexical_threshold),
            telemetry: None,
        }
    }

    fn embed_all(
        &self,
        generated: &[String],
        original: &[String],
    ) -> Result<(Vec<Vec<f32>>, Vec<Vec<f32>>), EmbeddingError> {
        let all: Vec<String> = generated.iter().chain(original).cloned().collect();
        let mut vectors = self.embedder.embed(&all)?;
        if vectors.len() != all.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: all.len(),
                got: vectors.len(),
            });
        }
        let original_vectors = vectors.split_off(generated.len());
        Ok((vectors, original_vectors))
    }
}

impl FactVerifier for EmbeddingVerifier {
    fn name(&self) -> &str {
        "embedding"
    }

    fn verify(&self, summary: &str, original: &str) -> VerifiedSummary {
        let generated = split_sentences(summary);
        let source = split_sentences(original);
        match self.embed_all(&generated, &source) {
            Ok((generated_vectors, source_vectors)) => {
                let similarity = |i: usize, j: usize| cosine(&source_vectors[i], &generated_vectors[j]);
                assemble(generated, &source, self.threshold, similarity, VerificationMethod::Embedding)
            }
            Err(err) => {
                if let Some(tel) = &self.telemetry {
                    let _ = tel.log(
                        LogLevel::Warn,
                        "summarizer.verify.fallback",
                        json!({ "embedder": self.embedder.name(), "error": err.to_string() }),
                    );
                }
                let mut verified = self.fallback.verify(summary, original);
                verified.method = VerificationMethod::LexicalFallback;
                verified
            }
        }
    }
}

/// Cosine over TF-IDF unigram vectors fit on both sentence sets.
#[derive(Debug, Clone, Copy)]
pub struct LexicalVerifier {
    threshold: f32,
}

impl LexicalVerifier {
    /// Verifier with the given cosine threshold.
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl FactVerifier for LexicalVerifier {
    fn name(&self) -> &str {
        "lexical"
    }

    fn verify(&self, summary: &str, original: &str) -> VerifiedSummary {
        let generated = split_sentences(summary);
        let source = split_sentences(original);
        let all: Vec<String> = generated.iter().chain(&source).cloned().collect();
        let rows = TfidfVectorizer::unigrams()
            .fit_transform(&all)
            .map(|matrix| matrix.rows().to_vec())
            .unwrap_or_default();
        let offset = generated.len();
        let similarity = |i: usize, j: usize| match (rows.get(offset + i), rows.get(j)) {
            (Some(src), Some(gen)) => src.cosine(gen),
            _ => 0.0,
        };
        assemble(generated, &source, self.threshold, similarity, VerificationMethod::Lexical)
    }
}

fn assemble(
    generated: Vec<String>,
    source: &[String],
    threshold: f32,
    similarity: impl Fn(usize, usize) -> f32,
    method: VerificationMethod,
) -> VerifiedSummary {
    let reinserted: Vec<String> = source
        .iter()
        .enumerate()
        .filter(|(i, sentence)| {
            let verbatim = generated.iter().any(|g| g.eq_ignore_ascii_case(sentence));
            !verbatim && !(0..generated.len()).any(|j| similarity(*i, j) > threshold)
        })
        .map(|(_, sentence)| sentence.clone())
        .collect();
    let generated_sentences = generated.len();
    let text = generated
        .into_iter()
        .chain(reinserted.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");
    VerifiedSummary {
        text,
        generated_sentences,
        reinserted,
        method,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OfflineEmbedder;

    impl SentenceEmbedder for OfflineEmbedder {
        fn name(&self) -> &str {
            "offline"
        }

        fn embed(&self, _sentences: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::VerificationUnavailable("weights not loaded".into()))
        }
    }

    const ORIGINAL: &str = "The cache stores hot keys in memory. \
                            Eviction follows an LRU policy. \
                            Farmers harvest apples every autumn.";

    #[test]
    fn uncovered_sentences_are_appended_in_order() {
        let verifier = build_verifier(
            Some(Arc::new(RandomIndexingEmbedder::default())),
            &VerificationSettings::default(),
            None,
        );
        let verified = verifier.verify("The cache stores hot keys in memory.", ORIGINAL);
        assert_eq!(verified.method, VerificationMethod::Embedding);
        assert_eq!(
            verified.reinserted,
            vec!["Eviction follows an LRU policy.", "Farmers harvest apples every autumn."]
        );
        assert!(verified.text.starts_with("The cache stores hot keys in memory. Eviction"));
    }

    #[test]
    fn verification_never_removes_sentences() {
        let verifier = LexicalVerifier::new(0.3);
        let summary = "Completely unrelated words. Another invented claim.";
        let verified = verifier.verify(summary, ORIGINAL);
        assert!(verified.sentence_count() >= verified.generated_sentences);
        assert_eq!(verified.generated_sentences, 2);
        assert!(verified.text.starts_with(summary));
        assert_eq!(verified.reinserted.len(), 3);
    }

    #[test]
    fn lexical_overlap_counts_as_covered() {
        let verified = LexicalVerifier::new(0.3).verify(
            "Eviction follows an LRU policy for keys.",
            "Eviction follows an LRU policy.",
        );
        assert!(verified.reinserted.is_empty());
        assert_eq!(verified.method, VerificationMethod::Lexical);
    }

    #[test]
    fn unavailable_embedder_falls_back_to_lexical() {
        let verifier = build_verifier(
            Some(Arc::new(OfflineEmbedder)),
            &VerificationSettings::default(),
            None,
        );
        let verified = verifier.verify("Eviction follows an LRU policy.", ORIGINAL);
        assert_eq!(verified.method, VerificationMethod::LexicalFallback);
        assert!(!verified.reinserted.contains(&"Eviction follows an LRU policy.".to_string()));
    }

    #[test]
    fn empty_summary_reinserts_everything() {
        let verified = LexicalVerifier::new(0.3).verify("", ORIGINAL);
        assert_eq!(verified.generated_sentences, 0);
        assert_eq!(verified.reinserted.len(), 3);
    }
}
