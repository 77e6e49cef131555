use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use thiserror::Error;

use crate::{
    abstractive::{AbstractiveCompressor, GenerationError},
    config::GenerationFailurePolicy,
    telemetry::SummarizerTelemetry,
    text::word_count,
    verify::FactVerifier,
};

/// One section as seen by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileEntry {
    /// Position of the section in the segmented document.
    pub index: usize,
    /// Original section content.
    pub original: String,
    /// Terms extracted during section processing.
    pub terms: Vec<String>,
    /// Current summary; replaced only on successful recompression.
    pub summary: String,
}

/// What happened to one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Recompressed under the rescaled budget.
    Recompressed {
        /// Section index.
        index: usize,
        /// Token budget used.
        budget: usize,
        /// Words after recompression.
        words: usize,
    },
    /// Prior summary kept.
    Kept {
        /// Section index.
        index: usize,
        /// Why the prior summary survived.
        reason: String,
    },
}

/// Reconciliation summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Words before reconciliation.
    pub current_words: usize,
    /// Requested total.
    pub target_words: usize,
    /// `target / current` when over budget, else 1.
    pub scale: f32,
    /// Words after reconciliation.
    pub final_words: usize,
    /// Per-section outcomes in document order.
    pub outcomes: Vec<ReconcileOutcome>,
}

/// Reconciliation failure under [`GenerationFailurePolicy::FailDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Recompressing a section failed.
    #[error("section {index} failed during reconciliation: {source}")]
    Generation {
        /// Section index.
        index: usize,
        /// Generator error.
        #[source]
        source: GenerationError,
    },
}

/// Rescales every section to the global word budget by recompressing the
/// original content.
#[derive(Clone)]
pub struct LengthReconciler {
    compressor: AbstractiveCompressor,
    min_length_floor: usize,
    policy: GenerationFailurePolicy,
    verifier: Option<Arc<dyn FactVerifier>>,
    telemetry: Option<SummarizerTelemetry>,
}

impl std::fmt::Debug for LengthReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LengthReconciler")
            .field("min_length_floor", &self.min_length_floor)
            .field("policy", &self.policy)
            .field("verify", &self.verifier.is_some())
            .finish_non_exhaustive()
    }
}

impl LengthReconciler {
    /// Creates a reconciler.
    #[must_use]
    pub const fn new(
        compressor: AbstractiveCompressor,
        min_length_floor: usize,
        policy: GenerationFailurePolicy,
    ) -> Self {
        Self {
            compressor,
            min_length_floor,
            policy,
            verifier: None,
            telemetry: None,
        }
    }

    /// Re-verifies recompressed text with `verifier`.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Option<Arc<dyn FactVerifier>>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Option<SummarizerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Scale factor for a document of `current` words and a `target`.
    #[must_use]
    pub fn scale(current: usize, target: usize) -> f32 {
        if current > target && current > 0 {
            target as f32 / current as f32
        } else {
            1.0
        }
    }

    /// `(max_length, min_length)` for a section of `words` words.
    #[must_use]
    pub fn budget(&self, words: usize, scale: f32) -> (usize, usize) {
        let max_length = ((words as f32 * scale).round() as usize).max(1);
        let min_length = self.min_length_floor.max(max_length / 2).min(max_length);
        (max_length, min_length)
    }

    /// Rewrites `entries` in place and reports what changed.
    pub fn reconcile(
        &self,
        entries: &mut [ReconcileEntry],
        target_words: usize,
    ) -> Result<ReconcileReport, ReconcileError> {
        let current_words: usize = entries.iter().map(|e| word_count(&e.summary)).sum();
        let scale = Self::scale(current_words, target_words);
        let mut outcomes = Vec::with_capacity(entries.len());

        for entry in entries.iter_mut() {
            let words = word_count(&entry.summary);
            if words == 0 {
                outcomes.push(ReconcileOutcome::Kept {
                    index: entry.index,
                    reason: "empty summary".into(),
                });
                continue;
            }
            let (max_length, min_length) = self.budget(words, scale);
            match self
                .compressor
                .compress(&entry.original, max_length, min_length, &entry.terms)
            {
                Ok(text) if !text.is_empty() => {
                    entry.summary = match &self.verifier {
                        Some(verifier) => verifier.verify(&text, &entry.original).text,
                        None => text,
                    };
                    outcomes.push(ReconcileOutcome::Recompressed {
                        index: entry.index,
                        budget: max_length,
                        words: word_count(&entry.summary),
                    });
                }
                Ok(_) => outcomes.push(ReconcileOutcome::Kept {
                    index: entry.index,
                    reason: "generator returned empty text".into(),
                }),
                Err(source) => {
                    if let Some(tel) = &self.telemetry {
                        let _ = tel.log(
                            LogLevel::Warn,
                            "summarizer.reconcile.section_failed",
                            json!({ "index": entry.index, "error": source.to_string() }),
                        );
                    }
                    if self.policy == GenerationFailurePolicy::FailDocument {
                        return Err(ReconcileError::Generation {
                            index: entry.index,
                            source,
                        });
                    }
                    outcomes.push(ReconcileOutcome::Kept {
                        index: entry.index,
                        reason: source.to_string(),
                    });
                }
            }
        }

        let final_words = entries.iter().map(|e| word_count(&e.summary)).sum();
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(
                LogLevel::Info,
                "summarizer.reconcile.completed",
                json!({
                    "current_words": current_words,
                    "target_words": target_words,
                    "scale": scale,
                    "final_words": final_words,
                }),
            );
        }
        Ok(ReconcileReport {
            current_words,
            target_words,
            scale,
            final_words,
            outcomes,
        })
    }
}
