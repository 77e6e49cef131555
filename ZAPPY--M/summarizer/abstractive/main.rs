//! Abstractive compression: term-biased encoding, beam search and decoding.

/// Beam search decoder.
pub mod beam;
/// Built-in copy generator.
pub mod copy_model;
/// Model capability trait and encoder types.
pub mod model;

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use regex::RegexBuilder;
use serde_json::json;
use shared_logging::LogLevel;

pub use beam::BeamSearch;
pub use copy_model::LexicalCopyModel;
pub use model::{Encoding, GenerationError, ModelInput, Seq2SeqModel, TokenId};

use crate::{config::GenerationSettings, telemetry::SummarizerTelemetry, text::split_sentences};

const DEFAULT_ATTENTION: f32 = 1.0;

/// Compresses text with a [`Seq2SeqModel`] under a token budget.
#[derive(Clone)]
pub struct AbstractiveCompressor {
    model: Arc<dyn Seq2SeqModel>,
    settings: GenerationSettings,
    gate: Option<Arc<Mutex<()>>>,
    telemetry: Option<SummarizerTelemetry>,
}

impl fmt::Debug for AbstractiveCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbstractiveCompressor")
            .field("model", &self.model.name())
            .field("settings", &self.settings)
            .field("serialized", &self.gate.is_some())
            .finish()
    }
}

impl AbstractiveCompressor {
    /// Wraps a model; generation is serialized when `settings.serialize_access` is set.
    #[must_use]
    pub fn new(model: Arc<dyn Seq2SeqModel>, settings: GenerationSettings) -> Self {
        let gate = settings.serialize_access.then(|| Arc::new(Mutex::new(())));
        Self {
            model,
            settings,
            gate,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Option<SummarizerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Name of the wrapped model.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Summarizes `text` into at most `max_length` tokens.
    ///
    /// `min_length` is clamped to `max_length`. Tokens overlapping an occurrence
    /// of one of `terms` get the configured term attention weight.
    pub fn compress(
        &self,
        text: &str,
        max_length: usize,
        min_length: usize,
        terms: &[String],
    ) -> Result<String, GenerationError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let mut encoding = self.model.encode(text)?;
        let input_tokens = encoding.len();
        encoding.truncate(self.settings.max_input_tokens);
        let input = ModelInput {
            attention: self.attention_mask(text, &encoding, terms),
            ids: encoding.ids,
        };

        let max_length = max_length.max(1);
        let search = BeamSearch {
            num_beams: self.settings.num_beams,
            length_penalty: self.settings.length_penalty,
            early_stopping: self.settings.early_stopping,
            no_repeat_ngram_size: self.settings.no_repeat_ngram_size,
            min_length: min_length.min(max_length),
            max_length,
        };
        let generated = {
            let _guard = self.gate.as_ref().map(|gate| gate.lock());
            search.generate(self.model.as_ref(), &input)
        }
        .map_err(|err| {
            if let Some(tel) = &self.telemetry {
                let _ = tel.log(
                    LogLevel::Warn,
                    "summarizer.abstractive.failed",
                    json!({ "model": self.model.name(), "error": err.to_string() }),
                );
            }
            err
        })?;
        let decoded = self.model.decode(&generated)?;
        let summary = trim_incomplete_tail(decoded.trim());

        if let Some(tel) = &self.telemetry {
            let _ = tel.log(
                LogLevel::Debug,
                "summarizer.abstractive.generated",
                json!({
                    "model": self.model.name(),
                    "input_tokens": input_tokens,
                    "truncated": input_tokens > input.ids.len(),
                    "output_tokens": generated.len(),
                    "max_length": max_length,
                }),
            );
        }
        Ok(summary)
    }

    fn attention_mask(&self, text: &str, encoding: &Encoding, terms: &[String]) -> Vec<f32> {
        let mut attention = vec![DEFAULT_ATTENTION; encoding.len()];
        for term in terms.iter().filter(|t| !t.trim().is_empty()) {
            let Ok(pattern) = RegexBuilder::new(&regex::escape(term))
                .case_insensitive(true)
                .build()
            else {
                continue;
            };
            for found in pattern.find_iter(text) {
                for (weight, &(start, end)) in attention.iter_mut().zip(&encoding.offsets) {
                    if start < found.end() && end > found.start() {
                        *weight = self.settings.term_attention_weight;
                    }
                }
            }
        }
        attention
    }
}

/// Drops a trailing fragment after the last terminal punctuation mark when the
/// text holds more than one sentence.
fn trim_incomplete_tail(text: &str) -> String {
    let ends_complete = text
        .trim_end_matches(['"', '\'', ')', ']', '”', '’'])
        .ends_with(['.', '!', '?']);
    if ends_complete || split_sentences(text).len() < 2 {
        return text.to_string();
    }
    text.rfind(['.', '!', '?'])
        .map_or_else(|| text.to_string(), |idx| text[..=idx].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Always fails, to exercise error propagation.
    struct BrokenModel;

    impl Seq2SeqModel for BrokenModel {
        fn name(&self) -> &str {
            "broken"
        }

        fn encode(&self, _text: &str) -> Result<Encoding, GenerationError> {
            Err(GenerationError::Model {
                model: "broken".into(),
                message: "device lost".into(),
            })
        }

        fn eos_token(&self) -> TokenId {
            0
        }

        fn next_token_logprobs(
            &self,
            _input: &ModelInput,
            _prefix: &[TokenId],
        ) -> Result<Vec<(TokenId, f32)>, GenerationError> {
            Ok(Vec::new())
        }

        fn decode(&self, _ids: &[TokenId]) -> Result<String, GenerationError> {
            Ok(String::new())
        }
    }

    fn compressor() -> AbstractiveCompressor {
        AbstractiveCompressor::new(Arc::new(LexicalCopyModel::new()), GenerationSettings::default())
    }

    #[test]
    fn output_respects_the_word_budget() {
        let text = "The cache stores hot keys in memory. Eviction uses an LRU policy for cold keys. \
                    Writes go through a journal before reaching disk. Readers never block writers.";
        let summary = compressor().compress(text, 12, 6, &[]).unwrap();
        assert!(!summary.is_empty());
        assert!(crate::text::word_count(&summary) <= 12, "{summary}");
    }

    #[test]
    fn term_tokens_get_boosted_attention() {
        let c = compressor();
        let text = "Uses the LRU Cache daily.";
        let encoding = c.model.encode(text).unwrap();
        let mask = c.attention_mask(text, &encoding, &["lru cache".to_string()]);
        assert_eq!(mask, vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn model_failures_surface_as_generation_errors() {
        let c = AbstractiveCompressor::new(Arc::new(BrokenModel), GenerationSettings::default());
        let err = c.compress("Some text here.", 10, 5, &[]).unwrap_err();
        assert!(matches!(err, GenerationError::Model { .. }));
    }

    #[test]
    fn serialized_access_still_generates() {
        let settings = GenerationSettings {
            serialize_access: true,
            ..GenerationSettings::default()
        };
        let c = AbstractiveCompressor::new(Arc::new(LexicalCopyModel::new()), settings);
        let summary = c.compress("Short input sentence here.", 20, 2, &[]).unwrap();
        assert_eq!(summary, "Short input sentence here.");
    }

    #[test]
    fn incomplete_tail_is_trimmed() {
        assert_eq!(trim_incomplete_tail("First one. Second one. Third"), "First one. Second one.");
        assert_eq!(trim_incomplete_tail("Only fragment"), "Only fragment");
        assert_eq!(trim_incomplete_tail("Done."), "Done.");
    }
}
