use std::{fmt, fs, path::Path, str::FromStr};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Requested output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    /// Roughly a tenth of the input.
    Short,
    /// Roughly a fifth of the input.
    #[default]
    Medium,
    /// Roughly a third of the input.
    Long,
}

impl SizeClass {
    /// Lower-case label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SizeClass {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "long" => Ok(Self::Long),
            other => Err(ConfigError::UnknownSizeClass(other.to_string())),
        }
    }
}

/// Target-length rule for one size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthProfile {
    /// Minimum target in words.
    pub word_floor: usize,
    /// Maximum target in words.
    pub word_ceiling: usize,
    /// Total words are divided by this before clamping.
    pub divisor: usize,
    /// Sentences kept by the extractive ranker.
    #[serde(default = "default_extractive_sentences")]
    pub extractive_sentences: usize,
}

impl LengthProfile {
    /// `min(ceiling, max(floor, total / divisor))`.
    #[must_use]
    pub fn target_words(&self, total_words: usize) -> usize {
        (total_words / self.divisor.max(1))
            .max(self.word_floor)
            .min(self.word_ceiling)
    }
}

/// `{short, medium, long}` -> [`LengthProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeClassTable {
    /// Short profile.
    pub short: LengthProfile,
    /// Medium profile.
    pub medium: LengthProfile,
    /// Long profile.
    pub long: LengthProfile,
}

impl Default for SizeClassTable {
    fn default() -> Self {
        Self {
            short: LengthProfile {
                word_floor: 250,
                word_ceiling: 500,
                divisor: 10,
                extractive_sentences: default_extractive_sentences(),
            },
            medium: LengthProfile {
                word_floor: 500,
                word_ceiling: 1000,
                divisor: 5,
                extractive_sentences: default_extractive_sentences(),
            },
            long: LengthProfile {
                word_floor: 1000,
                word_ceiling: 2000,
                divisor: 3,
                extractive_sentences: default_extractive_sentences(),
            },
        }
    }
}

impl SizeClassTable {
    /// Profile for a size class.
    #[must_use]
    pub const fn profile(&self, class: SizeClass) -> &LengthProfile {
        match class {
            SizeClass::Short => &self.short,
            SizeClass::Medium => &self.medium,
            SizeClass::Long => &self.long,
        }
    }

    /// Target word count for a document of `total_words`.
    #[must_use]
    pub fn target_words(&self, class: SizeClass, total_words: usize) -> usize {
        self.profile(class).target_words(total_words)
    }
}

/// Beam-search and attention settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Beam width.
    pub num_beams: usize,
    /// Exponent applied to hypothesis length when scoring.
    pub length_penalty: f32,
    /// Stop once `num_beams` hypotheses are finished.
    pub early_stopping: bool,
    /// Forbid repeating any n-gram of this size; 0 disables.
    pub no_repeat_ngram_size: usize,
    /// Input window in tokens.
    pub max_input_tokens: usize,
    /// Attention weight on tokens of preserved terms.
    pub term_attention_weight: f32,
    /// Floor for `min_length` during reconciliation.
    pub reconcile_min_length: usize,
    /// Serialize calls into the generator.
    pub serialize_access: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            num_beams: 4,
            length_penalty: 2.0,
            early_stopping: true,
            no_repeat_ngram_size: 3,
            max_input_tokens: 1024,
            term_attention_weight: 2.0,
            reconcile_min_length: 30,
            serialize_access: false,
        }
    }
}

/// Coverage thresholds for the fact verifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    /// Cosine threshold with sentence embeddings.
    pub embedding_threshold: f32,
    /// Cosine threshold with TF-IDF vectors.
    pub lexical_threshold: f32,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            embedding_threshold: 0.7,
            lexical_threshold: 0.3,
        }
    }
}

/// Term extraction limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermSettings {
    /// Terms kept per section.
    pub max_terms: usize,
    /// Candidates considered before filtering.
    pub term_candidates: usize,
    /// Longest n-gram.
    pub max_ngram: usize,
}

impl Default for TermSettings {
    fn default() -> Self {
        Self {
            max_terms: 15,
            term_candidates: 50,
            max_ngram: 3,
        }
    }
}

/// Rendering options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterSettings {
    /// Bullets in the key takeaways list.
    pub key_takeaways: usize,
    /// Sentences per rendered paragraph.
    pub sentences_per_paragraph: usize,
}

impl Default for FormatterSettings {
    fn default() -> Self {
        Self {
            key_takeaways: 5,
            sentences_per_paragraph: 3,
        }
    }
}

/// What to do when the generator fails on a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationFailurePolicy {
    /// Keep the extractive selection verbatim for that section.
    #[default]
    Degrade,
    /// Abort the whole document.
    FailDocument,
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Unrecognized size class label.
    #[error("unknown size class `{0}` (expected short, medium or long)")]
    UnknownSizeClass(String),
    /// A length profile is inconsistent.
    #[error("size class {class}: {reason}")]
    InvalidProfile {
        /// Offending class.
        class: SizeClass,
        /// Human readable cause.
        reason: String,
    },
    /// Any other out-of-range value.
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting {
        /// Dotted field path.
        field: &'static str,
        /// Human readable cause.
        reason: String,
    },
}

/// Pipeline configuration; every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Target-length table.
    pub size_classes: SizeClassTable,
    /// Floor for the per-section word budget.
    pub min_words_per_section: usize,
    /// Term extraction limits.
    pub terms: TermSettings,
    /// Generation settings.
    pub generation: GenerationSettings,
    /// Verifier thresholds.
    pub verification: VerificationSettings,
    /// Formatter options.
    pub formatter: FormatterSettings,
    /// Policy on generation failure.
    pub failure_policy: GenerationFailurePolicy,
    /// Section workers for parallel runs; 0 uses every available core.
    pub workers: usize,
    /// Re-run the verifier on reconciled sections.
    pub verify_after_reconcile: bool,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            size_classes: SizeClassTable::default(),
            min_words_per_section: 50,
            terms: TermSettings::default(),
            generation: GenerationSettings::default(),
            verification: VerificationSettings::default(),
            formatter: FormatterSettings::default(),
            failure_policy: GenerationFailurePolicy::default(),
            workers: 0,
            verify_after_reconcile: false,
        }
    }
}

impl SummarizerConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading summarizer config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for class in [SizeClass::Short, SizeClass::Medium, SizeClass::Long] {
            let profile = self.size_classes.profile(class);
            if profile.divisor == 0 {
                return Err(ConfigError::InvalidProfile {
                    class,
                    reason: "divisor must be positive".into(),
                });
            }
            if profile.word_floor > profile.word_ceiling {
                return Err(ConfigError::InvalidProfile {
                    class,
                    reason: format!(
                        "word_floor {} exceeds word_ceiling {}",
                        profile.word_floor, profile.word_ceiling
                    ),
                });
            }
            if profile.extractive_sentences == 0 {
                return Err(ConfigError::InvalidProfile {
                    class,
                    reason: "extractive_sentences must be positive".into(),
                });
            }
        }
        check_threshold("verification.embedding_threshold", self.verification.embedding_threshold)?;
        check_threshold("verification.lexical_threshold", self.verification.lexical_threshold)?;
        if self.generation.num_beams == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "generation.num_beams",
                reason: "at least one beam is required".into(),
            });
        }
        if self.generation.max_input_tokens == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "generation.max_input_tokens",
                reason: "input window must be positive".into(),
            });
        }
        if !(self.generation.term_attention_weight.is_finite()
            && self.generation.term_attention_weight > 0.0)
        {
            return Err(ConfigError::InvalidSetting {
                field: "generation.term_attention_weight",
                reason: "must be a positive number".into(),
            });
        }
        if self.formatter.sentences_per_paragraph == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "formatter.sentences_per_paragraph",
                reason: "must be positive".into(),
            });
        }
        if self.terms.max_ngram == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "terms.max_ngram",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Worker count with 0 resolved to the available parallelism.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        }
    }
}

fn check_threshold(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidSetting {
            field,
            reason: format!("{value} is outside (0, 1]"),
        })
    }
}

const fn default_extractive_sentences() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_targets_follow_size_table() {
        let table = SizeClassTable::default();
        assert_eq!(table.target_words(SizeClass::Short, 1000), 250);
        assert_eq!(table.target_words(SizeClass::Short, 4000), 400);
        assert_eq!(table.target_words(SizeClass::Short, 90_000), 500);
        assert_eq!(table.target_words(SizeClass::Medium, 3000), 600);
        assert_eq!(table.target_words(SizeClass::Long, 1500), 1000);
        assert_eq!(table.target_words(SizeClass::Long, 4500), 1500);
    }

    #[test]
    fn size_class_parses_labels() {
        assert_eq!("Short".parse::<SizeClass>().unwrap(), SizeClass::Short);
        assert_eq!(SizeClass::Long.to_string(), "long");
        assert!(matches!(
            "tiny".parse::<SizeClass>(),
            Err(ConfigError::UnknownSizeClass(_))
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SummarizerConfig::from_toml_str(
            "workers = 2\nfailure_policy = \"fail_document\"\n[generation]\nnum_beams = 2\n",
        )
        .unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.failure_policy, GenerationFailurePolicy::FailDocument);
        assert_eq!(config.generation.num_beams, 2);
        assert!((config.generation.length_penalty - 2.0).abs() < f32::EPSILON);
        assert_eq!(config.terms.max_terms, 15);
    }

    #[test]
    fn invalid_profile_is_rejected() {
        let raw = "[size_classes.short]\nword_floor = 600\nword_ceiling = 500\ndivisor = 10\n\
                   [size_classes.medium]\nword_floor = 500\nword_ceiling = 1000\ndivisor = 5\n\
                   [size_classes.long]\nword_floor = 1000\nword_ceiling = 2000\ndivisor = 3\n";
        let err = SummarizerConfig::from_toml_str(raw).unwrap_err();
        assert!(err.to_string().contains("short"));
    }

    #[test]
    fn default_config_round_trips_through_a_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summarizer.toml");
        let config = SummarizerConfig::default();
        fs::write(&path, config.to_toml().unwrap()).unwrap();
        assert_eq!(SummarizerConfig::load(&path).unwrap(), config);
        assert!(config.effective_workers() >= 1);
    }
}
