use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    config::TermSettings,
    telemetry::SummarizerTelemetry,
    text::{contains_ignore_case, is_stop_word, split_sentences, ExtractionError, TfidfVectorizer},
};

/// Coarse part-of-speech classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PosTag {
    /// Common noun.
    Noun,
    /// Capitalized name.
    ProperNoun,
    /// Verb in any form.
    Verb,
    /// Adjective.
    Adjective,
    /// Adverb.
    Adverb,
    /// Numeral.
    Number,
    /// Function words and anything else.
    Other,
}

impl PosTag {
    /// True for common and proper nouns.
    #[must_use]
    pub const fn is_noun(self) -> bool {
        matches!(self, Self::Noun | Self::ProperNoun)
    }
}

/// Part-of-speech tagging capability.
pub trait PosTagger: Send + Sync {
    /// Tags one token as it appears in the text.
    fn tag(&self, token: &str) -> PosTag;
}

const COMMON_VERBS: &[&str] = &[
    "allow", "allows", "apply", "applies", "build", "builds", "cause", "causes", "create",
    "creates", "describe", "describes", "enable", "enables", "ensure", "ensures", "find", "finds",
    "get", "gets", "give", "gives", "go", "goes", "grow", "grows", "help", "helps", "improve",
    "improves", "include", "includes", "increase", "increases", "keep", "keeps", "lead", "leads",
    "make", "makes", "need", "needs", "provide", "provides", "reduce", "reduces", "remain",
    "remains", "require", "requires", "run", "runs", "see", "sees", "show", "shows", "support",
    "supports", "take", "takes", "use", "uses", "rose", "fell", "grew", "made", "took", "ran",
];

const COMMON_ADJECTIVES: &[&str] = &[
    "big", "small", "large", "high", "low", "new", "old", "good", "bad", "best", "better",
    "worse", "fast", "slow", "great", "early", "late", "long", "short", "major", "minor", "key",
    "main", "strong", "weak", "recent", "simple", "clear", "full",
];

const NOUN_SUFFIXES: &[&str] = &[
    "tion", "sion", "ment", "ness", "ity", "ism", "ist", "ance", "ence", "ship", "hood", "ware",
    "ogy", "graphy", "age", "ure", "er", "or",
];

const ADJECTIVE_SUFFIXES: &[&str] = &[
    "ous", "ful", "ive", "able", "ible", "ical", "less", "ary", "al", "ic",
];

/// Closed-class word lists plus suffix rules; unknown words are nouns.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTagger;

impl PosTagger for HeuristicTagger {
    fn tag(&self, token: &str) -> PosTag {
        let lower = token.to_lowercase();
        if lower.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
            return PosTag::Number;
        }
        if is_stop_word(&lower) {
            return PosTag::Other;
        }
        if COMMON_VERBS.contains(&lower.as_str()) {
            return PosTag::Verb;
        }
        if COMMON_ADJECTIVES.contains(&lower.as_str()) {
            return PosTag::Adjective;
        }
        if NOUN_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
            return PosTag::Noun;
        }
        if lower.ends_with("ly") {
            return PosTag::Adverb;
        }
        if lower.ends_with("ed") {
            return PosTag::Verb;
        }
        if ADJECTIVE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
            return PosTag::Adjective;
        }
        if token.chars().next().is_some_and(char::is_uppercase) && token != token.to_uppercase() {
            return PosTag::ProperNoun;
        }
        // includes gerunds such as "caching"
        PosTag::Noun
    }
}

/// Salient terms of one section, most salient first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSet {
    /// Terms in rank order.
    pub terms: Vec<String>,
    /// True when the TF-IDF vocabulary was empty and whitespace tokens were used.
    pub fallback: bool,
}

impl TermSet {
    /// Number of terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True without terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.terms
    }
}

/// TF-IDF n-gram term extraction with a part-of-speech filter.
#[derive(Clone)]
pub struct TermExtractor {
    settings: TermSettings,
    tagger: Option<Arc<dyn PosTagger>>,
    telemetry: Option<SummarizerTelemetry>,
}

impl std::fmt::Debug for TermExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermExtractor")
            .field("settings", &self.settings)
            .field("tagger", &self.tagger.is_some())
            .finish_non_exhaustive()
    }
}

impl TermExtractor {
    /// Creates an extractor; without a tagger every single token counts as a noun.
    #[must_use]
    pub fn new(settings: TermSettings, tagger: Option<Arc<dyn PosTagger>>) -> Self {
        Self {
            settings,
            tagger,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Option<SummarizerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Terms of `content`, each present verbatim in one of its sentences.
    #[must_use]
    pub fn extract(&self, content: &str) -> TermSet {
        let sentences = split_sentences(content);
        let (candidates, fallback) = match self.ranked_candidates(content) {
            Ok(terms) => (terms, false),
            Err(err) => {
                if let Some(tel) = &self.telemetry {
                    let _ = tel.log(
                        LogLevel::Debug,
                        "summarizer.terms.fallback",
                        json!({ "reason": err.to_string() }),
                    );
                }
                (fallback_tokens(content), true)
            }
        };

        let mut terms: Vec<String> = Vec::new();
        for term in candidates {
            if terms.len() == self.settings.max_terms {
                break;
            }
            let anchored = sentences.iter().any(|s| contains_ignore_case(s, &term));
            let duplicate = terms.iter().any(|t| t.eq_ignore_ascii_case(&term));
            if anchored && !duplicate {
                terms.push(term);
            }
        }
        TermSet { terms, fallback }
    }

    fn ranked_candidates(&self, content: &str) -> Result<Vec<String>, ExtractionError> {
        let matrix = TfidfVectorizer::new(1, self.settings.max_ngram)
            .fit_transform(&[content.to_string()])?;
        Ok(matrix
            .ranked_terms()
            .into_iter()
            .take(self.settings.term_candidates)
            .filter_map(|(key, surface, _)| self.keep(key, surface))
            .collect())
    }

    fn keep(&self, key: String, surface: String) -> Option<String> {
        if key.contains(' ') {
            return Some(key);
        }
        if is_acronym(&surface) {
            return Some(surface);
        }
        let noun = self
            .tagger
            .as_ref()
            .map_or(true, |tagger| tagger.tag(&surface).is_noun());
        noun.then_some(key)
    }
}

fn is_acronym(token: &str) -> bool {
    token.chars().any(char::is_alphabetic)
        && token.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase)
}

fn fallback_tokens(content: &str) -> Vec<String> {
    content
        .split_whitespace()
        .filter(|token| token.chars().count() > 1)
        .map(ToString::to_string)
        .collect()
}
