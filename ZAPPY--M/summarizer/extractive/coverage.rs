use crate::text::{contains_ignore_case, split_sentences};

/// Extractive selection after the coverage guard ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoveredSelection {
    /// Ranked sentences followed by any appended ones.
    pub sentences: Vec<String>,
    /// Terms that needed an appended sentence.
    pub appended_terms: Vec<String>,
}

impl CoveredSelection {
    /// Sentences joined with single spaces.
    #[must_use]
    pub fn text(&self) -> String {
        self.sentences.join(" ")
    }
}

/// Appends, for every term missing from `selection`, the first sentence of
/// `content` that contains it.
#[must_use]
pub fn ensure_term_coverage(
    selection: Vec<String>,
    terms: &[String],
    content: &str,
) -> CoveredSelection {
    let missing: Vec<&String> = terms
        .iter()
        .filter(|term| !selection.iter().any(|s| contains_ignore_case(s, term)))
        .collect();
    if missing.is_empty() {
        return CoveredSelection {
            sentences: selection,
            appended_terms: Vec::new(),
        };
    }

    let section_sentences = split_sentences(content);
    let mut sentences = selection;
    let mut appended_terms = Vec::new();
    for term in missing {
        if let Some(sentence) = section_sentences.iter().find(|s| contains_ignore_case(s, term)) {
            sentences.push(sentence.clone());
            appended_terms.push(term.clone());
        }
    }
    CoveredSelection {
        sentences,
        appended_terms,
    }
}
