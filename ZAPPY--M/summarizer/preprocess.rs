use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    document::{Section, SegmentedDocument},
    telemetry::SummarizerTelemetry,
    text::{split_paragraphs, TfidfVectorizer},
};

static NUMBERED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)*\.?\s+(\p{Lu}.*)$").expect("numbered heading pattern"));
static PAGE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*---\s*Page\s+\d+\s*---[ \t]*$").expect("page marker pattern"));

const MAX_HEADING_WORDS: usize = 12;
const PARAGRAPH_TFIDF_THRESHOLD: usize = 5;
const SALIENT_TERMS: usize = 10;

/// Connector words allowed in lower case inside a title-cased heading.
const MINOR_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "in", "into", "of", "on", "or", "over",
    "per", "the", "to", "vs", "via", "with",
];

/// Splits raw text into heading-labelled sections.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    telemetry: Option<SummarizerTelemetry>,
}

impl Preprocessor {
    /// Creates a preprocessor.
    #[must_use]
    pub const fn new() -> Self {
        Self { telemetry: None }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Option<SummarizerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Segments `text` into sections in document order.
    #[must_use]
    pub fn segment(&self, text: &str) -> SegmentedDocument {
        let cleaned = clean(text);
        let paragraphs = split_paragraphs(&cleaned);
        let salient_terms = if paragraphs.len() > PARAGRAPH_TFIDF_THRESHOLD {
            paragraph_terms(&paragraphs)
        } else {
            Vec::new()
        };

        let mut sections = Vec::new();
        let mut heading: Option<String> = None;
        let mut body: Vec<&str> = Vec::new();
        for line in cleaned.lines() {
            if let Some(next) = heading_text(line) {
                flush(&mut sections, heading.take(), &body);
                body.clear();
                heading = Some(next);
            } else {
                body.push(line);
            }
        }
        let degenerate = heading.is_none() && sections.is_empty();
        if degenerate {
            sections.push(Section::new("", cleaned.trim()));
        } else {
            flush(&mut sections, heading, &body);
        }

        if let Some(tel) = &self.telemetry {
            if degenerate {
                let _ = tel.log(
                    LogLevel::Debug,
                    "summarizer.preprocess.no_headings",
                    json!({ "chars": cleaned.len() }),
                );
            }
            let _ = tel.log(
                LogLevel::Info,
                "summarizer.preprocess.segmented",
                json!({
                    "sections": sections.len(),
                    "paragraphs": paragraphs.len(),
                    "salient_terms": salient_terms,
                }),
            );
        }

        SegmentedDocument {
            sections,
            paragraph_count: paragraphs.len(),
            salient_terms,
        }
    }
}

fn clean(text: &str) -> String {
    let text = text.replace('\u{c}', "\n").replace("\r\n", "\n");
    PAGE_MARKER_RE.replace_all(&text, "").into_owned()
}

fn flush(sections: &mut Vec<Section>, heading: Option<String>, body: &[&str]) {
    let content = body.join("\n").trim().to_string();
    match heading {
        Some(heading) => sections.push(Section::new(heading, content)),
        // preamble before the first heading
        None if !content.is_empty() => sections.push(Section::new("", content)),
        None => {}
    }
}

fn paragraph_terms(paragraphs: &[String]) -> Vec<String> {
    TfidfVectorizer::unigrams()
        .fit_transform(paragraphs)
        .map(|matrix| {
            matrix
                .ranked_terms()
                .into_iter()
                .take(SALIENT_TERMS)
                .map(|(_, surface, _)| surface)
                .collect()
        })
        .unwrap_or_default()
}

/// Heading text when `line` is a heading line, without a trailing colon.
fn heading_text(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let stripped = trimmed.strip_suffix(':').unwrap_or(trimmed).trim_end();
    if stripped.is_empty() || stripped.ends_with(['.', '!', '?', ',', ';']) {
        return None;
    }
    if stripped.split_whitespace().count() > MAX_HEADING_WORDS {
        return None;
    }
    let is_heading = NUMBERED_RE
        .captures(stripped)
        .and_then(|caps| caps.get(1))
        .is_some_and(|rest| !rest.as_str().contains(['.', '!', '?']) || is_title_run(rest.as_str()))
        || is_title_run(stripped);
    is_heading.then(|| stripped.to_string())
}

fn is_title_run(text: &str) -> bool {
    if text.contains([',', ';']) {
        return false;
    }
    let mut has_letter = false;
    for (idx, word) in text.split_whitespace().enumerate() {
        let core = word.trim_matches(|c: char| !c.is_alphanumeric());
        let Some(first) = core.chars().next() else {
            // standalone symbols such as `&` or `-`
            continue;
        };
        if first.is_alphabetic() {
            has_letter = true;
        }
        let capitalized = first.is_uppercase() || first.is_ascii_digit();
        let minor = idx > 0 && MINOR_WORDS.contains(&core);
        if !(capitalized || minor) {
            return false;
        }
    }
    has_letter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_start_sections() {
        let text = "EXECUTIVE SUMMARY:\nRevenue grew strongly.\n\nMarket Analysis of Europe\nDemand rose. Supply fell.\n2.1 Risk Factors\nCurrency risk remains.";
        let doc = Preprocessor::new().segment(text);
        let headings: Vec<&str> = doc.sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(
            headings,
            vec!["EXECUTIVE SUMMARY", "Market Analysis of Europe", "2.1 Risk Factors"]
        );
        assert_eq!(doc.sections[1].content, "Demand rose. Supply fell.");
    }

    #[test]
    fn preamble_becomes_unlabelled_section() {
        let doc = Preprocessor::new().segment("Some opening words here.\nIntroduction\nBody text.");
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].heading, "");
        assert_eq!(doc.sections[0].content, "Some opening words here.");
        assert_eq!(doc.sections[1].heading, "Introduction");
    }

    #[test]
    fn sentences_are_not_headings() {
        assert!(heading_text("The system works well.").is_none());
        assert!(heading_text("Results Were Good.").is_none());
        assert!(heading_text("Alpha, Beta").is_none());
        assert!(heading_text("the lower case start").is_none());
        assert!(heading_text(
            "One Two Three Four Five Six Seven Eight Nine Ten Eleven Twelve Thirteen"
        )
        .is_none());
        assert_eq!(heading_text("3. Methods").as_deref(), Some("3. Methods"));
    }

    #[test]
    fn single_paragraph_without_headings_is_one_section() {
        let text = "this report describes how the pipeline condenses long documents into short \
                    summaries while keeping technical vocabulary intact and checking that every \
                    generated sentence remains anchored to the original source text so that \
                    readers can trust the condensed version they receive";
        assert_eq!(crate::text::word_count(text), 40);
        let doc = Preprocessor::new().segment(text);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].heading, "");
        assert_eq!(doc.sections[0].content, text);
    }

    #[test]
    fn empty_input_yields_one_empty_section() {
        let doc = Preprocessor::new().segment("");
        assert_eq!(doc.sections, vec![Section::new("", "")]);
        assert!(doc.is_empty());
    }

    #[test]
    fn segmentation_is_idempotent() {
        let text = "Overview\nFirst part.\n\n--- Page 2 ---\nDetails\nSecond part.";
        let pre = Preprocessor::new();
        let first = pre.segment(text);
        assert_eq!(first, pre.segment(text));
        assert!(first.sections.iter().all(|s| !s.content.contains("Page 2")));
    }

    #[test]
    fn paragraph_terms_only_for_long_documents() {
        let short = "Alpha beta.\n\nGamma delta.";
        assert!(Preprocessor::new().segment(short).salient_terms.is_empty());
        let long = (0..6)
            .map(|i| format!("Paragraph {i} discusses compilers and tokenizers."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let doc = Preprocessor::new().segment(&long);
        assert_eq!(doc.paragraph_count, 6);
        assert!(!doc.salient_terms.is_empty());
    }
}
