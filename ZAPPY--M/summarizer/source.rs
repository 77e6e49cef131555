use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::text::{stop_word_ratio, word_count, word_tokens};

const WORDS_PER_PAGE: usize = 500;
const MIN_STOP_WORD_RATIO: f32 = 0.05;

/// Text produced by an extraction collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Whether the text may be summarized.
    pub is_valid: bool,
    /// Extracted text with page markers.
    pub text: String,
    /// Pages seen in the source.
    pub page_count: usize,
    /// Reason for rejection, if any.
    pub message: Option<String>,
}

impl ExtractedDocument {
    fn rejected(page_count: usize, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            text: String::new(),
            page_count,
            message: Some(message.into()),
        }
    }
}

/// Loads documents for summarization.
pub trait DocumentSource {
    /// Extracts and validates the document at `path`.
    fn extract(&self, path: &Path) -> Result<ExtractedDocument>;
}

/// UTF-8 text files. Pages split on form feeds, otherwise every 500 words.
#[derive(Debug, Clone, Copy)]
pub struct PlainTextSource {
    max_pages: usize,
}

impl Default for PlainTextSource {
    fn default() -> Self {
        Self { max_pages: 50 }
    }
}

impl PlainTextSource {
    /// Source accepting at most `max_pages` pages.
    #[must_use]
    pub const fn new(max_pages: usize) -> Self {
        Self { max_pages }
    }

    /// Validates in-memory text the same way as a file.
    #[must_use]
    pub fn from_text(&self, raw: &str) -> ExtractedDocument {
        let pages = paginate(raw);
        let page_count = pages.len();
        if page_count == 0 {
            return ExtractedDocument::rejected(0, "document contains no text");
        }
        if page_count > self.max_pages {
            return ExtractedDocument::rejected(
                page_count,
                format!("document has {page_count} pages; the limit is {}", self.max_pages),
            );
        }
        let tokens = word_tokens(raw);
        if stop_word_ratio(&tokens) < MIN_STOP_WORD_RATIO {
            return ExtractedDocument::rejected(page_count, "document does not look like English text");
        }
        let text = pages
            .iter()
            .enumerate()
            .map(|(idx, page)| format!("--- Page {} ---\n{page}", idx + 1))
            .collect::<Vec<_>>()
            .join("\n\n");
        ExtractedDocument {
            is_valid: true,
            text,
            page_count,
            message: None,
        }
    }
}

impl DocumentSource for PlainTextSource {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading document {}", path.display()))?;
        Ok(self.from_text(&raw))
    }
}

fn paginate(raw: &str) -> Vec<String> {
    let normalized = raw.replace("\r\n", "\n");
    let pages: Vec<String> = if normalized.contains('\u{c}') {
        normalized.split('\u{c}').map(|p| p.trim().to_string()).collect()
    } else {
        let mut pages = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut words = 0;
        for line in normalized.lines() {
            current.push(line.trim_end());
            words += word_count(line);
            if words >= WORDS_PER_PAGE {
                pages.push(current.join("\n").trim().to_string());
                current.clear();
                words = 0;
            }
        }
        pages.push(current.join("\n").trim().to_string());
        pages
    };
    pages.into_iter().filter(|p| !p.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn form_feeds_delimit_pages() {
        let doc = PlainTextSource::default()
            .from_text("The first page is here.\u{c}The second page is here.");
        assert!(doc.is_valid);
        assert_eq!(doc.page_count, 2);
        assert!(doc.text.starts_with("--- Page 1 ---\nThe first page"));
        assert!(doc.text.contains("--- Page 2 ---\nThe second page"));
    }

    #[test]
    fn long_text_is_paged_by_word_count() {
        let line = "the system is fast and it is safe ".repeat(10);
        let raw = vec![line; 20].join("\n");
        let doc = PlainTextSource::new(1).from_text(&raw);
        assert!(!doc.is_valid);
        assert_eq!(doc.page_count, 3);
    }

    #[test]
    fn non_english_and_empty_text_are_rejected() {
        let source = PlainTextSource::default();
        assert!(!source.from_text("   ").is_valid);
        let doc = source.from_text("Lorem ipsum dolor sit amet consectetur adipiscing elit");
        assert!(!doc.is_valid);
        assert!(doc.message.unwrap().contains("English"));
    }

    #[test]
    fn extracts_from_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(&path, "Overview\nThe pipeline is described in this report.").unwrap();
        let doc = PlainTextSource::default().extract(&path).unwrap();
        assert!(doc.is_valid);
        assert_eq!(doc.page_count, 1);
        assert!(PlainTextSource::default().extract(&dir.path().join("missing.txt")).is_err());
    }
}
