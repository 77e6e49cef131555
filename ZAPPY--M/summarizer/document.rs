use serde::{Deserialize, Serialize};

use crate::text::word_count;

/// Heading plus body produced by segmentation. The heading may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading line without a trailing colon.
    pub heading: String,
    /// Body text up to the next heading.
    pub content: String,
}

impl Section {
    /// Creates a section.
    #[must_use]
    pub fn new(heading: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            content: content.into(),
        }
    }

    /// True when the content has no word tokens.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        word_count(&self.content) == 0
    }

    /// Word count of the content.
    #[must_use]
    pub fn word_count(&self) -> usize {
        word_count(&self.content)
    }
}

/// Segmentation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedDocument {
    /// Sections in document order.
    pub sections: Vec<Section>,
    /// Blank-line separated paragraphs seen in the input.
    pub paragraph_count: usize,
    /// Paragraph TF-IDF terms, only computed for documents with more than five paragraphs.
    pub salient_terms: Vec<String>,
}

impl SegmentedDocument {
    /// Sections carrying at least one word.
    pub fn non_blank(&self) -> impl Iterator<Item = (usize, &Section)> {
        self.sections.iter().enumerate().filter(|(_, s)| !s.is_blank())
    }

    /// True when no section carries a word.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.non_blank().next().is_none()
    }
}

/// Summary of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSummary {
    /// Heading copied from the source section.
    pub heading: String,
    /// Summarized body.
    pub content: String,
}

impl SectionSummary {
    /// Creates a section summary.
    #[must_use]
    pub fn new(heading: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            content: content.into(),
        }
    }

    /// Word count of the summarized body.
    #[must_use]
    pub fn word_count(&self) -> usize {
        word_count(&self.content)
    }
}

/// Final artifact handed to the caller before rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDocument {
    /// One summary per summarized section, in document order.
    pub sections: Vec<SectionSummary>,
    /// Most central sentences across all sections.
    pub key_takeaways: Vec<String>,
}

impl SummaryDocument {
    /// Total words across section bodies.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.sections.iter().map(SectionSummary::word_count).sum()
    }
}
