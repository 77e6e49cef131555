use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::SizeClass, document::SummaryDocument, importance::ImportanceBreakdown,
    pipeline::state::PipelineState, reconcile::ReconcileReport, terms::TermSet,
    verify::VerificationMethod,
};

/// Section result status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionStatus {
    /// Generated and verified.
    Summarized,
    /// Generation failed; the extractive selection stands in.
    Degraded {
        /// Generator error text.
        reason: String,
    },
}

/// Diagnostics for one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionReport {
    /// Index in the segmented document.
    pub index: usize,
    /// Section heading, possibly empty.
    pub heading: String,
    /// Importance score components.
    pub importance: ImportanceBreakdown,
    /// Generation budget in tokens.
    pub budget: usize,
    /// Minimum generation length.
    pub min_length: usize,
    /// Extracted terms.
    pub terms: TermSet,
    /// Sentences chosen by the ranker.
    pub extractive_sentences: usize,
    /// Sentences appended by the coverage guard.
    pub coverage_sentences: usize,
    /// Words produced before verification.
    pub generated_words: usize,
    /// Words after verification.
    pub verified_words: usize,
    /// Original sentences reinserted by the verifier.
    pub reinserted: usize,
    /// Verification measurement, absent for degraded sections.
    pub verification: Option<VerificationMethod>,
    /// Final word count after reconciliation.
    pub final_words: usize,
    /// Outcome.
    pub status: SectionStatus,
    /// States this section passed through.
    pub stages: Vec<PipelineState>,
}

impl SectionReport {
    /// True when the extractive fallback was used.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self.status, SectionStatus::Degraded { .. })
    }
}

/// Diagnostics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Correlation id for logs and events.
    pub run_id: Uuid,
    /// Requested size class.
    pub size_class: SizeClass,
    /// Section content words in the input, headings excluded.
    pub total_words: usize,
    /// Requested summary length.
    pub target_words: usize,
    /// Per-section share before importance weighting.
    pub words_per_section: usize,
    /// Section diagnostics in document order.
    pub sections: Vec<SectionReport>,
    /// Document-level state history.
    pub states: Vec<PipelineState>,
    /// Reconciliation details; absent for empty documents.
    pub reconciliation: Option<ReconcileReport>,
    /// Structured summary.
    pub document: SummaryDocument,
    /// Rendered text.
    pub output: String,
    /// Completion time.
    pub generated_at: DateTime<Utc>,
}

impl SummaryReport {
    /// Number of sections that fell back to extraction.
    #[must_use]
    pub fn degraded_sections(&self) -> usize {
        self.sections.iter().filter(|s| s.is_degraded()).count()
    }
}

/// Per-section view for `inspect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionInsight {
    /// Index in the segmented document.
    pub index: usize,
    /// Heading, possibly empty.
    pub heading: String,
    /// Section words.
    pub words: usize,
    /// Importance score components.
    pub importance: ImportanceBreakdown,
    /// Extracted terms.
    pub terms: TermSet,
}
