#![deny(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![warn(missing_docs)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::module_name_repetitions
)]

//! Zappy structured document summarizer: segmentation, term-aware extractive
//! ranking, abstractive compression, fact verification and length reconciliation.

/// Tokenization, stop words, TF-IDF and vector helpers.
#[path = "../text/main.rs"]
pub mod text;

/// Document, section and summary data model.
#[path = "../document.rs"]
pub mod document;

/// Explicit pipeline configuration.
#[path = "../config.rs"]
pub mod config;

/// Telemetry builder/hook for pipeline stages.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Heading-based segmentation.
#[path = "../preprocess.rs"]
pub mod preprocess;

/// Section importance multiplier.
#[path = "../importance.rs"]
pub mod importance;

/// Technical term extraction and part-of-speech tagging.
#[path = "../terms.rs"]
pub mod terms;

/// Sentence ranking and term coverage.
#[path = "../extractive/main.rs"]
pub mod extractive;

/// Seq2seq compression with beam search.
#[path = "../abstractive/main.rs"]
pub mod abstractive;

/// Embedding and lexical fact verification.
#[path = "../verify/main.rs"]
pub mod verify;

/// Global length-budget reconciliation.
#[path = "../reconcile.rs"]
pub mod reconcile;

/// Final document assembly and key takeaways.
#[path = "../formatter.rs"]
pub mod formatter;

/// Injectable model capabilities.
#[path = "../models.rs"]
pub mod models;

/// Extraction collaborator for plain-text inputs.
#[path = "../source.rs"]
pub mod source;

/// Orchestrator, state machine and parallel section workers.
#[path = "../pipeline/main.rs"]
pub mod pipeline;

pub use abstractive::{AbstractiveCompressor, GenerationError, LexicalCopyModel, Seq2SeqModel};
pub use config::{GenerationFailurePolicy, LengthProfile, SizeClass, SizeClassTable, SummarizerConfig};
pub use document::{Section, SectionSummary, SegmentedDocument, SummaryDocument};
pub use extractive::{LeadRanker, SentenceRanker, TextRankRanker};
pub use models::ModelSuite;
pub use pipeline::{
    ParallelSummarizer, PipelineError, PipelineState, SectionReport, SummarizationPipeline,
    SummaryReport, EMPTY_DOCUMENT_MESSAGE,
};
pub use source::{DocumentSource, ExtractedDocument, PlainTextSource};
pub use telemetry::{SummarizerTelemetry, SummarizerTelemetryBuilder};
pub use terms::{HeuristicTagger, PosTag, PosTagger, TermExtractor, TermSet};
pub use verify::{
    EmbeddingVerifier, FactVerifier, LexicalVerifier, RandomIndexingEmbedder, SentenceEmbedder,
};
