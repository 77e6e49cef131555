//! Pipeline orchestration: segmentation, per-section processing, length
//! reconciliation and formatting, driven through a validated state machine.

/// Pipeline error type.
pub mod error;
/// Async section workers.
pub mod parallel;
/// Serializable run diagnostics.
pub mod report;
/// Orchestrator states and transition checks.
pub mod state;

use std::{fmt, sync::Arc};

use chrono::Utc;
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

pub use error::PipelineError;
pub use parallel::ParallelSummarizer;
pub use report::{SectionInsight, SectionReport, SectionStatus, SummaryReport};
pub use state::{PipelineState, StateTracker};

use crate::{
    abstractive::AbstractiveCompressor,
    config::{GenerationFailurePolicy, SizeClass, SummarizerConfig},
    document::{Section, SectionSummary, SegmentedDocument, SummaryDocument},
    extractive::{ensure_term_coverage, SentenceRanker},
    formatter::Formatter,
    importance::ImportanceScorer,
    models::ModelSuite,
    preprocess::Preprocessor,
    reconcile::{LengthReconciler, ReconcileEntry},
    telemetry::SummarizerTelemetry,
    terms::TermExtractor,
    text::{split_sentences, word_count},
    verify::{build_verifier, FactVerifier},
};

/// Returned in place of a summary when the input has no words.
pub const EMPTY_DOCUMENT_MESSAGE: &str =
    "The input text does not contain any content to summarize.";

/// Segmented input plus the budget derived from it.
pub(crate) struct RunPlan {
    pub(crate) run_id: Uuid,
    pub(crate) size_class: SizeClass,
    pub(crate) segmented: SegmentedDocument,
    pub(crate) total_words: usize,
    pub(crate) target_words: usize,
    pub(crate) words_per_section: usize,
    pub(crate) tracker: StateTracker,
}

impl RunPlan {
    /// Non-blank sections with their document index.
    pub(crate) fn work_items(&self) -> Vec<(usize, Section)> {
        self.segmented
            .non_blank()
            .map(|(index, section)| (index, section.clone()))
            .collect()
    }
}

/// Output of one section worker.
pub(crate) struct SectionResult {
    pub(crate) report: SectionReport,
    pub(crate) summary: String,
    pub(crate) original: String,
}

/// Sequential orchestrator. Cheap to share behind an `Arc`.
pub struct SummarizationPipeline {
    config: SummarizerConfig,
    preprocessor: Preprocessor,
    scorer: ImportanceScorer,
    terms: TermExtractor,
    ranker: Arc<dyn SentenceRanker>,
    compressor: AbstractiveCompressor,
    verifier: Arc<dyn FactVerifier>,
    reconciler: LengthReconciler,
    formatter: Formatter,
    telemetry: Option<SummarizerTelemetry>,
}

impl fmt::Debug for SummarizationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummarizationPipeline")
            .field("ranker", &self.ranker.name())
            .field("generator", &self.compressor.model_name())
            .field("verifier", &self.verifier.name())
            .field("failure_policy", &self.config.failure_policy)
            .finish_non_exhaustive()
    }
}

impl SummarizationPipeline {
    /// Validates `config` and wires every stage to `models`.
    pub fn new(
        config: SummarizerConfig,
        models: ModelSuite,
        telemetry: Option<SummarizerTelemetry>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let compressor =
            AbstractiveCompressor::new(Arc::clone(&models.generator), config.generation.clone())
                .with_telemetry(telemetry.clone());
        let verifier =
            build_verifier(models.embedder.clone(), &config.verification, telemetry.clone());
        let reconciler = LengthReconciler::new(
            compressor.clone(),
            config.generation.reconcile_min_length,
            config.failure_policy,
        )
        .with_verifier(config.verify_after_reconcile.then(|| Arc::clone(&verifier)))
        .with_telemetry(telemetry.clone());

        Ok(Self {
            preprocessor: Preprocessor::new().with_telemetry(telemetry.clone()),
            scorer: ImportanceScorer,
            terms: TermExtractor::new(config.terms, models.tagger.clone())
                .with_telemetry(telemetry.clone()),
            ranker: models.ranker_or_lead(),
            formatter: Formatter::new(config.formatter, models.embedder)
                .with_telemetry(telemetry.clone()),
            compressor,
            verifier,
            reconciler,
            config,
            telemetry,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    /// Summarizes `text` and returns the rendered document.
    pub fn summarize(&self, text: &str, size_class: SizeClass) -> Result<String, PipelineError> {
        self.run(text, size_class).map(|report| report.output)
    }

    /// Summarizes `text`, returning the full diagnostics.
    pub fn run(&self, text: &str, size_class: SizeClass) -> Result<SummaryReport, PipelineError> {
        let mut plan = self.prepare(text, size_class);
        if plan.segmented.is_empty() {
            return self.finish_empty(plan);
        }
        let mut results = Vec::new();
        for (index, section) in plan.work_items() {
            match self.process_section(
                plan.run_id,
                index,
                &section,
                plan.words_per_section,
                size_class,
            ) {
                Ok(result) => results.push(result),
                Err(err) => return Err(self.abort(&mut plan, err)),
            }
        }
        self.finish(plan, results)
    }

    /// Sections with importance and terms, without generating anything.
    #[must_use]
    pub fn inspect(&self, text: &str) -> Vec<SectionInsight> {
        self.preprocessor
            .segment(text)
            .non_blank()
            .map(|(index, section)| SectionInsight {
                index,
                heading: section.heading.clone(),
                words: section.word_count(),
                importance: self.scorer.breakdown(&section.content),
                terms: self.terms.extract(&section.content),
            })
            .collect()
    }

    pub(crate) fn prepare(&self, text: &str, size_class: SizeClass) -> RunPlan {
        let run_id = Uuid::new_v4();
        let segmented = self.preprocessor.segment(text);
        let total_words: usize = segmented.sections.iter().map(Section::word_count).sum();
        let target_words = self.config.size_classes.target_words(size_class, total_words);
        let non_blank = segmented.non_blank().count().max(1);
        let words_per_section = self.config.min_words_per_section.max(target_words / non_blank);

        self.log(
            LogLevel::Info,
            "summarizer.run.started",
            json!({
                "run_id": run_id.to_string(),
                "size_class": size_class.label(),
                "total_words": total_words,
                "target_words": target_words,
                "sections": segmented.sections.len(),
                "words_per_section": words_per_section,
            }),
        );
        self.emit(
            "summarizer.run.started",
            run_id,
            json!({ "sections": non_blank, "target_words": target_words }),
        );
        RunPlan {
            run_id,
            size_class,
            segmented,
            total_words,
            target_words,
            words_per_section,
            tracker: StateTracker::new(),
        }
    }

    /// Scores, extracts, generates and verifies one section.
    pub(crate) fn process_section(
        &self,
        run_id: Uuid,
        index: usize,
        section: &Section,
        words_per_section: usize,
        size_class: SizeClass,
    ) -> Result<SectionResult, PipelineError> {
        let content = section.content.as_str();
        let mut stages = vec![PipelineState::ScoringSection(index)];
        let importance = self.scorer.breakdown(content);
        let budget = ((words_per_section as f32 * importance.importance) as usize).max(1);
        let min_length = budget / 2;

        stages.push(PipelineState::Extracting(index));
        let terms = self.terms.extract(content);
        let k = self
            .config
            .size_classes
            .profile(size_class)
            .extractive_sentences
            .min(split_sentences(content).len());
        let ranked = self.ranker.rank(content, k);
        let extractive_sentences = ranked.len();
        let covered = ensure_term_coverage(ranked, terms.as_slice(), content);
        let extractive = covered.text();

        stages.push(PipelineState::Abstracting(index));
        let generated =
            match self
                .compressor
                .compress(&extractive, budget, min_length, terms.as_slice())
            {
                Ok(text) => Ok(text),
                Err(source) => match self.config.failure_policy {
                    GenerationFailurePolicy::FailDocument => {
                        return Err(PipelineError::SectionFailed { index, source })
                    }
                    GenerationFailurePolicy::Degrade => Err(source.to_string()),
                },
            };

        let (summary, generated_words, reinserted, verification, status) = match generated {
            Ok(text) => {
                stages.push(PipelineState::Verifying(index));
                let generated_words = word_count(&text);
                let verified = self.verifier.verify(&text, content);
                (
                    verified.text,
                    generated_words,
                    verified.reinserted.len(),
                    Some(verified.method),
                    SectionStatus::Summarized,
                )
            }
            Err(reason) => {
                self.log(
                    LogLevel::Warn,
                    "summarizer.section.degraded",
                    json!({ "run_id": run_id.to_string(), "index": index, "error": reason }),
                );
                (
                    extractive.clone(),
                    word_count(&extractive),
                    0,
                    None,
                    SectionStatus::Degraded { reason },
                )
            }
        };

        let verified_words = word_count(&summary);
        self.emit(
            "summarizer.section.completed",
            run_id,
            json!({
                "index": index,
                "heading": section.heading,
                "degraded": matches!(status, SectionStatus::Degraded { .. }),
                "words": verified_words,
            }),
        );
        Ok(SectionResult {
            report: SectionReport {
                index,
                heading: section.heading.clone(),
                importance,
                budget,
                min_length,
                coverage_sentences: covered.sentences.len() - extractive_sentences,
                extractive_sentences,
                terms,
                generated_words,
                verified_words,
                reinserted,
                verification,
                final_words: verified_words,
                status,
                stages,
            },
            summary,
            original: section.content.clone(),
        })
    }

    /// Replays section states, reconciles lengths and renders the document.
    pub(crate) fn finish(
        &self,
        mut plan: RunPlan,
        mut results: Vec<SectionResult>,
    ) -> Result<SummaryReport, PipelineError> {
        results.sort_by_key(|result| result.report.index);
        for stage in results.iter().flat_map(|r| r.report.stages.iter()) {
            self.step(&mut plan, stage.clone())?;
        }

        self.step(&mut plan, PipelineState::Reconciling)?;
        let mut entries: Vec<ReconcileEntry> = results
            .iter()
            .map(|result| ReconcileEntry {
                index: result.report.index,
                original: result.original.clone(),
                terms: result.report.terms.terms.clone(),
                summary: result.summary.clone(),
            })
            .collect();
        let reconciliation = match self.reconciler.reconcile(&mut entries, plan.target_words) {
            Ok(report) => report,
            Err(err) => return Err(self.abort(&mut plan, err.into())),
        };

        self.step(&mut plan, PipelineState::Formatting)?;
        let mut summaries = Vec::with_capacity(entries.len());
        for (result, entry) in results.iter_mut().zip(entries) {
            result.report.final_words = word_count(&entry.summary);
            summaries.push(SectionSummary::new(result.report.heading.clone(), entry.summary));
        }
        let document = self.formatter.build_document(summaries);
        let output = self.formatter.format(&document);
        self.step(&mut plan, PipelineState::Done)?;

        let sections: Vec<SectionReport> = results.into_iter().map(|r| r.report).collect();
        let degraded = sections.iter().filter(|s| s.is_degraded()).count();
        self.log(
            LogLevel::Info,
            "summarizer.run.completed",
            json!({
                "run_id": plan.run_id.to_string(),
                "sections": sections.len(),
                "degraded": degraded,
                "summary_words": document.word_count(),
                "target_words": plan.target_words,
                "scale": reconciliation.scale,
            }),
        );
        self.emit(
            "summarizer.run.completed",
            plan.run_id,
            json!({ "words": document.word_count(), "degraded": degraded }),
        );
        Ok(SummaryReport {
            run_id: plan.run_id,
            size_class: plan.size_class,
            total_words: plan.total_words,
            target_words: plan.target_words,
            words_per_section: plan.words_per_section,
            sections,
            states: plan.tracker.into_history(),
            reconciliation: Some(reconciliation),
            document,
            output,
            generated_at: Utc::now(),
        })
    }

    pub(crate) fn finish_empty(&self, mut plan: RunPlan) -> Result<SummaryReport, PipelineError> {
        self.step(&mut plan, PipelineState::Done)?;
        self.log(
            LogLevel::Info,
            "summarizer.run.empty",
            json!({ "run_id": plan.run_id.to_string() }),
        );
        self.emit("summarizer.run.completed", plan.run_id, json!({ "words": 0 }));
        Ok(SummaryReport {
            run_id: plan.run_id,
            size_class: plan.size_class,
            total_words: plan.total_words,
            target_words: plan.target_words,
            words_per_section: plan.words_per_section,
            sections: Vec::new(),
            states: plan.tracker.into_history(),
            reconciliation: None,
            document: SummaryDocument::default(),
            output: EMPTY_DOCUMENT_MESSAGE.to_string(),
            generated_at: Utc::now(),
        })
    }

    /// Moves the plan to `Failed` and reports `err`.
    pub(crate) fn abort(&self, plan: &mut RunPlan, err: PipelineError) -> PipelineError {
        plan.tracker.fail(err.to_string());
        let states: Vec<String> = plan.tracker.history().iter().map(ToString::to_string).collect();
        self.log(
            LogLevel::Error,
            "summarizer.run.failed",
            json!({ "run_id": plan.run_id.to_string(), "error": err.to_string(), "states": states }),
        );
        self.emit("summarizer.run.failed", plan.run_id, json!({ "error": err.to_string() }));
        err
    }

    fn step(&self, plan: &mut RunPlan, next: PipelineState) -> Result<(), PipelineError> {
        match plan.tracker.advance(next) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.abort(plan, err)),
        }
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }

    fn emit(&self, event_type: &str, run_id: Uuid, payload: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.event(event_type, &run_id.to_string(), payload);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        abstractive::{
            Encoding, GenerationError, LexicalCopyModel, ModelInput, Seq2SeqModel, TokenId,
        },
        text::word_count,
        verify::VerificationMethod,
    };
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;

    /// Copy model that fails on any input mentioning `trigger`.
    pub(crate) struct FlakyModel {
        inner: LexicalCopyModel,
        trigger: &'static str,
    }

    impl FlakyModel {
        pub(crate) fn new(trigger: &'static str) -> Self {
            Self {
                inner: LexicalCopyModel::new(),
                trigger,
            }
        }
    }

    impl Seq2SeqModel for FlakyModel {
        fn name(&self) -> &str {
            "flaky"
        }

        fn encode(&self, text: &str) -> Result<Encoding, GenerationError> {
            if text.contains(self.trigger) {
                return Err(GenerationError::Model {
                    model: "flaky".into(),
                    message: "out of memory".into(),
                });
            }
            self.inner.encode(text)
        }

        fn eos_token(&self) -> TokenId {
            self.inner.eos_token()
        }

        fn next_token_logprobs(
            &self,
            input: &ModelInput,
            prefix: &[TokenId],
        ) -> Result<Vec<(TokenId, f32)>, GenerationError> {
            self.inner.next_token_logprobs(input, prefix)
        }

        fn decode(&self, ids: &[TokenId]) -> Result<String, GenerationError> {
            self.inner.decode(ids)
        }
    }

    pub(crate) fn sample_document() -> String {
        let storage = "The storage engine writes every record to an append-only journal. \
            Compaction merges journal segments into sorted tables. \
            Each sorted table carries a bloom filter for fast negative lookups. \
            Readers consult the memtable before touching any table on disk. \
            Checksums protect every block against silent corruption. \
            A background thread schedules compaction when segments pile up. \
            Table files are immutable once written. \
            Snapshots pin a consistent view of the tables for long scans. \
            The journal is truncated after a successful flush. \
            Recovery replays the journal from the last checkpoint.";
        let network = "The network layer accepts client connections over TLS. \
            Each connection gets a dedicated reader task. \
            Requests are framed with a length prefix and a type byte. \
            Backpressure is applied when the write queue grows too large. \
            Idle connections are closed after a configurable timeout. \
            Handshake failures are logged with the remote address. \
            Clients may pipeline several requests on one connection. \
            Responses always arrive in request order. \
            Keepalive messages detect dead peers. \
            A shutdown signal drains in-flight requests before exit.";
        let operations = "Operators deploy the service with a single static binary. \
            Configuration lives in one TOML file per node. \
            Metrics are exported for the monitoring stack. \
            Rolling upgrades replace one node at a time. \
            Backups copy sorted tables to object storage every night. \
            Restores verify checksums before the node rejoins the cluster. \
            Alerts fire when replication lag exceeds the threshold. \
            Capacity planning uses the weekly growth report. \
            Runbooks describe every alert and its remedy. \
            On-call engineers rotate weekly.";
        format!("Storage Engine\n{storage}\n\nNetwork Layer\n{network}\n\nOperations Guide\n{operations}\n")
    }

    fn pipeline(models: ModelSuite, config: SummarizerConfig) -> SummarizationPipeline {
        SummarizationPipeline::new(config, models, None).unwrap()
    }

    #[test]
    fn output_carries_the_document_header() {
        let p = pipeline(ModelSuite::builtin(), SummarizerConfig::default());
        let output = p.summarize(&sample_document(), SizeClass::Medium).unwrap();
        assert!(output.starts_with("Document Summary"));
        assert!(output.contains("### Storage engine"));
        assert!(output.contains("### Operations guide"));
    }

    #[test]
    fn short_summaries_stay_within_target_before_verification() {
        let p = pipeline(ModelSuite::lexical_only(), SummarizerConfig::default());
        let report = p.run(&sample_document(), SizeClass::Short).unwrap();
        assert_eq!(report.target_words, 250);
        let generated: usize = report.sections.iter().map(|s| s.generated_words).sum();
        assert!(generated <= report.target_words, "{generated}");
        for section in &report.sections {
            assert!(section.verified_words >= section.generated_words);
            assert!(section.budget <= report.words_per_section);
        }
    }

    #[test]
    fn state_trace_covers_every_section() {
        let p = pipeline(ModelSuite::builtin(), SummarizerConfig::default());
        let report = p.run(&sample_document(), SizeClass::Medium).unwrap();
        assert_eq!(report.states.first(), Some(&PipelineState::Segmenting));
        assert_eq!(report.states.last(), Some(&PipelineState::Done));
        for index in 0..3 {
            assert!(report.states.contains(&PipelineState::Verifying(index)));
        }
        let reconciling = report
            .states
            .iter()
            .position(|s| *s == PipelineState::Reconciling)
            .unwrap();
        assert_eq!(report.states[reconciling + 1], PipelineState::Formatting);
        assert!(report.reconciliation.is_some());
        assert!(report
            .sections
            .iter()
            .all(|s| s.verification == Some(VerificationMethod::Embedding)));
    }

    #[test]
    fn empty_documents_return_the_fixed_message() {
        let p = pipeline(ModelSuite::builtin(), SummarizerConfig::default());
        let report = p.run("   \n\n ", SizeClass::Short).unwrap();
        assert_eq!(report.output, EMPTY_DOCUMENT_MESSAGE);
        assert_eq!(report.states, vec![PipelineState::Segmenting, PipelineState::Done]);
        assert_eq!(p.summarize("", SizeClass::Long).unwrap(), EMPTY_DOCUMENT_MESSAGE);
    }

    #[test]
    fn generation_failure_degrades_to_extraction() {
        let models = ModelSuite::new(Arc::new(FlakyModel::new("TLS")));
        let p = pipeline(models, SummarizerConfig::default());
        let report = p.run(&sample_document(), SizeClass::Medium).unwrap();
        assert_eq!(report.degraded_sections(), 1);
        let network = &report.sections[1];
        assert!(network.is_degraded());
        assert!(network.verification.is_none());
        assert_eq!(network.stages.last(), Some(&PipelineState::Abstracting(1)));
        assert!(report.document.sections[1].content.contains("TLS"));
        assert!(report.states.contains(&PipelineState::ScoringSection(2)));
    }

    #[test]
    fn fail_document_policy_surfaces_the_section() {
        let models = ModelSuite::new(Arc::new(FlakyModel::new("TLS")));
        let config = SummarizerConfig {
            failure_policy: GenerationFailurePolicy::FailDocument,
            ..SummarizerConfig::default()
        };
        let err = pipeline(models, config)
            .run(&sample_document(), SizeClass::Medium)
            .unwrap_err();
        assert!(matches!(err, PipelineError::SectionFailed { index: 1, .. }));
    }

    const SHORT_DOCUMENT: &str = "Introduction\nThis paper studies adaptive caching for web servers.\n\n\
        Results\nLatency dropped by half under heavy load.\n";

    #[test]
    fn sections_shorter_than_min_length_are_summarized() {
        let p = pipeline(ModelSuite::builtin(), SummarizerConfig::default());
        let report = p.run(SHORT_DOCUMENT, SizeClass::Short).unwrap();
        assert_eq!(report.sections.len(), 2);
        for section in &report.sections {
            assert_eq!(section.status, SectionStatus::Summarized, "{section:?}");
            assert!(section.min_length > 9);
            assert!(section.generated_words > 0);
        }
        assert!(report.output.contains("adaptive caching"));
        // headings are not part of the document length
        assert_eq!(report.total_words, 15);

        let strict = SummarizerConfig {
            failure_policy: GenerationFailurePolicy::FailDocument,
            ..SummarizerConfig::default()
        };
        let report = pipeline(ModelSuite::builtin(), strict)
            .run(SHORT_DOCUMENT, SizeClass::Short)
            .unwrap();
        assert_eq!(report.degraded_sections(), 0);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut config = SummarizerConfig::default();
        config.generation.num_beams = 0;
        let err = SummarizationPipeline::new(config, ModelSuite::builtin(), None).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn sections_keep_document_order_and_terms_are_covered() {
        let p = pipeline(ModelSuite::builtin(), SummarizerConfig::default());
        let report = p.run(&sample_document(), SizeClass::Long).unwrap();
        let headings: Vec<&str> = report.sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["Storage Engine", "Network Layer", "Operations Guide"]);
        for section in &report.sections {
            assert!(!section.terms.is_empty());
            assert_eq!(section.final_words, word_count(&report.document.sections[section.index].content));
        }
    }

    #[test]
    fn inspect_reports_terms_without_generating() {
        let p = pipeline(ModelSuite::new(Arc::new(FlakyModel::new("The"))), SummarizerConfig::default());
        let insights = p.inspect(&sample_document());
        assert_eq!(insights.len(), 3);
        assert_eq!(insights[0].heading, "Storage Engine");
        assert!(insights[0].terms.terms.iter().any(|t| t.contains("journal")));
    }

    #[test]
    fn telemetry_records_run_events() {
        let tmp = tempdir().unwrap();
        let bus = Arc::new(MemoryEventBus::new(64));
        let telemetry = SummarizerTelemetry::builder("summarizer")
            .log_path(tmp.path().join("run.log"))
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let p = SummarizationPipeline::new(
            SummarizerConfig::default(),
            ModelSuite::builtin(),
            Some(telemetry),
        )
        .unwrap();
        let report = p.run(&sample_document(), SizeClass::Short).unwrap();
        let events = bus.correlated(&report.run_id.to_string());
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].event_type, "summarizer.run.started");
        assert_eq!(events[4].event_type, "summarizer.run.completed");
        let records = shared_logging::read_records(tmp.path().join("run.log")).unwrap();
        assert!(records.iter().any(|r| r.message == "summarizer.run.completed"));
    }
}
