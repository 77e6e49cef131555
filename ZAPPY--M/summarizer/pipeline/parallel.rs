use std::sync::Arc;

use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    config::SizeClass,
    pipeline::{PipelineError, SectionResult, SummarizationPipeline, SummaryReport},
};

/// Runs sections on blocking workers, bounded by a semaphore.
///
/// Sections are independent until reconciliation, which starts only after
/// every worker has returned.
#[derive(Debug, Clone)]
pub struct ParallelSummarizer {
    pipeline: Arc<SummarizationPipeline>,
    semaphore: Arc<Semaphore>,
    workers: usize,
}

impl ParallelSummarizer {
    /// Uses the pipeline's configured worker count.
    #[must_use]
    pub fn new(pipeline: Arc<SummarizationPipeline>) -> Self {
        let workers = pipeline.config().effective_workers();
        Self::with_workers(pipeline, workers)
    }

    /// Overrides the worker count; zero is treated as one.
    #[must_use]
    pub fn with_workers(pipeline: Arc<SummarizationPipeline>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            pipeline,
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Permits available to section workers.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Summarizes `text` and returns the rendered document.
    pub async fn summarize(
        &self,
        text: &str,
        size_class: SizeClass,
    ) -> Result<String, PipelineError> {
        self.run(text, size_class).await.map(|report| report.output)
    }

    /// Summarizes `text`, returning the full diagnostics.
    pub async fn run(
        &self,
        text: &str,
        size_class: SizeClass,
    ) -> Result<SummaryReport, PipelineError> {
        let mut plan = self.pipeline.prepare(text, size_class);
        if plan.segmented.is_empty() {
            return self.pipeline.finish_empty(plan);
        }

        let mut set = JoinSet::new();
        for (index, section) in plan.work_items() {
            let semaphore = Arc::clone(&self.semaphore);
            let pipeline = Arc::clone(&self.pipeline);
            let run_id = plan.run_id;
            let words_per_section = plan.words_per_section;
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|err| PipelineError::Worker(err.to_string()))?;
                tokio::task::spawn_blocking(move || {
                    pipeline.process_section(
                        run_id,
                        index,
                        &section,
                        words_per_section,
                        size_class,
                    )
                })
                .await
                .map_err(|err| PipelineError::Worker(err.to_string()))?
            });
        }

        let mut results: Vec<SectionResult> = Vec::new();
        let mut failures: Vec<(usize, PipelineError)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(err)) => failures.push((failure_index(&err), err)),
                Err(err) => failures.push((usize::MAX, PipelineError::Worker(err.to_string()))),
            }
        }
        // report the earliest failing section so runs are reproducible
        if let Some((_, err)) = failures.into_iter().min_by_key(|(index, _)| *index) {
            return Err(self.pipeline.abort(&mut plan, err));
        }
        self.pipeline.finish(plan, results)
    }
}

const fn failure_index(err: &PipelineError) -> usize {
    match err {
        PipelineError::SectionFailed { index, .. } => *index,
        _ => usize::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GenerationFailurePolicy, SummarizerConfig},
        models::ModelSuite,
        pipeline::{
            tests::{sample_document, FlakyModel},
            PipelineState, EMPTY_DOCUMENT_MESSAGE,
        },
    };

    fn summarizer(models: ModelSuite, config: SummarizerConfig) -> ParallelSummarizer {
        let pipeline = SummarizationPipeline::new(config, models, None).unwrap();
        ParallelSummarizer::new(Arc::new(pipeline))
    }

    #[tokio::test]
    async fn parallel_run_matches_sequential_output() {
        let config = SummarizerConfig {
            workers: 2,
            ..SummarizerConfig::default()
        };
        let pipeline =
            Arc::new(SummarizationPipeline::new(config, ModelSuite::lexical_only(), None).unwrap());
        let parallel = ParallelSummarizer::new(Arc::clone(&pipeline));
        assert_eq!(parallel.workers(), 2);

        let report = parallel.run(&sample_document(), SizeClass::Medium).await.unwrap();
        let sequential = pipeline.run(&sample_document(), SizeClass::Medium).unwrap();
        assert_eq!(report.output, sequential.output);
        assert_eq!(report.states, sequential.states);
        let indices: Vec<usize> = report.sections.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn reconciliation_waits_for_every_section() {
        let parallel = summarizer(ModelSuite::builtin(), SummarizerConfig::default());
        let report = parallel.run(&sample_document(), SizeClass::Short).await.unwrap();
        let reconciling = report
            .states
            .iter()
            .position(|s| *s == PipelineState::Reconciling)
            .unwrap();
        assert!(report.states[..reconciling].contains(&PipelineState::Verifying(2)));
        assert!(report.output.starts_with("Document Summary"));
    }

    #[tokio::test]
    async fn empty_input_short_circuits() {
        let parallel = summarizer(ModelSuite::builtin(), SummarizerConfig::default());
        let output = parallel.summarize("", SizeClass::Medium).await.unwrap();
        assert_eq!(output, EMPTY_DOCUMENT_MESSAGE);
    }

    #[tokio::test]
    async fn section_failure_fails_the_document() {
        let config = SummarizerConfig {
            failure_policy: GenerationFailurePolicy::FailDocument,
            ..SummarizerConfig::default()
        };
        let parallel = ParallelSummarizer::with_workers(
            Arc::new(
                SummarizationPipeline::new(
                    config,
                    ModelSuite::new(Arc::new(FlakyModel::new("e"))),
                    None,
                )
                .unwrap(),
            ),
            0,
        );
        assert_eq!(parallel.workers(), 1);
        let err = parallel.run(&sample_document(), SizeClass::Medium).await.unwrap_err();
        assert!(matches!(err, PipelineError::SectionFailed { index: 0, .. }));
    }
}
