use std::{fmt, sync::Arc};

use crate::{
    abstractive::{LexicalCopyModel, Seq2SeqModel},
    extractive::{LeadRanker, SentenceRanker, TextRankRanker},
    terms::{HeuristicTagger, PosTagger},
    verify::{RandomIndexingEmbedder, SentenceEmbedder},
};

/// Model collaborators injected into the pipeline. Only the generator is required.
#[derive(Clone)]
pub struct ModelSuite {
    /// Sequence-to-sequence generator.
    pub generator: Arc<dyn Seq2SeqModel>,
    /// Sentence ranker; the lead ranker is used when absent.
    pub ranker: Option<Arc<dyn SentenceRanker>>,
    /// Sentence embedder; TF-IDF is used when absent.
    pub embedder: Option<Arc<dyn SentenceEmbedder>>,
    /// Part-of-speech tagger; single tokens count as nouns when absent.
    pub tagger: Option<Arc<dyn PosTagger>>,
}

impl fmt::Debug for ModelSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSuite")
            .field("generator", &self.generator.name())
            .field("ranker", &self.ranker.as_ref().map(|r| r.name().to_string()))
            .field("embedder", &self.embedder.as_ref().map(|e| e.name().to_string()))
            .field("tagger", &self.tagger.is_some())
            .finish()
    }
}

impl ModelSuite {
    /// Suite with only a generator.
    #[must_use]
    pub fn new(generator: Arc<dyn Seq2SeqModel>) -> Self {
        Self {
            generator,
            ranker: None,
            embedder: None,
            tagger: None,
        }
    }

    /// Built-in models: copy generator, TextRank, random-indexing embeddings, heuristic tagger.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(Arc::new(LexicalCopyModel::new()))
            .with_ranker(Arc::new(TextRankRanker::new()))
            .with_embedder(Arc::new(RandomIndexingEmbedder::default()))
            .with_tagger(Arc::new(HeuristicTagger))
    }

    /// Built-in models without an embedder, so verification is lexical.
    #[must_use]
    pub fn lexical_only() -> Self {
        Self {
            embedder: None,
            ..Self::builtin()
        }
    }

    /// Sets the ranker.
    #[must_use]
    pub fn with_ranker(mut self, ranker: Arc<dyn SentenceRanker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    /// Sets the embedder.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn SentenceEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Sets the tagger.
    #[must_use]
    pub fn with_tagger(mut self, tagger: Arc<dyn PosTagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    /// Configured ranker or the lead fallback.
    #[must_use]
    pub fn ranker_or_lead(&self) -> Arc<dyn SentenceRanker> {
        self.ranker
            .clone()
            .unwrap_or_else(|| Arc::new(LeadRanker) as Arc<dyn SentenceRanker>)
    }
}
