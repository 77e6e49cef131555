use std::{fmt::Write as _, sync::Arc};

use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    config::FormatterSettings,
    document::{SectionSummary, SummaryDocument},
    telemetry::SummarizerTelemetry,
    text::{capitalize, centroid, cosine, split_sentences, TfidfVectorizer},
    verify::SentenceEmbedder,
};

const TITLE: &str = "Document Summary";
const GROUP: &str = "Overview";
const TAKEAWAYS: &str = "Key Takeaways";

/// Renders section summaries into the final document.
#[derive(Clone)]
pub struct Formatter {
    settings: FormatterSettings,
    embedder: Option<Arc<dyn SentenceEmbedder>>,
    telemetry: Option<SummarizerTelemetry>,
}

impl std::fmt::Debug for Formatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formatter")
            .field("settings", &self.settings)
            .field("embedder", &self.embedder.as_ref().map(|e| e.name().to_string()))
            .finish_non_exhaustive()
    }
}

impl Formatter {
    /// Creates a formatter; takeaways use TF-IDF vectors without an embedder.
    #[must_use]
    pub fn new(settings: FormatterSettings, embedder: Option<Arc<dyn SentenceEmbedder>>) -> Self {
        Self {
            settings,
            embedder,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Option<SummarizerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Bundles summaries with their key takeaways.
    #[must_use]
    pub fn build_document(&self, sections: Vec<SectionSummary>) -> SummaryDocument {
        let key_takeaways = self.key_takeaways(&sections);
        SummaryDocument {
            sections,
            key_takeaways,
        }
    }

    /// Plain-text rendering with `##`/`###` headings and `-` bullets.
    #[must_use]
    pub fn format(&self, document: &SummaryDocument) -> String {
        let mut out = String::new();
        let _ = write!(out, "{TITLE}\n\n## {GROUP}\n");
        for (position, section) in document.sections.iter().enumerate() {
            let heading = if section.heading.trim().is_empty() {
                format!("Section {}", position + 1)
            } else {
                capitalize(section.heading.trim())
            };
            let _ = write!(out, "\n### {heading}\n");
            for paragraph in self.paragraphs(&section.content) {
                let _ = write!(out, "\n{paragraph}\n");
            }
        }
        if !document.key_takeaways.is_empty() {
            let _ = write!(out, "\n{TAKEAWAYS}\n");
            for takeaway in &document.key_takeaways {
                let _ = writeln!(out, "- {takeaway}");
            }
        }
        out.trim_end().to_string()
    }

    fn paragraphs(&self, content: &str) -> Vec<String> {
        split_sentences(content)
            .chunks(self.settings.sentences_per_paragraph.max(1))
            .map(|chunk| chunk.join(" "))
            .collect()
    }

    /// Summary sentences closest to the centroid of all summary sentences.
    #[must_use]
    pub fn key_takeaways(&self, sections: &[SectionSummary]) -> Vec<String> {
        let mut sentences: Vec<String> = Vec::new();
        for sentence in sections.iter().flat_map(|s| split_sentences(&s.content)) {
            if !sentences.iter().any(|seen| seen.eq_ignore_ascii_case(&sentence)) {
                sentences.push(sentence);
            }
        }
        let limit = self.settings.key_takeaways;
        if sentences.len() <= 1 || limit == 0 {
            return sentences.into_iter().take(limit).collect();
        }

        let Some(vectors) = self.sentence_vectors(&sentences) else {
            return sentences.into_iter().take(limit).collect();
        };
        let center = centroid(&vectors);
        let scores: Vec<f32> = vectors.iter().map(|v| cosine(v, &center)).collect();
        let mut order: Vec<usize> = (0..sentences.len()).collect();
        order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
        order
            .into_iter()
            .take(limit)
            .map(|idx| sentences[idx].clone())
            .collect()
    }

    fn sentence_vectors(&self, sentences: &[String]) -> Option<Vec<Vec<f32>>> {
        if let Some(embedder) = &self.embedder {
            match embedder.embed(sentences) {
                Ok(vectors) if vectors.len() == sentences.len() => return Some(vectors),
                Ok(_) => {}
                Err(err) => {
                    if let Some(tel) = &self.telemetry {
                        let _ = tel.log(
                            LogLevel::Warn,
                            "summarizer.formatter.embedding_failed",
                            json!({ "error": err.to_string() }),
                        );
                    }
                }
            }
        }
        TfidfVectorizer::unigrams()
            .fit_transform(sentences)
            .ok()
            .map(|matrix| matrix.dense_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::RandomIndexingEmbedder;

    fn formatter() -> Formatter {
        Formatter::new(FormatterSettings::default(), None)
    }

    #[test]
    fn renders_headings_paragraphs_and_takeaways() {
        let doc = formatter().build_document(vec![
            SectionSummary::new("EXECUTIVE SUMMARY", "One a. Two b. Three c. Four d."),
            SectionSummary::new("", "Loose text."),
        ]);
        let text = formatter().format(&doc);
        assert!(text.starts_with("Document Summary\n\n## Overview\n\n### Executive summary\n"));
        assert!(text.contains("\nOne a. Two b. Three c.\n\nFour d.\n"));
        assert!(text.contains("### Section 2"));
        assert!(text.contains("\nKey Takeaways\n- "));
        assert_eq!(text.lines().filter(|l| l.starts_with("- ")).count(), 5);
    }

    #[test]
    fn takeaways_prefer_central_sentences() {
        let embedder: Arc<dyn SentenceEmbedder> = Arc::new(RandomIndexingEmbedder::default());
        let f = Formatter::new(
            FormatterSettings {
                key_takeaways: 1,
                ..FormatterSettings::default()
            },
            Some(embedder),
        );
        let takeaways = f.key_takeaways(&[SectionSummary::new(
            "",
            "Rust compilers check memory safety. Rust compilers check types. \
             Memory safety matters. Bananas are yellow.",
        )]);
        assert_eq!(takeaways.len(), 1);
        assert!(takeaways[0].starts_with("Rust compilers check"));
    }

    #[test]
    fn duplicate_sentences_yield_one_takeaway() {
        let takeaways = formatter().key_takeaways(&[
            SectionSummary::new("A", "Same claim here."),
            SectionSummary::new("B", "Same claim here."),
        ]);
        assert_eq!(takeaways, vec!["Same claim here."]);
    }
}
