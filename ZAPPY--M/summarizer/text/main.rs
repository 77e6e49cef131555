//! Text primitives shared by every pipeline stage.

/// Sentence and word segmentation.
pub mod segment;
/// English stop-word list.
pub mod stopwords;
/// TF-IDF vectorization over word n-grams.
pub mod tfidf;
/// Dense and sparse vector math.
pub mod vector;

pub use segment::{
    capitalize, contains_ignore_case, normalize_whitespace, split_paragraphs, split_sentences,
    word_count, word_spans, word_tokens,
};
pub use stopwords::{is_stop_word, stop_word_ratio};
pub use tfidf::{ExtractionError, SparseVector, TfidfMatrix, TfidfVectorizer};
pub use vector::{centroid, cosine, l2_normalize};
