use thiserror::Error;

/// Vocabulary index.
pub type TokenId = u32;

/// Tokenized text with byte offsets into the source string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    /// Token ids.
    pub ids: Vec<TokenId>,
    /// `(start, end)` byte span of each token.
    pub offsets: Vec<(usize, usize)>,
}

impl Encoding {
    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True without tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Keeps the first `max_tokens` tokens.
    pub fn truncate(&mut self, max_tokens: usize) {
        self.ids.truncate(max_tokens);
        self.offsets.truncate(max_tokens);
    }
}

/// Encoder input: token ids with a per-token attention weight.
///
/// A weight of 1.0 is the ordinary mask; values above 1.0 bias generation
/// toward the token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelInput {
    /// Token ids.
    pub ids: Vec<TokenId>,
    /// Attention weight per token.
    pub attention: Vec<f32>,
}

/// Failure inside the generation model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The model backend reported an error.
    #[error("model `{model}` failed: {message}")]
    Model {
        /// Model name.
        model: String,
        /// Backend message.
        message: String,
    },
    /// Input could not be tokenized.
    #[error("tokenization failed: {0}")]
    Tokenization(String),
    /// Decoding met an id outside the vocabulary.
    #[error("unknown token id {0}")]
    UnknownToken(TokenId),
    /// Beam search ended without any hypothesis.
    #[error("beam search produced no hypothesis")]
    NoCandidates,
}

/// Sequence-to-sequence generation capability.
///
/// Implementations must be safe to call from several threads; runtimes that
/// cannot run concurrent forward passes are serialized by the compressor.
pub trait Seq2SeqModel: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Tokenizes `text`, returning byte offsets for every token.
    fn encode(&self, text: &str) -> Result<Encoding, GenerationError>;

    /// End-of-sequence id.
    fn eos_token(&self) -> TokenId;

    /// Log-probabilities of the next token given the encoder input and the
    /// tokens generated so far. Tokens absent from the result have probability zero.
    fn next_token_logprobs(
        &self,
        input: &ModelInput,
        prefix: &[TokenId],
    ) -> Result<Vec<(TokenId, f32)>, GenerationError>;

    /// Turns ids back into text, skipping the end-of-sequence id.
    fn decode(&self, ids: &[TokenId]) -> Result<String, GenerationError>;
}
