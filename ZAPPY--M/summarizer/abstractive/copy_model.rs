use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;

use crate::abstractive::model::{Encoding, GenerationError, ModelInput, Seq2SeqModel, TokenId};

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['’\-][\p{L}\p{N}]+|\.\p{N}+)*|[^\s\p{L}\p{N}]")
        .expect("copy model token pattern")
});

const EOS: TokenId = 0;
/// EOS followed by the terminals, at fixed ids.
const RESERVED: [&str; 4] = ["</s>", ".", "!", "?"];
/// Extra weight for a continuation whose left context matches the prefix.
const CONTEXT_BONUS: f32 = 1.0;
const NO_SPACE_BEFORE: &[&str] = &[".", ",", ";", ":", "!", "?", ")", "]", "}", "%", "’", "'", "”"];
const NO_SPACE_AFTER: &[&str] = &["(", "[", "{", "“"];

/// Tokens interned per vocabulary generation by default.
const DEFAULT_VOCABULARY_LIMIT: usize = 65_536;

#[derive(Debug, Default)]
struct Generation {
    ids: HashMap<String, TokenId>,
    texts: HashMap<TokenId, String>,
}

impl Generation {
    fn insert(&mut self, text: &str, id: TokenId) {
        self.ids.insert(text.to_string(), id);
        self.texts.insert(id, text.to_string());
    }

    fn remove(&mut self, text: &str) -> Option<TokenId> {
        let id = self.ids.remove(text)?;
        self.texts.remove(&id);
        Some(id)
    }
}

/// Two-generation vocabulary. When the current generation fills up it
/// replaces the previous one, so memory stays bounded while ids seen by
/// in-flight calls remain decodable. Ids are never reused.
#[derive(Debug)]
struct Interner {
    limit: usize,
    next_id: TokenId,
    current: Generation,
    previous: Generation,
}

impl Interner {
    fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            next_id: RESERVED.len() as TokenId,
            current: Generation::default(),
            previous: Generation::default(),
        }
    }

    fn intern(&mut self, text: &str) -> TokenId {
        if let Some(id) = RESERVED.iter().position(|reserved| *reserved == text) {
            return id as TokenId;
        }
        if let Some(id) = self.current.ids.get(text) {
            return *id;
        }
        let id = self.previous.remove(text).unwrap_or_else(|| {
            let id = self.next_id;
            self.next_id += 1;
            id
        });
        if self.current.ids.len() >= self.limit {
            self.previous = std::mem::take(&mut self.current);
        }
        self.current.insert(text, id);
        id
    }

    fn text(&self, id: TokenId) -> Option<&str> {
        RESERVED
            .get(id as usize)
            .copied()
            .or_else(|| self.current.texts.get(&id).map(String::as_str))
            .or_else(|| self.previous.texts.get(&id).map(String::as_str))
    }

    fn len(&self) -> usize {
        RESERVED.len() + self.current.ids.len() + self.previous.ids.len()
    }
}

/// Deterministic copy generator over the encoder input.
///
/// Next-token candidates are the successors of the last generated token in the
/// input, weighted by the successor's attention, plus sentence starts after a
/// terminal punctuation mark. Sentences carrying boosted tokens are therefore
/// preferred when a new sentence begins.
#[derive(Debug)]
pub struct LexicalCopyModel {
    vocab: RwLock<Interner>,
}

impl Default for LexicalCopyModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalCopyModel {
    /// Creates a model with an empty vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self::with_vocabulary_limit(DEFAULT_VOCABULARY_LIMIT)
    }

    /// Caps each vocabulary generation at `limit` tokens; at most two are kept.
    #[must_use]
    pub fn with_vocabulary_limit(limit: usize) -> Self {
        Self {
            vocab: RwLock::new(Interner::new(limit)),
        }
    }

    /// Tokens currently held in the vocabulary.
    #[must_use]
    pub fn vocabulary_len(&self) -> usize {
        self.vocab.read().len()
    }

    const fn is_terminal(id: TokenId) -> bool {
        // terminals are interned right after EOS
        matches!(id, 1..=3)
    }

    fn sentence_starts(input: &ModelInput, prefix: &[TokenId], scores: &mut IndexMap<TokenId, f32>) {
        let ids = &input.ids;
        let used: HashSet<(TokenId, TokenId)> =
            prefix.windows(2).map(|pair| (pair[0], pair[1])).collect();
        let mut start = 0;
        while start < ids.len() {
            let end = (start..ids.len())
                .find(|&i| Self::is_terminal(ids[i]))
                .map_or(ids.len(), |i| i + 1);
            let repeated = ids
                .get(start + 1)
                .is_some_and(|&second| used.contains(&(ids[start], second)));
            if !Self::is_terminal(ids[start]) && !repeated {
                let span = input.attention.get(start..end).unwrap_or(&[]);
                let weight = if span.is_empty() {
                    1.0
                } else {
                    span.iter().sum::<f32>() / span.len() as f32
                };
                *scores.entry(ids[start]).or_insert(0.0) += weight;
            }
            start = end;
        }
    }
}

impl Seq2SeqModel for LexicalCopyModel {
    fn name(&self) -> &str {
        "lexical-copy"
    }

    fn encode(&self, text: &str) -> Result<Encoding, GenerationError> {
        let mut vocab = self.vocab.write();
        let mut encoding = Encoding::default();
        for m in TOKEN_RE.find_iter(text) {
            encoding.ids.push(vocab.intern(m.as_str()));
            encoding.offsets.push((m.start(), m.end()));
        }
        Ok(encoding)
    }

    fn eos_token(&self) -> TokenId {
        EOS
    }

    fn next_token_logprobs(
        &self,
        input: &ModelInput,
        prefix: &[TokenId],
    ) -> Result<Vec<(TokenId, f32)>, GenerationError> {
        let ids = &input.ids;
        let weight = |i: usize| input.attention.get(i).copied().unwrap_or(1.0).max(0.0);
        let mut scores: IndexMap<TokenId, f32> = IndexMap::new();
        match prefix.last() {
            None => Self::sentence_starts(input, prefix, &mut scores),
            Some(&last) if Self::is_terminal(last) => {
                Self::sentence_starts(input, prefix, &mut scores);
                *scores.entry(EOS).or_insert(0.0) += 1.0;
            }
            Some(&last) => {
                let before = prefix.len().checked_sub(2).map(|i| prefix[i]);
                for p in (0..ids.len()).filter(|&p| ids[p] == last) {
                    let bonus = if p > 0 && Some(ids[p - 1]) == before {
                        CONTEXT_BONUS
                    } else {
                        0.0
                    };
                    match ids.get(p + 1) {
                        Some(&next) => *scores.entry(next).or_insert(0.0) += weight(p + 1) + bonus,
                        None => *scores.entry(EOS).or_insert(0.0) += 1.0 + bonus,
                    }
                }
            }
        }
        scores.retain(|_, w| *w > 0.0);
        if scores.is_empty() {
            scores.insert(EOS, 1.0);
        }
        let total: f32 = scores.values().sum();
        Ok(scores
            .into_iter()
            .map(|(id, w)| (id, (w / total).ln()))
            .collect())
    }

    fn decode(&self, ids: &[TokenId]) -> Result<String, GenerationError> {
        let vocab = self.vocab.read();
        let mut out = String::new();
        let mut glue_next = true;
        for &id in ids.iter().filter(|&&id| id != EOS) {
            let token = vocab.text(id).ok_or(GenerationError::UnknownToken(id))?;
            if !glue_next && !NO_SPACE_BEFORE.contains(&token) {
                out.push(' ');
            }
            out.push_str(token);
            glue_next = NO_SPACE_AFTER.contains(&token);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(model: &LexicalCopyModel, text: &str) -> ModelInput {
        let encoding = model.encode(text).unwrap();
        ModelInput {
            attention: vec![1.0; encoding.len()],
            ids: encoding.ids,
        }
    }

    #[test]
    fn decode_restores_spacing() {
        let model = LexicalCopyModel::new();
        let text = "Latency fell (sharply), by 40%. Done!";
        let encoding = model.encode(text).unwrap();
        assert_eq!(model.decode(&encoding.ids).unwrap(), text);
        assert_eq!(encoding.offsets[0], (0, 7));
    }

    #[test]
    fn continuation_follows_the_input() {
        let model = LexicalCopyModel::new();
        let input = input(&model, "Alpha beta gamma.");
        let alpha = input.ids[0];
        let next = model.next_token_logprobs(&input, &[alpha]).unwrap();
        assert_eq!(next, vec![(input.ids[1], 0.0)]);
    }

    #[test]
    fn boosted_sentences_are_preferred_as_starts() {
        let model = LexicalCopyModel::new();
        let mut input = input(&model, "Plain words here. Special term here.");
        let special = input.ids[4];
        input.attention[5] = 2.0;
        let starts = model.next_token_logprobs(&input, &[]).unwrap();
        let plain = starts.iter().find(|(id, _)| *id == input.ids[0]).unwrap().1;
        let boosted = starts.iter().find(|(id, _)| *id == special).unwrap().1;
        assert!(boosted > plain);
    }

    #[test]
    fn unknown_ids_fail_to_decode() {
        let model = LexicalCopyModel::new();
        assert_eq!(
            model.decode(&[9_999]).unwrap_err(),
            GenerationError::UnknownToken(9_999)
        );
    }

    #[test]
    fn vocabulary_stays_bounded_across_documents() {
        let model = LexicalCopyModel::with_vocabulary_limit(4);
        let first = model.encode("alpha beta gamma delta.").unwrap();
        for round in 0..10 {
            model.encode(&format!("word{round} other{round} more{round}.")).unwrap();
        }
        assert!(model.vocabulary_len() <= 4 + 2 * 4, "{}", model.vocabulary_len());
        assert_eq!(
            model.decode(&first.ids[..1]).unwrap_err(),
            GenerationError::UnknownToken(first.ids[0])
        );

        let recent = model.encode("fresh tokens stay readable.").unwrap();
        assert_eq!(model.decode(&recent.ids).unwrap(), "fresh tokens stay readable.");
        let again = model.encode("fresh tokens").unwrap();
        assert_eq!(again.ids, recent.ids[..2]);
    }
}
