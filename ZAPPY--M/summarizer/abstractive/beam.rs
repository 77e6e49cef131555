use std::collections::HashSet;

use crate::abstractive::model::{GenerationError, ModelInput, Seq2SeqModel, TokenId};

/// Beam search parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamSearch {
    /// Beam width.
    pub num_beams: usize,
    /// Hypothesis score is `sum_logprob / len^length_penalty`.
    pub length_penalty: f32,
    /// Stop as soon as `num_beams` hypotheses are finished.
    pub early_stopping: bool,
    /// Size of n-grams that may not repeat; 0 disables.
    pub no_repeat_ngram_size: usize,
    /// End-of-sequence is masked before this many tokens.
    pub min_length: usize,
    /// Hard cap on generated tokens.
    pub max_length: usize,
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<TokenId>,
    score: f32,
}

impl BeamSearch {
    fn normalized(&self, sum_logprob: f32, len: usize) -> f32 {
        sum_logprob / (len.max(1) as f32).powf(self.length_penalty)
    }

    /// Runs beam search and returns the best hypothesis without the EOS id.
    pub fn generate(
        &self,
        model: &dyn Seq2SeqModel,
        input: &ModelInput,
    ) -> Result<Vec<TokenId>, GenerationError> {
        let num_beams = self.num_beams.max(1);
        let max_length = self.max_length.max(1);
        let min_length = self.min_length.min(max_length);
        let eos = model.eos_token();

        let mut beams = vec![Hypothesis {
            tokens: Vec::new(),
            score: 0.0,
        }];
        let mut finished: Vec<Hypothesis> = Vec::new();

        for step in 0..max_length {
            let mut candidates: Vec<(usize, TokenId, f32)> = Vec::new();
            for (beam_idx, beam) in beams.iter().enumerate() {
                let banned = self.banned_tokens(&beam.tokens);
                let mut masked_eos = None;
                let mut extended = false;
                for (token, logprob) in model.next_token_logprobs(input, &beam.tokens)? {
                    if !logprob.is_finite() || banned.contains(&token) {
                        continue;
                    }
                    if token == eos {
                        if step < min_length {
                            masked_eos = Some(logprob);
                            continue;
                        }
                    } else {
                        extended = true;
                    }
                    candidates.push((beam_idx, token, beam.score + logprob));
                }
                // an exhausted input may end before min_length
                if let (false, Some(logprob)) = (extended, masked_eos) {
                    candidates.push((beam_idx, eos, beam.score + logprob));
                }
            }
            // stable: earlier beams and candidates win ties
            candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
            candidates.truncate(2 * num_beams);

            let mut next_beams = Vec::with_capacity(num_beams);
            for (rank, (beam_idx, token, score)) in candidates.into_iter().enumerate() {
                if token == eos {
                    if rank < num_beams {
                        let tokens = beams[beam_idx].tokens.clone();
                        let normalized = self.normalized(score, tokens.len());
                        push_finished(&mut finished, num_beams, tokens, normalized);
                    }
                    continue;
                }
                let mut tokens = beams[beam_idx].tokens.clone();
                tokens.push(token);
                next_beams.push(Hypothesis { tokens, score });
                if next_beams.len() == num_beams {
                    break;
                }
            }

            if next_beams.is_empty() {
                // nothing extends the live hypotheses; keep them unless some finished
                if !finished.is_empty() {
                    beams.clear();
                }
                break;
            }
            if self.is_done(&finished, &next_beams, num_beams, step + 1) {
                beams = next_beams;
                break;
            }
            beams = next_beams;
        }

        for beam in beams {
            let normalized = self.normalized(beam.score, beam.tokens.len());
            push_finished(&mut finished, num_beams, beam.tokens, normalized);
        }
        finished
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|best| best.tokens)
            .ok_or(GenerationError::NoCandidates)
    }

    fn is_done(
        &self,
        finished: &[Hypothesis],
        active: &[Hypothesis],
        num_beams: usize,
        cur_len: usize,
    ) -> bool {
        if finished.len() < num_beams {
            return false;
        }
        if self.early_stopping {
            return true;
        }
        let worst = finished
            .iter()
            .map(|h| h.score)
            .fold(f32::INFINITY, f32::min);
        let best_active = active
            .iter()
            .map(|h| self.normalized(h.score, cur_len))
            .fold(f32::NEG_INFINITY, f32::max);
        best_active <= worst
    }

    /// Tokens that would complete an n-gram already present in `tokens`.
    fn banned_tokens(&self, tokens: &[TokenId]) -> HashSet<TokenId> {
        let n = self.no_repeat_ngram_size;
        if n == 0 || tokens.len() + 1 < n {
            return HashSet::new();
        }
        let context = &tokens[tokens.len() + 1 - n..];
        tokens
            .windows(n)
            .filter(|window| &window[..n - 1] == context)
            .map(|window| window[n - 1])
            .collect()
    }
}

fn push_finished(finished: &mut Vec<Hypothesis>, capacity: usize, tokens: Vec<TokenId>, score: f32) {
    finished.push(Hypothesis { tokens, score });
    if finished.len() > capacity {
        if let Some((worst, _)) = finished
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.score.total_cmp(&b.1.score))
        {
            finished.remove(worst);
        }
    }
}
