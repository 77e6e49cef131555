use once_cell::sync::Lazy;
use regex::Regex;

static WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['’\-][\p{L}\p{N}]+|\.\p{N}+)*").expect("word pattern")
});
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static PARAGRAPH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t\r]*\n").expect("paragraph pattern"));

/// Tokens that end with a period without ending the sentence.
const ABBREVIATIONS: &[&str] = &[
    "e.g", "i.e", "mr", "mrs", "ms", "dr", "prof", "vs", "fig", "st", "jr", "sr", "approx",
    "dept", "al", "cf", "eq",
];

/// Collapses every whitespace run to a single space and trims the ends.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Word tokens (letters/digits, keeping inner apostrophes, hyphens and decimals).
#[must_use]
pub fn word_tokens(text: &str) -> Vec<&str> {
    WORD_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Byte spans of the word tokens in `text`.
#[must_use]
pub fn word_spans(text: &str) -> Vec<(usize, usize)> {
    WORD_RE.find_iter(text).map(|m| (m.start(), m.end())).collect()
}

/// Number of word tokens; punctuation is not counted.
#[must_use]
pub fn word_count(text: &str) -> usize {
    WORD_RE.find_iter(text).count()
}

/// Splits on blank lines, dropping empty paragraphs.
#[must_use]
pub fn split_paragraphs(text: &str) -> Vec<String> {
    PARAGRAPH_RE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Splits text into whitespace-normalized sentences.
///
/// A sentence ends at `.`, `!` or `?` (plus trailing quotes/brackets) followed by
/// whitespace or the end of text, and always at a blank line. Periods after common
/// abbreviations and single-letter initials do not end a sentence.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for block in PARAGRAPH_RE.split(text) {
        let chars: Vec<(usize, char)> = block.char_indices().collect();
        let mut start = 0;
        let mut i = 0;
        while i < chars.len() {
            let (pos, ch) = chars[i];
            if !matches!(ch, '.' | '!' | '?') {
                i += 1;
                continue;
            }
            let mut j = i + 1;
            while j < chars.len()
                && matches!(chars[j].1, '.' | '!' | '?' | '"' | '\'' | ')' | ']' | '”' | '’')
            {
                j += 1;
            }
            let at_end = j >= chars.len();
            let boundary = at_end || chars[j].1.is_whitespace();
            if boundary && !(ch == '.' && j == i + 1 && ends_with_abbreviation(&block[start..pos])) {
                let end = if at_end { block.len() } else { chars[j].0 };
                push_sentence(&mut sentences, &block[start..end]);
                start = end;
            }
            i = j;
        }
        push_sentence(&mut sentences, &block[start..]);
    }
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let sentence = normalize_whitespace(raw);
    if sentence.chars().any(char::is_alphanumeric) {
        sentences.push(sentence);
    }
}

fn ends_with_abbreviation(fragment: &str) -> bool {
    let Some(last) = fragment.split_whitespace().last() else {
        return false;
    };
    let last = last.trim_start_matches(|c: char| !c.is_alphanumeric());
    let mut chars = last.chars();
    if let (Some(first), None) = (chars.next(), chars.next()) {
        return first.is_uppercase();
    }
    let lower = last.to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
}

/// Case-insensitive substring test.
#[must_use]
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Upper-cases the first character and lower-cases the rest.
#[must_use]
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sentences_detects_boundaries() {
        let sentences = split_sentences("One. Two! Three?");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?"]);
    }

    #[test]
    fn split_sentences_keeps_decimals_abbreviations_and_initials() {
        let sentences =
            split_sentences("Version 3.5 shipped, e.g. for Dr. Smith. J. Doe agreed.\nDone");
        assert_eq!(
            sentences,
            vec!["Version 3.5 shipped, e.g. for Dr. Smith.", "J. Doe agreed.", "Done"]
        );
    }

    #[test]
    fn blank_lines_end_sentences_and_whitespace_is_collapsed() {
        let sentences = split_sentences("First part\nwraps here\n\nSecond block.");
        assert_eq!(sentences, vec!["First part wraps here", "Second block."]);
    }

    #[test]
    fn punctuation_only_fragments_are_dropped() {
        assert!(split_sentences("...  !!").is_empty());
        assert!(split_sentences("").is_empty());
    }

    #[test]
    fn word_count_ignores_punctuation() {
        assert_eq!(word_count("Rust's borrow-checker, v1.2 works!"), 4);
        assert_eq!(
            word_tokens("state-of-the-art NLP."),
            vec!["state-of-the-art", "NLP"]
        );
    }

    #[test]
    fn capitalize_matches_heading_style() {
        assert_eq!(capitalize("EXECUTIVE SUMMARY"), "Executive summary");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        assert_eq!(split_paragraphs("a\n\n  \n\nb\n \nc").len(), 3);
    }
}
