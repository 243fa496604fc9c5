//! Tokenization for the lexical embedder.
//!
//! A token is a maximal run of alphanumeric code points; a single apostrophe
//! survives inside a run when flanked by letters. Runs are split at
//! camelCase boundaries (so identifiers contribute their parts), lowercased,
//! filtered against a fixed English stop-word list, and stemmed by one
//! greedy suffix strip. Bigrams (`bg:`) and optionally trigrams (`tg:`) over
//! the resulting sequence are appended last.

use std::collections::HashSet;
use std::sync::LazyLock;

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
        "it", "its", "of", "on", "that", "the", "to", "was", "will", "with", "this", "but",
        "they", "have", "had", "what", "when", "where", "who", "which", "why", "how", "all",
        "each", "every", "both", "few", "more", "most", "other", "some", "such", "no", "nor",
        "not", "only", "own", "same", "so", "than", "too", "very", "can", "just", "should", "now",
    ]
    .into_iter()
    .collect()
});

/// Suffixes stripped by the stemmer, longest-priority order.
const SUFFIXES: [&str; 16] = [
    "ing", "ed", "ly", "ness", "ment", "tion", "sion", "ity", "ous", "ive", "able", "ible", "ful",
    "less", "er", "est",
];

/// Knobs for [`tokenize`]; defaults match the embedder defaults.
#[derive(Debug, Clone, Copy)]
pub struct TokenizeOptions {
    /// Split camelCase / snake_case / kebab-case identifiers into parts.
    pub code_tokens: bool,
    /// Emit `bg:` bigrams (and `tg:` trigrams when `ngram_range >= 3`).
    pub ngrams: bool,
    pub ngram_range: usize,
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        Self {
            code_tokens: true,
            ngrams: true,
            ngram_range: 3,
        }
    }
}

/// Turn text into the embedder's term sequence.
pub fn tokenize(text: &str, opts: TokenizeOptions) -> Vec<String> {
    let mut tokens = Vec::new();

    for run in alphanumeric_runs(text) {
        let pieces = if opts.code_tokens {
            split_identifier(&run)
        } else {
            vec![run]
        };

        for piece in pieces {
            let lower = piece.to_lowercase();
            if lower.len() < 2 || STOPWORDS.contains(lower.as_str()) {
                continue;
            }
            let stemmed = stem(&lower);
            if stemmed.len() >= 2 {
                tokens.push(stemmed);
            }
        }
    }

    if opts.ngrams {
        let ngrams = generate_ngrams(&tokens, opts.ngram_range);
        tokens.extend(ngrams);
    }

    tokens
}

/// Maximal alphanumeric runs, keeping interior apostrophes between letters.
fn alphanumeric_runs(text: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();

    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_alphanumeric() {
            current.push(c);
        } else if c == '\''
            && !current.is_empty()
            && chars.get(i + 1).is_some_and(|n| n.is_alphabetic())
        {
            current.push(c);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }

    runs
}

/// Split an identifier at lowercase→uppercase boundaries, then on `_`/`-`.
/// Pieces shorter than two characters are dropped when the identifier had
/// multiple parts.
fn split_identifier(run: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in run.chars() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase();
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    if parts.len() <= 1 {
        return parts;
    }
    parts.into_iter().filter(|p| p.len() >= 2).collect()
}

/// One greedy suffix strip. The stem must keep at least three characters,
/// otherwise the original word is returned unchanged.
fn stem(word: &str) -> String {
    for suffix in SUFFIXES {
        if word.len() > suffix.len() + 2 && word.ends_with(suffix) {
            let stemmed = &word[..word.len() - suffix.len()];
            if stemmed.len() >= 3 {
                return stemmed.to_string();
            }
            break;
        }
    }
    word.to_string()
}

fn generate_ngrams(tokens: &[String], range: usize) -> Vec<String> {
    let mut ngrams = Vec::new();

    for pair in tokens.windows(2) {
        ngrams.push(format!("bg:{}_{}", pair[0], pair[1]));
    }
    if range >= 3 {
        for triple in tokens.windows(3) {
            ngrams.push(format!("tg:{}_{}_{}", triple[0], triple[1], triple[2]));
        }
    }

    ngrams
}
