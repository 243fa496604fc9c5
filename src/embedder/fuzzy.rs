//! Fuzzy vocabulary recall for query expansion.

use std::collections::HashMap;

/// Vocabulary terms within `threshold` edits of any query term.
///
/// Only terms of length 3–12 on both sides are compared, and exact matches
/// are excluded. The returned weight is `1 / (distance + 1)`; the embedder
/// scales it further before depositing.
pub fn find_fuzzy_matches<'a, I>(
    terms: &[String],
    vocab: I,
    threshold: usize,
) -> HashMap<String, f32>
where
    I: IntoIterator<Item = &'a String>,
{
    let candidates: Vec<&String> = vocab
        .into_iter()
        .filter(|t| (3..=12).contains(&t.len()))
        .collect();

    let mut matches = HashMap::new();
    for term in terms {
        if !(3..=12).contains(&term.len()) {
            continue;
        }
        for candidate in &candidates {
            let dist = levenshtein(term, candidate);
            if dist > 0 && dist <= threshold {
                matches.insert((*candidate).clone(), 1.0 / (dist as f32 + 1.0));
            }
        }
    }
    matches
}

/// Classic two-row Levenshtein distance over bytes.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (prev[j + 1] + 1).min(current[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "kitten"), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
    }

    #[test]
    fn matches_within_threshold() {
        let vocab: Vec<String> = ["python", "pithon", "java", "pythonic"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let terms = vec!["python".to_string()];

        let matches = find_fuzzy_matches(&terms, &vocab, 2);
        assert!(matches.contains_key("pithon"));
        assert!(matches.contains_key("pythonic"));
        assert!(!matches.contains_key("java"));
        // Exact matches are excluded.
        assert!(!matches.contains_key("python"));
    }

    #[test]
    fn weight_decays_with_distance() {
        let vocab: Vec<String> = ["pithon", "pythons"].iter().map(|s| s.to_string()).collect();
        let terms = vec!["python".to_string()];

        let matches = find_fuzzy_matches(&terms, &vocab, 2);
        assert_eq!(matches["pithon"], 0.5); // distance 1
        assert_eq!(matches["pythons"], 0.5); // distance 1
    }

    #[test]
    fn skips_terms_outside_length_bounds() {
        let vocab: Vec<String> = ["ab", "a_very_long_vocabulary_term"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let terms = vec!["ab".to_string(), "python".to_string()];

        let matches = find_fuzzy_matches(&terms, &vocab, 2);
        assert!(matches.is_empty());
    }
}
