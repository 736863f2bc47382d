//! Word n-gram overlap between a source and a rewrite.

use std::collections::HashSet;

/// Lowercased word tokens with surrounding punctuation removed.
pub fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn ngrams(tokens: &[String], n: usize) -> Vec<&[String]> {
    if tokens.len() < n {
        return Vec::new();
    }
    tokens.windows(n).collect()
}

/// Fraction of the output's word `n`-grams that also occur in the source.
///
/// Outputs shorter than `n` words are compared word by word. Returns 1.0
/// when the normalized texts are identical and 0.0 for an empty output.
pub fn ngram_overlap(source: &str, output: &str, n: usize) -> f64 {
    let source_tokens = tokens(source);
    let output_tokens = tokens(output);
    if output_tokens.is_empty() {
        return 0.0;
    }
    if source_tokens == output_tokens {
        return 1.0;
    }

    let n = n.max(1).min(output_tokens.len());
    let source_grams: HashSet<&[String]> = ngrams(&source_tokens, n).into_iter().collect();
    let output_grams = ngrams(&output_tokens, n);
    let shared = output_grams
        .iter()
        .filter(|gram| source_grams.contains(*gram))
        .count();
    shared as f64 / output_grams.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_text_is_full_overlap() {
        let text = "My roommate borrowed my car and came back with a puppy.";
        assert_eq!(ngram_overlap(text, text, 3), 1.0);
        // Case and punctuation do not hide a copy.
        assert_eq!(
            ngram_overlap(text, "my ROOMMATE borrowed my car, and came back with a puppy", 3),
            1.0
        );
    }

    #[test]
    fn test_disjoint_text_has_no_overlap() {
        assert_eq!(
            ngram_overlap("the cat sat on the mat", "a dog ran through tall grass", 3),
            0.0
        );
    }

    #[test]
    fn test_partial_rewrite_is_fractional() {
        let source = "one two three four five six";
        let output = "one two three four seven eight";
        // Output trigrams: [1 2 3] [2 3 4] [3 4 7] [4 7 8]; two are shared.
        assert!((ngram_overlap(source, output, 3) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_short_output_falls_back_to_smaller_grams() {
        assert_eq!(ngram_overlap("hello there friend", "hello", 3), 1.0);
        assert_eq!(ngram_overlap("hello there friend", "", 3), 0.0);
    }

    proptest! {
        #[test]
        fn prop_overlap_is_a_fraction(
            source in "[a-z ]{0,200}",
            output in "[a-z ]{0,200}",
            n in 1usize..5,
        ) {
            let overlap = ngram_overlap(&source, &output, n);
            prop_assert!((0.0..=1.0).contains(&overlap));
        }
    }
}
