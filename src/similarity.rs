//! Edit-distance scores on a 0-100 scale.
//!
//! `ratio` compares raw strings. The token variants first normalize both
//! strings (lowercase, punctuation to spaces) and then compare word lists,
//! so word order and repeated words stop mattering.

use std::collections::BTreeSet;

use strsim::normalized_levenshtein;

/// Levenshtein similarity of two strings, rounded to 0-100.
/// Either string being empty scores 0.
pub fn ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    (normalized_levenshtein(a, b) * 100.0).round() as u8
}

/// Lowercase, turn anything that is not alphanumeric into a space and trim.
pub fn process(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    replaced.to_lowercase().trim().to_string()
}

fn sorted_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens
}

/// Ratio after sorting each string's words alphabetically.
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    let a = process(a);
    let b = process(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    ratio(&sorted_tokens(&a).join(" "), &sorted_tokens(&b).join(" "))
}

/// Ratio built from the shared words and each side's leftover words.
///
/// With `sect` the sorted intersection, the score is the best of
/// `sect` vs `sect + rest_a`, `sect` vs `sect + rest_b` and
/// `sect + rest_a` vs `sect + rest_b`. A name fully contained in the other
/// therefore scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let a = process(a);
    let b = process(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let sect = join_tokens(tokens_a.intersection(&tokens_b));
    let rest_a = join_tokens(tokens_a.difference(&tokens_b));
    let rest_b = join_tokens(tokens_b.difference(&tokens_a));

    let combined_a = join_nonempty(&sect, &rest_a);
    let combined_b = join_nonempty(&sect, &rest_b);

    [
        ratio(&sect, &combined_a),
        ratio(&sect, &combined_b),
        ratio(&combined_a, &combined_b),
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
}

fn join_tokens<'a, 'b: 'a>(tokens: impl Iterator<Item = &'a &'b str>) -> String {
    tokens.copied().collect::<Vec<_>>().join(" ")
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{head} {tail}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_basics() {
        assert_eq!(ratio("john smith", "john smith"), 100);
        assert_eq!(ratio("jon smith", "john smith"), 90);
        assert_eq!(ratio("", "john"), 0);
        assert!(ratio("bob", "john smith") < 50);
    }

    #[test]
    fn token_sort_ignores_word_order_and_case() {
        assert_eq!(token_sort_ratio("Smith John", "john SMITH"), 100);
        assert_eq!(token_sort_ratio("Smith, John", "John Smith"), 100);
        assert!(token_sort_ratio("John Smith", "John Smyth") >= 90);
        assert_eq!(token_sort_ratio("!!!", "John"), 0);
    }

    #[test]
    fn token_set_ignores_extra_words() {
        assert_eq!(token_set_ratio("John Smith", "John A. Smith"), 100);
        assert_eq!(token_set_ratio("smith smith john", "John Smith"), 100);
        assert!(token_set_ratio("John Smith", "Mary Jones") < 50);
        assert!(token_set_ratio("John Smith", "John A. Smith") > token_sort_ratio("John Smith", "John A. Smith"));
    }

    #[test]
    fn process_strips_punctuation() {
        assert_eq!(process("  O'Brien, Pat! "), "o brien  pat");
    }
}
