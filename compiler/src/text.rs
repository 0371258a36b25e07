//! Small text utilities shared by extractors and passes.

use std::collections::BTreeMap;
use std::ops::Range;

use ssm::document::{InlineNode, plain_text};

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "all", "also", "and", "any", "are", "because", "been",
    "before", "being", "both", "but", "can", "could", "did", "does", "doing", "each", "for",
    "from", "had", "has", "have", "here", "how", "into", "its", "just", "more", "most", "must",
    "not", "now", "only", "other", "our", "out", "over", "same", "should", "some", "such",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "those",
    "through", "too", "under", "until", "use", "used", "uses", "using", "very", "was", "were",
    "what", "when", "where", "which", "while", "who", "why", "will", "with", "would", "you",
    "your",
];

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Collapse all whitespace runs to single spaces.
pub fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Split prose into sentences on `.`, `!` or `?` followed by whitespace.
pub fn sentences(text: &str) -> Vec<String> {
    let text = one_line(text);
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        let ends = matches!(b, b'.' | b'!' | b'?') && bytes.get(i + 1).is_none_or(|n| *n == b' ');
        if ends {
            let sentence = text[start..=i].trim();
            if !sentence.is_empty() {
                out.push(sentence.to_string());
            }
            start = i + 1;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

pub fn first_sentence(text: &str) -> String {
    sentences(text).into_iter().next().unwrap_or_default()
}

/// Lowercase word tokens of at least three characters.
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| w.chars().count() >= 3 && !w.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

/// The `limit` most frequent non-stopword tokens; ties break alphabetically.
pub fn keywords(text: &str, limit: usize) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for token in tokens(text) {
        if !is_stopword(&token) {
            *counts.entry(token).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(word, _)| word).collect()
}

/// Whether `needle` occurs in `haystack` as a whole word, ignoring case.
pub fn mentions(haystack: &str, needle: &str) -> bool {
    find_word(haystack, needle).is_some()
}

/// Byte range of the first whole-word, case-insensitive occurrence. Case
/// folding runs per char, so the range always lies on char boundaries of
/// `haystack` even where lowercasing changes byte lengths.
pub fn find_word(haystack: &str, needle: &str) -> Option<Range<usize>> {
    let needle: Vec<char> = needle.trim().chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut prev: Option<char> = None;
    for (start, c) in haystack.char_indices() {
        if prev.is_none_or(|p| !is_word(p)) {
            if let Some(len) = folded_prefix_len(&haystack[start..], &needle) {
                let end = start + len;
                if haystack[end..].chars().next().is_none_or(|c| !is_word(c)) {
                    return Some(start..end);
                }
            }
        }
        prev = Some(c);
    }
    None
}

/// Byte length of the shortest prefix of `text` that lowercases to exactly
/// `needle`.
fn folded_prefix_len(text: &str, needle: &[char]) -> Option<usize> {
    let mut rest = needle;
    for (offset, c) in text.char_indices() {
        if rest.is_empty() {
            return Some(offset);
        }
        for lower in c.to_lowercase() {
            let (first, tail) = rest.split_first()?;
            if *first != lower {
                return None;
            }
            rest = tail;
        }
    }
    rest.is_empty().then_some(text.len())
}

/// Plain text of each visual line of an inline run, split at line breaks.
pub fn inline_lines(inlines: &[InlineNode]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = Vec::new();
    for inline in inlines {
        match inline {
            InlineNode::SoftBreak | InlineNode::HardBreak => {
                lines.push(plain_text(&current));
                current.clear();
            }
            other => current.push(other.clone()),
        }
    }
    lines.push(plain_text(&current));
    lines
}

/// Strip a case-insensitive `prefix` and any following separator.
pub fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(text[prefix.len()..].trim_start_matches([':', ' ', '-']).trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwords_are_sorted() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn sentence_splitting() {
        assert_eq!(
            sentences("Rust is fast. It is safe!  Is it fun?\nYes"),
            ["Rust is fast.", "It is safe!", "Is it fun?", "Yes"]
        );
        assert_eq!(sentences("Version 1.2 ships."), ["Version 1.2 ships."]);
    }

    #[test]
    fn keyword_ranking() {
        let words = keywords("Borrow the value; borrow it again. The borrow checker checks values.", 3);
        assert_eq!(words, ["borrow", "again", "checker"]);
    }

    #[test]
    fn whole_word_mentions() {
        assert!(mentions("The Borrow Checker runs.", "borrow checker"));
        assert!(!mentions("Borrowing is fine.", "borrow"));
        assert!(mentions("a trait, then traits", "traits"));
        assert_eq!(find_word("traits trait", "trait"), Some(7..12));
    }

    #[test]
    fn case_folding_that_changes_byte_lengths() {
        let text = "İ marks the start. Then Borrowing follows.";
        let span = find_word(text, "borrowing").unwrap();
        assert_eq!(&text[span], "Borrowing");

        let city = "Visit İSTANBUL soon";
        let span = find_word(city, "İstanbul").unwrap();
        assert_eq!(&city[span], "İSTANBUL");
        assert!(mentions("STRASSE and Straße", "straße"));
        assert!(!mentions("İstanbuler", "İstanbul"));
    }

    #[test]
    fn prefix_stripping() {
        assert_eq!(strip_prefix_ci("WHY: because", "why"), Some("because"));
        assert_eq!(strip_prefix_ci("Whyever", "why"), Some("ever"));
        assert_eq!(strip_prefix_ci("no", "why"), None);
    }
}
