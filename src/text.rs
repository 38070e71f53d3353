//! Tokenizer/normalizer for segment text.
//!
//! Pure and deterministic: identical input always yields identical tokens.
//! `surface` keeps what the user typed (punctuation included) and `norm` is the
//! form compared against word tokens.

use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, TimelineError};

/// One comparable word token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextToken {
    pub surface: String,
    pub norm: String,
}

/// Lowercase, NFC-compose and strip leading/trailing punctuation.
///
/// Internal punctuation (`don't`, `rock-n-roll`) is preserved.
#[must_use]
pub fn normalize_token(surface: &str) -> String {
    let composed: String = surface.nfc().collect();
    composed
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Split on any whitespace run and drop tokens that normalize to nothing.
#[must_use]
pub fn tokenize_words(text: &str) -> Vec<TextToken> {
    text.split_whitespace()
        .filter_map(|raw| {
            let norm = normalize_token(raw);
            if norm.is_empty() {
                None
            } else {
                Some(TextToken {
                    surface: raw.nfc().collect(),
                    norm,
                })
            }
        })
        .collect()
}

/// Validate and tokenize user-supplied segment text.
///
/// Rejects control characters other than whitespace and text longer than
/// `max_chars`; everything else tokenizes (possibly to an empty list).
pub fn tokenize_segment(segment_id: &str, text: &str, max_chars: usize) -> Result<Vec<TextToken>> {
    let char_count = text.chars().count();
    if char_count > max_chars {
        return Err(TimelineError::tokenization(
            segment_id,
            format!("{char_count} characters exceeds limit of {max_chars}"),
        ));
    }
    if let Some(bad) = text.chars().find(|c| c.is_control() && !c.is_whitespace()) {
        return Err(TimelineError::tokenization(
            segment_id,
            format!("control character U+{:04X}", u32::from(bad)),
        ));
    }
    Ok(tokenize_words(text))
}

/// Join token surfaces back into display text.
#[must_use]
pub fn join_surfaces<'a, I>(surfaces: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for surface in surfaces {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(surface);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norms(text: &str) -> Vec<String> {
        tokenize_words(text).into_iter().map(|t| t.norm).collect()
    }

    #[test]
    fn lowercases_and_strips_edges() {
        assert_eq!(normalize_token("Hello"), "hello");
        assert_eq!(normalize_token("Bleiben."), "bleiben");
        assert_eq!(normalize_token("«Über»"), "über");
        assert_eq!(normalize_token("don't!"), "don't");
    }

    #[test]
    fn pure_punctuation_is_dropped() {
        assert_eq!(normalize_token("..."), "");
        assert_eq!(norms("Bleiben . Die !"), vec!["bleiben", "die"]);
    }

    #[test]
    fn collapses_whitespace_and_newlines() {
        assert_eq!(norms("  multiple   spaces\nline two\t"), vec![
            "multiple", "spaces", "line", "two"
        ]);
    }

    #[test]
    fn surface_keeps_punctuation() {
        let tokens = tokenize_words("Regeln Bleiben. Die");
        assert_eq!(tokens[1].surface, "Bleiben.");
        assert_eq!(tokens[1].norm, "bleiben");
    }

    #[test]
    fn decomposed_and_composed_forms_match() {
        // "ü" as u + combining diaeresis
        assert_eq!(normalize_token("u\u{0308}ber"), normalize_token("über"));
    }

    #[test]
    fn deterministic() {
        let first = tokenize_words("Nur Meine Regeln");
        for _ in 0..10 {
            assert_eq!(tokenize_words("Nur Meine Regeln"), first);
        }
    }

    #[test]
    fn rejects_control_characters() {
        let err = tokenize_segment("3", "bad\u{0007}text", 100).unwrap_err();
        assert!(matches!(err, TimelineError::Tokenization { ref segment_id, .. } if segment_id == "3"));
    }

    #[test]
    fn rejects_oversized_text() {
        assert!(tokenize_segment("0", "abc", 2).is_err());
        assert_eq!(tokenize_segment("0", "", 2).unwrap(), Vec::new());
    }
}
