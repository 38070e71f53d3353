//! Heuristic syllable generator (German-oriented vowel groups).
//!
//! Not linguistically exact; good enough to spread a word's duration for
//! karaoke highlighting. Generated syllables always partition the word span.

use once_cell::sync::OnceCell;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::types::{Millis, SyllableToken, Syllables, WordToken};

fn vowel_groups() -> Option<&'static Regex> {
    static VOWEL_GROUPS: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
    let regex = VOWEL_GROUPS
        .get_or_init(|| Regex::new(r"(?i)[aeiouyäöü]+").map_err(|err| err.to_string()));
    match regex {
        Ok(re) => Some(re),
        Err(msg) => {
            tracing::error!(error = %msg, "vowel group regex init failed");
            None
        }
    }
}

/// Approximate syllable count of `word`; at least 1 for any non-empty word.
#[must_use]
pub fn count_syllables(word: &str) -> usize {
    let lower = word.trim().to_lowercase();
    if lower.is_empty() {
        return 0;
    }
    vowel_groups()
        .map_or(1, |re| re.find_iter(&lower).count())
        .max(1)
}

/// Split `word` into syllable strings at the midpoint between vowel groups.
///
/// Punctuation is dropped; a word with one vowel group (or none) comes back
/// whole.
#[must_use]
pub fn split_syllables(word: &str) -> Vec<String> {
    let clean: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
    if clean.is_empty() {
        return if word.is_empty() {
            Vec::new()
        } else {
            vec![word.to_string()]
        };
    }
    let Some(re) = vowel_groups() else {
        return vec![clean];
    };
    let groups: Vec<(usize, usize)> = re.find_iter(&clean).map(|m| (m.start(), m.end())).collect();
    if groups.len() <= 1 {
        return vec![clean];
    }

    let mut out = Vec::with_capacity(groups.len());
    let mut from = 0usize;
    for pair in groups.windows(2) {
        let (_, vowel_end) = pair[0];
        let (next_start, _) = pair[1];
        let mut cut = ((vowel_end + next_start) / 2).max(vowel_end);
        while !clean.is_char_boundary(cut) {
            cut += 1;
        }
        if cut > from {
            out.push(clean[from..cut].to_string());
            from = cut;
        }
    }
    if from < clean.len() {
        out.push(clean[from..].to_string());
    }
    out
}

/// Syllable tokens for `word`, weighted by syllable length.
///
/// Falls back to [`Syllables::Unsplit`] when the word is too short in time to
/// give every syllable at least one millisecond.
#[must_use]
pub fn generate_syllables(word: &WordToken) -> Syllables {
    let parts = split_syllables(&word.surface);
    let duration = word.duration_ms();
    let count = Millis::try_from(parts.len()).unwrap_or(Millis::MAX);
    if parts.is_empty() || duration < count {
        return Syllables::Unsplit;
    }

    let weights: Vec<Millis> = parts
        .iter()
        .map(|part| Millis::try_from(part.graphemes(true).count()).unwrap_or(1).max(1))
        .collect();
    let total: Millis = weights.iter().sum();

    let mut tokens = Vec::with_capacity(parts.len());
    let mut cursor = word.start_ms;
    let mut cumulative = 0;
    for (idx, (text, weight)) in parts.into_iter().zip(&weights).enumerate() {
        cumulative += weight;
        let remaining = count - Millis::try_from(idx).unwrap_or(0) - 1;
        let end = if remaining == 0 {
            word.end_ms
        } else {
            (word.start_ms + duration * cumulative / total)
                .max(cursor + 1)
                .min(word.end_ms - remaining)
        };
        tokens.push(SyllableToken {
            syll_id: format!("{}.s{idx}", word.word_id),
            syll_index: u32::try_from(idx).unwrap_or(u32::MAX),
            text,
            start_ms: cursor,
            end_ms: end,
            confidence: word.confidence,
        });
        cursor = end;
    }
    Syllables::Split(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(surface: &str, start: i64, end: i64) -> WordToken {
        WordToken {
            word_id: "r1:w0001".into(),
            idx_in_run: 1,
            surface: surface.into(),
            norm: surface.to_lowercase(),
            start_ms: start,
            end_ms: end,
            confidence: 0.8,
            syllables: Syllables::Unsplit,
        }
    }

    #[test]
    fn splits_between_vowel_groups() {
        assert_eq!(split_syllables("Regeln"), vec!["Re", "geln"]);
        assert_eq!(split_syllables("Bleiben."), vec!["Blei", "ben"]);
        assert_eq!(split_syllables("Nur"), vec!["Nur"]);
    }

    #[test]
    fn umlauts_split_on_char_boundaries() {
        let parts = split_syllables("Mädchen");
        assert_eq!(parts.concat(), "Mädchen");
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn counts_vowel_groups() {
        assert_eq!(count_syllables("Meine"), 2);
        assert_eq!(count_syllables("Regeln"), 2);
        assert_eq!(count_syllables("hmm"), 1);
        assert_eq!(count_syllables(""), 0);
    }

    #[test]
    fn generated_syllables_partition_word() {
        let w = word("Wunderbar", 1000, 1901);
        let Syllables::Split(list) = generate_syllables(&w) else {
            panic!("expected split syllables");
        };
        assert_eq!(list.first().map(|s| s.start_ms), Some(1000));
        assert_eq!(list.last().map(|s| s.end_ms), Some(1901));
        for pair in list.windows(2) {
            assert_eq!(pair[0].end_ms, pair[1].start_ms);
            assert!(pair[0].start_ms < pair[0].end_ms);
        }
        let total: i64 = list.iter().map(|s| s.end_ms - s.start_ms).sum();
        assert_eq!(total, 901);
    }

    #[test]
    fn too_short_words_stay_unsplit() {
        assert!(generate_syllables(&word("Wunderbar", 0, 2)).is_unsplit());
    }
}
