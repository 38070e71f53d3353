//! Word and syllable tokens produced by alignment runs.

use serde::{Deserialize, Serialize};

use super::common::{Millis, TimeWindow};

/// Sub-word timing unit for fine-grained karaoke highlighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyllableToken {
    pub syll_id: String,
    pub syll_index: u32,
    pub text: String,
    pub start_ms: Millis,
    pub end_ms: Millis,
    pub confidence: f64,
}

/// Syllable timing attached to a word.
///
/// A word is either unsplit or carries a non-empty list whose spans partition
/// the word span. On disk both shapes are a plain `syllables` array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SyllableToken>", into = "Vec<SyllableToken>")]
pub enum Syllables {
    #[default]
    Unsplit,
    Split(Vec<SyllableToken>),
}

impl Syllables {
    #[must_use]
    pub fn as_slice(&self) -> &[SyllableToken] {
        match self {
            Self::Unsplit => &[],
            Self::Split(list) => list,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    #[must_use]
    pub fn is_unsplit(&self) -> bool {
        matches!(self, Self::Unsplit)
    }
}

impl From<Vec<SyllableToken>> for Syllables {
    fn from(list: Vec<SyllableToken>) -> Self {
        if list.is_empty() {
            Self::Unsplit
        } else {
            Self::Split(list)
        }
    }
}

impl From<Syllables> for Vec<SyllableToken> {
    fn from(syllables: Syllables) -> Self {
        match syllables {
            Syllables::Unsplit => Vec::new(),
            Syllables::Split(list) => list,
        }
    }
}

/// One recognized word inside an [`AlignmentRun`](super::AlignmentRun).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub word_id: String,
    pub idx_in_run: u32,
    /// Display form, punctuation included.
    pub surface: String,
    /// Matching form: lowercase, leading/trailing punctuation stripped.
    pub norm: String,
    pub start_ms: Millis,
    pub end_ms: Millis,
    pub confidence: f64,
    #[serde(default)]
    pub syllables: Syllables,
}

impl WordToken {
    #[must_use]
    pub fn span(&self) -> TimeWindow {
        TimeWindow::new(self.start_ms, self.end_ms)
    }

    #[must_use]
    pub fn duration_ms(&self) -> Millis {
        self.end_ms - self.start_ms
    }
}
