//! Alignment run records: one aligner execution over one time window.

use serde::{Deserialize, Serialize};

use super::common::{Millis, TimeWindow};
use super::word::WordToken;

/// Provenance-tagged batch of word timing produced by a single aligner call.
///
/// Runs are immutable once committed. Retirement of older words is recorded
/// on the run that caused it, never by editing the older run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRun {
    pub run_id: String,
    /// Implied by the owning document; filled in on load.
    #[serde(default, skip_serializing)]
    pub track_id: String,
    pub window_start_ms: Millis,
    pub window_end_ms: Millis,
    #[serde(rename = "model_provider")]
    pub provider: String,
    #[serde(rename = "model_version")]
    pub provider_version: String,
    pub params_hash: String,
    pub coverage: f64,
    pub avg_confidence: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub words: Vec<WordToken>,
    /// Ids of older words this run retired when it was committed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired_word_ids: Vec<String>,
}

impl AlignmentRun {
    #[must_use]
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.window_start_ms, self.window_end_ms)
    }

    #[must_use]
    pub fn syllable_count(&self) -> usize {
        self.words.iter().map(|word| word.syllables.len()).sum()
    }
}
