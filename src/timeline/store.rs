//! Word Timeline Store: the single source of truth for word timing.
//!
//! Holds every [`AlignmentRun`] of a track, including superseded ones for
//! audit. The only mutation is [`WordTimelineStore::commit_run`], which
//! validates first and then appends, so a rejected commit leaves the store
//! untouched.

use std::collections::{HashMap, HashSet};

use crate::constants::SYLLABLE_SUM_TOLERANCE_MS;
use crate::error::{Result, TimelineError};
use crate::types::{AlignmentRun, TimeWindow, WordToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WordLocation {
    run: usize,
    word: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WordTimelineStore {
    track_id: String,
    runs: Vec<AlignmentRun>,
    index: HashMap<String, WordLocation>,
    retired: HashSet<String>,
}

impl WordTimelineStore {
    #[must_use]
    pub fn new(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            ..Self::default()
        }
    }

    /// Rebuild a store from persisted runs, replaying their recorded retirements.
    pub fn from_runs(track_id: impl Into<String>, runs: Vec<AlignmentRun>) -> Result<Self> {
        let mut store = Self::new(track_id);
        for mut run in runs {
            if run.track_id.is_empty() {
                run.track_id = store.track_id.clone();
            }
            let recorded = std::mem::take(&mut run.retired_word_ids);
            store.check_insertable(&run)?;
            for word_id in &recorded {
                if !store.index.contains_key(word_id) {
                    return Err(TimelineError::invariant(
                        "store.load",
                        format!("run {} retires unknown word {word_id}", run.run_id),
                    ));
                }
            }
            run.retired_word_ids = recorded;
            store.append(run);
        }
        Ok(store)
    }

    #[must_use]
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// All runs in commit order, superseded ones included.
    #[must_use]
    pub fn runs(&self) -> &[AlignmentRun] {
        &self.runs
    }

    #[must_use]
    pub fn run(&self, run_id: &str) -> Option<&AlignmentRun> {
        self.runs.iter().find(|run| run.run_id == run_id)
    }

    /// Runs that still contribute at least one active word.
    pub fn active_runs(&self) -> impl Iterator<Item = &AlignmentRun> {
        self.runs.iter().filter(|run| {
            run.words
                .iter()
                .any(|word| !self.retired.contains(&word.word_id))
        })
    }

    /// Look up a word regardless of retirement.
    #[must_use]
    pub fn word(&self, word_id: &str) -> Option<&WordToken> {
        self.index
            .get(word_id)
            .map(|loc| &self.runs[loc.run].words[loc.word])
    }

    #[must_use]
    pub fn active_word(&self, word_id: &str) -> Option<&WordToken> {
        if self.retired.contains(word_id) {
            return None;
        }
        self.word(word_id)
    }

    #[must_use]
    pub fn is_retired(&self, word_id: &str) -> bool {
        self.retired.contains(word_id)
    }

    #[must_use]
    pub fn active_word_count(&self) -> usize {
        self.index.len() - self.retired.len()
    }

    /// Active words in timeline order (start, then commit order, then run index).
    #[must_use]
    pub fn active_words(&self) -> Vec<&WordToken> {
        let mut located: Vec<(WordLocation, &WordToken)> = Vec::with_capacity(self.index.len());
        for (run_idx, run) in self.runs.iter().enumerate() {
            for (word_idx, word) in run.words.iter().enumerate() {
                if !self.retired.contains(&word.word_id) {
                    located.push((
                        WordLocation {
                            run: run_idx,
                            word: word_idx,
                        },
                        word,
                    ));
                }
            }
        }
        located.sort_by_key(|(loc, word)| (word.start_ms, loc.run, loc.word));
        located.into_iter().map(|(_, word)| word).collect()
    }

    /// Active words whose span overlaps `window`.
    #[must_use]
    pub fn active_words_in(&self, window: TimeWindow) -> Vec<&WordToken> {
        self.active_words()
            .into_iter()
            .filter(|word| word.start_ms < window.end_ms && word.end_ms > window.start_ms)
            .collect()
    }

    /// Append `run` and retire every active word fully inside its window.
    ///
    /// Returns the retired word ids. On any validation failure the store is
    /// unchanged.
    pub fn commit_run(&mut self, mut run: AlignmentRun) -> Result<Vec<String>> {
        if run.track_id.is_empty() {
            run.track_id = self.track_id.clone();
        }
        if !run.retired_word_ids.is_empty() {
            return Err(TimelineError::invariant(
                "store.commit",
                format!("run {} arrived with pre-filled retirements", run.run_id),
            ));
        }
        self.check_insertable(&run)?;

        let window = run.window();
        let mut retired: Vec<String> = self
            .active_words()
            .into_iter()
            .filter(|word| window.contains_span(word.start_ms, word.end_ms))
            .map(|word| word.word_id.clone())
            .collect();
        retired.sort();
        run.retired_word_ids = retired.clone();

        tracing::debug!(
            track.id = %self.track_id,
            run.id = %run.run_id,
            run.words = run.words.len(),
            run.retired = retired.len(),
            window.start_ms = window.start_ms,
            window.end_ms = window.end_ms,
            "commit alignment run"
        );
        self.append(run);
        Ok(retired)
    }

    fn append(&mut self, run: AlignmentRun) {
        let run_idx = self.runs.len();
        for (word_idx, word) in run.words.iter().enumerate() {
            self.index.insert(
                word.word_id.clone(),
                WordLocation {
                    run: run_idx,
                    word: word_idx,
                },
            );
        }
        self.retired.extend(run.retired_word_ids.iter().cloned());
        self.runs.push(run);
    }

    fn check_insertable(&self, run: &AlignmentRun) -> Result<()> {
        if run.track_id != self.track_id {
            return Err(TimelineError::invariant(
                "store.commit",
                format!(
                    "run {} belongs to track {}, store holds {}",
                    run.run_id, run.track_id, self.track_id
                ),
            ));
        }
        if self.runs.iter().any(|existing| existing.run_id == run.run_id) {
            return Err(TimelineError::invariant(
                "store.commit",
                format!("duplicate run id {}", run.run_id),
            ));
        }
        validate_run(run).map_err(|reason| TimelineError::invariant("store.commit", reason))?;
        if let Some(clash) = run
            .words
            .iter()
            .find(|word| self.index.contains_key(&word.word_id))
        {
            return Err(TimelineError::invariant(
                "store.commit",
                format!("word id {} already present in track", clash.word_id),
            ));
        }
        Ok(())
    }
}

/// Check the data-model invariants of a single run in isolation.
///
/// Returns a human-readable reason on failure so callers can classify it
/// (invariant violation vs. malformed aligner output).
pub fn validate_run(run: &AlignmentRun) -> std::result::Result<(), String> {
    if run.window_start_ms > run.window_end_ms {
        return Err(format!(
            "run {} window starts after it ends ({} > {})",
            run.run_id, run.window_start_ms, run.window_end_ms
        ));
    }
    let window = run.window();
    let mut seen = HashSet::with_capacity(run.words.len());
    let mut previous: Option<&WordToken> = None;
    for word in &run.words {
        if word.word_id.is_empty() {
            return Err(format!("run {} has a word without id", run.run_id));
        }
        if !seen.insert(word.word_id.as_str()) {
            return Err(format!("duplicate word id {} in run {}", word.word_id, run.run_id));
        }
        validate_word(word)?;
        if !window.contains_span(word.start_ms, word.end_ms) {
            return Err(format!(
                "word {} [{}, {}] lies outside run window {window}",
                word.word_id, word.start_ms, word.end_ms
            ));
        }
        if let Some(prev) = previous {
            if word.idx_in_run <= prev.idx_in_run {
                return Err(format!(
                    "idx_in_run not strictly increasing at word {} ({} after {})",
                    word.word_id, word.idx_in_run, prev.idx_in_run
                ));
            }
            if word.start_ms <= prev.start_ms {
                return Err(format!(
                    "start_ms not strictly increasing at word {} ({} after {})",
                    word.word_id, word.start_ms, prev.start_ms
                ));
            }
        }
        previous = Some(word);
    }
    Ok(())
}

fn validate_word(word: &WordToken) -> std::result::Result<(), String> {
    if word.start_ms >= word.end_ms {
        return Err(format!(
            "word {} has start_ms {} >= end_ms {}",
            word.word_id, word.start_ms, word.end_ms
        ));
    }
    if !(0.0..=1.0).contains(&word.confidence) {
        return Err(format!(
            "word {} confidence {} outside [0, 1]",
            word.word_id, word.confidence
        ));
    }
    let syllables = word.syllables.as_slice();
    if syllables.is_empty() {
        return Ok(());
    }
    let mut cursor = word.start_ms;
    let mut total = 0;
    for (pos, syllable) in syllables.iter().enumerate() {
        if syllable.syll_index as usize != pos {
            return Err(format!(
                "word {} syllable {} out of order",
                word.word_id, syllable.syll_id
            ));
        }
        if syllable.start_ms >= syllable.end_ms || syllable.start_ms < cursor {
            return Err(format!(
                "word {} syllable {} overlaps or is empty",
                word.word_id, syllable.syll_id
            ));
        }
        cursor = syllable.end_ms;
        total += syllable.end_ms - syllable.start_ms;
    }
    if cursor > word.end_ms || (total - word.duration_ms()).abs() > SYLLABLE_SUM_TOLERANCE_MS {
        return Err(format!(
            "word {} syllables cover {total} ms of {} ms",
            word.word_id,
            word.duration_ms()
        ));
    }
    Ok(())
}
