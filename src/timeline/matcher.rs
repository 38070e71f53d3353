//! Matcher: explain edited segment text with existing word tokens.
//!
//! Runs in two phases. Candidate search walks the edit batch left to right
//! and, for each segment, lists every contiguous window of available words
//! whose `norm` sequence equals the new tokens; the window with the least
//! token-position drift from the segment's previous mapping wins, and a tie
//! is reported as ambiguous. The commit phase turns those decisions into a
//! [`MatchOutcome`] without touching any state.
//!
//! "Available" means active words that are unowned or owned by a segment in
//! the batch. Words owned by any other segment are barriers: a segment can
//! only match between its nearest non-batch neighbours.

use std::collections::{HashMap, HashSet};

use crate::text::TextToken;
use crate::timeline::segment_map::SegmentWordMaps;
use crate::timeline::store::WordTimelineStore;
use crate::types::{MatcherOptions, Millis, TimeWindow, WordToken};

/// One segment of an edit batch, already tokenized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSegment {
    pub segment_id: String,
    /// Reading-order position among all segments of the track.
    pub position: usize,
    pub tokens: Vec<TextToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMatch {
    pub segment_id: String,
    pub word_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    NoCandidate,
    Ambiguous { candidates: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedSegment {
    pub segment_id: String,
    pub tokens: Vec<TextToken>,
    /// Approximate region of the audio the new text belongs to.
    pub time_hint: TimeWindow,
    pub reason: UnresolvedReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Full {
        matched: Vec<SegmentMatch>,
    },
    Partial {
        matched: Vec<SegmentMatch>,
        unresolved: Vec<UnresolvedSegment>,
    },
}

impl MatchOutcome {
    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }

    #[must_use]
    pub fn matched(&self) -> &[SegmentMatch] {
        match self {
            Self::Full { matched } | Self::Partial { matched, .. } => matched,
        }
    }

    #[must_use]
    pub fn unresolved(&self) -> &[UnresolvedSegment] {
        match self {
            Self::Full { .. } => &[],
            Self::Partial { unresolved, .. } => unresolved,
        }
    }
}

/// Result of the lenient pass used after a realign commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestrictedBinding {
    pub bindings: Vec<SegmentMatch>,
    /// Surfaces that found no word, per segment.
    pub missing: Vec<(String, Vec<String>)>,
}

impl RestrictedBinding {
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.missing.iter().map(|(_, surfaces)| surfaces.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Matched { start: usize, len: usize },
    Empty,
    Unresolved(UnresolvedReason),
}

/// Active words a batch may draw from, in timeline order.
struct Pool<'s> {
    words: Vec<&'s WordToken>,
    position: HashMap<&'s str, usize>,
}

impl<'s> Pool<'s> {
    fn build(store: &'s WordTimelineStore, maps: &SegmentWordMaps, movable: &HashSet<&str>) -> Self {
        let owners = maps.ownership();
        let words: Vec<&WordToken> = store
            .active_words()
            .into_iter()
            .filter(|word| match owners.get(word.word_id.as_str()) {
                Some(owner) => movable.contains(owner),
                None => true,
            })
            .collect();
        let position = words
            .iter()
            .enumerate()
            .map(|(idx, word)| (word.word_id.as_str(), idx))
            .collect();
        Self { words, position }
    }

    fn first_starting_at_or_after(&self, ms: Millis) -> usize {
        self.words.partition_point(|word| word.start_ms < ms)
    }

    fn norms_equal(&self, start: usize, tokens: &[TextToken]) -> bool {
        tokens
            .iter()
            .enumerate()
            .all(|(offset, token)| self.words[start + offset].norm == token.norm)
    }
}

pub struct Matcher<'s> {
    store: &'s WordTimelineStore,
    maps: &'s SegmentWordMaps,
    options: MatcherOptions,
    track_duration_ms: Option<Millis>,
}

impl<'s> Matcher<'s> {
    #[must_use]
    pub fn new(
        store: &'s WordTimelineStore,
        maps: &'s SegmentWordMaps,
        options: MatcherOptions,
        track_duration_ms: Option<Millis>,
    ) -> Self {
        Self {
            store,
            maps,
            options,
            track_duration_ms,
        }
    }

    /// Try to explain every segment of `batch` with existing words.
    ///
    /// `batch` must be sorted by reading position.
    #[must_use]
    pub fn match_batch(&self, batch: &[BatchSegment]) -> MatchOutcome {
        let movable: HashSet<&str> = batch.iter().map(|seg| seg.segment_id.as_str()).collect();
        let pool = Pool::build(self.store, self.maps, &movable);

        // Phase 1: candidate search, greedy left to right.
        let mut decisions = Vec::with_capacity(batch.len());
        let mut cursor = 0usize;
        for segment in batch {
            let (lo, hi) = self.bounds(&pool, segment.position, &movable);
            let lo = lo.max(cursor);
            let decision = self.decide(&pool, segment, lo, hi);
            if let Decision::Matched { start, len } = decision {
                cursor = start + len;
            }
            tracing::debug!(
                segment.id = %segment.segment_id,
                segment.tokens = segment.tokens.len(),
                search.lo = lo,
                search.hi = hi,
                decision = ?decision,
                "matcher decision"
            );
            decisions.push(decision);
        }

        // Phase 2: commit decisions into an outcome.
        let mut matched = Vec::new();
        let mut unresolved_ids = Vec::new();
        let mut matched_spans: HashMap<&str, TimeWindow> = HashMap::new();
        for (segment, decision) in batch.iter().zip(&decisions) {
            match *decision {
                Decision::Matched { start, len } => {
                    let words = &pool.words[start..start + len];
                    matched_spans.insert(segment.segment_id.as_str(), span_of(words.iter().copied()));
                    matched.push(SegmentMatch {
                        segment_id: segment.segment_id.clone(),
                        word_ids: words.iter().map(|w| w.word_id.clone()).collect(),
                    });
                }
                Decision::Empty => matched.push(SegmentMatch {
                    segment_id: segment.segment_id.clone(),
                    word_ids: Vec::new(),
                }),
                Decision::Unresolved(reason) => unresolved_ids.push((segment, reason)),
            }
        }

        if unresolved_ids.is_empty() {
            return MatchOutcome::Full { matched };
        }
        let unresolved = unresolved_ids
            .into_iter()
            .map(|(segment, reason)| UnresolvedSegment {
                segment_id: segment.segment_id.clone(),
                tokens: segment.tokens.clone(),
                time_hint: self.time_hint(segment, &matched_spans),
                reason,
            })
            .collect();
        MatchOutcome::Partial {
            matched,
            unresolved,
        }
    }

    /// Lenient, token-by-token binding used after new words were committed.
    ///
    /// Each token takes the next available word with the same `norm` inside
    /// the lookahead; tokens without one are reported as missing rather than
    /// failing the edit.
    #[must_use]
    pub fn bind_restricted(&self, segments: &[BatchSegment]) -> RestrictedBinding {
        let movable: HashSet<&str> = segments.iter().map(|seg| seg.segment_id.as_str()).collect();
        let pool = Pool::build(self.store, self.maps, &movable);
        let mut out = RestrictedBinding::default();
        let mut cursor = 0usize;
        for segment in segments {
            let (lo, hi) = self.bounds(&pool, segment.position, &movable);
            let mut next = lo.max(cursor);
            let mut word_ids = Vec::with_capacity(segment.tokens.len());
            let mut missing = Vec::new();
            for token in &segment.tokens {
                let limit = hi.min(next.saturating_add(self.options.lookahead_words + 1));
                match (next..limit).find(|&idx| pool.words[idx].norm == token.norm) {
                    Some(idx) => {
                        word_ids.push(pool.words[idx].word_id.clone());
                        next = idx + 1;
                    }
                    None => missing.push(token.surface.clone()),
                }
            }
            cursor = next;
            if !missing.is_empty() {
                out.missing.push((segment.segment_id.clone(), missing));
            }
            out.bindings.push(SegmentMatch {
                segment_id: segment.segment_id.clone(),
                word_ids,
            });
        }
        out
    }

    fn decide(&self, pool: &Pool<'_>, segment: &BatchSegment, lo: usize, hi: usize) -> Decision {
        let len = segment.tokens.len();
        if len == 0 {
            return Decision::Empty;
        }
        if hi < lo || hi - lo < len {
            return Decision::Unresolved(UnresolvedReason::NoCandidate);
        }
        let last_start = (hi - len).min(lo.saturating_add(self.options.lookahead_words));
        let anchor = self.anchor(pool, &segment.segment_id).unwrap_or(lo);

        let mut best: Option<(usize, usize)> = None;
        let mut ties = 0usize;
        for start in lo..=last_start {
            if !pool.norms_equal(start, &segment.tokens) {
                continue;
            }
            let drift = start.abs_diff(anchor) * len;
            match best {
                Some((_, best_drift)) if drift > best_drift => {}
                Some((_, best_drift)) if drift == best_drift => ties += 1,
                _ => {
                    best = Some((start, drift));
                    ties = 1;
                }
            }
        }
        match best {
            None => Decision::Unresolved(UnresolvedReason::NoCandidate),
            Some(_) if ties > 1 => {
                Decision::Unresolved(UnresolvedReason::Ambiguous { candidates: ties })
            }
            Some((start, _)) => Decision::Matched { start, len },
        }
    }

    /// Pool position of the first word the segment owned before the edit.
    fn anchor(&self, pool: &Pool<'_>, segment_id: &str) -> Option<usize> {
        self.maps
            .get(segment_id)?
            .word_ids
            .iter()
            .find_map(|word_id| pool.position.get(word_id.as_str()).copied())
    }

    /// `[lo, hi)` pool range between the nearest non-movable neighbours.
    fn bounds(&self, pool: &Pool<'_>, position: usize, movable: &HashSet<&str>) -> (usize, usize) {
        let maps = self.maps.as_slice();
        let previous_end = maps[..position.min(maps.len())]
            .iter()
            .rev()
            .filter(|map| !movable.contains(map.segment_id.as_str()))
            .find_map(|map| self.raw_span(&map.word_ids))
            .map(|span| span.end_ms);
        let next_start = maps
            .iter()
            .skip(position + 1)
            .filter(|map| !movable.contains(map.segment_id.as_str()))
            .find_map(|map| self.raw_span(&map.word_ids))
            .map(|span| span.start_ms);
        let lo = previous_end.map_or(0, |ms| pool.first_starting_at_or_after(ms));
        let hi = next_start.map_or(pool.words.len(), |ms| pool.first_starting_at_or_after(ms));
        (lo, hi)
    }

    fn raw_span(&self, word_ids: &[String]) -> Option<TimeWindow> {
        let words: Vec<&WordToken> = word_ids
            .iter()
            .filter_map(|word_id| self.store.word(word_id))
            .collect();
        if words.is_empty() {
            None
        } else {
            Some(span_of(words))
        }
    }

    /// Previous ownership span, else the gap between the nearest neighbours.
    fn time_hint(&self, segment: &BatchSegment, matched: &HashMap<&str, TimeWindow>) -> TimeWindow {
        if let Some(map) = self.maps.get(&segment.segment_id) {
            if let Some(span) = self.raw_span(&map.word_ids) {
                return span;
            }
        }
        let maps = self.maps.as_slice();
        let span_for = |segment_id: &str, word_ids: &[String]| {
            matched
                .get(segment_id)
                .copied()
                .or_else(|| self.raw_span(word_ids))
        };
        let previous_end = maps[..segment.position.min(maps.len())]
            .iter()
            .rev()
            .find_map(|map| span_for(&map.segment_id, &map.word_ids))
            .map(|span| span.end_ms);
        let next_start = maps
            .iter()
            .skip(segment.position + 1)
            .find_map(|map| span_for(&map.segment_id, &map.word_ids))
            .map(|span| span.start_ms);
        let start = previous_end.unwrap_or(0);
        let end = next_start
            .or(self.track_duration_ms)
            .unwrap_or(start)
            .max(start);
        TimeWindow::new(start, end)
    }
}

fn span_of<'w, I>(words: I) -> TimeWindow
where
    I: IntoIterator<Item = &'w WordToken>,
{
    let mut span: Option<TimeWindow> = None;
    for word in words {
        let current = word.span();
        span = Some(span.map_or(current, |acc| acc.union(&current)));
    }
    span.unwrap_or_default()
}
