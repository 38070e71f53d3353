//! One track's complete timing state: word store plus segment maps.
//!
//! A `TrackTimeline` is an immutable snapshot once published. Edits work on
//! a clone and publish a new value only after it validated and persisted.

use crate::error::{Result, TimelineError};
use crate::io::TimelineDocument;
use crate::timeline::boundary::{RawSegment, derive_boundaries, raw_segments};
use crate::timeline::quality::WordQuality;
use crate::timeline::segment_map::SegmentWordMaps;
use crate::timeline::store::WordTimelineStore;
use crate::types::{
    GapPolicy, Millis, QualityThresholds, SegmentTiming, SegmentWordMap, SyllableToken,
};

#[derive(Debug, Clone, Default)]
pub struct TrackTimeline {
    store: WordTimelineStore,
    maps: SegmentWordMaps,
    track_duration_ms: Option<Millis>,
}

/// A word owned by a segment, as handed to karaoke exporters.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentWord {
    pub word_id: String,
    pub surface: String,
    pub start_ms: Millis,
    pub end_ms: Millis,
    pub confidence: f64,
    pub syllables: Vec<SyllableToken>,
}

/// Quality over the whole active timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineMetrics {
    pub coverage_pct: f64,
    pub avg_confidence: f64,
    pub word_count: usize,
    pub syllable_count: usize,
    pub segment_count: usize,
    pub run_count: usize,
    pub active_run_count: usize,
    pub unowned_word_count: usize,
    pub needs_review: bool,
}

impl TrackTimeline {
    /// Empty timeline with no runs and no segments.
    #[must_use]
    pub fn new(track_id: impl Into<String>, track_duration_ms: Option<Millis>) -> Self {
        Self {
            store: WordTimelineStore::new(track_id),
            maps: SegmentWordMaps::default(),
            track_duration_ms,
        }
    }

    /// Assemble and validate a timeline.
    pub fn from_parts(
        store: WordTimelineStore,
        maps: SegmentWordMaps,
        track_duration_ms: Option<Millis>,
    ) -> Result<Self> {
        let timeline = Self {
            store,
            maps,
            track_duration_ms,
        };
        timeline.validate()?;
        Ok(timeline)
    }

    pub fn from_document(document: TimelineDocument) -> Result<Self> {
        let store = WordTimelineStore::from_runs(document.track_id, document.alignment_runs)?;
        let maps = SegmentWordMaps::new(document.segment_word_maps)?;
        Self::from_parts(store, maps, document.track_duration_ms)
    }

    #[must_use]
    pub fn to_document(&self) -> TimelineDocument {
        TimelineDocument {
            track_id: self.store.track_id().to_string(),
            track_duration_ms: self.track_duration_ms,
            alignment_runs: self.store.runs().to_vec(),
            segment_word_maps: self.maps.as_slice().to_vec(),
        }
    }

    #[must_use]
    pub fn track_id(&self) -> &str {
        self.store.track_id()
    }

    #[must_use]
    pub fn store(&self) -> &WordTimelineStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut WordTimelineStore {
        &mut self.store
    }

    #[must_use]
    pub fn maps(&self) -> &SegmentWordMaps {
        &self.maps
    }

    pub(crate) fn maps_mut(&mut self) -> &mut SegmentWordMaps {
        &mut self.maps
    }

    #[must_use]
    pub fn track_duration_ms(&self) -> Option<Millis> {
        self.track_duration_ms
    }

    /// Re-check every cross-structure invariant.
    pub fn validate(&self) -> Result<()> {
        self.maps.validate_against(&self.store)?;
        if let Some(duration) = self.track_duration_ms {
            if duration < 0 {
                return Err(TimelineError::invariant(
                    "track",
                    format!("negative track duration {duration}"),
                ));
            }
        }
        Ok(())
    }

    /// Pre-policy spans of every segment, in reading order.
    pub fn raw_segments(&self) -> Result<Vec<RawSegment>> {
        raw_segments(&self.store, &self.maps)
    }

    /// Exposed segment timing after the gap/clamp policy.
    pub fn segment_timings(&self, policy: &GapPolicy) -> Result<Vec<SegmentTiming>> {
        Ok(derive_boundaries(&self.raw_segments()?, policy))
    }

    /// Words (and syllables) currently owned by `segment_id`, in reading order.
    pub fn words_for_segment(&self, segment_id: &str) -> Result<Vec<SegmentWord>> {
        Ok(self
            .maps
            .owned_words(&self.store, segment_id)?
            .into_iter()
            .map(|word| SegmentWord {
                word_id: word.word_id.clone(),
                surface: word.surface.clone(),
                start_ms: word.start_ms,
                end_ms: word.end_ms,
                confidence: word.confidence,
                syllables: word.syllables.as_slice().to_vec(),
            })
            .collect())
    }

    #[must_use]
    pub fn metrics(&self, thresholds: &QualityThresholds) -> TimelineMetrics {
        let active = self.store.active_words();
        let quality = WordQuality::measure(active.iter().copied(), thresholds.word_confidence_floor);
        let owners = self.maps.ownership();
        let unowned_word_count = active
            .iter()
            .filter(|word| !owners.contains_key(word.word_id.as_str()))
            .count();
        TimelineMetrics {
            coverage_pct: quality.coverage,
            avg_confidence: quality.avg_confidence,
            word_count: quality.word_count,
            syllable_count: quality.syllable_count,
            segment_count: self.maps.len(),
            run_count: self.store.runs().len(),
            active_run_count: self.store.active_runs().count(),
            unowned_word_count,
            needs_review: quality.is_low(thresholds),
        }
    }

    /// Segment maps by id, for callers that already hold the snapshot.
    #[must_use]
    pub fn segment_map(&self, segment_id: &str) -> Option<&SegmentWordMap> {
        self.maps.get(segment_id)
    }
}
