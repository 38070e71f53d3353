//! Boundary Derivation & Gap Policy.
//!
//! Segment timing is never stored. It is recomputed from owned words on every
//! read: `raw_start`/`raw_end` are the min start and max end of the owned
//! words, then the gap policy is applied in reading order.

use crate::error::Result;
use crate::timeline::segment_map::SegmentWordMaps;
use crate::timeline::store::WordTimelineStore;
use crate::types::{GapPolicy, Millis, SegmentTiming, TimeWindow};

/// Pre-policy timing of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSegment {
    pub segment_id: String,
    /// `None` for a segment that owns no words.
    pub raw: Option<TimeWindow>,
    pub word_count: usize,
}

/// Resolve every map against the store into raw spans, in reading order.
pub fn raw_segments(store: &WordTimelineStore, maps: &SegmentWordMaps) -> Result<Vec<RawSegment>> {
    maps.as_slice()
        .iter()
        .map(|map| {
            let words = maps.owned_words(store, &map.segment_id)?;
            let raw = words
                .iter()
                .map(|word| word.span())
                .reduce(|acc, span| acc.union(&span));
            Ok(RawSegment {
                segment_id: map.segment_id.clone(),
                raw,
                word_count: words.len(),
            })
        })
        .collect()
}

/// Apply minimum duration, minimum gap and clamping.
///
/// Rules, per non-empty segment in reading order:
/// - `start = max(raw_start, 0, previous_end + gap_min)`
/// - `end` is pushed forward to reach `min_segment_duration_ms`, but not past
///   the next segment's raw start
/// - `end` is pulled back so the gap to the next raw start is at least
///   `gap_min`, never below `start`
///
/// Gaps above `gap_max_ms` are silence and left alone. Segments without words
/// become zero-length markers at the previous adjusted end and do not take
/// part in the neighbour rules.
#[must_use]
pub fn derive_boundaries(segments: &[RawSegment], policy: &GapPolicy) -> Vec<SegmentTiming> {
    let mut out = Vec::with_capacity(segments.len());
    let mut previous_end: Option<Millis> = None;

    for (pos, segment) in segments.iter().enumerate() {
        let Some(raw) = segment.raw else {
            let at = previous_end.unwrap_or(0);
            out.push(SegmentTiming {
                segment_id: segment.segment_id.clone(),
                start_ms: at,
                end_ms: at,
                raw_start_ms: None,
                raw_end_ms: None,
                word_count: 0,
                marker: true,
            });
            continue;
        };

        let next_start = segments[pos + 1..]
            .iter()
            .find_map(|next| next.raw)
            .map(|next| next.start_ms);

        let mut start = raw.start_ms.max(0);
        if let Some(prev) = previous_end {
            start = start.max(prev + policy.gap_min_ms);
        }
        let mut end = raw.end_ms.max(start);

        if end - start < policy.min_segment_duration_ms {
            let wanted = start + policy.min_segment_duration_ms;
            end = end.max(next_start.map_or(wanted, |next| wanted.min(next)));
        }
        if let Some(next) = next_start {
            if next - end < policy.gap_min_ms {
                end = start.max(next - policy.gap_min_ms);
            }
        }

        previous_end = Some(end);
        out.push(SegmentTiming {
            segment_id: segment.segment_id.clone(),
            start_ms: start,
            end_ms: end,
            raw_start_ms: Some(raw.start_ms),
            raw_end_ms: Some(raw.end_ms),
            word_count: segment.word_count,
            marker: false,
        });
    }
    out
}
