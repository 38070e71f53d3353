//! Segment–Word Map: which segment owns which word ids, in reading order.
//!
//! Maps only reference word ids. A reference that no longer resolves to an
//! active word is an invariant violation, never silently dropped.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{Result, TimelineError};
use crate::timeline::store::WordTimelineStore;
use crate::types::{Author, SegmentWordMap, WordToken};

/// All segment maps of a track, ordered by reading order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentWordMaps {
    maps: Vec<SegmentWordMap>,
}

impl SegmentWordMaps {
    /// Wrap maps already in reading order; ids must be unique.
    pub fn new(maps: Vec<SegmentWordMap>) -> Result<Self> {
        let mut seen = HashMap::with_capacity(maps.len());
        for (pos, map) in maps.iter().enumerate() {
            if let Some(first) = seen.insert(map.segment_id.as_str(), pos) {
                return Err(TimelineError::invariant(
                    "segment_map",
                    format!(
                        "segment {} listed twice (positions {first} and {pos})",
                        map.segment_id
                    ),
                ));
            }
        }
        Ok(Self { maps })
    }

    #[must_use]
    pub fn as_slice(&self) -> &[SegmentWordMap] {
        &self.maps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    #[must_use]
    pub fn get(&self, segment_id: &str) -> Option<&SegmentWordMap> {
        self.maps.iter().find(|map| map.segment_id == segment_id)
    }

    /// Reading-order position of a segment.
    #[must_use]
    pub fn position(&self, segment_id: &str) -> Option<usize> {
        self.maps.iter().position(|map| map.segment_id == segment_id)
    }

    /// Word id → owning segment id, over every map.
    #[must_use]
    pub fn ownership(&self) -> HashMap<&str, &str> {
        let mut owners = HashMap::new();
        for map in &self.maps {
            for word_id in &map.word_ids {
                owners.insert(word_id.as_str(), map.segment_id.as_str());
            }
        }
        owners
    }

    /// Resolve a segment's owned words; a dangling or retired reference is an error.
    pub fn owned_words<'s>(
        &self,
        store: &'s WordTimelineStore,
        segment_id: &str,
    ) -> Result<Vec<&'s WordToken>> {
        let Some(map) = self.get(segment_id) else {
            return Err(TimelineError::invariant(
                "segment_map",
                format!("unknown segment {segment_id}"),
            ));
        };
        resolve(store, map)
    }

    /// Replace the word lists of the given segments.
    ///
    /// Only maps whose list actually changes get a version bump, a new
    /// timestamp and the given author, so re-applying an identical binding
    /// is a no-op.
    pub fn rebind(
        &mut self,
        bindings: &[(String, Vec<String>)],
        author: Author,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut changed = 0;
        for (segment_id, word_ids) in bindings {
            let Some(map) = self.maps.iter_mut().find(|m| &m.segment_id == segment_id) else {
                return Err(TimelineError::invariant(
                    "segment_map.rebind",
                    format!("unknown segment {segment_id}"),
                ));
            };
            if &map.word_ids == word_ids {
                continue;
            }
            map.word_ids.clone_from(word_ids);
            map.map_version = map.map_version.saturating_add(1);
            map.updated_at = now;
            map.author = author;
            changed += 1;
        }
        Ok(changed)
    }

    /// Check every map against the store.
    ///
    /// - every referenced id resolves to an active word
    /// - no word id is owned twice
    /// - words inside a map are in reading (start time) order
    ///
    /// Order between segments is not checked. Neighbouring lines may
    /// overlap or cross in time (overlapping source subtitles, a line that
    /// kept its words after a failed window); boundary derivation clamps
    /// them into non-overlapping exposed timing.
    pub fn validate_against(&self, store: &WordTimelineStore) -> Result<()> {
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for map in &self.maps {
            let words = resolve(store, map)?;
            for pair in words.windows(2) {
                if pair[1].start_ms < pair[0].start_ms {
                    return Err(TimelineError::invariant(
                        "segment_map",
                        format!(
                            "segment {} lists {} before {} out of reading order",
                            map.segment_id, pair[0].word_id, pair[1].word_id
                        ),
                    ));
                }
            }
            for word_id in &map.word_ids {
                if let Some(previous) = owners.insert(word_id.as_str(), map.segment_id.as_str()) {
                    return Err(TimelineError::invariant(
                        "segment_map",
                        format!(
                            "word {word_id} owned by both segment {previous} and {}",
                            map.segment_id
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<SegmentWordMap> {
        self.maps
    }
}

fn resolve<'s>(store: &'s WordTimelineStore, map: &SegmentWordMap) -> Result<Vec<&'s WordToken>> {
    map.word_ids
        .iter()
        .map(|word_id| {
            store.active_word(word_id).ok_or_else(|| {
                let state = if store.word(word_id).is_some() {
                    "retired"
                } else {
                    "missing"
                };
                TimelineError::invariant(
                    "segment_map",
                    format!("segment {} references {state} word {word_id}", map.segment_id),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::types::{AlignmentRun, Syllables};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn store() -> WordTimelineStore {
        let words = ["nur", "meine", "regeln"]
            .iter()
            .enumerate()
            .map(|(i, norm)| WordToken {
                word_id: format!("w{i}"),
                idx_in_run: i as u32,
                surface: (*norm).to_string(),
                norm: (*norm).to_string(),
                start_ms: i as i64 * 500,
                end_ms: i as i64 * 500 + 400,
                confidence: 0.9,
                syllables: Syllables::Unsplit,
            })
            .collect();
        let mut store = WordTimelineStore::new("t");
        store
            .commit_run(AlignmentRun {
                run_id: "r0".into(),
                track_id: "t".into(),
                window_start_ms: 0,
                window_end_ms: 2000,
                provider: "test".into(),
                provider_version: "1".into(),
                params_hash: "h".into(),
                coverage: 1.0,
                avg_confidence: 0.9,
                warnings: Vec::new(),
                words,
                retired_word_ids: Vec::new(),
            })
            .unwrap();
        store
    }

    fn maps(lists: &[(&str, &[&str])]) -> SegmentWordMaps {
        SegmentWordMaps::new(
            lists
                .iter()
                .map(|(id, words)| {
                    SegmentWordMap::new(*id, words.iter().map(|w| (*w).to_string()).collect(), at(0))
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn detects_double_ownership() {
        let maps = maps(&[("0", &["w0", "w1"]), ("1", &["w1", "w2"])]);
        let err = maps.validate_against(&store()).unwrap_err();
        assert!(err.to_string().contains("owned by both"));
    }

    #[test]
    fn detects_dangling_reference() {
        let maps = maps(&[("0", &["w0", "ghost"])]);
        let err = maps.validate_against(&store()).unwrap_err();
        assert!(err.to_string().contains("missing word ghost"));
    }

    #[test]
    fn detects_reading_order_break() {
        let maps = maps(&[("0", &["w1", "w0"])]);
        assert!(maps.validate_against(&store()).is_err());
    }

    #[test]
    fn order_across_segments_is_left_to_boundary_derivation() {
        let store = store();
        let maps = maps(&[("0", &["w1", "w2"]), ("1", &["w0"])]);
        maps.validate_against(&store).unwrap();

        let timings = crate::timeline::derive_boundaries(
            &crate::timeline::raw_segments(&store, &maps).unwrap(),
            &crate::types::GapPolicy::default(),
        );
        assert!(timings[1].start_ms > timings[0].end_ms);
    }

    #[test]
    fn rebind_bumps_only_changed_maps() {
        let mut maps = maps(&[("0", &["w0", "w1", "w2"]), ("1", &[])]);
        let changed = maps
            .rebind(
                &[
                    ("0".to_string(), vec!["w0".to_string(), "w1".to_string()]),
                    ("1".to_string(), vec![]),
                ],
                Author::User,
                at(10),
            )
            .unwrap();
        assert_eq!(changed, 1);
        let first = maps.get("0").unwrap();
        assert_eq!(first.map_version, 2);
        assert_eq!(first.author, Author::User);
        assert_eq!(first.updated_at, at(10));
        assert_eq!(maps.get("1").unwrap().map_version, 1);
    }

    #[test]
    fn rejects_duplicate_segment_ids() {
        let result = SegmentWordMaps::new(vec![
            SegmentWordMap::new("0", vec![], at(0)),
            SegmentWordMap::new("0", vec![], at(0)),
        ]);
        assert!(result.is_err());
    }
}
