//! Edit request/response contracts and build inputs exchanged with the API layer.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use super::common::{Millis, TimeWindow};
use crate::error::{Result, TimelineError};

/// New text for one existing segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEdit {
    pub segment_id: String,
    pub text: String,
}

/// A batch of segment text edits, keyed by segment id.
///
/// On the wire this is a flat JSON object (`{"0": "Nur Meine", ...}`). The
/// batch is re-ordered into reading order before matching, so key order
/// carries no meaning. A key given twice is rejected, not overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(into = "BTreeMap<String, String>")]
pub struct EditRequest {
    edits: Vec<SegmentEdit>,
}

impl EditRequest {
    /// Build a request, rejecting duplicate segment ids.
    pub fn new<I, K, V>(edits: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (segment_id, text) in edits {
            let segment_id = segment_id.into();
            if segment_id.trim().is_empty() {
                return Err(TimelineError::invalid_request("empty segment id"));
            }
            if !seen.insert(segment_id.clone()) {
                return Err(TimelineError::invalid_request(format!(
                    "segment {segment_id} appears more than once"
                )));
            }
            out.push(SegmentEdit {
                segment_id,
                text: text.into(),
            });
        }
        Ok(Self { edits: out })
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        let entries: Entries = serde_json::from_str(payload)
            .map_err(|err| TimelineError::json("parsing edit request", err))?;
        Self::new(entries.0)
    }

    #[must_use]
    pub fn edits(&self) -> &[SegmentEdit] {
        &self.edits
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

impl<'de> Deserialize<'de> for EditRequest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Entries::deserialize(deserializer)?;
        Self::new(entries.0).map_err(serde::de::Error::custom)
    }
}

/// Object entries in wire order, duplicates included.
struct Entries(Vec<(String, String)>);

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Entries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of segment id to text")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Entries, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, String>()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl From<EditRequest> for BTreeMap<String, String> {
    fn from(request: EditRequest) -> Self {
        request
            .edits
            .into_iter()
            .map(|edit| (edit.segment_id, edit.text))
            .collect()
    }
}

/// Which edit path produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    Remap,
    Realign,
}

/// Quality figures attached to an edit response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EditMetrics {
    pub coverage_pct: f64,
    pub avg_confidence: f64,
    pub word_count: usize,
    pub syllable_count: usize,
    pub segment_count: usize,
    #[serde(default)]
    pub remap_only: bool,
    #[serde(default)]
    pub realign_needed: bool,
}

/// Exposed timing of one segment after the gap/clamp policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentTiming {
    pub segment_id: String,
    pub start_ms: Millis,
    pub end_ms: Millis,
    /// `min(start_ms)` of the owned words before policy adjustment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_start_ms: Option<Millis>,
    /// `max(end_ms)` of the owned words before policy adjustment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_end_ms: Option<Millis>,
    pub word_count: usize,
    /// Zero-duration placeholder for a segment that owns no words.
    #[serde(default)]
    pub marker: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditResponse {
    pub action: EditAction,
    pub confidence: f64,
    pub needs_review: bool,
    pub metrics: EditMetrics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub windows: Vec<TimeWindow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<SegmentTiming>,
}

/// Pre-existing word timing carried by a segment at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceWord {
    pub surface: String,
    pub start_ms: Millis,
    pub end_ms: Millis,
    #[serde(default = "default_source_confidence")]
    pub confidence: f64,
}

fn default_source_confidence() -> f64 {
    1.0
}

/// A full segment handed to the build/rebuild interface, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSegment {
    pub segment_id: String,
    pub text: String,
    pub start_ms: Millis,
    pub end_ms: Millis,
    #[serde(default)]
    pub words: Vec<SourceWord>,
}
