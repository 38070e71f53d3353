use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::Author;

/// Ownership of word tokens by one subtitle segment, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentWordMap {
    pub segment_id: String,
    pub word_ids: Vec<String>,
    pub map_version: u32,
    pub updated_at: DateTime<Utc>,
    pub author: Author,
}

impl SegmentWordMap {
    #[must_use]
    pub fn new(segment_id: impl Into<String>, word_ids: Vec<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            segment_id: segment_id.into(),
            word_ids,
            map_version: 1,
            updated_at,
            author: Author::System,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.word_ids.is_empty()
    }
}
