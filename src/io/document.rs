//! `word_timeline.json`: one pretty-printed JSON document per track.
//!
//! Every collection is a `Vec` in a fixed order, so identical state always
//! serializes to identical bytes. Writes go through an atomic replace; a
//! crash mid-write leaves the previous document in place.

use std::io::{ErrorKind, Write};
use std::path::Path;

use atomic_write_file::AtomicWriteFile;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TimelineError};
use crate::types::{AlignmentRun, Millis, SegmentWordMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineDocument {
    pub track_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_duration_ms: Option<Millis>,
    #[serde(default)]
    pub alignment_runs: Vec<AlignmentRun>,
    #[serde(default)]
    pub segment_word_maps: Vec<SegmentWordMap>,
}

impl TimelineDocument {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)
            .map_err(|err| TimelineError::json("serializing timeline document", err))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| TimelineError::json("parsing timeline document", err))
    }
}

/// Atomically replace `path` with `document`.
///
/// The parent directory must exist. Any I/O failure is reported as
/// [`TimelineError::Persistence`] and leaves the previous file untouched.
#[tracing::instrument(level = "debug", skip_all, fields(track.id = %document.track_id, path = %path.display()))]
pub fn save_document(path: &Path, document: &TimelineDocument) -> Result<()> {
    let bytes = document.to_json_bytes()?;
    let persistence = |source: std::io::Error| TimelineError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    let mut file = AtomicWriteFile::open(path).map_err(persistence)?;
    if let Err(err) = file.write_all(&bytes).and_then(|()| file.flush()) {
        if let Err(discard) = file.discard() {
            tracing::warn!(error = %discard, "failed to discard staged timeline write");
        }
        return Err(persistence(err));
    }
    file.commit().map_err(persistence)?;

    tracing::debug!(
        document.bytes = bytes.len(),
        document.runs = document.alignment_runs.len(),
        document.maps = document.segment_word_maps.len(),
        "timeline document persisted"
    );
    Ok(())
}

/// Read a document; `Ok(None)` when no file exists yet.
pub fn load_document(path: &Path) -> Result<Option<TimelineDocument>> {
    let bytes = match fs_err::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    TimelineDocument::from_json_slice(&bytes).map(Some)
}
