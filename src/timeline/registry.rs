//! Explicit track registry owned by the job/track manager.
//!
//! Maps track ids to handles rooted at `<root>/<track_id>/word_timeline.json`.
//! Tracks share nothing; the registry lock only guards the id → handle table
//! and is never held across an edit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::constants::TIMELINE_FILENAME;
use crate::error::{Result, TimelineError};
use crate::timeline::lifecycle::TrackHandle;
use crate::types::TimelinePolicy;

#[derive(Debug)]
pub struct TrackRegistry {
    root: PathBuf,
    policy: TimelinePolicy,
    tracks: Mutex<HashMap<String, TrackHandle>>,
}

impl TrackRegistry {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, policy: TimelinePolicy) -> Self {
        Self {
            root: root.into(),
            policy,
            tracks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Document path for `track_id`; ids that could escape the root are rejected.
    pub fn path_for(&self, track_id: &str) -> Result<PathBuf> {
        let unsafe_id = track_id.is_empty()
            || track_id == "."
            || track_id == ".."
            || track_id.contains(['/', '\\'])
            || track_id.chars().any(char::is_control);
        if unsafe_id {
            return Err(TimelineError::invalid_request(format!(
                "track id {track_id:?} is not a valid directory name"
            )));
        }
        Ok(self.root.join(track_id).join(TIMELINE_FILENAME))
    }

    /// Handle for `track_id`, opening (or creating the directory of) the track on first use.
    pub fn open(&self, track_id: &str) -> Result<TrackHandle> {
        if let Some(handle) = self.get(track_id) {
            return Ok(handle);
        }
        let path = self.path_for(track_id)?;
        if let Some(dir) = path.parent() {
            fs_err::create_dir_all(dir)?;
        }
        let handle = TrackHandle::open(&path, track_id, self.policy.clone())?;

        let mut tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have opened it meanwhile; keep the first handle.
        let handle = tracks
            .entry(track_id.to_string())
            .or_insert(handle)
            .clone();
        Ok(handle)
    }

    #[must_use]
    pub fn get(&self, track_id: &str) -> Option<TrackHandle> {
        let tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        tracks.get(track_id).cloned()
    }

    /// Drop the cached handle. Outstanding clones keep working.
    pub fn close(&self, track_id: &str) -> bool {
        let mut tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        tracks.remove(track_id).is_some()
    }

    /// Ids of currently open tracks, sorted.
    #[must_use]
    pub fn open_tracks(&self) -> Vec<String> {
        let tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = tracks.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_escaping_ids() {
        let registry = TrackRegistry::new("/tmp/tracks", TimelinePolicy::default());
        assert!(registry.path_for("../etc").is_err());
        assert!(registry.path_for("").is_err());
        assert!(registry.path_for("job-42").is_ok());
    }

    #[test]
    fn open_reuses_handle_and_creates_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = TrackRegistry::new(dir.path(), TimelinePolicy::default());
        let first = registry.open("job-1").expect("open");
        let second = registry.open("job-1").expect("open again");
        assert!(dir.path().join("job-1").is_dir());
        assert_eq!(first.track_id(), second.track_id());
        assert_eq!(registry.open_tracks(), vec!["job-1".to_string()]);
        assert!(registry.close("job-1"));
        assert!(registry.get("job-1").is_none());
    }
}
