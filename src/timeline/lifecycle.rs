//! Per-track handle: single writer, many readers.
//!
//! Responsibilities:
//! - Open a persisted timeline (or start empty) and remember where it lives.
//! - Serialize edits and rebuilds through a FIFO queue; concurrent callers
//!   wait their turn instead of being rejected.
//! - Publish a new snapshot only after it persisted, so readers never see
//!   state that is not on disk and never block on an in-flight aligner call.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TimelineError};
use crate::io::{load_document, save_document};
use crate::timeline::build::{BuildReport, Built, build_from_segments, rebuild_with_aligner};
use crate::timeline::edit::execute_edit;
use crate::timeline::track::{SegmentWord, TimelineMetrics, TrackTimeline};
use crate::types::{
    Aligner, EditRequest, EditResponse, Millis, SegmentTiming, SourceSegment, TimelinePolicy,
};

/// Cheap to clone; clones share the same track.
#[derive(Clone)]
pub struct TrackHandle {
    inner: Arc<TrackInner>,
}

struct TrackInner {
    track_id: String,
    path: Option<PathBuf>,
    policy: TimelinePolicy,
    state: RwLock<Arc<TrackTimeline>>,
    edit_queue: Mutex<()>,
}

impl std::fmt::Debug for TrackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackHandle")
            .field("track_id", &self.inner.track_id)
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl TrackHandle {
    /// Wrap an in-memory timeline that is never written to disk.
    #[must_use]
    pub fn in_memory(timeline: TrackTimeline, policy: TimelinePolicy) -> Self {
        Self::from_parts(None, timeline, policy)
    }

    /// Open the document at `path`, or start an empty timeline if none exists.
    ///
    /// A document for a different track id is rejected.
    #[tracing::instrument(level = "debug", skip_all, fields(track.id = track_id))]
    pub fn open(path: impl AsRef<Path>, track_id: &str, policy: TimelinePolicy) -> Result<Self> {
        let path = path.as_ref();
        let timeline = match load_document(path)? {
            Some(document) => {
                if document.track_id != track_id {
                    return Err(TimelineError::invariant(
                        "track.open",
                        format!(
                            "{} holds track {}, expected {track_id}",
                            path.display(),
                            document.track_id
                        ),
                    ));
                }
                TrackTimeline::from_document(document)?
            }
            None => TrackTimeline::new(track_id, None),
        };
        tracing::debug!(
            track.id = track_id,
            track.runs = timeline.store().runs().len(),
            track.segments = timeline.maps().len(),
            "track opened"
        );
        Ok(Self::from_parts(Some(path.to_path_buf()), timeline, policy))
    }

    /// Persist `timeline` at `path` and return a handle to it.
    pub fn create(path: impl AsRef<Path>, timeline: TrackTimeline, policy: TimelinePolicy) -> Result<Self> {
        let path = path.as_ref();
        save_document(path, &timeline.to_document())?;
        Ok(Self::from_parts(Some(path.to_path_buf()), timeline, policy))
    }

    fn from_parts(path: Option<PathBuf>, timeline: TrackTimeline, policy: TimelinePolicy) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                track_id: timeline.track_id().to_string(),
                path,
                policy,
                state: RwLock::new(Arc::new(timeline)),
                edit_queue: Mutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn track_id(&self) -> &str {
        &self.inner.track_id
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    #[must_use]
    pub fn policy(&self) -> &TimelinePolicy {
        &self.inner.policy
    }

    /// Current published state. Never waits on an edit in progress.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TrackTimeline> {
        let guard = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn segment_timings(&self) -> Result<Vec<SegmentTiming>> {
        self.snapshot().segment_timings(&self.inner.policy.gap)
    }

    pub fn words_for_segment(&self, segment_id: &str) -> Result<Vec<SegmentWord>> {
        self.snapshot().words_for_segment(segment_id)
    }

    #[must_use]
    pub fn metrics(&self) -> TimelineMetrics {
        self.snapshot().metrics(&self.inner.policy.quality)
    }

    /// Apply one edit batch.
    ///
    /// On any error the published state and the file on disk are exactly
    /// what they were before the call, except for
    /// [`TimelineError::PartialRealign`] under the keep-committed policy,
    /// where the successful windows were persisted and published.
    #[tracing::instrument(skip_all, fields(track.id = %self.inner.track_id, edit.segments = request.edits().len()))]
    pub async fn apply_edit(
        &self,
        request: &EditRequest,
        aligner: &dyn Aligner,
        cancel: &CancellationToken,
    ) -> Result<EditResponse> {
        let _writer = self.inner.edit_queue.lock().await;
        let current = self.snapshot();
        let outcome = execute_edit(
            &current,
            request,
            aligner,
            &self.inner.policy,
            cancel,
            Utc::now(),
        )
        .await?;
        if cancel.is_cancelled() {
            return Err(TimelineError::Cancelled);
        }
        self.publish(outcome.timeline)?;
        match outcome.partial {
            Some(partial) => Err(partial.into()),
            None => Ok(outcome.response),
        }
    }

    /// Replace the timeline with one bootstrapped from `segments`.
    #[tracing::instrument(skip_all, fields(track.id = %self.inner.track_id, build.segments = segments.len()))]
    pub async fn rebuild(
        &self,
        segments: &[SourceSegment],
        track_duration_ms: Option<Millis>,
        updated_at: DateTime<Utc>,
    ) -> Result<BuildReport> {
        let _writer = self.inner.edit_queue.lock().await;
        let Built { timeline, report } = build_from_segments(
            &self.inner.track_id,
            segments,
            &self.inner.policy,
            track_duration_ms,
            updated_at,
        )?;
        self.publish(timeline)?;
        Ok(report)
    }

    /// Replace the timeline with one aligned from scratch by `aligner`.
    #[tracing::instrument(skip_all, fields(track.id = %self.inner.track_id, build.segments = segments.len()))]
    pub async fn rebuild_with_aligner(
        &self,
        segments: &[SourceSegment],
        aligner: &dyn Aligner,
        track_duration_ms: Option<Millis>,
        cancel: &CancellationToken,
        updated_at: DateTime<Utc>,
    ) -> Result<BuildReport> {
        let _writer = self.inner.edit_queue.lock().await;
        let Built { timeline, report } = rebuild_with_aligner(
            &self.inner.track_id,
            segments,
            aligner,
            &self.inner.policy,
            track_duration_ms,
            cancel,
            updated_at,
        )
        .await?;
        if cancel.is_cancelled() {
            return Err(TimelineError::Cancelled);
        }
        self.publish(timeline)?;
        Ok(report)
    }

    /// Persist, then swap the published snapshot. A failed write publishes nothing.
    fn publish(&self, timeline: TrackTimeline) -> Result<()> {
        if let Some(path) = &self.inner.path {
            save_document(path, &timeline.to_document())?;
        }
        let mut guard = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(timeline);
        Ok(())
    }
}
