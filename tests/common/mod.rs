//! Shared fixtures for the integration tests.
//!
//! `ScriptedAligner` plays the part of the transcription backend: it "hears"
//! a fixed list of words on the track and returns the ones that lie fully
//! inside the requested window, unless told to misbehave.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use word_timeline_core::{
    AlignRequest, AlignedWord, Aligner, AlignerError, Millis, SourceSegment, SourceWord,
    TimelinePolicy, TrackHandle,
    timeline::build_from_segments,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Return the heard words inside the window.
    Transcribe,
    /// Return nothing at all.
    Silent,
    /// Fail every call with a transport error.
    Fail,
    /// Fail windows starting at or after the given time, transcribe the rest.
    FailFrom(Millis),
    /// Never answer.
    Hang,
}

pub struct ScriptedAligner {
    heard: Mutex<Vec<AlignedWord>>,
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
    requests: Mutex<Vec<AlignRequest>>,
}

impl ScriptedAligner {
    pub fn new(heard: Vec<AlignedWord>) -> Self {
        Self {
            heard: Mutex::new(heard),
            behavior: Mutex::new(Behavior::Transcribe),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(self, behavior: Behavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Replace what the backend hears from now on.
    pub fn set_heard(&self, heard: Vec<AlignedWord>) {
        *self.heard.lock().unwrap() = heard;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<AlignRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn transcribe(&self, request: &AlignRequest) -> Vec<AlignedWord> {
        self.heard
            .lock()
            .unwrap()
            .iter()
            .filter(|word| request.window.contains_span(word.start_ms, word.end_ms))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Aligner for ScriptedAligner {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn provider_version(&self) -> &str {
        "1"
    }

    async fn align(&self, request: AlignRequest) -> Result<Vec<AlignedWord>, AlignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::Transcribe => Ok(self.transcribe(&request)),
            Behavior::Silent => Ok(Vec::new()),
            Behavior::Fail => Err(AlignerError::Transport("connection reset".into())),
            Behavior::FailFrom(ms) if request.window.start_ms >= ms => {
                Err(AlignerError::Transport("backend unavailable".into()))
            }
            Behavior::FailFrom(_) => Ok(self.transcribe(&request)),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

pub fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap()
}

pub fn word(surface: &str, start_ms: Millis, end_ms: Millis) -> SourceWord {
    SourceWord {
        surface: surface.to_string(),
        start_ms,
        end_ms,
        confidence: 0.9,
    }
}

pub fn heard(surface: &str, start_ms: Millis, end_ms: Millis) -> AlignedWord {
    AlignedWord::new(surface, start_ms, end_ms, 0.92)
}

pub fn segment(id: &str, text: &str, words: Vec<SourceWord>) -> SourceSegment {
    let start_ms = words.first().map_or(0, |w| w.start_ms);
    let end_ms = words.last().map_or(0, |w| w.end_ms);
    SourceSegment {
        segment_id: id.to_string(),
        text: text.to_string(),
        start_ms,
        end_ms,
        words,
    }
}

/// "Nur Meine" / "Regeln Bleiben. Die" with five timed words.
pub fn two_segments() -> Vec<SourceSegment> {
    vec![
        segment("0", "Nur Meine", vec![word("Nur", 0, 500), word("Meine", 500, 1200)]),
        segment("1", "Regeln Bleiben. Die", vec![
            word("Regeln", 1200, 2000),
            word("Bleiben.", 2000, 2800),
            word("Die", 2800, 4000),
        ]),
    ]
}

/// The audio of [`two_segments`] after the singer's line became "Nur Deine".
pub fn heard_nur_deine() -> Vec<AlignedWord> {
    vec![
        heard("Nur", 0, 500),
        heard("Deine", 500, 1200),
        heard("Regeln", 1200, 2000),
        heard("Bleiben.", 2000, 2800),
        heard("Die", 2800, 4000),
    ]
}

pub fn handle_for(segments: &[SourceSegment], policy: TimelinePolicy) -> TrackHandle {
    let built = build_from_segments("track-1", segments, &policy, None, at()).unwrap();
    TrackHandle::in_memory(built.timeline, policy)
}

pub fn surfaces(handle: &TrackHandle, segment_id: &str) -> Vec<String> {
    handle
        .words_for_segment(segment_id)
        .unwrap()
        .into_iter()
        .map(|w| w.surface)
        .collect()
}

pub fn bounds(handle: &TrackHandle) -> Vec<(Millis, Millis)> {
    handle
        .segment_timings()
        .unwrap()
        .into_iter()
        .map(|t| (t.start_ms, t.end_ms))
        .collect()
}
