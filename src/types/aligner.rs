//! Outbound interface to the external transcription/alignment backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::common::{Millis, TimeWindow};
use crate::error::AlignerError;

/// What the orchestrator asks the aligner to do for one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignRequest {
    pub track_id: String,
    pub window: TimeWindow,
    /// Text expected inside the window, in reading order, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedSyllable {
    pub text: String,
    pub start_ms: Millis,
    pub end_ms: Millis,
    pub confidence: f64,
}

/// One word as returned by the aligner, on absolute track time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedWord {
    pub surface: String,
    pub start_ms: Millis,
    pub end_ms: Millis,
    pub confidence: f64,
    #[serde(default)]
    pub syllables: Vec<AlignedSyllable>,
}

impl AlignedWord {
    #[must_use]
    pub fn new(surface: impl Into<String>, start_ms: Millis, end_ms: Millis, confidence: f64) -> Self {
        Self {
            surface: surface.into(),
            start_ms,
            end_ms,
            confidence,
            syllables: Vec::new(),
        }
    }
}

/// External aligner collaborator.
///
/// Implementations may be slow and unreliable; the orchestrator wraps every
/// call in a timeout and a cancellation check and never commits partial output.
#[async_trait]
pub trait Aligner: Send + Sync {
    /// Provider tag recorded on committed runs.
    fn provider(&self) -> &str;

    fn provider_version(&self) -> &str;

    /// Align the audio inside `request.window`, returning words in time order.
    async fn align(&self, request: AlignRequest) -> Result<Vec<AlignedWord>, AlignerError>;
}
