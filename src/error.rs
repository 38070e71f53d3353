use std::path::PathBuf;

use thiserror::Error;

use crate::types::TimeWindow;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, TimelineError>;

/// Failure modes of the external aligner collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlignerError {
    #[error("aligner timed out after {budget_ms} ms")]
    Timeout { budget_ms: u64 },
    #[error("aligner transport error: {0}")]
    Transport(String),
    #[error("malformed aligner response: {0}")]
    Malformed(String),
}

/// One window of a multi-window realign that did not make it into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowFailure {
    pub window: TimeWindow,
    pub error: AlignerError,
}

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("segment {segment_id}: cannot tokenize text: {reason}")]
    Tokenization { segment_id: String, reason: String },

    #[error("invalid edit request: {reason}")]
    InvalidRequest { reason: String },

    #[error("invariant violation in {context}: {reason}")]
    InvariantViolation {
        context: &'static str,
        reason: String,
    },

    #[error("aligner failed for window {window}: {source}")]
    Aligner {
        window: TimeWindow,
        #[source]
        source: AlignerError,
    },

    #[error(
        "realign partially failed: {} window(s) committed, {} window(s) failed",
        committed.len(),
        failed.len()
    )]
    PartialRealign {
        committed: Vec<TimeWindow>,
        failed: Vec<WindowFailure>,
    },

    #[error("edit cancelled before commit")]
    Cancelled,

    #[error("failed to persist timeline to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TimelineError {
    pub(crate) fn invariant(context: &'static str, reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            context,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub(crate) fn tokenization(segment_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Tokenization {
            segment_id: segment_id.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    /// Whether the caller may resubmit the same edit unchanged.
    ///
    /// Aligner, cancellation and persistence failures leave the track at its
    /// last persisted state, so an identical retry is safe. Input and
    /// invariant errors will fail the same way again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Aligner { .. }
                | Self::PartialRealign { .. }
                | Self::Cancelled
                | Self::Persistence { .. }
                | Self::Io(_)
        )
    }
}
