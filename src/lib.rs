#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Strategic lint exceptions:
//
// Documentation lints: internal helpers are self-describing; the public
// surface carries its own docs.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Cast safety: millisecond values and word counts stay far below the ranges
// where these casts lose information.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
//
// Style/complexity: the edit pipeline reads top to bottom as one function.
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::similar_names)] // start_ms/end_ms, word_id/run_id
//
// Pattern matching
#![allow(clippy::manual_let_else)]
#![allow(clippy::match_same_arms)]
//
// Ergonomics
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::field_reassign_with_default)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::manual_clamp)]
#![allow(clippy::unnecessary_wraps)]

//! Word-level subtitle timing as the single source of truth.
//!
//! Every track owns an append-only store of aligned words and one map per
//! subtitle segment pointing into it. Segment start/end times are always
//! derived from the words they own. Text edits are first remapped onto the
//! existing words; only tokens that cannot be matched trigger a local
//! realignment of the affected time windows.

/// The word-timeline-core crate version (matches `Cargo.toml`).
pub const WORD_TIMELINE_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod constants;
pub mod error;
pub mod io;
pub mod text;
pub mod timeline;
pub mod types;

pub use constants::*;
pub use error::{AlignerError, Result, TimelineError, WindowFailure};
pub use io::{TimelineDocument, load_document, save_document};
pub use text::{TextToken, normalize_token, tokenize_segment, tokenize_words};
pub use timeline::{
    BuildReport, MatchOutcome, Matcher, SegmentWord, SegmentWordMaps, TimelineMetrics,
    TrackHandle, TrackRegistry, TrackTimeline, WordTimelineStore, derive_boundaries,
    plan_windows,
};
pub use types::{
    AlignRequest, AlignedSyllable, AlignedWord, Aligner, AlignmentRun, Author, EditAction,
    EditMetrics, EditRequest, EditResponse, GapPolicy, MatcherOptions, Millis,
    PartialWindowPolicy, QualityThresholds, RealignOptions, SegmentEdit, SegmentTiming,
    SegmentWordMap, SourceSegment, SourceWord, SyllableToken, Syllables, TimeWindow,
    TimelinePolicy, TimelinePolicyBuilder, WindowPolicy, WordToken,
};
