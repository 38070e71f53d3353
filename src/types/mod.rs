//! Public types exposed by the `word-timeline-core` crate.

pub mod aligner;
pub mod common;
pub mod edit;
pub mod mapping;
pub mod options;
pub mod run;
pub mod word;

pub use aligner::{AlignRequest, AlignedSyllable, AlignedWord, Aligner};
pub use common::{Author, Millis, TimeWindow};
pub use edit::{
    EditAction, EditMetrics, EditRequest, EditResponse, SegmentEdit, SegmentTiming, SourceSegment,
    SourceWord,
};
pub use mapping::SegmentWordMap;
pub use options::{
    GapPolicy, MatcherOptions, PartialWindowPolicy, QualityThresholds, RealignOptions,
    TimelinePolicy, TimelinePolicyBuilder, WindowPolicy,
};
pub use run::AlignmentRun;
pub use word::{SyllableToken, Syllables, WordToken};
