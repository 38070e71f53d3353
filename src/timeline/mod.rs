//! Word timeline engine: storage, matching, realignment and derivation.

pub mod boundary;
pub mod build;
pub mod edit;
pub mod lifecycle;
pub mod matcher;
pub mod planner;
pub mod quality;
pub mod realign;
pub mod registry;
pub mod segment_map;
pub mod store;
pub mod syllables;
pub mod track;

pub use boundary::{RawSegment, derive_boundaries, raw_segments};
pub use build::{BuildReport, Built, build_from_segments, rebuild_with_aligner};
pub use edit::{EditOutcome, PartialFailure, execute_edit};
pub use lifecycle::TrackHandle;
pub use matcher::{
    BatchSegment, MatchOutcome, Matcher, RestrictedBinding, SegmentMatch, UnresolvedReason,
    UnresolvedSegment,
};
pub use planner::plan_windows;
pub use quality::{EditAssessment, EditQualityInput, WordQuality, assess_edit};
pub use realign::{AlignedBatch, RunContext, WindowJob, align_windows, params_hash, run_id};
pub use registry::TrackRegistry;
pub use segment_map::SegmentWordMaps;
pub use store::WordTimelineStore;
pub use syllables::{count_syllables, generate_syllables, split_syllables};
pub use track::{SegmentWord, TimelineMetrics, TrackTimeline};
