//! On-disk representation of a track timeline.

pub mod document;

pub use document::{TimelineDocument, load_document, save_document};
