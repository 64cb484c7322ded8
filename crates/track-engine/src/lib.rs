//! Track Engine - Animatable tracks built from time-ordered observations
//!
//! This library turns point observations into continuous trajectories that can be
//! played back along a timeline. Coordinates are stored in compact strided buffers,
//! split at the antimeridian for display, and queried with a cursor that produces
//! the visible sub-path and an interpolated position marker for any time window.
//!
//! # Architecture
//!
//! - **[`CoordinateBuffer`]**: Flat `lon, lat, [alt], sort` storage with binary search by sort value
//! - **[`TrackGeometry`]**: One logical path, possibly split into segments
//! - **[`TrackCursor`]**: Windowing and marker interpolation during playback
//! - **[`TrackEntity`]**: The aggregate owning geometry, statistics, cursor and metadata
//! - **[`TrackBuilder`]**: Builds and extends tracks from feature-like records
//!
//! # Performance Characteristics
//!
//! - **Window update**: O(log N + K) where K = samples inside the window
//! - **Append**: O(M log N + N) for M new samples (merge, splice, re-split)
//! - **Statistics**: O(N) distance pass, O(1) duration

mod antimeridian;
mod buffer;
mod builder;
mod cursor;
mod entity;
mod geometry;
pub mod geodesy;
mod record;
pub mod stats;

// Public API exports
pub use antimeridian::{MergedPath, merge_segments, split_on_antimeridian};
pub use buffer::{
    Coordinate, CoordinateBuffer, Layout, binary_search_by_sort_value, encode_search_result,
};
pub use builder::{
    Config, DEFAULT_TRACK_ID_FIELD, ExtractReport, ExtractedPoint, Extraction, RejectReason,
    Rejection, SplitOutcome, TrackBuilder, TrackResolver,
};
pub use cursor::{CursorState, SkipReason, TrackCursor, UpdateOutcome, Window, position_at};
pub use entity::{
    AppendOutcome, RecordRef, TrackEntity, TrackOptions, TrackSnapshot, TrackSource, TrackStyle,
};
pub use geometry::{Boundary, TrackGeometry};
pub use record::{Attributes, Feature, FieldValue, SortField, TrackRecord};
pub use stats::TrackStatistics;

/// Error types for track construction and mutation
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("No usable coordinates could be extracted")]
    NoGeometry,

    #[error("Sort field `{0}` has no values on any record")]
    SortFieldUnresolved(String),

    #[error("Track has been disposed")]
    Disposed,

    #[error("Layout mismatch: expected {expected:?}, found {found:?}")]
    LayoutMismatch { expected: Layout, found: Layout },
}

pub type Result<T> = std::result::Result<T, TrackError>;
