//! TrackEntity - A track with its geometry, statistics, cursor and metadata
//!
//! The entity is the unit the host application works with: it is created from
//! coordinates or records, grows with [`append`](TrackEntity::append), shrinks with
//! [`clamp`](TrackEntity::clamp) and follows the timeline through
//! [`update_window`](TrackEntity::update_window) while animating.
//!
//! Every mutation works on the merged (contiguous) path and re-splits it at the
//! antimeridian afterwards, replacing the displayed geometry.

use crate::builder::{ExtractReport, ExtractedPoint, RejectReason, Rejection, TrackBuilder};
use crate::geodesy::Haversine;
use crate::{
    Attributes, Coordinate, CoordinateBuffer, FieldValue, Layout, MergedPath, Result, SkipReason,
    SortField, TrackCursor, TrackError, TrackGeometry, TrackRecord, TrackStatistics,
    UpdateOutcome, merge_segments, split_on_antimeridian,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

fn next_track_id() -> String {
    format!("track-{}", NEXT_TRACK_ID.fetch_add(1, AtomicOrdering::Relaxed))
}

/// A record borrowed for track construction
pub type RecordRef<'a> = &'a (dyn TrackRecord + Sync);

/// Input of [`TrackEntity::create`] and [`TrackEntity::append`]
pub enum TrackSource<'a> {
    /// Explicit coordinates, in any order
    Coordinates(Vec<Coordinate>),
    /// Several physical tracks joined into one multi-track
    Tracks(Vec<Vec<Coordinate>>),
    /// Feature-like records; points and metadata are extracted from them
    Records(Vec<RecordRef<'a>>),
}

impl<'a> TrackSource<'a> {
    pub fn records<R: TrackRecord + Sync>(records: &'a [R]) -> Self {
        TrackSource::Records(records.iter().map(|r| r as RecordRef<'a>).collect())
    }
}

/// Display flags of a track
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackStyle {
    pub show_line: bool,
    pub show_marker: bool,
    /// Interpolate the marker between samples instead of snapping to the older one
    pub interpolate_marker: bool,
}

impl Default for TrackStyle {
    fn default() -> Self {
        Self {
            show_line: true,
            show_marker: true,
            interpolate_marker: true,
        }
    }
}

/// How a new track is identified, ordered and displayed
#[derive(Clone, Debug, PartialEq)]
pub struct TrackOptions {
    /// Unique id; generated when `None`
    pub id: Option<String>,
    /// Display name; defaults to the id
    pub name: Option<String>,
    pub sort_field: SortField,
    pub style: TrackStyle,
    /// Keep each record's attributes, keyed by sort value
    pub include_metadata: bool,
    /// Record field naming the segment a sample belongs to; a change of value
    /// between consecutive samples is a gap in the track
    pub segment_field: Option<String>,
}

impl TrackOptions {
    pub fn new(sort_field: SortField) -> Self {
        Self {
            id: None,
            name: None,
            sort_field,
            style: TrackStyle::default(),
            include_metadata: true,
            segment_field: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_style(mut self, style: TrackStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_metadata(mut self, include_metadata: bool) -> Self {
        self.include_metadata = include_metadata;
        self
    }

    pub fn with_segment_field(mut self, field: impl Into<String>) -> Self {
        self.segment_field = Some(field.into());
        self
    }
}

/// What an append did with each input item, by input index
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppendOutcome {
    /// Items that were inserted
    pub added: Vec<usize>,
    /// Items skipped because their sort value was already present
    pub duplicates: Vec<usize>,
    /// Items that had no usable point or sort value
    pub rejected: Vec<Rejection>,
    /// Layout of the input when it differs from the track's; altitudes were
    /// dropped or filled in to match the track
    pub layout_mismatch: Option<Layout>,
}

impl AppendOutcome {
    #[inline]
    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    #[inline]
    pub fn skipped_count(&self) -> usize {
        self.duplicates.len() + self.rejected.len()
    }
}

/// Read-only copy of a track's data for persistence
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackSnapshot {
    pub id: String,
    pub name: String,
    pub sort_field: String,
    pub layout: Layout,
    pub coordinates: Vec<Coordinate>,
    pub gaps: Vec<f64>,
    pub metadata: Vec<(f64, Attributes)>,
}

/// Metadata key with a total order over sort values
#[derive(Clone, Copy, Debug)]
struct SortKey(f64);

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One track or sub-track
#[derive(Clone, Debug)]
pub struct TrackEntity {
    id: String,
    name: String,
    sort_field: SortField,
    style: TrackStyle,
    include_metadata: bool,
    segment_field: Option<String>,
    geometry: TrackGeometry,
    metadata: BTreeMap<SortKey, Attributes>,
    cursor: TrackCursor,
    statistics: TrackStatistics,
    /// Sort value of the marker, used to find the current attributes
    current: Option<f64>,
}

/// Coordinates with their input index, gaps, and a report of skipped input
struct Collected {
    points: Vec<ExtractedPoint>,
    gaps: Vec<f64>,
    layout: Layout,
    report: ExtractReport,
}

fn collect_source(
    source: TrackSource<'_>,
    sort_field: &SortField,
    include_metadata: bool,
    segment_field: Option<&str>,
) -> Result<Collected> {
    match source {
        TrackSource::Coordinates(coordinates) => Ok(collect_coordinates(coordinates)),
        TrackSource::Tracks(tracks) => {
            // Sort and dedupe each track, then let the multi-track decide where gaps go
            let mut collected = collect_coordinates(tracks.iter().flatten().copied().collect());
            let mut offset = 0;
            let mut buffers = Vec::with_capacity(tracks.len());
            for track in &tracks {
                let range = offset..offset + track.len();
                offset = range.end;
                let mut buffer = CoordinateBuffer::new(collected.layout);
                for point in collected.points.iter().filter(|p| range.contains(&p.index)) {
                    buffer.insert(point.coordinate);
                }
                buffers.push(buffer);
            }
            let merged = merge_segments(&TrackGeometry::multi(buffers)?);
            collected.gaps = merged.gaps;
            Ok(collected)
        }
        TrackSource::Records(records) => {
            let extraction = TrackBuilder::extract_coordinates(records.iter().copied(), sort_field, include_metadata);
            if !records.is_empty() && extraction.report.sort_values_found == 0 {
                return Err(TrackError::SortFieldUnresolved(sort_field.to_string()));
            }
            let gaps = segment_field
                .map(|field| segment_gaps(&records, &extraction.points, field))
                .unwrap_or_default();
            Ok(Collected {
                points: extraction.points,
                gaps,
                layout: extraction.layout,
                report: extraction.report,
            })
        }
    }
}

/// Sort values after which the segment field changes between consecutive samples
fn segment_gaps(records: &[RecordRef<'_>], points: &[ExtractedPoint], field: &str) -> Vec<f64> {
    let mut ordered: Vec<(f64, Option<&FieldValue>)> = points
        .iter()
        .map(|p| {
            let segment = records.get(p.index).and_then(|record| record.get(field));
            (p.coordinate.sort, segment)
        })
        .collect();
    ordered.sort_by(|a, b| a.0.total_cmp(&b.0));
    ordered
        .windows(2)
        .filter(|pair| pair[0].0 < pair[1].0 && pair[0].1 != pair[1].1)
        .map(|pair| pair[0].0)
        .collect()
}

fn collect_coordinates(coordinates: Vec<Coordinate>) -> Collected {
    let mut report = ExtractReport::default();
    let mut points = Vec::with_capacity(coordinates.len());
    for (index, coordinate) in coordinates.into_iter().enumerate() {
        if !coordinate.sort.is_finite() {
            report.reject(index, None, RejectReason::MissingSortValue);
        } else if !coordinate.lon.is_finite() || !coordinate.lat.is_finite() {
            report.reject(index, None, RejectReason::MissingGeometry);
        } else {
            report.sort_values_found += 1;
            points.push(ExtractedPoint {
                index,
                id: None,
                coordinate,
                attributes: None,
            });
        }
    }
    let layout = if points.iter().any(|p| p.coordinate.alt.is_some()) {
        Layout::Xyzm
    } else {
        Layout::Xym
    };
    Collected {
        points,
        gaps: Vec::new(),
        layout,
        report,
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackEntity {
    /// Build a track from coordinates or records
    ///
    /// Fails with [`TrackError::SortFieldUnresolved`] when no record has a value for
    /// the sort field, and with [`TrackError::NoGeometry`] when no coordinate could be
    /// extracted. Skipped input is listed in the returned report.
    pub fn create(options: TrackOptions, source: TrackSource<'_>) -> Result<(Self, ExtractReport)> {
        profiling::scope!("track::create");
        let mut collected = collect_source(
            source,
            &options.sort_field,
            options.include_metadata,
            options.segment_field.as_deref(),
        )?;

        collected
            .points
            .sort_by(|a, b| a.coordinate.sort.total_cmp(&b.coordinate.sort));

        let mut coordinates = CoordinateBuffer::with_capacity(collected.layout, collected.points.len());
        let mut metadata = BTreeMap::new();
        for point in collected.points {
            if coordinates.last().is_some_and(|last| last.sort == point.coordinate.sort) {
                collected
                    .report
                    .reject(point.index, point.id, RejectReason::DuplicateSortValue);
                continue;
            }
            coordinates.push(point.coordinate);
            if let Some(attributes) = point.attributes {
                metadata.insert(SortKey(point.coordinate.sort), attributes);
            }
        }
        collected.report.accepted = coordinates.len();

        if coordinates.is_empty() {
            return Err(TrackError::NoGeometry);
        }

        let id = options.id.unwrap_or_else(next_track_id);
        let name = options.name.unwrap_or_else(|| id.clone());
        let geometry = split_on_antimeridian(MergedPath {
            coordinates,
            gaps: collected.gaps,
        });
        let statistics =
            TrackStatistics::compute(&geometry, options.sort_field.is_temporal(), &Haversine);
        let mut cursor = TrackCursor::new(options.style.interpolate_marker);
        cursor.show_full(&geometry);

        tracing::debug!(
            id = %id,
            points = collected.report.accepted,
            skipped = collected.report.rejected.len(),
            segments = geometry.segment_ranges().len(),
            "Created track"
        );

        let mut track = Self {
            id,
            name,
            sort_field: options.sort_field,
            style: options.style,
            include_metadata: options.include_metadata,
            segment_field: options.segment_field,
            geometry,
            metadata,
            cursor,
            statistics,
            current: None,
        };
        track.current = track.cursor.marker().map(|m| m.sort);
        Ok((track, collected.report))
    }

    /// Insert new samples, skipping sort values the track already has
    ///
    /// Safe to call repeatedly with overlapping input: every sort value is inserted at
    /// most once.
    pub fn append(&mut self, source: TrackSource<'_>) -> Result<AppendOutcome> {
        profiling::scope!("track::append");
        if self.is_disposed() {
            return Err(TrackError::Disposed);
        }
        let collected = collect_source(
            source,
            &self.sort_field,
            self.include_metadata,
            self.segment_field.as_deref(),
        )?;
        let layout_mismatch =
            (!collected.points.is_empty() && collected.layout != self.layout()).then_some(collected.layout);
        if let Some(found) = layout_mismatch {
            tracing::warn!(
                track = %self.id,
                expected = ?self.layout(),
                ?found,
                "Appending coordinates with a different layout"
            );
        }

        let mut outcome = AppendOutcome {
            rejected: collected.report.rejected,
            layout_mismatch,
            ..Default::default()
        };
        let mut path = merge_segments(&self.geometry);
        let gaps_before = path.gaps.len();
        path.gaps.extend(collected.gaps);
        path.gaps.sort_by(f64::total_cmp);
        path.gaps.dedup();
        let gaps_added = path.gaps.len() > gaps_before;
        for point in collected.points {
            let mut coordinate = point.coordinate;
            coordinate.lon = crate::buffer::normalize_longitude(coordinate.lon);
            match path.coordinates.insert(coordinate) {
                Some(_) => {
                    outcome.added.push(point.index);
                    if let Some(attributes) = point.attributes {
                        self.metadata.insert(SortKey(coordinate.sort), attributes);
                    }
                }
                None => outcome.duplicates.push(point.index),
            }
        }

        tracing::debug!(
            track = %self.id,
            added = outcome.added_count(),
            skipped = outcome.skipped_count(),
            "Appended to track"
        );

        if !outcome.added.is_empty() || gaps_added {
            self.replace_geometry(split_on_antimeridian(path));
        }
        Ok(outcome)
    }

    /// Truncate the track to sort values in `[start, end]`
    ///
    /// This is a hard cut at the nearest samples inside the range, without
    /// interpolation. Returns false if nothing was removed.
    pub fn clamp(&mut self, start: f64, end: f64) -> bool {
        if self.is_disposed() {
            return false;
        }
        let (start, end) = if start <= end { (start, end) } else { (end, start) };

        let mut path = merge_segments(&self.geometry);
        let range = path.coordinates.sort_range(start, end);
        if !path.coordinates.retain_range(range) {
            tracing::trace!(track = %self.id, "Clamp did not shrink the track");
            return false;
        }

        self.metadata
            .retain(|key, _| key.0 >= start && key.0 <= end);
        path.gaps.retain(|gap| *gap >= start && *gap <= end);
        self.replace_geometry(split_on_antimeridian(path));
        true
    }

    /// Start following the timeline; no-op for tracks not sorted by time
    pub fn enter_animating(&mut self) -> bool {
        if !self.is_animatable() {
            return false;
        }
        self.cursor.enter(self.layout())
    }

    /// Stop following the timeline and show the whole track again
    pub fn exit_animating(&mut self) -> bool {
        if !self.cursor.exit(&self.geometry) {
            return false;
        }
        self.statistics.reset_elapsed();
        self.current = self.cursor.marker().map(|m| m.sort);
        true
    }

    /// Apply a timeline window
    pub fn update_window(&mut self, start: f64, end: f64) -> UpdateOutcome {
        if !self.is_animatable() {
            return UpdateOutcome::Skipped(SkipReason::NotAnimatable);
        }

        profiling::scope!("track::update_window");

        let outcome = self.cursor.update_window(&self.geometry, start, end);
        if outcome == UpdateOutcome::Rebuilt {
            self.sync_with_cursor();
        }
        outcome
    }

    /// Tear the track down, releasing the cursor line and metadata
    pub fn dispose(&mut self) {
        self.cursor.dispose();
        self.metadata.clear();
        self.current = None;
    }

    pub fn set_interpolate(&mut self, interpolate: bool) {
        self.style.interpolate_marker = interpolate;
        self.cursor.set_interpolate(interpolate);
        if self.cursor.refresh(&self.geometry) == UpdateOutcome::Rebuilt {
            self.sync_with_cursor();
        }
    }

    pub fn set_style(&mut self, style: TrackStyle) {
        self.set_interpolate(style.interpolate_marker);
        self.style = style;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    fn replace_geometry(&mut self, geometry: TrackGeometry) {
        self.geometry = geometry;
        self.statistics =
            TrackStatistics::compute(&self.geometry, self.is_animatable(), &Haversine);
        self.cursor.refresh(&self.geometry);
        self.sync_with_cursor();
    }

    /// Pull elapsed statistics and the current sort value from the cursor
    fn sync_with_cursor(&mut self) {
        match self.cursor.line() {
            Some(line) if self.cursor.is_windowed() => {
                self.statistics
                    .update_elapsed(line, self.is_animatable(), &Haversine)
            }
            _ => self.statistics.reset_elapsed(),
        }
        self.current = self.cursor.marker().map(|m| m.sort);
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn sort_field(&self) -> &SortField {
        &self.sort_field
    }

    /// Whether the cursor can be driven by a timeline
    #[inline]
    pub fn is_animatable(&self) -> bool {
        self.sort_field.is_temporal()
    }

    #[inline]
    pub fn is_animating(&self) -> bool {
        self.cursor.is_windowed()
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.cursor.state() == crate::CursorState::Disposed
    }

    #[inline]
    pub fn style(&self) -> TrackStyle {
        self.style
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.geometry.layout()
    }

    /// Displayed geometry, split at the antimeridian
    #[inline]
    pub fn geometry(&self) -> &TrackGeometry {
        &self.geometry
    }

    /// The whole track as one contiguous path
    pub fn merged(&self) -> MergedPath {
        merge_segments(&self.geometry)
    }

    #[inline]
    pub fn cursor(&self) -> &TrackCursor {
        &self.cursor
    }

    #[inline]
    pub fn statistics(&self) -> &TrackStatistics {
        &self.statistics
    }

    /// Current marker position
    #[inline]
    pub fn marker(&self) -> Option<Coordinate> {
        self.cursor.marker()
    }

    /// Whether the marker should be drawn
    pub fn is_marker_visible(&self) -> bool {
        self.style.show_marker && self.cursor.is_marker_visible()
    }

    /// Visible sub-path while animating
    #[inline]
    pub fn current_line(&self) -> Option<&TrackGeometry> {
        self.cursor.line()
    }

    /// Attributes of the sample at the marker
    ///
    /// For temporal tracks an interpolated marker has no sample of its own, so the
    /// closest older sample is used. Other tracks only match exact sort values.
    pub fn current_attributes(&self) -> Option<&Attributes> {
        let current = SortKey(self.current?);
        if self.is_animatable() {
            self.metadata
                .range(..=current)
                .next_back()
                .map(|(_, attributes)| attributes)
        } else {
            self.metadata.get(&current)
        }
    }

    /// Attributes stored for an exact sort value
    pub fn metadata(&self, sort: f64) -> Option<&Attributes> {
        self.metadata.get(&SortKey(sort))
    }

    /// Whether the geometry or the visible line must be redrawn
    pub fn is_dirty(&self) -> bool {
        self.geometry.is_dirty() || self.cursor.line().is_some_and(TrackGeometry::is_dirty)
    }

    /// Return the dirty state and clear it
    pub fn take_dirty(&mut self) -> bool {
        let geometry = self.geometry.take_dirty();
        let line = self
            .cursor
            .line_mut()
            .is_some_and(TrackGeometry::take_dirty);
        geometry || line
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        let merged = self.merged();
        TrackSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            sort_field: self.sort_field.to_string(),
            layout: self.layout(),
            coordinates: merged.coordinates.to_vec(),
            gaps: merged.gaps,
            metadata: self
                .metadata
                .iter()
                .map(|(key, attributes)| (key.0, attributes.clone()))
                .collect(),
        }
    }
}
