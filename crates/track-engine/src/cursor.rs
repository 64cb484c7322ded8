//! Timeline cursor: the visible part of a track and its position marker
//!
//! While a timeline plays, every tick supplies a `[start, end]` window. The cursor
//! turns it into the sub-path drawn for that window and a single marker position at
//! `end`. Between two samples the marker is linearly interpolated, or frozen on the
//! older sample when interpolation is off. Segment boundaries are never
//! interpolated across.
//!
//! Ticks that leave the visible line unchanged are detected by comparing the index
//! range and the synthesized end points with the previous tick, so rapid playback
//! doesn't rebuild geometry needlessly.

use crate::geometry::{Break, Breaks};
use crate::{Coordinate, CoordinateBuffer, Layout, TrackGeometry};
use std::ops::Range;

/// A closed sort-value interval, usually a time range
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    /// Window over `[a, b]`, swapping the bounds if needed
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    /// The whole track is shown, the marker sits on the last sample
    Full,
    /// A timeline window is applied
    Windowed,
    /// Torn down; every update is ignored
    Disposed,
}

/// Result of a window update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The visible line and marker were recomputed
    Rebuilt,
    /// The window maps to the same visible line as before
    Unchanged,
    /// Nothing was done
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The track is not sorted by time
    NotAnimatable,
    /// The cursor is not in windowed mode
    NotAnimating,
    /// A window bound was NaN or infinite
    InvalidWindow,
    Disposed,
}

/// What the last window resolved to, used to skip identical rebuilds
#[derive(Clone, Debug, PartialEq)]
struct LineSpan {
    range: Range<usize>,
    head: Option<Coordinate>,
    tail: Option<Coordinate>,
    visible: bool,
}

#[derive(Clone, Debug)]
pub struct TrackCursor {
    state: CursorState,
    interpolate: bool,
    window: Option<Window>,
    line: Option<TrackGeometry>,
    marker: Option<Coordinate>,
    marker_visible: bool,
    span: Option<LineSpan>,
}

/// Position on `geometry` at sort value `t`
///
/// Before the first sample this is the first sample, after the last one the last.
/// Between two samples of one segment the position is interpolated (or the older
/// sample when `interpolate` is false); inside a segment boundary it is the sample
/// closing the earlier segment.
pub fn position_at(geometry: &TrackGeometry, t: f64, interpolate: bool) -> Option<Coordinate> {
    let coordinates = geometry.coordinates();
    if t.is_nan() {
        return None;
    }
    let first = coordinates.first()?;
    let last = coordinates.last()?;
    if t <= first.sort {
        return Some(first);
    }
    if t >= last.sort {
        return Some(last);
    }

    match coordinates.binary_search(t) {
        Ok(index) => coordinates.get(index),
        Err(index) => {
            let before = coordinates.get(index.checked_sub(1)?)?;
            if geometry.boundary_before(index).is_some() {
                return Some(before);
            }
            let after = coordinates.get(index)?;
            Some(between(&before, &after, t, interpolate))
        }
    }
}

/// Interpolated or snapped position at `t` with `before.sort <= t <= after.sort`
fn between(before: &Coordinate, after: &Coordinate, t: f64, interpolate: bool) -> Coordinate {
    let span = after.sort - before.sort;
    if !interpolate || span <= 0.0 {
        return *before;
    }
    let scale = (t - before.sort) / span;
    Coordinate {
        sort: t,
        ..before.lerp(after, scale)
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackCursor {
    pub fn new(interpolate: bool) -> Self {
        Self {
            state: CursorState::Full,
            interpolate,
            window: None,
            line: None,
            marker: None,
            marker_visible: false,
            span: None,
        }
    }

    #[inline]
    pub fn state(&self) -> CursorState {
        self.state
    }

    #[inline]
    pub fn is_windowed(&self) -> bool {
        self.state == CursorState::Windowed
    }

    /// Last window applied while windowed
    #[inline]
    pub fn window(&self) -> Option<Window> {
        self.window
    }

    /// Sub-path visible in the current window (windowed mode only)
    #[inline]
    pub fn line(&self) -> Option<&TrackGeometry> {
        self.line.as_ref()
    }

    pub(crate) fn line_mut(&mut self) -> Option<&mut TrackGeometry> {
        self.line.as_mut()
    }

    #[inline]
    pub fn marker(&self) -> Option<Coordinate> {
        self.marker
    }

    #[inline]
    pub fn is_marker_visible(&self) -> bool {
        self.marker_visible
    }

    #[inline]
    pub fn interpolate(&self) -> bool {
        self.interpolate
    }

    /// Toggle interpolation; the next update rebuilds
    pub fn set_interpolate(&mut self, interpolate: bool) {
        if self.interpolate != interpolate {
            self.interpolate = interpolate;
            self.span = None;
        }
    }

    /// Switch from full to windowed mode with an empty placeholder line
    ///
    /// Returns false if the cursor was not in full mode.
    pub fn enter(&mut self, layout: Layout) -> bool {
        if self.state != CursorState::Full {
            return false;
        }
        self.state = CursorState::Windowed;
        self.line = Some(TrackGeometry::new(CoordinateBuffer::new(layout)));
        self.span = None;
        self.window = None;
        true
    }

    /// Switch back to full mode, dropping the windowed line
    ///
    /// Returns false if the cursor was not windowed.
    pub fn exit(&mut self, geometry: &TrackGeometry) -> bool {
        if self.state != CursorState::Windowed {
            return false;
        }
        self.state = CursorState::Full;
        self.line = None;
        self.span = None;
        self.window = None;
        self.show_full(geometry);
        true
    }

    pub fn dispose(&mut self) {
        self.state = CursorState::Disposed;
        self.line = None;
        self.span = None;
        self.window = None;
        self.marker = None;
        self.marker_visible = false;
    }

    /// Put the marker on the last sample of the whole track
    pub fn show_full(&mut self, geometry: &TrackGeometry) {
        if self.state != CursorState::Full {
            return;
        }
        self.marker = geometry.coordinates().last();
        self.marker_visible = self.marker.is_some();
    }

    /// Recompute after `geometry` changed, reusing the last window
    pub fn refresh(&mut self, geometry: &TrackGeometry) -> UpdateOutcome {
        match (self.state, self.window) {
            (CursorState::Windowed, Some(window)) => {
                self.span = None;
                self.update_window(geometry, window.start, window.end)
            }
            (CursorState::Full, _) => {
                self.show_full(geometry);
                UpdateOutcome::Rebuilt
            }
            (CursorState::Windowed, None) => UpdateOutcome::Unchanged,
            (CursorState::Disposed, _) => UpdateOutcome::Skipped(SkipReason::Disposed),
        }
    }

    /// Apply a `[start, end]` window to `geometry`
    pub fn update_window(&mut self, geometry: &TrackGeometry, start: f64, end: f64) -> UpdateOutcome {
        match self.state {
            CursorState::Disposed => return UpdateOutcome::Skipped(SkipReason::Disposed),
            CursorState::Full => return UpdateOutcome::Skipped(SkipReason::NotAnimating),
            CursorState::Windowed => {}
        }
        if !start.is_finite() || !end.is_finite() {
            tracing::debug!(start, end, "Ignoring window with non-finite bounds");
            return UpdateOutcome::Skipped(SkipReason::InvalidWindow);
        }

        let window = Window::new(start, end);
        self.window = Some(window);

        let coordinates = geometry.coordinates();
        let (Some(first), Some(last)) = (coordinates.first(), coordinates.last()) else {
            let changed = self.marker.is_some() || self.span.is_some();
            self.span = None;
            self.marker = None;
            self.marker_visible = false;
            self.line = Some(TrackGeometry::new(CoordinateBuffer::new(geometry.layout())));
            return if changed {
                UpdateOutcome::Rebuilt
            } else {
                UpdateOutcome::Unchanged
            };
        };

        let span = if window.end < first.sort {
            LineSpan {
                range: 0..1,
                head: None,
                tail: None,
                visible: false,
            }
        } else if window.start > last.sort {
            let n = coordinates.len();
            LineSpan {
                range: n - 1..n,
                head: None,
                tail: None,
                visible: false,
            }
        } else {
            self.resolve_span(geometry, window)
        };

        if self.span.as_ref() == Some(&span) {
            return UpdateOutcome::Unchanged;
        }

        self.marker = span.tail.or_else(|| {
            span.range
                .end
                .checked_sub(1)
                .and_then(|i| coordinates.get(i))
        });
        self.line = Some(Self::build_line(geometry, &span));
        self.marker_visible = span.visible;
        self.span = Some(span);
        UpdateOutcome::Rebuilt
    }

    /// Index range and synthesized end points of a window overlapping the data
    fn resolve_span(&self, geometry: &TrackGeometry, window: Window) -> LineSpan {
        let coordinates = geometry.coordinates();
        let n = coordinates.len();
        let range = coordinates.sort_range(window.start, window.end);

        let head = (range.start > 0
            && range.start < n
            && coordinates.sort_value(range.start) != Some(window.start)
            && geometry.boundary_before(range.start).is_none())
        .then(|| position_at(geometry, window.start, self.interpolate))
        .flatten();

        let tail = (range.end > 0
            && range.end < n
            && coordinates.sort_value(range.end - 1) != Some(window.end)
            && geometry.boundary_before(range.end).is_none())
        .then(|| position_at(geometry, window.end, self.interpolate))
        .flatten();

        let visible = !range.is_empty() || head.is_some() || tail.is_some();
        LineSpan {
            range,
            head,
            tail,
            visible,
        }
    }

    /// Head point, the samples in range (with their inner boundaries) and tail point
    fn build_line(geometry: &TrackGeometry, span: &LineSpan) -> TrackGeometry {
        let source = geometry.coordinates();
        let range = span.range.clone();
        let mut coordinates =
            CoordinateBuffer::with_capacity(source.layout(), range.len() + 2);

        if let Some(head) = span.head {
            coordinates.push(head);
        }
        let offset = coordinates.len();
        coordinates.extend_from(source, range.clone());

        // A snapped tail is the last sample itself
        if let Some(tail) = span.tail {
            let duplicate = coordinates
                .last()
                .is_some_and(|last| last.same_position(&tail) && last.sort == tail.sort);
            if !duplicate {
                coordinates.push(tail);
            }
        }

        let breaks: Breaks = geometry
            .breaks()
            .iter()
            .filter(|b| b.end > range.start && b.end < range.end)
            .map(|b| Break {
                end: b.end - range.start + offset,
                boundary: b.boundary,
            })
            .collect();

        TrackGeometry::from_parts(coordinates, breaks, geometry.is_normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Boundary, split_on_antimeridian};

    fn create_test_geometry(points: &[(f64, f64)]) -> TrackGeometry {
        TrackGeometry::new(CoordinateBuffer::from_sorted(
            Layout::Xym,
            points.iter().map(|&(lon, sort)| Coordinate::new(lon, 0.0, sort)),
        ))
    }

    fn windowed(interpolate: bool) -> TrackCursor {
        let mut cursor = TrackCursor::new(interpolate);
        assert!(cursor.enter(Layout::Xym));
        cursor
    }

    fn line_lons(cursor: &TrackCursor) -> Vec<f64> {
        cursor
            .line()
            .unwrap()
            .coordinates()
            .iter()
            .map(|c| c.lon)
            .collect()
    }

    #[test]
    fn test_state_transitions() {
        let geometry = create_test_geometry(&[(0.0, 0.0), (10.0, 10.0)]);
        let mut cursor = TrackCursor::new(true);
        assert_eq!(cursor.state(), CursorState::Full);
        assert_eq!(
            cursor.update_window(&geometry, 0.0, 5.0),
            UpdateOutcome::Skipped(SkipReason::NotAnimating)
        );

        assert!(cursor.enter(Layout::Xym));
        assert!(!cursor.enter(Layout::Xym));
        assert!(cursor.line().unwrap().is_empty());

        assert!(cursor.exit(&geometry));
        assert_eq!(cursor.state(), CursorState::Full);
        assert!(cursor.line().is_none());
        assert_eq!(cursor.marker().unwrap().lon, 10.0);

        cursor.dispose();
        assert!(!cursor.enter(Layout::Xym));
        assert_eq!(
            cursor.update_window(&geometry, 0.0, 5.0),
            UpdateOutcome::Skipped(SkipReason::Disposed)
        );
    }

    #[test]
    fn test_interpolated_marker() {
        let geometry = create_test_geometry(&[(0.0, 0.0), (10.0, 10.0)]);
        let mut cursor = windowed(true);

        assert_eq!(cursor.update_window(&geometry, 0.0, 5.0), UpdateOutcome::Rebuilt);
        let marker = cursor.marker().unwrap();
        assert!((marker.lon - 5.0).abs() < 1e-9);
        assert_eq!(marker.sort, 5.0);
        assert_eq!(line_lons(&cursor), vec![0.0, 5.0]);
        assert!(cursor.is_marker_visible());
    }

    #[test]
    fn test_snapped_marker() {
        let geometry = create_test_geometry(&[(0.0, 0.0), (10.0, 10.0)]);
        let mut cursor = windowed(false);

        cursor.update_window(&geometry, 0.0, 5.0);
        assert_eq!(cursor.marker().unwrap().lon, 0.0);
        assert_eq!(line_lons(&cursor), vec![0.0]);
    }

    #[test]
    fn test_window_start_is_interpolated() {
        let geometry = create_test_geometry(&[(0.0, 0.0), (10.0, 10.0), (20.0, 20.0)]);
        let mut cursor = windowed(true);

        cursor.update_window(&geometry, 5.0, 15.0);
        assert_eq!(line_lons(&cursor), vec![5.0, 10.0, 15.0]);

        let mut snapped = windowed(false);
        snapped.update_window(&geometry, 5.0, 15.0);
        assert_eq!(line_lons(&snapped), vec![0.0, 10.0]);
        assert_eq!(snapped.marker().unwrap().lon, 10.0);
    }

    #[test]
    fn test_point_windows_at_and_beyond_samples() {
        let geometry = create_test_geometry(&[(1.0, 10.0), (2.0, 20.0), (3.0, 30.0)]);
        let mut cursor = windowed(true);

        cursor.update_window(&geometry, 0.0, 0.0);
        assert_eq!(line_lons(&cursor), vec![1.0]);
        assert_eq!(cursor.marker().unwrap().lon, 1.0);
        assert!(!cursor.is_marker_visible());

        cursor.update_window(&geometry, 99.0, 99.0);
        assert_eq!(line_lons(&cursor), vec![3.0]);
        assert_eq!(cursor.marker().unwrap().lon, 3.0);

        cursor.update_window(&geometry, 20.0, 20.0);
        assert_eq!(line_lons(&cursor), vec![2.0]);
        assert_eq!(cursor.marker(), Some(Coordinate::new(2.0, 0.0, 20.0)));
        assert!(cursor.is_marker_visible());
    }

    #[test]
    fn test_repeated_tick_is_unchanged() {
        let geometry = create_test_geometry(&[(0.0, 0.0), (10.0, 10.0), (20.0, 20.0)]);
        let mut cursor = windowed(false);

        assert_eq!(cursor.update_window(&geometry, 0.0, 12.0), UpdateOutcome::Rebuilt);
        // Same samples and same snapped end point
        assert_eq!(cursor.update_window(&geometry, 0.0, 13.0), UpdateOutcome::Unchanged);
        assert_eq!(cursor.update_window(&geometry, 0.0, 20.0), UpdateOutcome::Rebuilt);

        let mut interpolated = windowed(true);
        interpolated.update_window(&geometry, 0.0, 12.0);
        assert_eq!(interpolated.update_window(&geometry, 0.0, 12.0), UpdateOutcome::Unchanged);
        assert_eq!(interpolated.update_window(&geometry, 0.0, 13.0), UpdateOutcome::Rebuilt);
    }

    #[test]
    fn test_no_interpolation_across_gap() {
        let geometry = TrackGeometry::multi(vec![
            CoordinateBuffer::from_sorted(
                Layout::Xym,
                [Coordinate::new(0.0, 0.0, 0.0), Coordinate::new(1.0, 0.0, 10.0)],
            ),
            CoordinateBuffer::from_sorted(
                Layout::Xym,
                [Coordinate::new(50.0, 0.0, 100.0), Coordinate::new(51.0, 0.0, 110.0)],
            ),
        ])
        .unwrap();
        let mut cursor = windowed(true);

        // End inside the gap: marker stays at the end of the first track
        cursor.update_window(&geometry, 0.0, 50.0);
        assert_eq!(line_lons(&cursor), vec![0.0, 1.0]);
        assert_eq!(cursor.marker().unwrap().lon, 1.0);

        // Start inside the gap: line begins at the second track as-is
        cursor.update_window(&geometry, 50.0, 105.0);
        assert_eq!(line_lons(&cursor), vec![50.0, 50.5]);

        // Window spanning the gap keeps the boundary
        cursor.update_window(&geometry, 0.0, 110.0);
        assert_eq!(
            cursor.line().unwrap().boundary_before(2),
            Some(Boundary::Gap)
        );

        // Window entirely inside the gap shows nothing
        cursor.update_window(&geometry, 40.0, 60.0);
        assert!(cursor.line().unwrap().is_empty());
        assert!(!cursor.is_marker_visible());
        assert_eq!(cursor.marker().unwrap().lon, 1.0);
    }

    #[test]
    fn test_window_over_antimeridian() {
        let geometry = split_on_antimeridian(CoordinateBuffer::from_sorted(
            Layout::Xym,
            [Coordinate::new(175.0, 0.0, 0.0), Coordinate::new(-175.0, 0.0, 10.0)],
        ));
        let mut cursor = windowed(true);

        cursor.update_window(&geometry, 0.0, 8.0);
        let lons = line_lons(&cursor);
        assert_eq!(lons[..3], [175.0, 180.0, -180.0]);
        assert!((lons[3] + 177.0).abs() < 1e-9);
        assert_eq!(
            cursor.line().unwrap().boundary_before(2),
            Some(Boundary::Antimeridian)
        );
        assert!((cursor.marker().unwrap().lon + 177.0).abs() < 1e-9);
    }

    #[test]
    fn test_refresh_after_geometry_change() {
        let mut cursor = windowed(true);
        let short = create_test_geometry(&[(0.0, 0.0), (10.0, 10.0)]);
        cursor.update_window(&short, 0.0, 15.0);
        assert_eq!(cursor.marker().unwrap().lon, 10.0);

        let longer = create_test_geometry(&[(0.0, 0.0), (10.0, 10.0), (30.0, 20.0)]);
        assert_eq!(cursor.refresh(&longer), UpdateOutcome::Rebuilt);
        assert!((cursor.marker().unwrap().lon - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_reversed_window_bounds() {
        let window = Window::new(10.0, 2.0);
        assert_eq!(window.start, 2.0);
        assert_eq!(window.end, 10.0);
    }

    #[test]
    fn test_position_at() {
        let geometry = create_test_geometry(&[(0.0, 0.0), (10.0, 10.0)]);
        assert_eq!(position_at(&geometry, -5.0, true).unwrap().lon, 0.0);
        assert_eq!(position_at(&geometry, 2.5, true).unwrap().lon, 2.5);
        assert_eq!(position_at(&geometry, 2.5, false).unwrap().lon, 0.0);
        assert_eq!(position_at(&geometry, 50.0, true).unwrap().lon, 10.0);

        let empty = TrackGeometry::new(CoordinateBuffer::new(Layout::Xym));
        assert!(position_at(&empty, 0.0, true).is_none());
        assert!(position_at(&geometry, f64::NAN, true).is_none());
    }

    #[test]
    fn test_non_finite_window_is_skipped() {
        let geometry = create_test_geometry(&[(0.0, 0.0), (5.0, 5.0), (10.0, 10.0)]);
        let mut cursor = windowed(true);
        assert_eq!(cursor.update_window(&geometry, 0.0, 5.0), UpdateOutcome::Rebuilt);
        let marker = cursor.marker();

        for (start, end) in [
            (f64::NAN, 5.0),
            (0.0, f64::NAN),
            (f64::NEG_INFINITY, 5.0),
            (0.0, f64::INFINITY),
        ] {
            assert_eq!(
                cursor.update_window(&geometry, start, end),
                UpdateOutcome::Skipped(SkipReason::InvalidWindow)
            );
        }
        assert_eq!(cursor.marker(), marker);
        assert_eq!(cursor.window(), Some(Window::new(0.0, 5.0)));
    }
}
