//! Track geometry: one logical path stored as contiguous segments
//!
//! A [`TrackGeometry`] owns a single globally sorted [`CoordinateBuffer`] and a list
//! of segment boundaries. A boundary either marks an antimeridian crossing (the
//! coordinates on both sides of it are synthetic edge points) or a gap between two
//! physical tracks joined into one multi-track.

use crate::{CoordinateBuffer, Layout, Result, TrackError};
use geo::{BoundingRect, LineString, MultiLineString, Rect};
use smallvec::SmallVec;
use std::ops::Range;

/// Why a geometry is split at a given index
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    /// The path crosses +/-180° longitude; edge points were inserted on both sides
    Antimeridian,
    /// No track exists between the two samples
    Gap,
}

/// A segment boundary: the segment before it ends (exclusive) at `end`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Break {
    pub end: usize,
    pub boundary: Boundary,
}

pub(crate) type Breaks = SmallVec<[Break; 2]>;

/// One logical trajectory, single or multi-segment
#[derive(Clone, Debug)]
pub struct TrackGeometry {
    coordinates: CoordinateBuffer,
    breaks: Breaks,
    normalized: bool,
    dirty: bool,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackGeometry {
    /// Single-segment geometry over `coordinates`
    pub fn new(coordinates: CoordinateBuffer) -> Self {
        Self {
            coordinates,
            breaks: Breaks::new(),
            normalized: false,
            dirty: true,
        }
    }

    pub(crate) fn from_parts(coordinates: CoordinateBuffer, breaks: Breaks, normalized: bool) -> Self {
        debug_assert!(breaks.windows(2).all(|w| w[0].end < w[1].end));
        debug_assert!(breaks.iter().all(|b| b.end <= coordinates.len()));
        Self {
            coordinates,
            breaks,
            normalized,
            dirty: true,
        }
    }

    /// Join several physical tracks into one multi-track
    ///
    /// Segments are ordered by their first sort value and separated by [`Boundary::Gap`].
    /// A segment that overlaps the previous one in sort value is folded into it, since
    /// a gap can only sit between two consecutive samples.
    pub fn multi(mut segments: Vec<CoordinateBuffer>) -> Result<Self> {
        segments.retain(|segment| !segment.is_empty());
        let Some(layout) = segments.first().map(CoordinateBuffer::layout) else {
            return Err(TrackError::NoGeometry);
        };
        if let Some(other) = segments.iter().find(|s| s.layout() != layout) {
            return Err(TrackError::LayoutMismatch {
                expected: layout,
                found: other.layout(),
            });
        }

        segments.sort_by(|a, b| {
            let (a, b) = (a.sort_value(0).unwrap_or(0.0), b.sort_value(0).unwrap_or(0.0));
            a.total_cmp(&b)
        });

        let total = segments.iter().map(CoordinateBuffer::len).sum();
        let mut coordinates = CoordinateBuffer::with_capacity(layout, total);
        let mut breaks = Breaks::new();
        for segment in segments {
            let overlaps = match (coordinates.last(), segment.first()) {
                (Some(last), Some(first)) => first.sort <= last.sort,
                _ => false,
            };
            if overlaps {
                for coordinate in segment.iter() {
                    coordinates.insert(coordinate);
                }
            } else {
                if !coordinates.is_empty() {
                    breaks.push(Break {
                        end: coordinates.len(),
                        boundary: Boundary::Gap,
                    });
                }
                coordinates.extend_from(&segment, 0..segment.len());
            }
        }

        let mut geometry = Self::from_parts(coordinates, breaks, false);
        geometry.normalize();
        Ok(geometry)
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.coordinates.layout()
    }

    /// All coordinates of all segments, in sort order
    #[inline]
    pub fn coordinates(&self) -> &CoordinateBuffer {
        &self.coordinates
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    #[inline]
    pub fn is_multi(&self) -> bool {
        !self.breaks.is_empty()
    }

    /// Exclusive end index of every segment, `None` for a single segment
    pub fn segment_ends(&self) -> Option<Vec<usize>> {
        if self.breaks.is_empty() {
            return None;
        }
        let mut ends: Vec<usize> = self.breaks.iter().map(|b| b.end).collect();
        ends.push(self.len());
        Some(ends)
    }

    /// Index range of every segment
    pub fn segment_ranges(&self) -> SmallVec<[Range<usize>; 3]> {
        let mut ranges = SmallVec::new();
        let mut start = 0;
        for b in &self.breaks {
            ranges.push(start..b.end);
            start = b.end;
        }
        ranges.push(start..self.len());
        ranges
    }

    /// Iterate segment boundaries as `(first index after the boundary, kind)`
    pub fn boundaries(&self) -> impl Iterator<Item = (usize, Boundary)> + '_ {
        self.breaks.iter().map(|b| (b.end, b.boundary))
    }

    /// Boundary between coordinates `index - 1` and `index`, if any
    pub fn boundary_before(&self, index: usize) -> Option<Boundary> {
        self.breaks
            .binary_search_by_key(&index, |b| b.end)
            .ok()
            .map(|i| self.breaks[i].boundary)
    }

    pub(crate) fn breaks(&self) -> &[Break] {
        &self.breaks
    }

    /// Whether longitudes were already wrapped into [-180, 180]
    #[inline]
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Wrap longitudes into [-180, 180] unless that was already done
    pub fn normalize(&mut self) {
        if !self.normalized {
            self.coordinates.normalize_longitudes();
            self.normalized = true;
            self.dirty = true;
        }
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Return the dirty flag and clear it
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// Sub-geometry over `range`, keeping boundaries strictly inside it
    pub fn slice(&self, range: Range<usize>) -> TrackGeometry {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        let breaks = self
            .breaks
            .iter()
            .filter(|b| b.end > start && b.end < end)
            .map(|b| Break {
                end: b.end - start,
                boundary: b.boundary,
            })
            .collect();
        Self::from_parts(self.coordinates.slice(start..end), breaks, self.normalized)
    }

    /// One lon/lat line per segment, for the rendering layer
    pub fn to_multi_line_string(&self) -> MultiLineString<f64> {
        let lines = self
            .segment_ranges()
            .into_iter()
            .filter(|range| !range.is_empty())
            .map(|range| {
                LineString::new(
                    range
                        .filter_map(|i| self.coordinates.get(i))
                        .map(|c| c.position())
                        .collect(),
                )
            })
            .collect();
        MultiLineString::new(lines)
    }

    /// Lon/lat extent of all coordinates
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.to_multi_line_string().bounding_rect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coordinate;

    fn create_test_segment(start: f64, count: usize) -> CoordinateBuffer {
        CoordinateBuffer::from_sorted(
            Layout::Xym,
            (0..count).map(|i| Coordinate::new(i as f64, start / 10.0, start + i as f64)),
        )
    }

    #[test]
    fn test_single_segment() {
        let geometry = TrackGeometry::new(create_test_segment(0.0, 5));
        assert!(!geometry.is_multi());
        assert_eq!(geometry.segment_ends(), None);
        assert_eq!(geometry.segment_ranges().as_slice(), &[0..5]);
        assert!(geometry.is_dirty());
    }

    #[test]
    fn test_multi_track_gaps() {
        let geometry = TrackGeometry::multi(vec![
            create_test_segment(100.0, 3),
            create_test_segment(0.0, 4),
        ])
        .unwrap();

        assert_eq!(geometry.len(), 7);
        assert_eq!(geometry.segment_ends(), Some(vec![4, 7]));
        assert_eq!(geometry.boundary_before(4), Some(Boundary::Gap));
        assert_eq!(geometry.boundary_before(3), None);
        assert_eq!(geometry.coordinates().sort_value(4), Some(100.0));
    }

    #[test]
    fn test_multi_overlapping_segments_fold() {
        let geometry = TrackGeometry::multi(vec![
            create_test_segment(0.0, 4),
            create_test_segment(2.0, 4),
        ])
        .unwrap();

        // Sort values 0..=5 once each, no gap between overlapping tracks
        assert_eq!(geometry.len(), 6);
        assert!(!geometry.is_multi());
    }

    #[test]
    fn test_multi_rejects_mixed_layouts() {
        let xyzm = CoordinateBuffer::from_sorted(
            Layout::Xyzm,
            [Coordinate::with_altitude(0.0, 0.0, 1.0, 50.0)],
        );
        let result = TrackGeometry::multi(vec![create_test_segment(0.0, 2), xyzm]);
        assert!(matches!(result, Err(TrackError::LayoutMismatch { .. })));
        assert!(matches!(
            TrackGeometry::multi(Vec::new()),
            Err(TrackError::NoGeometry)
        ));
    }

    #[test]
    fn test_slice_keeps_inner_boundaries() {
        let geometry = TrackGeometry::multi(vec![
            create_test_segment(0.0, 4),
            create_test_segment(100.0, 4),
        ])
        .unwrap();

        let inner = geometry.slice(2..6);
        assert_eq!(inner.len(), 4);
        assert_eq!(inner.segment_ends(), Some(vec![2, 4]));

        let edge = geometry.slice(4..8);
        assert!(!edge.is_multi());
    }

    #[test]
    fn test_normalize_once() {
        let buffer = CoordinateBuffer::from_sorted(Layout::Xym, [Coordinate::new(190.0, 0.0, 0.0)]);
        let mut geometry = TrackGeometry::new(buffer);
        geometry.normalize();
        assert!(geometry.is_normalized());
        assert_eq!(geometry.coordinates().get(0).unwrap().lon, -170.0);
    }

    #[test]
    fn test_take_dirty() {
        let mut geometry = TrackGeometry::new(create_test_segment(0.0, 2));
        assert!(geometry.take_dirty());
        assert!(!geometry.take_dirty());
        geometry.mark_dirty();
        assert!(geometry.is_dirty());
    }

    #[test]
    fn test_multi_line_string_and_bounds() {
        let geometry = TrackGeometry::multi(vec![
            create_test_segment(0.0, 3),
            create_test_segment(100.0, 2),
        ])
        .unwrap();

        let lines = geometry.to_multi_line_string();
        assert_eq!(lines.0.len(), 2);
        assert_eq!(lines.0[0].0.len(), 3);

        let bounds = geometry.bounding_rect().unwrap();
        assert_eq!(bounds.min().x, 0.0);
        assert_eq!(bounds.max().x, 2.0);
        assert_eq!(bounds.max().y, 10.0);
    }
}
