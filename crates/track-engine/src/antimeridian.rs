//! Splitting paths at the antimeridian and merging them back
//!
//! Rendering a line from 175° to -175° without wraparound draws it across the whole
//! map. Splitting inserts a pair of edge coordinates at +180°/-180° between the two
//! samples so every segment stays visually contiguous. Merging drops those edge
//! coordinates again, so `merge_segments(split_on_antimeridian(path))` gives back
//! the original samples.

use crate::geometry::{Break, Breaks};
use crate::{Boundary, Coordinate, CoordinateBuffer, TrackGeometry};

/// A contiguous, sorted coordinate sequence with the multi-track gaps it contained
///
/// Gaps are recorded as the sort value of the sample right before each gap, so they
/// stay meaningful while coordinates are inserted or truncated.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedPath {
    pub coordinates: CoordinateBuffer,
    pub gaps: Vec<f64>,
}

impl From<CoordinateBuffer> for MergedPath {
    fn from(coordinates: CoordinateBuffer) -> Self {
        Self {
            coordinates,
            gaps: Vec::new(),
        }
    }
}

impl MergedPath {
    fn gap_after(&self, sort: f64) -> bool {
        self.gaps
            .binary_search_by(|gap| gap.total_cmp(&sort))
            .is_ok()
    }
}

/// Consecutive samples more than half the globe apart in longitude cross the antimeridian
#[inline]
fn crosses_antimeridian(a: &Coordinate, b: &Coordinate) -> bool {
    (b.lon - a.lon).abs() > 180.0
}

/// Edge coordinates on the `a` side and the `b` side of a crossing
fn edge_pair(a: &Coordinate, b: &Coordinate) -> (Coordinate, Coordinate) {
    // Unwrap `b` so the pair is adjacent on a continuous longitude axis
    let (edge_a, edge_b, unwrapped_lon) = if a.lon > b.lon {
        (180.0, -180.0, b.lon + 360.0)
    } else {
        (-180.0, 180.0, b.lon - 360.0)
    };

    // 180 and -180 are the same meridian, so the edge sits on `a`
    let span = unwrapped_lon - a.lon;
    let scale = if span == 0.0 { 0.0 } else { (edge_a - a.lon) / span };
    let mid = a.lerp(b, scale);
    (
        Coordinate { lon: edge_a, ..mid },
        Coordinate { lon: edge_b, ..mid },
    )
}

/// Split a path into segments at antimeridian crossings and multi-track gaps
///
/// Longitudes are wrapped into [-180, 180] first. A path with neither crossings nor
/// gaps keeps its buffer as-is and yields a single-segment geometry.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn split_on_antimeridian(path: impl Into<MergedPath>) -> TrackGeometry {
    let mut path = path.into();
    path.coordinates.normalize_longitudes();

    let mut crossings = 0;
    let mut has_gaps = false;
    let mut prev: Option<Coordinate> = None;
    for coordinate in path.coordinates.iter() {
        if let Some(prev) = prev {
            if path.gap_after(prev.sort) {
                has_gaps = true;
            } else if crosses_antimeridian(&prev, &coordinate) {
                crossings += 1;
            }
        }
        prev = Some(coordinate);
    }

    if crossings == 0 && !has_gaps {
        return TrackGeometry::from_parts(path.coordinates, Breaks::new(), true);
    }

    let layout = path.coordinates.layout();
    let mut out = CoordinateBuffer::with_capacity(layout, path.coordinates.len() + 2 * crossings);
    let mut breaks = Breaks::new();
    let mut prev: Option<Coordinate> = None;
    for coordinate in path.coordinates.iter() {
        if let Some(prev) = prev {
            if path.gap_after(prev.sort) {
                breaks.push(Break {
                    end: out.len(),
                    boundary: Boundary::Gap,
                });
            } else if crosses_antimeridian(&prev, &coordinate) {
                let (before, after) = edge_pair(&prev, &coordinate);
                out.push(before);
                breaks.push(Break {
                    end: out.len(),
                    boundary: Boundary::Antimeridian,
                });
                out.push(after);
            }
        }
        out.push(coordinate);
        prev = Some(coordinate);
    }

    tracing::trace!(
        crossings,
        segments = breaks.len() + 1,
        "Split path at antimeridian"
    );
    TrackGeometry::from_parts(out, breaks, true)
}

/// Concatenate the segments of a geometry back into one contiguous path
///
/// Edge coordinates inserted at antimeridian crossings are dropped; gap boundaries
/// are reported in [`MergedPath::gaps`].
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn merge_segments(geometry: &TrackGeometry) -> MergedPath {
    let source = geometry.coordinates();
    if !geometry.is_multi() {
        return MergedPath::from(source.clone());
    }

    let mut coordinates = CoordinateBuffer::with_capacity(source.layout(), source.len());
    let mut gaps = Vec::new();
    let mut start = 0;
    for b in geometry.breaks() {
        match b.boundary {
            Boundary::Antimeridian => {
                // Drop the edge point closing this segment and the one opening the next
                coordinates.extend_from(source, start..b.end.saturating_sub(1).max(start));
                start = b.end + 1;
            }
            Boundary::Gap => {
                coordinates.extend_from(source, start..b.end);
                if let Some(sort) = source.sort_value(b.end.saturating_sub(1)) {
                    gaps.push(sort);
                }
                start = b.end;
            }
        }
    }
    coordinates.extend_from(source, start.min(source.len())..source.len());

    MergedPath { coordinates, gaps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Layout;

    fn create_test_path(points: &[(f64, f64, f64)]) -> CoordinateBuffer {
        CoordinateBuffer::from_sorted(
            Layout::Xym,
            points
                .iter()
                .map(|&(lon, lat, sort)| Coordinate::new(lon, lat, sort)),
        )
    }

    #[test]
    fn test_no_crossing_is_single_segment() {
        let path = create_test_path(&[(0.0, 0.0, 0.0), (10.0, 1.0, 10.0), (20.0, 2.0, 20.0)]);
        let geometry = split_on_antimeridian(path.clone());

        assert!(!geometry.is_multi());
        assert_eq!(geometry.coordinates(), &path);
        assert!(geometry.is_normalized());
    }

    #[test]
    fn test_eastward_crossing() {
        let path = create_test_path(&[(175.0, 0.0, 0.0), (-175.0, 0.0, 10.0)]);
        let geometry = split_on_antimeridian(path);

        assert_eq!(geometry.len(), 4);
        assert_eq!(geometry.segment_ends(), Some(vec![2, 4]));
        assert_eq!(geometry.boundary_before(2), Some(Boundary::Antimeridian));

        let coords = geometry.coordinates();
        assert_eq!(coords.get(1).unwrap().lon, 180.0);
        assert_eq!(coords.get(2).unwrap().lon, -180.0);
        assert!((coords.get(1).unwrap().sort - 5.0).abs() < 1e-9);
        assert_eq!(coords.get(1).unwrap().sort, coords.get(2).unwrap().sort);
    }

    #[test]
    fn test_westward_crossing_interpolates_latitude() {
        let path = create_test_path(&[(-170.0, 0.0, 0.0), (170.0, 20.0, 20.0)]);
        let geometry = split_on_antimeridian(path);

        let coords = geometry.coordinates();
        let before = coords.get(1).unwrap();
        let after = coords.get(2).unwrap();
        assert_eq!(before.lon, -180.0);
        assert_eq!(after.lon, 180.0);
        assert!((before.lat - 10.0).abs() < 1e-9);
        assert!((after.sort - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_merge_roundtrip() {
        let original = create_test_path(&[(175.0, 0.0, 0.0), (-175.0, 0.0, 10.0)]);
        let merged = merge_segments(&split_on_antimeridian(original.clone()));
        assert_eq!(merged.coordinates, original);
        assert!(merged.gaps.is_empty());

        let zigzag = create_test_path(&[
            (170.0, 1.0, 0.0),
            (-170.0, 2.0, 1.0),
            (-160.0, 3.0, 2.0),
            (179.0, 4.0, 3.0),
            (-179.5, 5.0, 4.0),
        ]);
        let geometry = split_on_antimeridian(zigzag.clone());
        assert_eq!(geometry.segment_ends().map(|e| e.len()), Some(4));
        assert_eq!(merge_segments(&geometry).coordinates, zigzag);
    }

    #[test]
    fn test_samples_on_both_edges() {
        let original = create_test_path(&[
            (170.0, 0.0, 0.0),
            (180.0, 0.0, 10.0),
            (-180.0, 0.0, 20.0),
            (-170.0, 0.0, 30.0),
        ]);
        let geometry = split_on_antimeridian(original.clone());

        assert_eq!(geometry.segment_ends(), Some(vec![3, 6]));
        let coords = geometry.coordinates();
        assert!(coords.iter().all(|c| c.lat.is_finite() && c.sort.is_finite()));
        assert_eq!(coords.get(2).unwrap().lon, 180.0);
        assert_eq!(coords.get(2).unwrap().sort, 10.0);
        assert_eq!(coords.get(3).unwrap().lon, -180.0);
        assert_eq!(merge_segments(&geometry).coordinates, original);
    }

    #[test]
    fn test_gaps_survive_roundtrip() {
        let path = MergedPath {
            coordinates: create_test_path(&[
                (0.0, 0.0, 0.0),
                (1.0, 0.0, 1.0),
                (170.0, 0.0, 5.0),
                (-170.0, 0.0, 6.0),
            ]),
            gaps: vec![1.0],
        };
        let geometry = split_on_antimeridian(path.clone());

        // 0, 1 | 170, 180 | -180, -170
        assert_eq!(geometry.segment_ends(), Some(vec![2, 4, 6]));
        assert_eq!(geometry.boundary_before(2), Some(Boundary::Gap));
        assert_eq!(geometry.boundary_before(4), Some(Boundary::Antimeridian));
        assert_eq!(merge_segments(&geometry), path);
    }

    #[test]
    fn test_gap_suppresses_crossing() {
        let path = MergedPath {
            coordinates: create_test_path(&[(175.0, 0.0, 0.0), (-175.0, 0.0, 10.0)]),
            gaps: vec![0.0],
        };
        let geometry = split_on_antimeridian(path);
        assert_eq!(geometry.len(), 2);
        assert_eq!(geometry.boundary_before(1), Some(Boundary::Gap));
    }

    #[test]
    fn test_split_normalizes_longitudes() {
        let path = create_test_path(&[(170.0, 0.0, 0.0), (190.0, 0.0, 10.0)]);
        let geometry = split_on_antimeridian(path);
        // 190 wraps to -170, which is a crossing
        assert!(geometry.is_multi());
        assert_eq!(geometry.coordinates().last().unwrap().lon, -170.0);
    }
}
