//! Distance, duration and speed of whole or partial tracks
//!
//! Everything here is a pure function of a geometry or of scalars, so statistics can
//! be recomputed whenever the visible window changes. Degenerate input never fails:
//! durations and speeds that can't be computed are `None` and format as [`UNKNOWN`].

use crate::TrackGeometry;
use crate::geodesy::Geodesy;

/// Display sentinel for values that have no data
pub const UNKNOWN: &str = "Unknown";

/// Sum of distances between consecutive coordinates of every segment
///
/// No distance is counted across segment boundaries.
pub fn geometry_distance_meters<G: Geodesy>(geometry: &TrackGeometry, geodesy: &G) -> f64 {
    let coordinates = geometry.coordinates();
    geometry
        .segment_ranges()
        .into_iter()
        .map(|range| {
            let mut total = 0.0;
            let mut prev = None;
            for coordinate in range.filter_map(|i| coordinates.get(i)) {
                if let Some(prev) = prev {
                    total += geodesy.distance(prev, coordinate.position());
                }
                prev = Some(coordinate.position());
            }
            total
        })
        .sum()
}

/// Last sort value minus first sort value, `None` unless positive
pub fn geometry_duration_seconds(geometry: &TrackGeometry) -> Option<f64> {
    let coordinates = geometry.coordinates();
    let duration = coordinates.last()?.sort - coordinates.first()?.sort;
    (duration > 0.0).then_some(duration)
}

/// Average speed in meters per hour, `None` without distance or duration
pub fn average_speed(distance_meters: f64, duration_seconds: Option<f64>) -> Option<f64> {
    if distance_meters <= 0.0 {
        return None;
    }
    duration_seconds
        .filter(|d| *d > 0.0)
        .map(|d| distance_meters / (d / 3600.0))
}

pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.0} m", meters)
    } else {
        format!("{:.2} km", meters / 1000.0)
    }
}

pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds else {
        return UNKNOWN.to_string();
    };
    let total = seconds.round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Format a speed given in meters per hour as km/h
pub fn format_speed(meters_per_hour: Option<f64>) -> String {
    match meters_per_hour {
        Some(speed) => format!("{:.2} km/h", speed / 1000.0),
        None => UNKNOWN.to_string(),
    }
}

/// Cached statistics of a track and of its currently visible part
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackStatistics {
    /// Distance of the whole track in meters
    pub total_distance: f64,
    /// Duration of the whole track in seconds (temporal tracks only)
    pub total_duration: Option<f64>,
    /// Distance of the visible part in meters
    pub elapsed_distance: f64,
    /// Duration of the visible part in seconds
    pub elapsed_duration: Option<f64>,
    /// Average speed over the visible part in meters per hour
    pub average_speed: Option<f64>,
}

impl TrackStatistics {
    /// Statistics of the whole track, with the visible part equal to the whole
    pub fn compute<G: Geodesy>(geometry: &TrackGeometry, temporal: bool, geodesy: &G) -> Self {
        let distance = geometry_distance_meters(geometry, geodesy);
        let duration = temporal.then(|| geometry_duration_seconds(geometry)).flatten();
        Self {
            total_distance: distance,
            total_duration: duration,
            elapsed_distance: distance,
            elapsed_duration: duration,
            average_speed: average_speed(distance, duration),
        }
    }

    /// Replace the visible-part values with those of `visible`
    pub fn update_elapsed<G: Geodesy>(&mut self, visible: &TrackGeometry, temporal: bool, geodesy: &G) {
        self.elapsed_distance = geometry_distance_meters(visible, geodesy);
        self.elapsed_duration = temporal.then(|| geometry_duration_seconds(visible)).flatten();
        self.average_speed = average_speed(self.elapsed_distance, self.elapsed_duration);
    }

    /// Make the visible part the whole track again
    pub fn reset_elapsed(&mut self) {
        self.elapsed_distance = self.total_distance;
        self.elapsed_duration = self.total_duration;
        self.average_speed = average_speed(self.total_distance, self.total_duration);
    }

    pub fn total_distance_label(&self) -> String {
        format_distance(self.total_distance)
    }

    pub fn total_duration_label(&self) -> String {
        format_duration(self.total_duration)
    }

    pub fn elapsed_distance_label(&self) -> String {
        format_distance(self.elapsed_distance)
    }

    pub fn elapsed_duration_label(&self) -> String {
        format_duration(self.elapsed_duration)
    }

    pub fn average_speed_label(&self) -> String {
        format_speed(self.average_speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::Haversine;
    use crate::{Coordinate, CoordinateBuffer, Layout, TrackGeometry, split_on_antimeridian};
    use geo::Coord;

    /// Flat-plane distance, one unit of longitude = 1000 m
    struct Kilometers;

    impl Geodesy for Kilometers {
        fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64 {
            ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt() * 1000.0
        }
    }

    fn create_test_geometry(points: &[(f64, f64, f64)]) -> TrackGeometry {
        TrackGeometry::new(CoordinateBuffer::from_sorted(
            Layout::Xym,
            points
                .iter()
                .map(|&(lon, lat, sort)| Coordinate::new(lon, lat, sort)),
        ))
    }

    #[test]
    fn test_colinear_distance_duration_speed() {
        let geometry = create_test_geometry(&[(0.0, 0.0, 0.0), (1.0, 0.0, 10.0), (2.0, 0.0, 20.0)]);

        let distance = geometry_distance_meters(&geometry, &Kilometers);
        let duration = geometry_duration_seconds(&geometry);
        assert!((distance - 2000.0).abs() < 1e-9);
        assert_eq!(duration, Some(20.0));
        assert_eq!(average_speed(distance, duration), Some(distance / (20.0 / 3600.0)));
    }

    #[test]
    fn test_one_degree_track() {
        let geometry = create_test_geometry(&[(0.0, 0.0, 0.0), (0.0, 1.0, 10.0)]);
        let stats = TrackStatistics::compute(&geometry, true, &Haversine);
        assert!((stats.total_distance - 111_195.0).abs() < 100.0);
        assert_eq!(stats.total_duration, Some(10.0));
    }

    #[test]
    fn test_degenerate_inputs() {
        let single = create_test_geometry(&[(0.0, 0.0, 5.0)]);
        assert_eq!(geometry_distance_meters(&single, &Haversine), 0.0);
        assert_eq!(geometry_duration_seconds(&single), None);

        let empty = TrackGeometry::new(CoordinateBuffer::new(Layout::Xym));
        assert_eq!(geometry_duration_seconds(&empty), None);

        assert_eq!(average_speed(0.0, Some(10.0)), None);
        assert_eq!(average_speed(100.0, None), None);
    }

    #[test]
    fn test_no_distance_across_segments() {
        let geometry = split_on_antimeridian(CoordinateBuffer::from_sorted(
            Layout::Xym,
            [Coordinate::new(179.0, 0.0, 0.0), Coordinate::new(-179.0, 0.0, 10.0)],
        ));
        assert!(geometry.is_multi());

        // 179 -> 180 and -180 -> -179 only, not the 360 degree jump in between
        let distance = geometry_distance_meters(&geometry, &Kilometers);
        assert!((distance - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn test_non_temporal_has_no_duration() {
        let geometry = create_test_geometry(&[(0.0, 0.0, 1.0), (0.0, 1.0, 2.0)]);
        let stats = TrackStatistics::compute(&geometry, false, &Haversine);
        assert_eq!(stats.total_duration, None);
        assert_eq!(stats.average_speed_label(), UNKNOWN);
    }

    #[test]
    fn test_elapsed_update_and_reset() {
        let geometry = create_test_geometry(&[(0.0, 0.0, 0.0), (1.0, 0.0, 10.0), (2.0, 0.0, 20.0)]);
        let mut stats = TrackStatistics::compute(&geometry, true, &Kilometers);

        stats.update_elapsed(&geometry.slice(0..2), true, &Kilometers);
        assert!((stats.elapsed_distance - 1000.0).abs() < 1e-9);
        assert_eq!(stats.elapsed_duration, Some(10.0));
        assert!((stats.total_distance - 2000.0).abs() < 1e-9);

        stats.reset_elapsed();
        assert_eq!(stats.elapsed_distance, stats.total_distance);
        assert_eq!(stats.elapsed_duration, Some(20.0));
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_distance(532.4), "532 m");
        assert_eq!(format_distance(111_190.0), "111.19 km");
        assert_eq!(format_duration(Some(3723.0)), "1h 02m 03s");
        assert_eq!(format_duration(Some(125.0)), "2m 05s");
        assert_eq!(format_duration(Some(9.0)), "9s");
        assert_eq!(format_duration(None), UNKNOWN);
        assert_eq!(format_speed(Some(36_000.0)), "36.00 km/h");
        assert_eq!(format_speed(None), UNKNOWN);
    }
}
