//! Distance between geographic coordinates

use geo::Coord;

/// Earth's mean radius in meters
pub const EARTH_RADIUS_M: f64 = 6371000.0;

/// Great-circle distance provider used by the statistics
///
/// Coordinates are `x = lon`, `y = lat` in degrees.
pub trait Geodesy {
    /// Distance in meters between `a` and `b`
    fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64;
}

/// Haversine formula on a sphere of [`EARTH_RADIUS_M`]
#[derive(Clone, Copy, Debug, Default)]
pub struct Haversine;

impl Geodesy for Haversine {
    #[inline]
    fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64 {
        let lat1 = a.y.to_radians();
        let lat2 = b.y.to_radians();
        let delta_lat = (b.y - a.y).to_radians();
        let delta_lon = (b.x - a.x).to_radians();

        let h = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

        EARTH_RADIUS_M * c
    }
}

impl<G: Geodesy + ?Sized> Geodesy for &G {
    #[inline]
    fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64 {
        (**self).distance(a, b)
    }
}
