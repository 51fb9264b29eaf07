//! # Geographic Utilities
//!
//! Great-circle distance and speed helpers used by every stage of the pipeline.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`distance`] | Haversine distance in kilometres from raw lon/lat pairs |
//! | [`haversine_distance`] | Same, between two [`GpsPoint`]s |
//! | [`distances`] | Elementwise distances over two equal-length tracks |
//! | [`speed`] | Distance over elapsed time, in km/h |
//! | [`speeds`] | Elementwise speeds |
//! | [`km_to_degrees`] | Approximate degree span of a distance at a latitude |
//!
//! ## Example
//!
//! ```rust
//! use bus_punctuality::{GpsPoint, geo_utils};
//!
//! let warsaw = GpsPoint::new(52.2118, 20.9821);
//! let poznan = GpsPoint::new(52.4025, 16.9387);
//!
//! let km = geo_utils::haversine_distance(&warsaw, &poznan);
//! assert!((km - 275.5).abs() < 0.5);
//! ```
//!
//! ## Earth radius
//!
//! Distances assume a spherical Earth of radius 6373 km. `geo`'s haversine works
//! on its mean radius, so its result is rescaled; the central angle is the same.

use geo::{Point, Haversine, Distance};
use crate::GpsPoint;

/// Earth radius used for every distance in this crate, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6373.0;

/// Mean Earth radius `geo`'s haversine measures with, in meters.
const GEO_MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in kilometres between two lon/lat pairs.
///
/// Symmetric, and zero when both points coincide.
///
/// # Example
///
/// ```rust
/// use bus_punctuality::geo_utils;
///
/// // One degree of latitude at the equator
/// let km = geo_utils::distance(0.0, 0.0, 0.0, 1.0);
/// assert!((km - 111.0).abs() <= 0.5);
/// ```
#[inline]
pub fn distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let point1 = Point::new(lon1, lat1);
    let point2 = Point::new(lon2, lat2);
    Haversine::distance(point1, point2) / GEO_MEAN_EARTH_RADIUS_M * EARTH_RADIUS_KM
}

/// Great-circle distance in kilometres between two GPS points.
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    distance(p1.longitude, p1.latitude, p2.longitude, p2.latitude)
}

/// Elementwise distances between two tracks.
///
/// `from[i]` is paired with `to[i]`; both slices must have the same length.
pub fn distances(from: &[GpsPoint], to: &[GpsPoint]) -> Vec<f64> {
    debug_assert_eq!(from.len(), to.len());
    from.iter()
        .zip(to)
        .map(|(p1, p2)| haversine_distance(p1, p2))
        .collect()
}

/// Speed in km/h. The caller guarantees `elapsed_hours != 0`.
#[inline]
pub fn speed(distance_km: f64, elapsed_hours: f64) -> f64 {
    distance_km / elapsed_hours
}

/// Elementwise speeds; same length and non-zero preconditions as [`speed`].
pub fn speeds(distances_km: &[f64], elapsed_hours: &[f64]) -> Vec<f64> {
    debug_assert_eq!(distances_km.len(), elapsed_hours.len());
    distances_km
        .iter()
        .zip(elapsed_hours)
        .map(|(&d, &t)| speed(d, t))
        .collect()
}

/// Convert a distance to approximate `(latitude, longitude)` degree spans at a
/// given latitude.
///
/// The longitude span grows with `1 / cos(latitude)`; the cosine is clamped so
/// the result stays finite near the poles. Both spans are slightly generous,
/// which is what bounding-box pre-filters need.
#[inline]
pub fn km_to_degrees(km: f64, latitude: f64) -> (f64, f64) {
    let km_per_degree = EARTH_RADIUS_KM.to_radians();
    let lat_deg = km / km_per_degree;
    let lon_deg = lat_deg / latitude.to_radians().cos().abs().max(0.01);
    (lat_deg * 1.01, lon_deg * 1.01)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() <= epsilon
    }

    #[test]
    fn test_distance_same_point() {
        assert_eq!(distance(0.0, 0.0, 0.0, 0.0), 0.0);
        let p = GpsPoint::new(52.2297, 21.0117);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        assert!(approx_eq(distance(0.0, 0.0, 0.0, 1.0), 111.0, 0.5));
    }

    #[test]
    fn test_distance_known_value() {
        let km = distance(20.982075190290256, 52.21183403897336, 16.938678071885487, 52.40254719674715);
        assert!(approx_eq(km, 275.5, 0.5));
    }

    #[test]
    fn test_distance_symmetric() {
        let a = distance(21.0, 52.2, 21.1, 52.3);
        let b = distance(21.1, 52.3, 21.0, 52.2);
        assert!(approx_eq(a, b, 1e-9));
    }

    #[test]
    fn test_distances_elementwise() {
        let from = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(52.21183403897336, 20.982075190290256),
        ];
        let to = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(1.0, 0.0),
            GpsPoint::new(52.40254719674715, 16.938678071885487),
        ];
        let result = distances(&from, &to);
        let expected = [0.0, 111.0, 275.5];
        for (got, want) in result.iter().zip(expected) {
            assert!(approx_eq(*got, want, 0.5));
        }
    }

    #[test]
    fn test_speed() {
        assert_eq!(speed(0.0, 1.0), 0.0);
        assert_eq!(speed(2.0, 1.0), 2.0);
        assert!(approx_eq(speed(2.0, 3.0), 0.6667, 0.001));
        assert_eq!(speeds(&[3.0, 3.0], &[2.0, 4.0]), vec![1.5, 0.75]);
    }

    #[test]
    fn test_km_to_degrees() {
        let (lat_deg, lon_deg) = km_to_degrees(EARTH_RADIUS_KM.to_radians(), 0.0);
        assert!(approx_eq(lat_deg, 1.0, 0.02));
        assert!(approx_eq(lon_deg, 1.0, 0.02));

        // Longitude degrees shrink away from the equator, so the span grows
        let (_, lon_deg_52) = km_to_degrees(1.0, 52.0);
        let (_, lon_deg_0) = km_to_degrees(1.0, 0.0);
        assert!(lon_deg_52 > lon_deg_0);
    }
}
