//! Great-circle distance and unit conversion.

use crate::types::Position;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Metres in one statute mile.
pub const METERS_PER_MILE: f64 = 1609.34721869;

/// Great-circle distance in metres (spherical law of cosines).
///
/// Points closer than ~1e-4 rad on both axes return 0 so that `acos` never
/// sees a value pushed past 1.0 by rounding.
pub fn great_circle(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());
    let (lat2, lon2) = (lat2.to_radians(), lon2.to_radians());

    if (lat1 - lat2).abs() < 0.0001 && (lon1 - lon2).abs() < 0.0001 {
        return 0.0;
    }

    let cos_angle =
        lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * (lon1 - lon2).abs().cos();
    EARTH_RADIUS_M * cos_angle.clamp(-1.0, 1.0).acos()
}

/// Great-circle distance between two positions, in metres.
pub fn distance(a: &Position, b: &Position) -> f64 {
    great_circle(a.lat, a.lon, b.lat, b.lon)
}

pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_great_circle_same_point() {
        assert_eq!(great_circle(1.0, 1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_great_circle_known_distance() {
        let d = great_circle(1.0, 1.0, 2.0, 2.0);
        assert!((d - 157_225.432).abs() < 0.01, "got {d}");
    }

    #[test]
    fn test_great_circle_symmetric() {
        let a = great_circle(55.91, -3.24, 51.47, -0.45);
        let b = great_circle(51.47, -0.45, 55.91, -3.24);
        assert!((a - b).abs() < 1e-6);
        // Edinburgh to Heathrow is roughly 530 km
        assert!(a > 500_000.0 && a < 560_000.0, "got {a}");
    }

    #[test]
    fn test_great_circle_antipodal() {
        let d = great_circle(0.0, 0.0, 0.0, 180.0);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn test_meters_to_miles() {
        assert_eq!(meters_to_miles(METERS_PER_MILE), 1.0);
    }
}
