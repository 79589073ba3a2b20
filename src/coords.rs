//! # Coordinate Systems
//!
//! Conversion between the three datums a trajectory may need to be shown in:
//!
//! | System | Used by |
//! |--------|---------|
//! | [`CoordinateSystem::Wgs84`] | GPS receivers, storage, GPX/CSV export |
//! | [`CoordinateSystem::Gcj02`] | Map tiles inside mainland China |
//! | [`CoordinateSystem::Bd09`] | Baidu Maps, a further offset of GCJ-02 |
//!
//! Stored points are always WGS84. Conversion happens only when handing coordinates to a
//! map view (see [`to_display`]).
//!
//! ## Accuracy
//!
//! [`gcj02_to_wgs84`] is a first-order inverse: the offset is evaluated at the shifted
//! GCJ-02 position and subtracted, without iterating. Residual error is typically below a
//! meter and reaches a few meters near the edges of the China bounding box. Stored offsets
//! depend on this exact formula, so it must not be replaced with an iterative solver.
//!
//! ## Example
//!
//! ```rust
//! use trajectory_core::coords::{self, CoordinateSystem};
//!
//! let gcj = coords::convert(39.9042, 116.4074, CoordinateSystem::Wgs84, CoordinateSystem::Gcj02);
//! let back = coords::convert(gcj.latitude, gcj.longitude, CoordinateSystem::Gcj02, CoordinateSystem::Wgs84);
//! assert!((back.latitude - 39.9042).abs() < 1e-4);
//! ```

use std::f64::consts::PI;

use crate::{GpsPoint, TrackPoint};

/// Semi-major axis of the Krasovsky 1940 ellipsoid used by GCJ-02.
const KRASOVSKY_A: f64 = 6378245.0;

/// First eccentricity squared of the same ellipsoid.
const KRASOVSKY_EE: f64 = 0.00669342162296594323;

/// Angular factor of the BD-09 polar perturbation.
const BD_X_PI: f64 = PI * 3000.0 / 180.0;

const BD_LON_OFFSET: f64 = 0.0065;
const BD_LAT_OFFSET: f64 = 0.006;

/// Geodetic datum tag. Not stored with points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoordinateSystem {
    Wgs84,
    Gcj02,
    Bd09,
}

/// Whether a coordinate lies outside the mainland China bounding box.
///
/// Outside the box GCJ-02 equals WGS84 and no offset is applied.
///
/// ```rust
/// use trajectory_core::coords::out_of_china;
///
/// assert!(!out_of_china(1.0, 100.0));
/// assert!(out_of_china(0.5, 100.0));
/// assert!(out_of_china(56.0, 100.0));
/// ```
#[inline]
pub fn out_of_china(lat: f64, lon: f64) -> bool {
    lon < 72.004 || lon > 137.8347 || lat < 0.8293 || lat > 55.8271
}

fn transform_lat(x: f64, y: f64) -> f64 {
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn transform_lon(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}

/// GCJ-02 offset in degrees `(d_lat, d_lon)` evaluated at `(lat, lon)`.
fn gcj_delta(lat: f64, lon: f64) -> (f64, f64) {
    let d_lat = transform_lat(lon - 105.0, lat - 35.0);
    let d_lon = transform_lon(lon - 105.0, lat - 35.0);

    let rad_lat = lat / 180.0 * PI;
    let magic = 1.0 - KRASOVSKY_EE * rad_lat.sin() * rad_lat.sin();
    let sqrt_magic = magic.sqrt();

    let d_lat = (d_lat * 180.0) / ((KRASOVSKY_A * (1.0 - KRASOVSKY_EE)) / (magic * sqrt_magic) * PI);
    let d_lon = (d_lon * 180.0) / (KRASOVSKY_A / sqrt_magic * rad_lat.cos() * PI);
    (d_lat, d_lon)
}

/// Convert WGS84 to GCJ-02. Identity outside China.
pub fn wgs84_to_gcj02(lat: f64, lon: f64) -> GpsPoint {
    if out_of_china(lat, lon) {
        return GpsPoint::new(lat, lon);
    }
    let (d_lat, d_lon) = gcj_delta(lat, lon);
    GpsPoint::new(lat + d_lat, lon + d_lon)
}

/// Convert GCJ-02 to WGS84 with the first-order inverse. Identity outside China.
///
/// The offset is computed from the GCJ-02 input itself and subtracted once.
pub fn gcj02_to_wgs84(lat: f64, lon: f64) -> GpsPoint {
    if out_of_china(lat, lon) {
        return GpsPoint::new(lat, lon);
    }
    let (d_lat, d_lon) = gcj_delta(lat, lon);
    GpsPoint::new(lat - d_lat, lon - d_lon)
}

/// Convert GCJ-02 to BD-09. Applied everywhere, there is no bounding box check.
pub fn gcj02_to_bd09(lat: f64, lon: f64) -> GpsPoint {
    let z = (lon * lon + lat * lat).sqrt() + 0.00002 * (lat * BD_X_PI).sin();
    let theta = lat.atan2(lon) + 0.000003 * (lon * BD_X_PI).cos();
    GpsPoint::new(
        z * theta.sin() + BD_LAT_OFFSET,
        z * theta.cos() + BD_LON_OFFSET,
    )
}

/// Convert BD-09 to GCJ-02.
pub fn bd09_to_gcj02(lat: f64, lon: f64) -> GpsPoint {
    let x = lon - BD_LON_OFFSET;
    let y = lat - BD_LAT_OFFSET;
    let z = (x * x + y * y).sqrt() - 0.00002 * (y * BD_X_PI).sin();
    let theta = y.atan2(x) - 0.000003 * (x * BD_X_PI).cos();
    GpsPoint::new(z * theta.sin(), z * theta.cos())
}

/// Convert a coordinate between any two systems.
///
/// WGS84 and BD-09 have no direct formula and are routed through GCJ-02.
pub fn convert(lat: f64, lon: f64, from: CoordinateSystem, to: CoordinateSystem) -> GpsPoint {
    use CoordinateSystem::*;

    match (from, to) {
        (Wgs84, Wgs84) | (Gcj02, Gcj02) | (Bd09, Bd09) => GpsPoint::new(lat, lon),
        (Wgs84, Gcj02) => wgs84_to_gcj02(lat, lon),
        (Gcj02, Wgs84) => gcj02_to_wgs84(lat, lon),
        (Gcj02, Bd09) => gcj02_to_bd09(lat, lon),
        (Bd09, Gcj02) => bd09_to_gcj02(lat, lon),
        (Wgs84, Bd09) => {
            let gcj = wgs84_to_gcj02(lat, lon);
            gcj02_to_bd09(gcj.latitude, gcj.longitude)
        }
        (Bd09, Wgs84) => {
            let gcj = bd09_to_gcj02(lat, lon);
            gcj02_to_wgs84(gcj.latitude, gcj.longitude)
        }
    }
}

/// Coordinate to hand to a map view for a stored WGS84 position.
///
/// Inside China the point is shifted to GCJ-02 so it lines up with the map tiles; outside
/// it passes through unchanged.
pub fn to_display(lat: f64, lon: f64) -> GpsPoint {
    if out_of_china(lat, lon) {
        GpsPoint::new(lat, lon)
    } else {
        convert(lat, lon, CoordinateSystem::Wgs84, CoordinateSystem::Gcj02)
    }
}

/// Display coordinates for a trajectory, in chronological order.
pub fn display_points(points: &[TrackPoint]) -> Vec<GpsPoint> {
    crate::geo_utils::sort_chronologically(points)
        .iter()
        .map(|p| to_display(p.latitude, p.longitude))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::haversine_distance;

    const BEIJING: (f64, f64) = (39.9042, 116.4074);
    const SHANGHAI: (f64, f64) = (31.2304, 121.4737);
    const SHENZHEN: (f64, f64) = (22.5431, 114.0579);
    const LONDON: (f64, f64) = (51.5074, -0.1278);

    fn meters(a: GpsPoint, lat: f64, lon: f64) -> f64 {
        haversine_distance(&a, &GpsPoint::new(lat, lon))
    }

    #[test]
    fn test_out_of_china_boundaries() {
        assert!(!out_of_china(1.0, 100.0));
        assert!(out_of_china(0.5, 100.0));
        assert!(out_of_china(56.0, 100.0));
        assert!(out_of_china(30.0, 72.0));
        assert!(out_of_china(30.0, 138.0));
        assert!(!out_of_china(BEIJING.0, BEIJING.1));
    }

    #[test]
    fn test_wgs84_to_gcj02_shifts_inside_china() {
        let gcj = wgs84_to_gcj02(BEIJING.0, BEIJING.1);
        let shift = meters(gcj, BEIJING.0, BEIJING.1);
        // The GCJ-02 offset in Beijing is a few hundred meters
        assert!(shift > 300.0 && shift < 800.0, "shift was {shift}");
    }

    #[test]
    fn test_round_trip_within_five_meters() {
        for (lat, lon) in [BEIJING, SHANGHAI, SHENZHEN, (1.0, 100.0)] {
            let gcj = wgs84_to_gcj02(lat, lon);
            let back = gcj02_to_wgs84(gcj.latitude, gcj.longitude);
            let err = meters(back, lat, lon);
            assert!(err < 5.0, "round trip error {err}m at ({lat}, {lon})");
        }
    }

    #[test]
    fn test_inverse_is_first_order_not_exact() {
        let gcj = wgs84_to_gcj02(SHANGHAI.0, SHANGHAI.1);
        let back = gcj02_to_wgs84(gcj.latitude, gcj.longitude);
        // Single subtraction of the offset at the shifted point leaves a residual
        assert!(back != GpsPoint::new(SHANGHAI.0, SHANGHAI.1));

        let (d_lat, d_lon) = gcj_delta(gcj.latitude, gcj.longitude);
        assert_eq!(back.latitude, gcj.latitude - d_lat);
        assert_eq!(back.longitude, gcj.longitude - d_lon);
    }

    #[test]
    fn test_identity_outside_china() {
        let p = wgs84_to_gcj02(LONDON.0, LONDON.1);
        assert_eq!(p, GpsPoint::new(LONDON.0, LONDON.1));
        let p = gcj02_to_wgs84(LONDON.0, LONDON.1);
        assert_eq!(p, GpsPoint::new(LONDON.0, LONDON.1));
    }

    #[test]
    fn test_bd09_round_trip() {
        let gcj = wgs84_to_gcj02(BEIJING.0, BEIJING.1);
        let bd = gcj02_to_bd09(gcj.latitude, gcj.longitude);
        assert!(meters(bd, gcj.latitude, gcj.longitude) > 500.0);

        let back = bd09_to_gcj02(bd.latitude, bd.longitude);
        assert!(meters(back, gcj.latitude, gcj.longitude) < 1.0);
    }

    #[test]
    fn test_bd09_applies_outside_china() {
        let bd = gcj02_to_bd09(LONDON.0, LONDON.1);
        assert!(bd != GpsPoint::new(LONDON.0, LONDON.1));
    }

    #[test]
    fn test_convert_routes_through_gcj02() {
        use CoordinateSystem::*;

        let (lat, lon) = SHENZHEN;
        assert_eq!(convert(lat, lon, Wgs84, Wgs84), GpsPoint::new(lat, lon));
        assert_eq!(convert(lat, lon, Bd09, Bd09), GpsPoint::new(lat, lon));

        let gcj = wgs84_to_gcj02(lat, lon);
        let expected = gcj02_to_bd09(gcj.latitude, gcj.longitude);
        assert_eq!(convert(lat, lon, Wgs84, Bd09), expected);

        let back = convert(expected.latitude, expected.longitude, Bd09, Wgs84);
        assert!(meters(back, lat, lon) < 5.0);
    }

    #[test]
    fn test_to_display_bypass() {
        assert_eq!(to_display(LONDON.0, LONDON.1), GpsPoint::new(LONDON.0, LONDON.1));
        assert_eq!(
            to_display(BEIJING.0, BEIJING.1),
            wgs84_to_gcj02(BEIJING.0, BEIJING.1)
        );
    }
}
