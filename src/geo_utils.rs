//! # Geographic Utilities
//!
//! Distance, time and ordering helpers shared by the validator, the smoother and the
//! aggregation functions.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a GPS track in meters, no filtering |
//! | [`seconds_between`] | Signed elapsed time between two timestamps |
//! | [`sort_chronologically`] | Timestamp-ordered copy of a point list |
//! | [`is_chronological`] | Whether a point list is already in timestamp order |
//!
//! ## Example
//!
//! ```rust
//! use trajectory_core::{GpsPoint, geo_utils};
//!
//! let track = vec![
//!     GpsPoint::new(39.9042, 116.4074),  // Beijing
//!     GpsPoint::new(39.9050, 116.4080),
//!     GpsPoint::new(39.9060, 116.4090),
//! ];
//!
//! let length = geo_utils::polyline_length(&track);
//! println!("Track length: {:.0}m", length);
//! ```
//!
//! ## Algorithm Notes
//!
//! Distances use the haversine formula on a spherical Earth (mean radius 6,371 km), via
//! `geo`. All coordinates are WGS84 degrees; GCJ-02 and BD-09 values must be converted back
//! before measuring anything.

use chrono::{DateTime, Utc};
use geo::{Distance, Haversine, Point};

use crate::{GpsPoint, TrackPoint};

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface.
///
/// # Example
///
/// ```rust
/// use trajectory_core::{GpsPoint, geo_utils};
///
/// let a = GpsPoint::new(0.0, 0.0);
/// let b = GpsPoint::new(0.0, 0.001);
///
/// let distance = geo_utils::haversine_distance(&a, &b);
/// assert!((distance - 111.2).abs() < 0.5);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Calculate the total length of a polyline in meters.
///
/// Sums the haversine distance between consecutive points without dropping any segment.
/// Empty or single-point tracks return 0.0. Use [`crate::aggregate::total_distance`] for the
/// outlier-filtered distance of a recorded trajectory.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Time Functions
// =============================================================================

/// Seconds elapsed from `earlier` to `later`.
///
/// Negative when the timestamps are out of order, zero for duplicates. Resolution is one
/// millisecond.
#[inline]
pub fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

// =============================================================================
// Ordering Functions
// =============================================================================

/// Return a copy of `points` sorted by timestamp.
///
/// The sort is stable, so points sharing a timestamp keep their insertion order. Recorded
/// tracks are stored in insertion order, which the location source does not guarantee to be
/// chronological; every statistic and every export works on this view.
pub fn sort_chronologically(points: &[TrackPoint]) -> Vec<TrackPoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.timestamp);
    sorted
}

/// Check that no point is earlier than the one before it.
pub fn is_chronological(points: &[TrackPoint]) -> bool {
    points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
}

// =============================================================================
// Unit Tests
// =============================================================================
