//! # Trajectory Statistics
//!
//! Pure, read-only statistics over recorded points: distance, speeds, elevation and a
//! data-quality audit.
//!
//! Every function sorts its input chronologically before looking at it, since stored
//! insertion order is not guaranteed to match time order. Call them on an owned snapshot
//! (for example [`crate::TrackRecorder::snapshot`]), never on a buffer that is still being
//! written.
//!
//! ## Outlier policy
//!
//! Limits here are more permissive than the live [`crate::validator`] (150 km/h instead of
//! 120 km/h) because they audit data that already passed validation. Outliers are dropped,
//! never clipped:
//!
//! | Statistic | Dropped when |
//! |-----------|--------------|
//! | [`total_distance`] | segment > 1000 m or implied speed > 150 km/h |
//! | [`average_speed`] | result > 100 km/h |
//! | [`max_speed`] | point speed > 150 km/h or unknown |
//! | [`moving_average_speed`] | window speed > 150 km/h |
//! | [`elevation_gain`] | climb step > 100 m |
//! | [`max_altitude`] / [`min_altitude`] | altitude outside [-500, 10000] m |
//!
//! Insufficient data yields `None` (or an empty series), never a panic.

use std::fmt;

use crate::geo_utils::{
    haversine_distance, is_chronological, polyline_length, seconds_between, sort_chronologically,
};
use crate::{Bounds, GpsPoint, Track, TrackPoint};

/// Segments longer than this are treated as signal loss and excluded (meters).
pub const MAX_SEGMENT_METERS: f64 = 1000.0;

/// Upper bound for segment, window and point speeds (km/h).
pub const MAX_SPEED_KMH: f64 = 150.0;

/// Average speeds above this are not reported (km/h).
pub const MAX_AVERAGE_SPEED_KMH: f64 = 100.0;

/// Altitude steps above this are sensor error (meters).
pub const MAX_ELEVATION_STEP: f64 = 100.0;

pub const MIN_VALID_ALTITUDE: f64 = -500.0;
pub const MAX_VALID_ALTITUDE: f64 = 10000.0;

/// Points with a worse accuracy count as poor in the quality audit (meters).
pub const POOR_ACCURACY_METERS: f64 = 50.0;

/// Default number of segments per moving-average window.
pub const DEFAULT_WINDOW_SIZE: usize = 5;

#[inline]
fn kmh(meters: f64, secs: f64) -> f64 {
    meters / secs * 3.6
}

#[inline]
fn altitude_in_range(altitude: f64) -> bool {
    (MIN_VALID_ALTITUDE..=MAX_VALID_ALTITUDE).contains(&altitude)
}

fn segment_distance(a: &TrackPoint, b: &TrackPoint) -> f64 {
    haversine_distance(&a.position(), &b.position())
}

// ============================================================================
// Distance and Speed
// ============================================================================

/// Total distance in meters, skipping outlier segments.
///
/// A segment is dropped when it is longer than [`MAX_SEGMENT_METERS`] or, when time
/// advanced across it, its implied speed exceeds [`MAX_SPEED_KMH`]. Returns `None` for
/// fewer than 2 points.
///
/// # Example
///
/// ```rust
/// use chrono::{Duration, TimeZone, Utc};
/// use trajectory_core::{aggregate, TrackPoint};
///
/// let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
/// let points: Vec<TrackPoint> = (0..3)
///     .map(|i| TrackPoint {
///         latitude: 0.0,
///         longitude: i as f64 * 0.001,
///         altitude: 10.0,
///         speed: 11.0,
///         horizontal_accuracy: 5.0,
///         timestamp: t0 + Duration::seconds(i * 10),
///     })
///     .collect();
///
/// let distance = aggregate::total_distance(&points).unwrap();
/// assert!((distance - 222.4).abs() < 1.0);
/// ```
pub fn total_distance(points: &[TrackPoint]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let sorted = sort_chronologically(points);
    Some(filtered_distance(&sorted))
}

fn filtered_distance(sorted: &[TrackPoint]) -> f64 {
    sorted
        .windows(2)
        .filter_map(|w| {
            let meters = segment_distance(&w[0], &w[1]);
            if meters > MAX_SEGMENT_METERS {
                return None;
            }
            let dt = seconds_between(w[0].timestamp, w[1].timestamp);
            if dt > 0.0 && kmh(meters, dt) > MAX_SPEED_KMH {
                return None;
            }
            Some(meters)
        })
        .sum()
}

/// Average speed in km/h over `duration_secs`.
///
/// Returns `None` when the duration or the distance is not positive, or when the result
/// exceeds [`MAX_AVERAGE_SPEED_KMH`].
pub fn average_speed(points: &[TrackPoint], duration_secs: f64) -> Option<f64> {
    if !(duration_secs > 0.0) {
        return None;
    }
    let distance = total_distance(points)?;
    if !(distance > 0.0) {
        return None;
    }
    let speed = kmh(distance, duration_secs);
    (speed <= MAX_AVERAGE_SPEED_KMH).then_some(speed)
}

/// Highest receiver-reported speed in km/h.
///
/// Unknown (negative) speeds and speeds above [`MAX_SPEED_KMH`] are ignored. `None` when
/// nothing remains.
pub fn max_speed(points: &[TrackPoint]) -> Option<f64> {
    points
        .iter()
        .filter(|p| p.speed >= 0.0)
        .map(|p| p.speed * 3.6)
        .filter(|&v| v <= MAX_SPEED_KMH)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
}

/// Sliding-window speed series in km/h.
///
/// Each window spans `window_size` segments (`window_size + 1` consecutive points) and
/// advances one point at a time. Windows with no elapsed time or a speed above
/// [`MAX_SPEED_KMH`] are left out of the series rather than replaced.
pub fn moving_average_speed(points: &[TrackPoint], window_size: usize) -> Vec<f64> {
    if window_size == 0 || points.len() < window_size + 1 {
        return Vec::new();
    }
    let sorted = sort_chronologically(points);

    sorted
        .windows(window_size + 1)
        .filter_map(|window| {
            let first = window.first()?;
            let last = window.last()?;
            let dt = seconds_between(first.timestamp, last.timestamp);
            if dt <= 0.0 {
                return None;
            }
            let meters: f64 = window.windows(2).map(|w| segment_distance(&w[0], &w[1])).sum();
            let speed = kmh(meters, dt);
            (speed <= MAX_SPEED_KMH).then_some(speed)
        })
        .collect()
}

// ============================================================================
// Elevation
// ============================================================================

/// Cumulative climb in meters.
///
/// Only rises in `(0, MAX_ELEVATION_STEP]` count; larger steps are excluded entirely.
pub fn elevation_gain(points: &[TrackPoint]) -> f64 {
    let sorted = sort_chronologically(points);
    sorted
        .windows(2)
        .map(|w| w[1].altitude - w[0].altitude)
        .filter(|&delta| delta > 0.0 && delta <= MAX_ELEVATION_STEP)
        .sum()
}

/// Highest altitude within the plausible range.
pub fn max_altitude(points: &[TrackPoint]) -> Option<f64> {
    points
        .iter()
        .map(|p| p.altitude)
        .filter(|&a| altitude_in_range(a))
        .reduce(f64::max)
}

/// Lowest altitude within the plausible range.
pub fn min_altitude(points: &[TrackPoint]) -> Option<f64> {
    points
        .iter()
        .map(|p| p.altitude)
        .filter(|&a| altitude_in_range(a))
        .reduce(f64::min)
}

// ============================================================================
// Quality Audit
// ============================================================================

/// A problem found by [`validate`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QualityIssue {
    NoData,
    TooFewPoints { count: u32 },
    OutOfOrder,
    PoorAccuracy { poor: u32, total: u32 },
    ExcessiveSpeed { count: u32 },
    LargeJumps { count: u32 },
    ImplausibleAverageSpeed { kmh: f64 },
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "track has no data"),
            Self::TooFewPoints { count } => {
                write!(f, "too few points ({}), need at least 2", count)
            }
            Self::OutOfOrder => write!(f, "points are not stored in chronological order"),
            Self::PoorAccuracy { poor, total } => write!(
                f,
                "{} of {} points have accuracy worse than {}m",
                poor, total, POOR_ACCURACY_METERS
            ),
            Self::ExcessiveSpeed { count } => write!(
                f,
                "{} points report speed above {}km/h",
                count, MAX_SPEED_KMH
            ),
            Self::LargeJumps { count } => write!(
                f,
                "{} jumps longer than {}m between consecutive points",
                count, MAX_SEGMENT_METERS
            ),
            Self::ImplausibleAverageSpeed { kmh } => write!(
                f,
                "average speed {:.1}km/h exceeds {}km/h",
                kmh, MAX_AVERAGE_SPEED_KMH
            ),
        }
    }
}

/// Result of [`validate`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualityReport {
    /// True iff `issues` is empty
    pub is_valid: bool,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    fn from_issues(issues: Vec<QualityIssue>) -> Self {
        Self {
            is_valid: issues.is_empty(),
            issues,
        }
    }

    /// Human-readable description of each issue.
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.to_string()).collect()
    }
}

/// Audit a track's data quality.
///
/// Empty and single-point tracks stop after the first issue. Otherwise all of the following
/// are reported together:
///
/// - stored order differs from chronological order
/// - more than half the points have accuracy worse than [`POOR_ACCURACY_METERS`]
/// - points reporting more than [`MAX_SPEED_KMH`]
/// - consecutive jumps longer than [`MAX_SEGMENT_METERS`]
/// - unfiltered average speed above [`MAX_AVERAGE_SPEED_KMH`]
pub fn validate(track: &Track) -> QualityReport {
    let points = &track.points;
    let mut issues = Vec::new();

    if points.is_empty() {
        issues.push(QualityIssue::NoData);
        return QualityReport::from_issues(issues);
    }
    if points.len() < 2 {
        issues.push(QualityIssue::TooFewPoints { count: points.len() as u32 });
        return QualityReport::from_issues(issues);
    }

    if !is_chronological(points) {
        issues.push(QualityIssue::OutOfOrder);
    }

    let total = points.len() as u32;
    let poor = points
        .iter()
        .filter(|p| p.horizontal_accuracy > POOR_ACCURACY_METERS)
        .count() as u32;
    if poor * 2 > total {
        issues.push(QualityIssue::PoorAccuracy { poor, total });
    }

    let fast = points.iter().filter(|p| p.speed * 3.6 > MAX_SPEED_KMH).count() as u32;
    if fast > 0 {
        issues.push(QualityIssue::ExcessiveSpeed { count: fast });
    }

    let sorted = sort_chronologically(points);
    let jumps = sorted
        .windows(2)
        .filter(|w| segment_distance(&w[0], &w[1]) > MAX_SEGMENT_METERS)
        .count() as u32;
    if jumps > 0 {
        issues.push(QualityIssue::LargeJumps { count: jumps });
    }

    let duration = track.duration_secs();
    if duration > 0.0 {
        let positions: Vec<GpsPoint> = sorted.iter().map(TrackPoint::position).collect();
        let speed = kmh(polyline_length(&positions), duration);
        if speed > MAX_AVERAGE_SPEED_KMH {
            issues.push(QualityIssue::ImplausibleAverageSpeed { kmh: speed });
        }
    }

    QualityReport::from_issues(issues)
}

// ============================================================================
// Summaries
// ============================================================================

/// Headline numbers for one track.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackStats {
    pub track_id: String,
    pub point_count: u32,
    /// Seconds between start and end (or first and last point while recording)
    pub duration_secs: f64,
    /// Outlier-filtered distance in meters
    pub distance_meters: Option<f64>,
    pub average_speed_kmh: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    pub elevation_gain_meters: f64,
    pub min_altitude: Option<f64>,
    pub max_altitude: Option<f64>,
    /// WGS84 bounding box for map framing
    pub bounds: Option<Bounds>,
}

/// Compute every statistic for a track.
pub fn summarize(track: &Track) -> TrackStats {
    let points = &track.points;
    let duration_secs = track.duration_secs();
    let positions: Vec<GpsPoint> = points.iter().map(TrackPoint::position).collect();

    TrackStats {
        track_id: track.id.clone(),
        point_count: points.len() as u32,
        duration_secs,
        distance_meters: total_distance(points),
        average_speed_kmh: average_speed(points, duration_secs),
        max_speed_kmh: max_speed(points),
        elevation_gain_meters: elevation_gain(points),
        min_altitude: min_altitude(points),
        max_altitude: max_altitude(points),
        bounds: Bounds::from_points(&positions),
    }
}

/// Summarize several stored tracks, in input order.
pub fn summarize_many(tracks: &[Track]) -> Vec<TrackStats> {
    tracks.iter().map(summarize).collect()
}

/// Summarize several stored tracks using rayon.
///
/// Same output as [`summarize_many`]. Worth it for large track libraries.
#[cfg(feature = "parallel")]
pub fn summarize_many_parallel(tracks: &[Track]) -> Vec<TrackStats> {
    use rayon::prelude::*;

    tracks.par_iter().map(summarize).collect()
}

// ============================================================================
// Tests
// ============================================================================
