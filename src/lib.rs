//! # Trajectory Core
//!
//! Turns a noisy stream of raw GPS fixes into a clean, analyzable trajectory.
//!
//! This library provides:
//! - Fix validation against accuracy, age, speed, jump and altitude limits
//! - A scalar Kalman smoother for position noise
//! - WGS84 / GCJ-02 / BD-09 coordinate conversion for map display in China
//! - Trajectory statistics and a data-quality audit
//! - GPX and CSV export
//!
//! ## Features
//!
//! - **`parallel`** - Batch statistics with rayon
//! - **`serde`** - Serialize fixes, points, tracks and reports
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use trajectory_core::{aggregate, RawFix, TrackRecorder};
//!
//! let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
//! let mut recorder = TrackRecorder::default();
//! recorder.start("walk-1", "Lunch walk", t0);
//!
//! for i in 0..10 {
//!     let fix = RawFix {
//!         latitude: 39.9042 + i as f64 * 0.0001,
//!         longitude: 116.4074,
//!         altitude: 44.0,
//!         speed: 1.4,
//!         horizontal_accuracy: 6.0,
//!         timestamp: t0 + Duration::seconds(i * 8),
//!     };
//!     recorder.push_fix_at(&fix, true, fix.timestamp);
//! }
//!
//! let track = recorder.stop(t0 + Duration::seconds(80)).unwrap();
//! let stats = aggregate::summarize(&track);
//! println!("{} points, {:.0}m", stats.point_count, stats.distance_meters.unwrap_or(0.0));
//! ```

use chrono::{DateTime, Utc};

pub mod error;
pub use error::{Error, Result};

pub mod geo_utils;

// Datum conversion for display
pub mod coords;
pub use coords::CoordinateSystem;

// Live pipeline
pub mod validator;
pub use validator::{FixRejection, FixValidator, ValidatorConfig};

pub mod kalman;
pub use kalman::{FilterState, KalmanSmoother, SmootherConfig};

pub mod session;
pub use session::{SessionCounters, TrackRecorder};

// Post-hoc analysis and output
pub mod aggregate;
pub use aggregate::{QualityIssue, QualityReport, TrackStats};

pub mod export;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TrajectoryCoreRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use trajectory_core::GpsPoint;
/// let point = GpsPoint::new(39.9042, 116.4074); // Beijing
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }
}

/// One positioning measurement as delivered by the location source.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawFix {
    /// Degrees, WGS84
    pub latitude: f64,
    /// Degrees, WGS84
    pub longitude: f64,
    /// Meters above sea level
    pub altitude: f64,
    /// Meters per second; negative when the receiver does not know
    pub speed: f64,
    /// Radius of uncertainty in meters; zero or negative means invalid
    pub horizontal_accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl RawFix {
    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// A recorded, smoothed trajectory point. Always WGS84.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub horizontal_accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl TrackPoint {
    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

impl From<RawFix> for TrackPoint {
    fn from(fix: RawFix) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude,
            speed: fix.speed,
            horizontal_accuracy: fix.horizontal_accuracy,
            timestamp: fix.timestamp,
        }
    }
}

/// A recording and its points in insertion order.
///
/// Insertion order is not guaranteed to be chronological; use [`Track::sorted_points`]
/// before interpreting the sequence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    pub id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    /// `None` while still recording
    pub end_time: Option<DateTime<Utc>>,
    pub points: Vec<TrackPoint>,
}

impl Track {
    /// Create an empty track that is still recording.
    pub fn new(id: &str, name: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            start_time,
            end_time: None,
            points: Vec::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.end_time.is_none()
    }

    /// Points in timestamp order.
    pub fn sorted_points(&self) -> Vec<TrackPoint> {
        geo_utils::sort_chronologically(&self.points)
    }

    /// Duration in seconds.
    ///
    /// Finished tracks use `end_time - start_time`. Tracks still recording use the span
    /// between their earliest and latest point, or 0.0 with fewer than two points.
    pub fn duration_secs(&self) -> f64 {
        if let Some(end) = self.end_time {
            return geo_utils::seconds_between(self.start_time, end).max(0.0);
        }
        let first = self.points.iter().map(|p| p.timestamp).min();
        let last = self.points.iter().map(|p| p.timestamp).max();
        match (first, last) {
            (Some(first), Some(last)) => geo_utils::seconds_between(first, last),
            _ => 0.0,
        }
    }
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::{info, warn};
    use std::sync::{Arc, Mutex, MutexGuard};

    /// Out-of-range millisecond values fall back to the Unix epoch with a warning.
    fn from_millis(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap_or_else(|| {
            warn!("[TrajectoryCoreRust] Timestamp {}ms out of range, using epoch", ms);
            DateTime::default()
        })
    }

    /// A fix or stored point crossing the FFI boundary.
    /// Timestamps are Unix epoch milliseconds.
    #[derive(Debug, Clone, Copy, uniffi::Record)]
    pub struct FfiFix {
        pub latitude: f64,
        pub longitude: f64,
        pub altitude: f64,
        pub speed: f64,
        pub horizontal_accuracy: f64,
        pub timestamp_ms: i64,
    }

    impl From<FfiFix> for RawFix {
        fn from(f: FfiFix) -> Self {
            RawFix {
                latitude: f.latitude,
                longitude: f.longitude,
                altitude: f.altitude,
                speed: f.speed,
                horizontal_accuracy: f.horizontal_accuracy,
                timestamp: from_millis(f.timestamp_ms),
            }
        }
    }

    impl From<FfiFix> for TrackPoint {
        fn from(f: FfiFix) -> Self {
            TrackPoint::from(RawFix::from(f))
        }
    }

    impl From<TrackPoint> for FfiFix {
        fn from(p: TrackPoint) -> Self {
            FfiFix {
                latitude: p.latitude,
                longitude: p.longitude,
                altitude: p.altitude,
                speed: p.speed,
                horizontal_accuracy: p.horizontal_accuracy,
                timestamp_ms: p.timestamp.timestamp_millis(),
            }
        }
    }

    /// A track crossing the FFI boundary.
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiTrack {
        pub id: String,
        pub name: String,
        pub start_time_ms: i64,
        pub end_time_ms: Option<i64>,
        pub points: Vec<FfiFix>,
    }

    impl From<FfiTrack> for Track {
        fn from(t: FfiTrack) -> Self {
            Track {
                id: t.id,
                name: t.name,
                start_time: from_millis(t.start_time_ms),
                end_time: t.end_time_ms.map(from_millis),
                points: t.points.into_iter().map(TrackPoint::from).collect(),
            }
        }
    }

    impl From<Track> for FfiTrack {
        fn from(t: Track) -> Self {
            FfiTrack {
                id: t.id,
                name: t.name,
                start_time_ms: t.start_time.timestamp_millis(),
                end_time_ms: t.end_time.map(|e| e.timestamp_millis()),
                points: t.points.into_iter().map(FfiFix::from).collect(),
            }
        }
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Recording session handle for Kotlin/Swift.
    /// Fixes must be pushed from one thread at a time, in arrival order.
    #[derive(uniffi::Object)]
    pub struct FfiTrackRecorder {
        inner: Mutex<TrackRecorder>,
    }

    impl FfiTrackRecorder {
        fn lock(&self) -> MutexGuard<'_, TrackRecorder> {
            self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    #[uniffi::export]
    impl FfiTrackRecorder {
        #[uniffi::constructor]
        pub fn new(validator: ValidatorConfig, smoother: SmootherConfig) -> Arc<Self> {
            init_logging();
            Arc::new(Self {
                inner: Mutex::new(TrackRecorder::new(validator, smoother)),
            })
        }

        pub fn start(&self, id: String, name: String, started_at_ms: i64) {
            self.lock().start(&id, &name, from_millis(started_at_ms));
        }

        /// Returns true when the fix was accepted and stored.
        /// Fixes with an unrepresentable timestamp are rejected.
        pub fn push_fix(&self, fix: FfiFix, is_moving: bool) -> bool {
            if DateTime::from_timestamp_millis(fix.timestamp_ms).is_none() {
                warn!(
                    "[TrajectoryCoreRust] Rejected fix with out-of-range timestamp {}ms",
                    fix.timestamp_ms
                );
                return false;
            }
            self.lock().push_fix(&RawFix::from(fix), is_moving).is_some()
        }

        pub fn is_recording(&self) -> bool {
            self.lock().is_recording()
        }

        pub fn counters(&self) -> SessionCounters {
            self.lock().counters()
        }

        pub fn snapshot(&self) -> Vec<FfiFix> {
            self.lock().snapshot().into_iter().map(FfiFix::from).collect()
        }

        pub fn stop(&self, ended_at_ms: i64) -> Option<FfiTrack> {
            self.lock().stop(from_millis(ended_at_ms)).map(FfiTrack::from)
        }
    }

    #[uniffi::export]
    pub fn ffi_is_moving(x: f64, y: f64, z: f64) -> bool {
        crate::session::is_moving_from_acceleration(x, y, z)
    }

    #[uniffi::export]
    pub fn default_validator_config() -> ValidatorConfig {
        init_logging();
        ValidatorConfig::default()
    }

    #[uniffi::export]
    pub fn default_smoother_config() -> SmootherConfig {
        SmootherConfig::default()
    }

    // ========================================================================
    // Coordinates
    // ========================================================================

    #[uniffi::export]
    pub fn ffi_out_of_china(lat: f64, lon: f64) -> bool {
        crate::coords::out_of_china(lat, lon)
    }

    #[uniffi::export]
    pub fn ffi_convert_coordinate(
        lat: f64,
        lon: f64,
        from: CoordinateSystem,
        to: CoordinateSystem,
    ) -> GpsPoint {
        crate::coords::convert(lat, lon, from, to)
    }

    #[uniffi::export]
    pub fn ffi_to_display(lat: f64, lon: f64) -> GpsPoint {
        crate::coords::to_display(lat, lon)
    }

    /// Map-ready coordinates for a recorded snapshot, in chronological order.
    #[uniffi::export]
    pub fn ffi_display_points(points: Vec<FfiFix>) -> Vec<GpsPoint> {
        let points: Vec<TrackPoint> = points.into_iter().map(TrackPoint::from).collect();
        crate::coords::display_points(&points)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    #[uniffi::export]
    pub fn ffi_summarize(track: FfiTrack) -> TrackStats {
        init_logging();
        crate::aggregate::summarize(&Track::from(track))
    }

    #[uniffi::export]
    pub fn ffi_summarize_many(tracks: Vec<FfiTrack>) -> Vec<TrackStats> {
        init_logging();
        info!("[TrajectoryCoreRust] summarize_many called with {} tracks", tracks.len());

        let start = std::time::Instant::now();
        let tracks: Vec<Track> = tracks.into_iter().map(Track::from).collect();
        let stats = crate::aggregate::summarize_many_parallel(&tracks);

        info!("[TrajectoryCoreRust] Summarized {} tracks in {:?}", stats.len(), start.elapsed());
        stats
    }

    #[uniffi::export]
    pub fn ffi_moving_average_speed(points: Vec<FfiFix>, window_size: u32) -> Vec<f64> {
        let points: Vec<TrackPoint> = points.into_iter().map(TrackPoint::from).collect();
        crate::aggregate::moving_average_speed(&points, window_size as usize)
    }

    #[uniffi::export]
    pub fn ffi_validate_track(track: FfiTrack) -> QualityReport {
        init_logging();
        let report = crate::aggregate::validate(&Track::from(track));
        if !report.is_valid {
            info!("[TrajectoryCoreRust] Quality issues: {:?}", report.messages());
        }
        report
    }

    // ========================================================================
    // Export
    // ========================================================================

    #[uniffi::export]
    pub fn ffi_export_gpx(track: FfiTrack) -> String {
        crate::export::to_gpx(&Track::from(track))
    }

    /// CSV text, or None when rendering failed.
    #[uniffi::export]
    pub fn ffi_export_csv(track: FfiTrack) -> Option<String> {
        init_logging();
        match crate::export::to_csv(&Track::from(track)) {
            Ok(csv) => Some(csv),
            Err(e) => {
                warn!("[TrajectoryCoreRust] CSV export failed: {}", e);
                None
            }
        }
    }

}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn point(secs: i64) -> TrackPoint {
        TrackPoint {
            latitude: 39.9,
            longitude: 116.4,
            altitude: 44.0,
            speed: 1.0,
            horizontal_accuracy: 5.0,
            timestamp: t0() + Duration::seconds(secs),
        }
    }

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(39.9042, 116.4074).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds() {
        assert!(Bounds::from_points(&[]).is_none());

        let bounds = Bounds::from_points(&[
            GpsPoint::new(39.90, 116.40),
            GpsPoint::new(39.92, 116.38),
        ])
        .unwrap();
        assert_eq!(bounds.min_lat, 39.90);
        assert_eq!(bounds.max_lng, 116.40);
        assert_eq!(bounds.max_lat, 39.92);
        assert_eq!(bounds.min_lng, 116.38);
    }

    #[test]
    fn test_track_point_from_fix() {
        let fix = RawFix {
            latitude: 1.0,
            longitude: 2.0,
            altitude: 3.0,
            speed: -1.0,
            horizontal_accuracy: 4.0,
            timestamp: t0(),
        };
        let p = TrackPoint::from(fix);
        assert_eq!(p.position(), fix.position());
        assert_eq!(p.speed, -1.0);
        assert_eq!(p.timestamp, fix.timestamp);
    }

    #[test]
    fn test_track_duration() {
        let mut track = Track::new("t", "Track", t0());
        assert!(track.is_recording());
        assert_eq!(track.duration_secs(), 0.0);

        track.points = vec![point(30), point(5), point(12)];
        assert_eq!(track.duration_secs(), 25.0);

        track.end_time = Some(t0() + Duration::seconds(90));
        assert!(!track.is_recording());
        assert_eq!(track.duration_secs(), 90.0);
    }

    #[test]
    fn test_track_sorted_points_leaves_storage_alone() {
        let mut track = Track::new("t", "Track", t0());
        track.points = vec![point(30), point(5)];
        let sorted = track.sorted_points();
        assert_eq!(sorted[0].timestamp, t0() + Duration::seconds(5));
        assert_eq!(track.points[0].timestamp, t0() + Duration::seconds(30));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_track_serde_round_trip() {
        let mut track = Track::new("t", "Track", t0());
        track.points = vec![point(0), point(1)];
        let json = serde_json::to_string(&track).unwrap();
        let back: Track = serde_json::from_str(&json).unwrap();
        assert_eq!(back, track);
    }
}
