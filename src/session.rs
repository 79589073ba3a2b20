//! Recording sessions.
//!
//! [`TrackRecorder`] wires the pipeline together for one session at a time:
//!
//! ```text
//! RawFix -> FixValidator -> KalmanSmoother -> Track buffer
//! ```
//!
//! It exclusively owns the validator's last accepted fix, the [`FilterState`] and the
//! in-progress [`Track`]. Readers get owned copies through [`TrackRecorder::snapshot`];
//! stopping hands the buffer over and clears all filter state so nothing carries into the
//! next session.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::kalman::{FilterState, KalmanSmoother, SmootherConfig};
use crate::validator::{FixValidator, ValidatorConfig};
use crate::{RawFix, Track, TrackPoint};

/// Allowed deviation of the acceleration magnitude from 1 g before the device counts as
/// moving.
pub const MOTION_THRESHOLD_G: f64 = 0.15;

/// Derive the validator's `is_moving` flag from an accelerometer sample in g.
pub fn is_moving_from_acceleration(x: f64, y: f64, z: f64) -> bool {
    let magnitude = (x * x + y * y + z * z).sqrt();
    (magnitude - 1.0).abs() > MOTION_THRESHOLD_G
}

/// Counters for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SessionCounters {
    pub accepted: u32,
    pub rejected: u32,
}

/// Drives validation and smoothing for one recording at a time.
#[derive(Debug, Default)]
pub struct TrackRecorder {
    validator: FixValidator,
    smoother: KalmanSmoother,
    filter: FilterState,
    current: Option<Track>,
    counters: SessionCounters,
}

impl TrackRecorder {
    pub fn new(validator: ValidatorConfig, smoother: SmootherConfig) -> Self {
        Self {
            validator: FixValidator::new(validator),
            smoother: KalmanSmoother::new(smoother),
            filter: FilterState::new(),
            current: None,
            counters: SessionCounters::default(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.current.is_some()
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    /// Filter state of the active session.
    pub fn filter_state(&self) -> &FilterState {
        &self.filter
    }

    /// Begin a new session with an empty track.
    ///
    /// A session still in progress is discarded. Validator and filter state always start
    /// from scratch.
    pub fn start(&mut self, id: &str, name: &str, started_at: DateTime<Utc>) {
        if let Some(previous) = self.current.take() {
            info!(
                "[TrackRecorder] Discarding unfinished track {} ({} points)",
                previous.id,
                previous.points.len()
            );
        }
        self.reset_state();
        self.current = Some(Track::new(id, name, started_at));
        info!("[TrackRecorder] Started track {} '{}'", id, name);
    }

    /// Feed one fix, measuring its age against the system clock.
    pub fn push_fix(&mut self, fix: &RawFix, is_moving: bool) -> Option<TrackPoint> {
        self.push_fix_at(fix, is_moving, Utc::now())
    }

    /// Feed one fix with an explicit clock reading.
    ///
    /// Returns the stored point when the fix was accepted. Rejected fixes are dropped and
    /// counted. Fixes arriving while no session is active are ignored and not counted.
    pub fn push_fix_at(
        &mut self,
        fix: &RawFix,
        is_moving: bool,
        now: DateTime<Utc>,
    ) -> Option<TrackPoint> {
        let track = self.current.as_mut()?;

        if let Err(reason) = self.validator.accept_at(fix, is_moving, now) {
            self.counters.rejected += 1;
            debug!("[TrackRecorder] Rejected fix: {}", reason);
            return None;
        }

        let smoothed = self.smoother.smooth(&mut self.filter, fix);
        let point = TrackPoint::from(smoothed);
        track.points.push(point);
        self.counters.accepted += 1;
        Some(point)
    }

    /// Feed an ordered stream of `(fix, is_moving, arrived_at)` items, returning how many
    /// were accepted.
    ///
    /// Each fix is aged against its own arrival time, so a replayed stream spanning minutes
    /// is judged the same way it was live.
    pub fn ingest_all<I>(&mut self, fixes: I) -> usize
    where
        I: IntoIterator<Item = (RawFix, bool, DateTime<Utc>)>,
    {
        fixes
            .into_iter()
            .filter(|(fix, moving, arrived_at)| {
                self.push_fix_at(fix, *moving, *arrived_at).is_some()
            })
            .count()
    }

    /// Copy of the points recorded so far, in insertion order.
    pub fn snapshot(&self) -> Vec<TrackPoint> {
        self.current
            .as_ref()
            .map(|t| t.points.clone())
            .unwrap_or_default()
    }

    /// End the session and hand over the finished track.
    ///
    /// Returns `None` when nothing was recording.
    pub fn stop(&mut self, ended_at: DateTime<Utc>) -> Option<Track> {
        let mut track = self.current.take()?;
        track.end_time = Some(ended_at);

        info!(
            "[TrackRecorder] Stopped track {}: {} points kept, {} fixes rejected",
            track.id, self.counters.accepted, self.counters.rejected
        );
        self.reset_state();
        Some(track)
    }

    fn reset_state(&mut self) {
        self.validator.reset();
        self.smoother.reset(&mut self.filter);
        self.counters = SessionCounters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn fix(secs: i64, lat: f64, lon: f64, accuracy: f64) -> RawFix {
        RawFix {
            latitude: lat,
            longitude: lon,
            altitude: 30.0,
            speed: 1.4,
            horizontal_accuracy: accuracy,
            timestamp: t0() + Duration::seconds(secs),
        }
    }

    #[test]
    fn test_motion_threshold() {
        assert!(!is_moving_from_acceleration(0.0, 0.0, 1.0));
        assert!(!is_moving_from_acceleration(0.0, 0.1, 1.1));
        assert!(is_moving_from_acceleration(0.0, 0.0, 1.2));
        assert!(is_moving_from_acceleration(0.0, 0.0, 0.8));
    }

    #[test]
    fn test_push_without_session_is_ignored() {
        let mut recorder = TrackRecorder::default();
        let f = fix(0, 39.9, 116.4, 5.0);
        assert!(recorder.push_fix_at(&f, true, f.timestamp).is_none());
        assert!(recorder.snapshot().is_empty());
        assert_eq!(recorder.counters(), SessionCounters::default());
        assert!(recorder.stop(t0()).is_none());
    }

    #[test]
    fn test_pipeline_validates_then_smooths() {
        let mut recorder = TrackRecorder::default();
        recorder.start("walk-1", "Lunch walk", t0());
        assert!(recorder.is_recording());

        let first = fix(0, 39.9, 116.4, 5.0);
        let stored = recorder.push_fix_at(&first, true, first.timestamp).unwrap();
        assert_eq!(stored, TrackPoint::from(first));

        let poor = fix(1, 39.90001, 116.4, 45.0);
        assert!(recorder.push_fix_at(&poor, true, poor.timestamp).is_none());

        let second = fix(5, 39.9001, 116.4, 5.0);
        let stored = recorder.push_fix_at(&second, true, second.timestamp).unwrap();
        assert!(stored.latitude > 39.9 && stored.latitude < 39.9001);
        assert_eq!(stored.timestamp, second.timestamp);

        assert_eq!(recorder.counters(), SessionCounters { accepted: 2, rejected: 1 });
        assert_eq!(recorder.snapshot().len(), 2);
    }

    #[test]
    fn test_ingest_all_counts_accepted() {
        let mut recorder = TrackRecorder::default();
        recorder.start("run-1", "Run", t0());

        let now = t0() + Duration::seconds(4);
        let stream = vec![
            (fix(0, 31.2, 121.4, 8.0), true, now),
            (fix(1, 31.2, 121.4, 0.0), true, now),  // sentinel accuracy
            (fix(2, 31.20002, 121.4, 8.0), true, now),
            (fix(2, 31.20002, 121.4, 8.0), true, now),  // duplicate
            (fix(3, 31.21, 121.4, 8.0), true, now),     // ~1.1km jump
            (fix(4, 31.20004, 121.4, 8.0), false, now),
        ];
        assert_eq!(recorder.ingest_all(stream), 4);
        assert_eq!(recorder.counters().rejected, 2);
    }

    #[test]
    fn test_ingest_all_ages_each_fix_at_arrival() {
        let mut recorder = TrackRecorder::default();
        recorder.start("walk-2", "Long walk", t0());

        // one minute of walking, 3m every 2s
        let stream: Vec<_> = (0..30)
            .map(|i| {
                let f = fix(i * 2, 39.9 + i as f64 * 3.0 / 111_195.08, 116.4, 6.0);
                (f, true, f.timestamp + Duration::milliseconds(300))
            })
            .collect();
        assert_eq!(recorder.ingest_all(stream), 30);
        assert_eq!(recorder.counters(), SessionCounters { accepted: 30, rejected: 0 });

        // a cached fix delivered late is still stale
        let cached = fix(20, 39.9, 116.4, 6.0);
        let late = vec![(cached, true, t0() + Duration::seconds(70))];
        assert_eq!(recorder.ingest_all(late), 0);
    }

    #[test]
    fn test_stop_flushes_and_resets() {
        let mut recorder = TrackRecorder::default();
        recorder.start("ride-1", "Ride", t0());
        for i in 0..5 {
            let f = fix(i * 2, 22.5 + i as f64 * 1e-4, 114.0, 6.0);
            recorder.push_fix_at(&f, true, f.timestamp);
        }

        let track = recorder.stop(t0() + Duration::seconds(10)).unwrap();
        assert_eq!(track.id, "ride-1");
        assert_eq!(track.points.len(), 5);
        assert_eq!(track.end_time, Some(t0() + Duration::seconds(10)));
        assert!(!track.is_recording());

        assert!(!recorder.is_recording());
        assert!(!recorder.filter_state().is_initialized());
        assert_eq!(recorder.counters(), SessionCounters::default());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let mut recorder = TrackRecorder::default();
        recorder.start("a", "First", t0());
        for i in 0..10 {
            let f = fix(i, 22.5 + i as f64 * 5e-5, 114.0, 12.0);
            recorder.push_fix_at(&f, true, f.timestamp);
        }
        recorder.stop(t0() + Duration::seconds(10));

        recorder.start("b", "Second", t0() + Duration::seconds(60));
        // Far from the last fix of session one; a leaked validator would call this a jump
        let first = fix(61, 31.2, 121.4, 9.0);
        let stored = recorder.push_fix_at(&first, true, first.timestamp).unwrap();
        assert_eq!(stored.latitude.to_bits(), first.latitude.to_bits());
        assert_eq!(stored.longitude.to_bits(), first.longitude.to_bits());
        assert_eq!(recorder.filter_state().variance(), 81.0);
    }

    #[test]
    fn test_restart_discards_unfinished_track() {
        let mut recorder = TrackRecorder::default();
        recorder.start("a", "First", t0());
        let f = fix(0, 22.5, 114.0, 5.0);
        recorder.push_fix_at(&f, true, f.timestamp);

        recorder.start("b", "Second", t0());
        assert!(recorder.snapshot().is_empty());
        let track = recorder.stop(t0()).unwrap();
        assert_eq!(track.id, "b");
    }
}
