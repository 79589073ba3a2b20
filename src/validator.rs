//! Live fix validation.
//!
//! Decides whether a raw fix from the location source is trustworthy enough to enter a
//! recording session. Checks run fail-fast in this order:
//!
//! 1. position (finite, within ±90° / ±180°)
//! 2. horizontal accuracy
//! 3. fix age relative to "now"
//! 4. receiver-reported speed
//! 5. movement relative to the last accepted fix (computed speed, jump distance,
//!    stationary jitter)
//! 6. altitude range
//!
//! Thresholds are tuned for live recording and are stricter than the post-hoc limits in
//! [`crate::aggregate`] (120 km/h here, 150 km/h there).

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::geo_utils::{haversine_distance, seconds_between};
use crate::RawFix;

/// Thresholds applied by [`FixValidator`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidatorConfig {
    /// Worst acceptable horizontal accuracy in meters. Zero and negative accuracies are
    /// always rejected. Default: 30.0
    pub max_accuracy: f64,

    /// Maximum distance in time between a fix and "now", in seconds. Rejects cached fixes.
    /// Default: 5.0
    pub max_fix_age_secs: f64,

    /// Maximum plausible speed in km/h, applied to both the reported and the computed speed.
    /// Default: 120.0
    pub max_speed_kmh: f64,

    /// Maximum distance from the last accepted fix in meters. Default: 500.0
    pub max_jump_meters: f64,

    /// Movements shorter than this (meters) are jitter when the device is still.
    /// Default: 2.0
    pub stationary_distance: f64,

    /// Jitter suppression only applies within this many seconds of the last fix.
    /// Default: 10.0
    pub stationary_window_secs: f64,

    /// Lowest plausible altitude in meters. Default: -500.0
    pub min_altitude: f64,

    /// Highest plausible altitude in meters. Default: 10000.0
    pub max_altitude: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_accuracy: 30.0,
            max_fix_age_secs: 5.0,
            max_speed_kmh: 120.0,
            max_jump_meters: 500.0,
            stationary_distance: 2.0,
            stationary_window_secs: 10.0,
            min_altitude: -500.0,
            max_altitude: 10000.0,
        }
    }
}

/// Reason a fix was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FixRejection {
    #[error("position ({latitude}, {longitude}) is not a valid coordinate")]
    Position { latitude: f64, longitude: f64 },

    #[error("horizontal accuracy {accuracy:.1}m outside (0, limit]")]
    Accuracy { accuracy: f64 },

    #[error("fix is {age_secs:.1}s away from now")]
    Stale { age_secs: f64 },

    #[error("reported speed {kmh:.1}km/h too high")]
    ReportedSpeed { kmh: f64 },

    #[error("computed speed {kmh:.1}km/h from last fix too high")]
    ComputedSpeed { kmh: f64 },

    #[error("jumped {meters:.0}m from last fix")]
    Jump { meters: f64 },

    #[error("stationary jitter of {meters:.2}m")]
    Stationary { meters: f64 },

    #[error("altitude {meters:.0}m out of range")]
    Altitude { meters: f64 },
}

/// Gatekeeper for raw fixes.
///
/// Holds the thresholds and, when driven through [`FixValidator::accept_at`], the last fix it
/// let through. That state belongs to a single recording session and must be cleared with
/// [`FixValidator::reset`] before the next one.
#[derive(Debug, Clone, Default)]
pub struct FixValidator {
    config: ValidatorConfig,
    last_accepted: Option<RawFix>,
}

impl FixValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config, last_accepted: None }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// The last fix accepted through [`FixValidator::accept_at`].
    pub fn last_accepted(&self) -> Option<&RawFix> {
        self.last_accepted.as_ref()
    }

    /// Forget the last accepted fix.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }

    /// Check a fix against `last_accepted`, measuring its age against the system clock.
    pub fn is_valid(&self, fix: &RawFix, last_accepted: Option<&RawFix>, is_moving: bool) -> bool {
        self.is_valid_at(fix, last_accepted, is_moving, Utc::now())
    }

    /// Same as [`FixValidator::is_valid`] with an explicit clock reading.
    pub fn is_valid_at(
        &self,
        fix: &RawFix,
        last_accepted: Option<&RawFix>,
        is_moving: bool,
        now: DateTime<Utc>,
    ) -> bool {
        self.check_at(fix, last_accepted, is_moving, now).is_ok()
    }

    /// Run every check and report the first one that fails.
    ///
    /// Comparisons are written so that NaN fields fail them.
    pub fn check_at(
        &self,
        fix: &RawFix,
        last_accepted: Option<&RawFix>,
        is_moving: bool,
        now: DateTime<Utc>,
    ) -> Result<(), FixRejection> {
        let cfg = &self.config;

        if !fix.position().is_valid() {
            return Err(FixRejection::Position {
                latitude: fix.latitude,
                longitude: fix.longitude,
            });
        }

        let accuracy = fix.horizontal_accuracy;
        if !(accuracy > 0.0 && accuracy <= cfg.max_accuracy) {
            return Err(FixRejection::Accuracy { accuracy });
        }

        let age_secs = seconds_between(fix.timestamp, now).abs();
        if age_secs > cfg.max_fix_age_secs {
            return Err(FixRejection::Stale { age_secs });
        }

        if fix.speed > 0.0 {
            let kmh = fix.speed * 3.6;
            if !(kmh <= cfg.max_speed_kmh) {
                return Err(FixRejection::ReportedSpeed { kmh });
            }
        }

        if let Some(last) = last_accepted {
            let dt = seconds_between(last.timestamp, fix.timestamp);
            if dt > 0.0 {
                let meters = haversine_distance(&fix.position(), &last.position());

                let kmh = meters / dt * 3.6;
                if !(kmh <= cfg.max_speed_kmh) {
                    return Err(FixRejection::ComputedSpeed { kmh });
                }

                if !(meters <= cfg.max_jump_meters) {
                    return Err(FixRejection::Jump { meters });
                }

                if !is_moving
                    && meters < cfg.stationary_distance
                    && dt < cfg.stationary_window_secs
                {
                    return Err(FixRejection::Stationary { meters });
                }
            }
        }

        let altitude = fix.altitude;
        if !(altitude >= cfg.min_altitude && altitude <= cfg.max_altitude) {
            return Err(FixRejection::Altitude { meters: altitude });
        }

        Ok(())
    }

    /// Check a fix against this validator's own last accepted fix and remember it if it
    /// passes.
    pub fn accept_at(
        &mut self,
        fix: &RawFix,
        is_moving: bool,
        now: DateTime<Utc>,
    ) -> Result<(), FixRejection> {
        self.check_at(fix, self.last_accepted.as_ref(), is_moving, now)?;
        self.last_accepted = Some(*fix);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn fix(secs: i64, lat: f64, lon: f64) -> RawFix {
        RawFix {
            latitude: lat,
            longitude: lon,
            altitude: 45.0,
            speed: 1.5,
            horizontal_accuracy: 10.0,
            timestamp: t0() + Duration::seconds(secs),
        }
    }

    /// Latitude offset for a northward displacement in meters (haversine radius).
    fn north(meters: f64) -> f64 {
        meters / 111_195.08
    }

    #[test]
    fn test_accepts_clean_fix_without_history() {
        let v = FixValidator::default();
        let f = fix(0, 39.9, 116.4);
        assert!(v.is_valid_at(&f, None, true, f.timestamp));
    }

    #[test]
    fn test_rejects_poor_accuracy() {
        let v = FixValidator::default();
        let mut f = fix(0, 39.9, 116.4);
        f.horizontal_accuracy = 31.0;
        assert_eq!(
            v.check_at(&f, None, true, f.timestamp),
            Err(FixRejection::Accuracy { accuracy: 31.0 })
        );

        f.horizontal_accuracy = 30.0;
        assert!(v.is_valid_at(&f, None, true, f.timestamp));
    }

    #[test]
    fn test_rejects_sentinel_accuracy() {
        let v = FixValidator::default();
        for accuracy in [0.0, -1.0, f64::NAN] {
            let mut f = fix(0, 39.9, 116.4);
            f.horizontal_accuracy = accuracy;
            assert!(!v.is_valid_at(&f, None, true, f.timestamp));
        }
    }

    #[test]
    fn test_rejects_stale_fix() {
        let v = FixValidator::default();
        let f = fix(0, 39.9, 116.4);
        assert!(v.is_valid_at(&f, None, true, f.timestamp + Duration::seconds(5)));
        assert!(!v.is_valid_at(&f, None, true, f.timestamp + Duration::seconds(6)));
        assert!(!v.is_valid_at(&f, None, true, f.timestamp - Duration::seconds(6)));
    }

    #[test]
    fn test_reported_speed_limit() {
        let v = FixValidator::default();
        let mut f = fix(0, 39.9, 116.4);
        f.speed = 34.0; // 122.4 km/h
        assert!(!v.is_valid_at(&f, None, true, f.timestamp));

        f.speed = -1.0; // unknown
        assert!(v.is_valid_at(&f, None, true, f.timestamp));
    }

    #[test]
    fn test_rejects_computed_speed() {
        let v = FixValidator::default();
        let last = fix(0, 39.9, 116.4);
        // 361m in 10s = 130 km/h
        let f = fix(10, 39.9 + north(361.1), 116.4);
        let result = v.check_at(&f, Some(&last), true, f.timestamp);
        assert!(matches!(result, Err(FixRejection::ComputedSpeed { .. })));
    }

    #[test]
    fn test_rejects_jump() {
        let v = FixValidator::default();
        let last = fix(0, 39.9, 116.4);

        // 600m in 1s trips the speed rule first
        let fast = fix(1, 39.9 + north(600.0), 116.4);
        assert!(!v.is_valid_at(&fast, Some(&last), true, fast.timestamp));

        // 600m in 60s is 36 km/h, only the jump rule catches it
        let slow = fix(60, 39.9 + north(600.0), 116.4);
        let result = v.check_at(&slow, Some(&last), true, slow.timestamp);
        assert!(matches!(result, Err(FixRejection::Jump { .. })));
    }

    #[test]
    fn test_stationary_jitter() {
        let v = FixValidator::default();
        let last = fix(0, 39.9, 116.4);
        let jitter = fix(3, 39.9 + north(1.0), 116.4);

        assert!(matches!(
            v.check_at(&jitter, Some(&last), false, jitter.timestamp),
            Err(FixRejection::Stationary { .. })
        ));
        assert!(v.is_valid_at(&jitter, Some(&last), true, jitter.timestamp));

        let later = fix(12, 39.9 + north(1.0), 116.4);
        assert!(v.is_valid_at(&later, Some(&last), false, later.timestamp));
    }

    #[test]
    fn test_rejects_invalid_position() {
        let v = FixValidator::default();

        let nan = fix(0, f64::NAN, 116.4);
        assert!(matches!(
            v.check_at(&nan, None, true, nan.timestamp),
            Err(FixRejection::Position { .. })
        ));

        let out_of_range = fix(0, 39.9, 181.0);
        assert_eq!(
            v.check_at(&out_of_range, None, true, out_of_range.timestamp),
            Err(FixRejection::Position { latitude: 39.9, longitude: 181.0 })
        );

        let infinite = fix(0, f64::INFINITY, 116.4);
        assert!(!v.is_valid_at(&infinite, None, true, infinite.timestamp));
    }

    #[test]
    fn test_invalid_position_does_not_poison_history() {
        let mut v = FixValidator::default();
        let nan = fix(0, f64::NAN, 116.4);
        assert!(v.accept_at(&nan, true, nan.timestamp).is_err());
        assert!(v.last_accepted().is_none());

        let accepted = (1..20)
            .map(|i| fix(i, 39.9 + north(1.5 * i as f64), 116.4))
            .filter(|f| v.accept_at(f, true, f.timestamp).is_ok())
            .count();
        assert_eq!(accepted, 19);
    }

    #[test]
    fn test_rejects_altitude() {
        let v = FixValidator::default();
        let mut f = fix(0, 39.9, 116.4);
        f.altitude = 11000.0;
        assert_eq!(
            v.check_at(&f, None, true, f.timestamp),
            Err(FixRejection::Altitude { meters: 11000.0 })
        );
        f.altitude = -500.0;
        assert!(v.is_valid_at(&f, None, true, f.timestamp));
    }

    #[test]
    fn test_duplicate_and_out_of_order_skip_relative_checks() {
        let v = FixValidator::default();
        let last = fix(10, 39.9, 116.4);

        let duplicate = last;
        assert!(v.is_valid_at(&duplicate, Some(&last), false, duplicate.timestamp));

        let earlier = fix(8, 39.9 + north(900.0), 116.4);
        assert!(v.is_valid_at(&earlier, Some(&last), true, earlier.timestamp));
    }

    #[test]
    fn test_valid_neighbors_accepted() {
        let v = FixValidator::default();
        let last = fix(0, 39.9, 116.4);
        // 50m in 5s = 36 km/h
        let f = fix(5, 39.9 + north(50.0), 116.4);
        assert!(v.is_valid_at(&f, Some(&last), true, f.timestamp));
    }

    #[test]
    fn test_accept_tracks_last_and_resets() {
        let mut v = FixValidator::default();
        let first = fix(0, 39.9, 116.4);
        assert!(v.accept_at(&first, true, first.timestamp).is_ok());
        assert_eq!(v.last_accepted(), Some(&first));

        let jump = fix(60, 39.9 + north(600.0), 116.4);
        assert!(v.accept_at(&jump, true, jump.timestamp).is_err());
        assert_eq!(v.last_accepted(), Some(&first));

        v.reset();
        assert!(v.last_accepted().is_none());
        assert!(v.accept_at(&jump, true, jump.timestamp).is_ok());
    }
}
