//! # Kalman Position Smoother
//!
//! A one-dimensional Kalman filter applied jointly to latitude and longitude. A single
//! scalar variance (in m²) stands in for the full 2×2 covariance, so both axes share one
//! gain.
//!
//! ## State machine
//!
//! ```text
//! Uninitialized --first fix--> Running --reset()--> Uninitialized
//! ```
//!
//! - **Uninitialized**: the first fix seeds `variance = accuracy²` and is returned as is.
//! - **Running**: each fix advances the prediction by the elapsed time, then blends the
//!   measurement in with gain `k = variance / (variance + r)`.
//!
//! [`FilterState`] is a plain value owned by the recording session and passed by `&mut` to
//! [`KalmanSmoother::smooth`]. Reset it at the start of every session.
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use trajectory_core::{FilterState, KalmanSmoother, RawFix};
//!
//! let smoother = KalmanSmoother::default();
//! let mut state = FilterState::new();
//!
//! let fix = RawFix {
//!     latitude: 39.9042,
//!     longitude: 116.4074,
//!     altitude: 44.0,
//!     speed: 1.2,
//!     horizontal_accuracy: 8.0,
//!     timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
//! };
//!
//! let smoothed = smoother.smooth(&mut state, &fix);
//! assert_eq!(smoothed, fix);
//! assert_eq!(state.variance(), 64.0);
//! ```

use log::debug;

use crate::geo_utils::seconds_between;
use crate::RawFix;

/// Variance marker for a filter that has not seen a fix yet.
const UNINITIALIZED: f64 = -1.0;

/// Tuning for [`KalmanSmoother`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmootherConfig {
    /// Process noise added per squared second of elapsed time, in m²/s².
    /// Default: 4.0
    pub process_noise: f64,

    /// Floor applied to the reported accuracy before squaring it into the measurement
    /// noise, in meters. Default: 1.0
    pub min_accuracy: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            process_noise: 4.0,
            min_accuracy: 1.0,
        }
    }
}

/// Filter memory for one recording session.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    variance: f64,
    last_fix: Option<RawFix>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterState {
    /// An uninitialized state.
    pub fn new() -> Self {
        Self {
            variance: UNINITIALIZED,
            last_fix: None,
        }
    }

    /// Discard everything and return to the uninitialized state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_initialized(&self) -> bool {
        self.variance >= 0.0 && self.last_fix.is_some()
    }

    /// Current position variance in m², or -1.0 before the first fix.
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// The last smoothed fix.
    pub fn last_fix(&self) -> Option<&RawFix> {
        self.last_fix.as_ref()
    }
}

/// Stateless smoothing rule; all memory lives in [`FilterState`].
#[derive(Debug, Clone, Default)]
pub struct KalmanSmoother {
    config: SmootherConfig,
}

impl KalmanSmoother {
    pub fn new(config: SmootherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SmootherConfig {
        &self.config
    }

    /// Smooth one accepted fix.
    ///
    /// The returned fix carries the corrected latitude and longitude and the input's own
    /// altitude, speed, accuracy and timestamp.
    pub fn smooth(&self, state: &mut FilterState, fix: &RawFix) -> RawFix {
        let last = match (state.last_fix, state.variance >= 0.0) {
            (Some(last), true) => last,
            _ => {
                state.variance = fix.horizontal_accuracy * fix.horizontal_accuracy;
                state.last_fix = Some(*fix);
                return *fix;
            }
        };

        let dt = seconds_between(last.timestamp, fix.timestamp);
        if dt > 0.0 {
            state.variance += dt * dt * self.config.process_noise;
        }

        let accuracy = fix.horizontal_accuracy.max(self.config.min_accuracy);
        let r = accuracy * accuracy;
        let k = state.variance / (state.variance + r);

        let smoothed = RawFix {
            latitude: last.latitude + k * (fix.latitude - last.latitude),
            longitude: last.longitude + k * (fix.longitude - last.longitude),
            ..*fix
        };
        state.variance *= 1.0 - k;
        state.last_fix = Some(smoothed);

        debug!(
            "[KalmanSmoother] dt={:.2}s gain={:.3} variance={:.2}",
            dt, k, state.variance
        );

        smoothed
    }

    /// Return `state` to the uninitialized state.
    pub fn reset(&self, state: &mut FilterState) {
        state.reset();
    }
}
