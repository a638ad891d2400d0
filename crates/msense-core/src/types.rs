//! Core types for the prediction pipeline
//!
//! Defines the values that flow through the refresh pipeline:
//! - Feature vectors read from the telemetry store
//! - Score vectors produced by the scorer
//! - The cache entry published by the refresher

use crate::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of input features per scoring call
pub const FEATURE_LEN: usize = 5;

/// Number of forecast horizons per scoring result
pub const SCORE_LEN: usize = 3;

/// Canonical feature order
pub const FEATURE_NAMES: [&str; FEATURE_LEN] =
    ["heart_rate", "rmssd", "temperature", "steps", "sleep_duration"];

/// Fixed-order snapshot of the latest telemetry record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    heart_rate: f64,
    rmssd: f64,
    temperature: f64,
    steps: f64,
    sleep_duration: f64,
}

impl FeatureVector {
    /// Create a feature vector from its named fields
    #[inline]
    #[must_use]
    pub fn new(
        heart_rate: f64,
        rmssd: f64,
        temperature: f64,
        steps: f64,
        sleep_duration: f64,
    ) -> Self {
        Self {
            heart_rate,
            rmssd,
            temperature,
            steps,
            sleep_duration,
        }
    }

    /// Create from values in canonical order
    #[inline]
    #[must_use]
    pub fn from_array(values: [f64; FEATURE_LEN]) -> Self {
        let [heart_rate, rmssd, temperature, steps, sleep_duration] = values;
        Self::new(heart_rate, rmssd, temperature, steps, sleep_duration)
    }

    /// Values in canonical order
    #[inline]
    #[must_use]
    pub fn as_array(&self) -> [f64; FEATURE_LEN] {
        [
            self.heart_rate,
            self.rmssd,
            self.temperature,
            self.steps,
            self.sleep_duration,
        ]
    }

    #[inline]
    #[must_use]
    pub fn heart_rate(&self) -> f64 {
        self.heart_rate
    }

    #[inline]
    #[must_use]
    pub fn rmssd(&self) -> f64 {
        self.rmssd
    }

    #[inline]
    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    #[inline]
    #[must_use]
    pub fn steps(&self) -> f64 {
        self.steps
    }

    #[inline]
    #[must_use]
    pub fn sleep_duration(&self) -> f64 {
        self.sleep_duration
    }
}

/// Rejected raw scorer output
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("score at horizon {index} is not finite: {value}")]
pub struct NonFiniteScore {
    /// Horizon index of the offending value
    pub index: usize,
    /// The raw value
    pub value: f64,
}

/// Fixed-size scorer result, one value per horizon
///
/// Every value lies in [`ScoreVector::MIN`, `ScoreVector::MAX`] and carries
/// at most one decimal digit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreVector([f64; SCORE_LEN]);

impl ScoreVector {
    /// Lower bound of every score
    pub const MIN: f64 = 0.0;
    /// Upper bound of every score
    pub const MAX: f64 = 9.0;

    /// Clamp and round raw scorer output
    ///
    /// # Errors
    /// Returns [`NonFiniteScore`] if any value is NaN or infinite
    pub fn from_raw(raw: [f64; SCORE_LEN]) -> Result<Self, NonFiniteScore> {
        let mut values = [0.0; SCORE_LEN];
        for (index, (slot, value)) in values.iter_mut().zip(raw).enumerate() {
            if !value.is_finite() {
                return Err(NonFiniteScore { index, value });
            }
            *slot = round_tenths(value.clamp(Self::MIN, Self::MAX));
        }
        Ok(Self(values))
    }

    /// Scores in horizon order
    #[inline]
    #[must_use]
    pub fn values(&self) -> [f64; SCORE_LEN] {
        self.0
    }
}

#[inline]
fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Forward time offsets, in minutes, that a score vector is reported against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizons(pub [u32; SCORE_LEN]);

impl Horizons {
    /// Horizons attached to every live result
    pub const LIVE: Self = Self([1, 2, 3]);

    #[inline]
    #[must_use]
    pub fn minutes(&self) -> &[u32] {
        &self.0
    }
}

impl Default for Horizons {
    fn default() -> Self {
        Self::LIVE
    }
}

/// Why the last refresh cycle did not produce a fresh result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StaleReason {
    /// The store had no usable record, or could not be reached
    NoData,
    /// The scorer could not produce a result
    ScoringError,
}

impl StaleReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StaleReason::NoData => "no data",
            StaleReason::ScoringError => "scoring error",
        }
    }
}

impl From<FailureKind> for StaleReason {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::SourceUnavailable | FailureKind::NoData => StaleReason::NoData,
            FailureKind::ScoringUnavailable | FailureKind::ScoringFailure => {
                StaleReason::ScoringError
            }
        }
    }
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single published state of the prediction cache
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// Never successfully populated
    Empty,
    /// The latest refresh cycle failed
    Stale {
        /// Reason exposed to readers
        reason: StaleReason,
        /// Failure that produced this entry
        failure: FailureKind,
        /// Timestamp of the last fresh result, if there ever was one
        last_success: Option<DateTime<Utc>>,
    },
    /// A live result from a successful cycle
    Fresh {
        scores: ScoreVector,
        timestamp: DateTime<Utc>,
        horizons: Horizons,
    },
}

impl CacheEntry {
    /// Build a stale entry for a refresh failure
    #[inline]
    #[must_use]
    pub fn stale(failure: FailureKind, last_success: Option<DateTime<Utc>>) -> Self {
        Self::Stale {
            reason: failure.into(),
            failure,
            last_success,
        }
    }

    /// Build a fresh entry with the live horizons
    #[inline]
    #[must_use]
    pub fn fresh(scores: ScoreVector, timestamp: DateTime<Utc>) -> Self {
        Self::Fresh {
            scores,
            timestamp,
            horizons: Horizons::LIVE,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }

    /// Stale reason, if this entry is stale
    #[inline]
    #[must_use]
    pub fn stale_reason(&self) -> Option<StaleReason> {
        match self {
            Self::Stale { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Short state label for logs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Stale { .. } => "stale",
            Self::Fresh { .. } => "fresh",
        }
    }
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self::Empty
    }
}
