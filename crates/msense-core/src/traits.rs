//! Collaborator contracts driven by the refresher

use crate::error::{FetchError, ScoringError};
use crate::types::{FeatureVector, ScoreVector};
use async_trait::async_trait;
use std::sync::Arc;

/// Source of the single most recent telemetry record
///
/// Implementations catch every store failure at this boundary and surface
/// it as [`FetchError`]; nothing propagates into the refresh loop as a
/// panic.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch the latest record mapped onto the canonical features
    async fn fetch(&self) -> Result<FeatureVector, FetchError>;

    /// Human-readable name for logs
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Maps one feature vector onto one score vector
pub trait Scorer: Send + Sync {
    /// Score a feature vector
    ///
    /// # Errors
    /// [`ScoringError::Unavailable`] when artifacts are missing,
    /// [`ScoringError::Failure`] when the transform fails
    fn score(&self, features: &FeatureVector) -> Result<ScoreVector, ScoringError>;
}

#[async_trait]
impl<T: TelemetrySource + ?Sized> TelemetrySource for Arc<T> {
    async fn fetch(&self) -> Result<FeatureVector, FetchError> {
        (**self).fetch().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: Scorer + ?Sized> Scorer for Arc<T> {
    fn score(&self, features: &FeatureVector) -> Result<ScoreVector, ScoringError> {
        (**self).score(features)
    }
}
