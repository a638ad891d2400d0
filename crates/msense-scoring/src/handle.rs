//! Scorer handle built once before the refresh loop starts
//!
//! A handle is either ready (artifacts loaded and validated) or
//! unavailable. An unavailable handle answers every call with
//! [`ScoringError::Unavailable`] instead of failing the process.

use crate::artifact::{ArtifactError, ArtifactPaths, StateDict};
use crate::lstm::{sigmoid, LstmModel};
use crate::scaler::FeatureScaler;
use msense_core::{FeatureVector, ScoreVector, Scorer, ScoringError};

/// Normalize, run the model, squash into the score range
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPipeline {
    scaler: FeatureScaler,
    model: LstmModel,
}

impl ScoringPipeline {
    #[inline]
    #[must_use]
    pub fn new(scaler: FeatureScaler, model: LstmModel) -> Self {
        Self { scaler, model }
    }

    /// Load both artifacts
    ///
    /// # Errors
    /// Any missing, malformed or inconsistent artifact
    pub fn load(paths: &ArtifactPaths) -> Result<Self, ArtifactError> {
        tracing::info!(
            model = %paths.model.display(),
            scaler = %paths.scaler.display(),
            "Loading model and scaler"
        );
        let dict = StateDict::load(&paths.model)?;
        let model = LstmModel::from_state_dict(&dict)?;
        let scaler = FeatureScaler::load(&paths.scaler)?;
        tracing::info!("Model and scaler loaded successfully");
        Ok(Self::new(scaler, model))
    }

    /// Score one feature vector
    ///
    /// # Errors
    /// [`ScoringError::Failure`] if the model produces a non-finite value
    pub fn run(&self, features: &FeatureVector) -> Result<ScoreVector, ScoringError> {
        let scaled = self.scaler.transform(features);
        let raw = self.model.forward(&[scaled]);
        let squashed = raw.map(|x| sigmoid(x) * ScoreVector::MAX);
        ScoreVector::from_raw(squashed).map_err(|e| ScoringError::Failure(e.to_string()))
    }
}

#[derive(Debug, Clone)]
enum HandleState {
    Ready(Box<ScoringPipeline>),
    Unavailable(String),
}

/// Owned scorer passed into the refresher
#[derive(Debug, Clone)]
pub struct ScorerHandle {
    state: HandleState,
}

impl ScorerHandle {
    /// Ready handle around a loaded pipeline
    #[inline]
    #[must_use]
    pub fn ready(pipeline: ScoringPipeline) -> Self {
        Self {
            state: HandleState::Ready(Box::new(pipeline)),
        }
    }

    /// Handle that rejects every call with `reason`
    #[inline]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: HandleState::Unavailable(reason.into()),
        }
    }

    /// Load artifacts, failing on any error
    ///
    /// # Errors
    /// Any [`ArtifactError`] from loading
    pub fn load(paths: &ArtifactPaths) -> Result<Self, ArtifactError> {
        ScoringPipeline::load(paths).map(Self::ready)
    }

    /// Load artifacts, degrading to an unavailable handle on error
    #[must_use]
    pub fn load_or_unavailable(paths: &ArtifactPaths) -> Self {
        match Self::load(paths) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Scoring artifacts unavailable: {}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }
}

impl Scorer for ScorerHandle {
    fn score(&self, features: &FeatureVector) -> Result<ScoreVector, ScoringError> {
        match &self.state {
            HandleState::Ready(pipeline) => pipeline.run(features),
            HandleState::Unavailable(reason) => Err(ScoringError::Unavailable(reason.clone())),
        }
    }
}
