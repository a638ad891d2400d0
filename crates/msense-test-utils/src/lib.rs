//! Testing utilities for the MSense workspace
//!
//! Shared test helpers, fixtures, and scripted collaborators.

#![allow(missing_docs)]

use async_trait::async_trait;
use msense_core::{
    FeatureVector, FetchError, ScoreVector, Scorer, ScoringError, TelemetrySource,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::path::Path;
use tokio::time::Instant;

/// Input of the golden scoring scenario
pub const GOLDEN_INPUT: [f64; 5] = [70.0, 50.0, 37.0, 500.0, 7.0];

/// Expected scores for [`GOLDEN_INPUT`] through the golden artifacts
pub const GOLDEN_SCORES: [f64; 3] = [5.4, 4.3, 4.8];

pub fn golden_features() -> FeatureVector {
    FeatureVector::from_array(GOLDEN_INPUT)
}

/// Hidden size 2 model, head stored under the `fc.*` names
pub fn golden_model_json() -> serde_json::Value {
    json!({
        "lstm.weight_ih_l0": [
            [0.1, -0.2, 0.3, 0.05, -0.1],
            [0.2, 0.1, -0.1, 0.3, 0.2],
            [-0.3, 0.2, 0.1, 0.1, 0.0],
            [0.05, 0.05, 0.05, 0.05, 0.05],
            [0.4, -0.1, 0.2, -0.2, 0.1],
            [-0.2, 0.3, -0.3, 0.2, 0.1],
            [0.1, 0.1, 0.2, -0.1, -0.3],
            [0.3, -0.2, 0.1, 0.2, 0.0]
        ],
        "lstm.weight_hh_l0": [
            [0.1, 0.0], [0.0, 0.1], [0.2, -0.1], [0.1, 0.1],
            [0.0, 0.3], [-0.1, 0.2], [0.2, 0.2], [0.1, -0.2]
        ],
        "lstm.bias_ih_l0": [0.1, 0.0, -0.1, 0.2, 0.0, 0.1, 0.05, -0.05],
        "lstm.bias_hh_l0": [0.0, 0.1, 0.1, -0.1, 0.05, 0.0, 0.0, 0.1],
        "fc.weight": [[1.5, -0.5], [0.8, 0.9], [-1.2, 2.0]],
        "fc.bias": [0.2, -0.1, 0.4]
    })
}

pub fn golden_scaler_json() -> serde_json::Value {
    json!({
        "mean": [65.0, 45.0, 36.5, 400.0, 8.0],
        "scale": [10.0, 20.0, 0.5, 300.0, 2.0]
    })
}

/// Write the golden artifacts under their default names into `dir`
pub fn write_golden_artifacts(dir: &Path) -> std::io::Result<()> {
    std::fs::write(dir.join("fatigue_model.json"), golden_model_json().to_string())?;
    std::fs::write(dir.join("feature_scaler.json"), golden_scaler_json().to_string())
}

pub fn scores(a: f64, b: f64, c: f64) -> ScoreVector {
    ScoreVector::from_raw([a, b, c]).unwrap()
}

/// Source that replays a script of fetch results
///
/// Once the script is exhausted every call returns the `then` result.
/// Each call records the tokio instant it was made at.
#[derive(Debug)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<FeatureVector, FetchError>>>,
    then: Result<FeatureVector, FetchError>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<FeatureVector, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            then: Err(FetchError::NoData),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always return the same result
    pub fn always(result: Result<FeatureVector, FetchError>) -> Self {
        Self::new(Vec::new()).then(result)
    }

    pub fn then(mut self, result: Result<FeatureVector, FetchError>) -> Self {
        self.then = result;
        self
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn fetch(&self) -> Result<FeatureVector, FetchError> {
        self.calls.lock().push(Instant::now());
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.then.clone())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Scorer that always returns the same scores
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer(pub ScoreVector);

impl Scorer for FixedScorer {
    fn score(&self, _features: &FeatureVector) -> Result<ScoreVector, ScoringError> {
        Ok(self.0)
    }
}

/// Scorer that always fails with the same error
#[derive(Debug, Clone)]
pub struct FailingScorer(pub ScoringError);

impl Scorer for FailingScorer {
    fn score(&self, _features: &FeatureVector) -> Result<ScoreVector, ScoringError> {
        Err(self.0.clone())
    }
}

/// Scorer that echoes the heart rate into every horizon
///
/// Lets tests tell cycles apart by the input they fed.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoScorer;

impl Scorer for EchoScorer {
    fn score(&self, features: &FeatureVector) -> Result<ScoreVector, ScoringError> {
        let v = features.heart_rate();
        ScoreVector::from_raw([v, v, v]).map_err(|e| ScoringError::Failure(e.to_string()))
    }
}
