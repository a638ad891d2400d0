//! Standard-score feature normalization

use crate::artifact::{read, ArtifactError};
use msense_core::{FeatureVector, FEATURE_LEN};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawScaler {
    #[serde(alias = "mean_")]
    mean: Vec<f64>,
    #[serde(alias = "scale_")]
    scale: Vec<f64>,
}

/// Per-feature `(x - mean) / scale` normalization
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScaler {
    mean: [f64; FEATURE_LEN],
    scale: [f64; FEATURE_LEN],
}

impl FeatureScaler {
    /// Build from mean and scale
    ///
    /// A zero scale is treated as 1, matching a zero-variance column.
    ///
    /// # Errors
    /// Returns [`ArtifactError::NonFinite`] for NaN or infinite parameters
    pub fn new(mean: [f64; FEATURE_LEN], scale: [f64; FEATURE_LEN]) -> Result<Self, ArtifactError> {
        if mean.iter().any(|v| !v.is_finite()) {
            return Err(ArtifactError::NonFinite("mean".to_string()));
        }
        if scale.iter().any(|v| !v.is_finite()) {
            return Err(ArtifactError::NonFinite("scale".to_string()));
        }
        let scale = scale.map(|s| if s == 0.0 { 1.0 } else { s });
        Ok(Self { mean, scale })
    }

    /// Parse from JSON text
    ///
    /// # Errors
    /// Malformed JSON or parameter vectors of the wrong length
    pub fn from_json(json: &str, path: &Path) -> Result<Self, ArtifactError> {
        let raw: RawScaler = serde_json::from_str(json).map_err(|source| ArtifactError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let mean = to_array("mean", raw.mean)?;
        let scale = to_array("scale", raw.scale)?;
        Self::new(mean, scale)
    }

    /// Load from a file
    ///
    /// # Errors
    /// Unreadable file, malformed JSON or wrong lengths
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        Self::from_json(&read(path)?, path)
    }

    /// Normalize a feature vector
    #[must_use]
    pub fn transform(&self, features: &FeatureVector) -> [f64; FEATURE_LEN] {
        let mut out = features.as_array();
        for ((x, mean), scale) in out.iter_mut().zip(self.mean).zip(self.scale) {
            *x = (*x - mean) / scale;
        }
        out
    }
}

fn to_array(name: &str, values: Vec<f64>) -> Result<[f64; FEATURE_LEN], ArtifactError> {
    let len = values.len();
    values
        .try_into()
        .map_err(|_| ArtifactError::shape(name, format!("[{FEATURE_LEN}]"), vec![len]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn transform_standardizes() {
        let scaler = FeatureScaler::new(
            [65.0, 45.0, 36.5, 400.0, 8.0],
            [10.0, 20.0, 0.5, 300.0, 2.0],
        )
        .unwrap();
        let scaled = scaler.transform(&FeatureVector::new(70.0, 50.0, 37.0, 500.0, 7.0));
        assert_eq!(scaled[0], 0.5);
        assert_eq!(scaled[1], 0.25);
        assert_eq!(scaled[2], 1.0);
        assert!((scaled[3] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(scaled[4], -0.5);
    }

    #[test]
    fn zero_scale_is_identity_shift() {
        let scaler = FeatureScaler::new([1.0; FEATURE_LEN], [0.0; FEATURE_LEN]).unwrap();
        let scaled = scaler.transform(&FeatureVector::from_array([3.0; FEATURE_LEN]));
        assert_eq!(scaled, [2.0; FEATURE_LEN]);
    }

    #[test]
    fn accepts_sklearn_attribute_names() {
        let json = r#"{"mean_": [0, 0, 0, 0, 0], "scale_": [1, 1, 1, 1, 1]}"#;
        let scaler = FeatureScaler::from_json(json, Path::new("scaler.json")).unwrap();
        let fv = FeatureVector::new(1.0, 2.0, 3.0, 4.0, 5.0);
        assert_eq!(scaler.transform(&fv), fv.as_array());
    }

    #[test]
    fn wrong_length_is_shape_error() {
        let json = r#"{"mean": [0, 0], "scale": [1, 1, 1, 1, 1]}"#;
        let err = FeatureScaler::from_json(json, Path::new("scaler.json")).unwrap_err();
        assert!(matches!(err, ArtifactError::Shape { ref tensor, .. } if tensor == "mean"));
    }
}
