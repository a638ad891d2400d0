//! Scoring artifact files
//!
//! Two JSON files live in the model directory:
//! - `fatigue_model.json`: state-dict-shaped weights keyed by tensor name
//! - `feature_scaler.json`: per-feature mean and scale
//!
//! Tensor names follow the exported PyTorch module. The output head may be
//! stored as either `linear.*` or `fc.*`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default model weights file name
pub const MODEL_FILE: &str = "fatigue_model.json";

/// Default scaler file name
pub const SCALER_FILE: &str = "feature_scaler.json";

/// Artifact loading errors
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// File missing or unreadable
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid JSON for its schema
    #[error("malformed artifact {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Required tensor absent
    #[error("missing tensor: {0}")]
    MissingTensor(String),

    /// Tensor has the wrong rank or size
    #[error("tensor {tensor} has shape {actual:?}, expected {expected}")]
    Shape {
        tensor: String,
        expected: String,
        actual: Vec<usize>,
    },

    /// Tensor contains NaN or infinity
    #[error("tensor {0} contains non-finite values")]
    NonFinite(String),
}

impl ArtifactError {
    pub(crate) fn shape(tensor: &str, expected: impl Into<String>, actual: Vec<usize>) -> Self {
        Self::Shape {
            tensor: tensor.to_string(),
            expected: expected.into(),
            actual,
        }
    }
}

/// Locations of the two artifact files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub scaler: PathBuf,
}

impl ArtifactPaths {
    /// Default file names inside `dir`
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            model: dir.join(MODEL_FILE),
            scaler: dir.join(SCALER_FILE),
        }
    }

    /// Whether both files exist
    #[must_use]
    pub fn exist(&self) -> bool {
        self.model.is_file() && self.scaler.is_file()
    }
}

/// One named tensor from a state dict
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Tensor {
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
}

impl Tensor {
    /// Dimensions, outermost first
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Tensor::Vector(v) => vec![v.len()],
            Tensor::Matrix(rows) => vec![rows.len(), rows.first().map_or(0, Vec::len)],
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            Tensor::Vector(v) => v.iter().all(|x| x.is_finite()),
            Tensor::Matrix(rows) => rows.iter().flatten().all(|x| x.is_finite()),
        }
    }
}

/// Parsed state dict with head-name aliases resolved
#[derive(Debug, Clone, Default)]
pub struct StateDict {
    tensors: BTreeMap<String, Tensor>,
}

const HEAD_ALIASES: [(&str, &str); 2] = [
    ("fc.weight", "linear.weight"),
    ("fc.bias", "linear.bias"),
];

impl StateDict {
    /// Build from raw name/tensor pairs
    #[must_use]
    pub fn from_tensors(tensors: BTreeMap<String, Tensor>) -> Self {
        let tensors = tensors
            .into_iter()
            .map(|(name, tensor)| {
                let name = HEAD_ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == name)
                    .map_or(name, |(_, canonical)| (*canonical).to_string());
                (name, tensor)
            })
            .collect();
        Self { tensors }
    }

    /// Parse from JSON text
    ///
    /// # Errors
    /// Returns the serde error if the text is not a name-to-tensor object
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, Tensor> = serde_json::from_str(json)?;
        Ok(Self::from_tensors(raw))
    }

    /// Load from a file
    ///
    /// # Errors
    /// Returns [`ArtifactError::Io`] or [`ArtifactError::Json`]
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let text = read(path)?;
        Self::from_json(&text).map_err(|source| ArtifactError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Tensor names present
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Required matrix, returned as rows
    ///
    /// # Errors
    /// Missing tensor, wrong rank, ragged rows or non-finite values
    pub fn matrix(&self, name: &str) -> Result<&[Vec<f64>], ArtifactError> {
        match self.get(name)? {
            Tensor::Matrix(rows) => {
                let cols = rows.first().map_or(0, Vec::len);
                if rows.iter().any(|r| r.len() != cols) {
                    return Err(ArtifactError::shape(
                        name,
                        format!("rectangular rows of {cols}"),
                        rows.iter().map(Vec::len).collect(),
                    ));
                }
                Ok(rows)
            }
            other => Err(ArtifactError::shape(name, "rank 2", other.shape())),
        }
    }

    /// Required vector
    ///
    /// # Errors
    /// Missing tensor, wrong rank or non-finite values
    pub fn vector(&self, name: &str) -> Result<&[f64], ArtifactError> {
        match self.get(name)? {
            Tensor::Vector(v) => Ok(v),
            other => Err(ArtifactError::shape(name, "rank 1", other.shape())),
        }
    }

    fn get(&self, name: &str) -> Result<&Tensor, ArtifactError> {
        let tensor = self
            .tensors
            .get(name)
            .ok_or_else(|| ArtifactError::MissingTensor(name.to_string()))?;
        if !tensor.is_finite() {
            return Err(ArtifactError::NonFinite(name.to_string()));
        }
        Ok(tensor)
    }
}

pub(crate) fn read(path: &Path) -> Result<String, ArtifactError> {
    std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}
