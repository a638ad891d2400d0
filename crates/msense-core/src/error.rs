//! Error types for the prediction pipeline
//!
//! Every refresh-side failure maps onto one [`FailureKind`]:
//! - Store connectivity, auth or throttling failures
//! - Empty store results
//! - Missing or corrupt scoring artifacts
//! - Scoring failures on valid input

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failed refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Telemetry store could not be reached or refused the request
    SourceUnavailable,
    /// Telemetry store was reachable but held no record
    NoData,
    /// Scoring artifacts are missing or malformed
    ScoringUnavailable,
    /// The scoring transform failed on valid input
    ScoringFailure,
}

impl FailureKind {
    /// Whether the failure happened while fetching
    #[inline]
    #[must_use]
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::SourceUnavailable | Self::NoData)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceUnavailable => "source_unavailable",
            Self::NoData => "no_data",
            Self::ScoringUnavailable => "scoring_unavailable",
            Self::ScoringFailure => "scoring_failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Telemetry fetch errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Store reachable, empty result set
    #[error("no data in telemetry store")]
    NoData,

    /// Connectivity, auth, throttling or decode failure
    #[error("telemetry source unavailable: {0}")]
    SourceUnavailable(String),
}

impl FetchError {
    #[inline]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable(reason.into())
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NoData => FailureKind::NoData,
            Self::SourceUnavailable(_) => FailureKind::SourceUnavailable,
        }
    }
}

/// Scoring errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    /// Artifacts could not be loaded
    #[error("artifact unavailable: {0}")]
    Unavailable(String),

    /// Transform failed on the given input
    #[error("scoring failed: {0}")]
    Failure(String),
}

impl ScoringError {
    #[inline]
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unavailable(_) => FailureKind::ScoringUnavailable,
            Self::Failure(_) => FailureKind::ScoringFailure,
        }
    }
}

/// Configuration errors, all fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required variable absent or empty
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    /// Value present but not parseable
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    /// Config file unreadable
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// Dotenv file present but unusable
    #[error("cannot load env file {path}: {source}")]
    DotEnv {
        path: String,
        #[source]
        source: dotenvy::Error,
    },
}

impl ConfigError {
    #[inline]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_kinds() {
        assert_eq!(FetchError::NoData.kind(), FailureKind::NoData);
        assert_eq!(
            FetchError::unavailable("timeout").kind(),
            FailureKind::SourceUnavailable
        );
        assert!(FailureKind::NoData.is_fetch_failure());
        assert!(!FailureKind::ScoringFailure.is_fetch_failure());
    }

    #[test]
    fn scoring_error_display() {
        let err = ScoringError::Unavailable("model file missing".to_string());
        assert_eq!(err.to_string(), "artifact unavailable: model file missing");
        assert_eq!(err.kind(), FailureKind::ScoringUnavailable);
    }

    #[test]
    fn missing_config_lists_every_key() {
        let err = ConfigError::Missing(vec!["AWS_REGION".into(), "DYNAMODB_TABLE".into()]);
        assert_eq!(
            err.to_string(),
            "missing required environment variables: AWS_REGION, DYNAMODB_TABLE"
        );
    }
}
