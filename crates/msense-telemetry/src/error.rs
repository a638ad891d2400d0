//! Telemetry store errors
//!
//! All of these are converted into [`FetchError`] at the source boundary.

use msense_core::FetchError;

/// Store client errors
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// No credentials configured
    #[error("no store credentials configured")]
    MissingCredentials,

    /// A configured credential source could not produce credentials
    #[error("credential provider {provider} failed: {reason}")]
    Provider {
        provider: &'static str,
        reason: String,
    },

    /// Endpoint URL unusable
    #[error("invalid store endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Request could not be signed
    #[error("request signing failed: {0}")]
    Signing(String),

    /// Connection, timeout or body transfer failure
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Store answered with an error status
    #[error("store returned {status}: {error_type}: {message}")]
    Status {
        status: u16,
        error_type: String,
        message: String,
    },

    /// Response body not in the expected shape
    #[error("cannot decode store response: {0}")]
    Decode(String),

    /// Record field present but not numeric
    #[error("field {field} is not numeric: {value}")]
    NonNumeric { field: String, value: String },
}

impl TelemetryError {
    #[inline]
    pub fn provider(provider: &'static str, reason: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            reason: reason.into(),
        }
    }

    /// Whether the store rejected the request for rate reasons
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        match self {
            Self::Status { error_type, .. } => {
                error_type.ends_with("ProvisionedThroughputExceededException")
                    || error_type.ends_with("ThrottlingException")
                    || error_type.ends_with("RequestLimitExceeded")
            }
            _ => false,
        }
    }

    /// Whether the store rejected the credentials
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::MissingCredentials => true,
            Self::Status { status, error_type, .. } => {
                *status == 403
                    || error_type.ends_with("UnrecognizedClientException")
                    || error_type.ends_with("InvalidSignatureException")
                    || error_type.ends_with("AccessDeniedException")
            }
            _ => false,
        }
    }
}

impl From<TelemetryError> for FetchError {
    fn from(err: TelemetryError) -> Self {
        FetchError::SourceUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16, error_type: &str) -> TelemetryError {
        TelemetryError::Status {
            status: code,
            error_type: error_type.to_string(),
            message: String::new(),
        }
    }

    #[test]
    fn classifies_throttling() {
        let throttled = status(400, "com.amazonaws.dynamodb.v20120810#ThrottlingException");
        assert!(throttled.is_throttled());
        assert!(!status(400, "ValidationException").is_throttled());
    }

    #[test]
    fn classifies_auth_failures() {
        assert!(TelemetryError::MissingCredentials.is_auth_failure());
        let unrecognized = status(400, "com.amazon.coral.service#UnrecognizedClientException");
        assert!(unrecognized.is_auth_failure());
        assert!(!status(500, "InternalServerError").is_auth_failure());
    }

    #[test]
    fn converts_to_source_unavailable() {
        let err: FetchError = status(500, "InternalServerError").into();
        assert!(matches!(err, FetchError::SourceUnavailable(ref m) if m.contains("500")));
    }
}
