//! Endpoint-side errors

use std::net::SocketAddr;

/// HTTP surface errors
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// Response body could not be encoded; fails that one request
    #[error("response serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Listen address unavailable; fatal at startup
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: warp::Error,
    },
}

impl ServeError {
    /// Whether only the current request is affected
    #[inline]
    #[must_use]
    pub fn is_per_request(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_fault_is_per_request() {
        let err: ServeError = serde_json::from_str::<u8>("x").unwrap_err().into();
        assert!(err.is_per_request());
        assert!(err.to_string().starts_with("response serialization failed"));
    }
}
