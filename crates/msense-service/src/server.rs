//! HTTP surface
//!
//! - `GET /current-predictions`: live scores, or the fixed fallback payload
//!   while the cache is empty or stale
//! - `GET /health`: liveness
//! - `GET /`: greeting

use crate::error::ServeError;
use chrono::{DateTime, SecondsFormat, Utc};
use msense_core::{CacheEntry, PredictionCache};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

pub const GREETING: &str = "Welcome to the fatigue prediction service";

/// Wire payload of `GET /current-predictions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResponse {
    pub status: &'static str,
    pub predictions: Vec<f64>,
    pub next_minutes: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
    pub timestamp: String,
}

impl PredictionResponse {
    pub const FALLBACK_PREDICTIONS: [f64; 4] = [6.2, 7.1, 7.8, 8.3];
    pub const FALLBACK_MINUTES: [u32; 4] = [15, 30, 45, 60];
    pub const FALLBACK_SOURCE: &'static str = "test_data";

    /// Encode a cache entry; anything but `Fresh` yields the fallback
    #[must_use]
    pub fn from_entry(entry: &CacheEntry, now: DateTime<Utc>) -> Self {
        match entry {
            CacheEntry::Fresh {
                scores,
                timestamp,
                horizons,
            } => Self {
                status: "success",
                predictions: scores.values().to_vec(),
                next_minutes: horizons.minutes().to_vec(),
                source: None,
                timestamp: rfc3339(*timestamp),
            },
            CacheEntry::Empty | CacheEntry::Stale { .. } => Self::fallback(now),
        }
    }

    #[must_use]
    pub fn fallback(now: DateTime<Utc>) -> Self {
        Self {
            status: "success",
            predictions: Self::FALLBACK_PREDICTIONS.to_vec(),
            next_minutes: Self::FALLBACK_MINUTES.to_vec(),
            source: Some(Self::FALLBACK_SOURCE),
            timestamp: rfc3339(now),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.source == Some(Self::FALLBACK_SOURCE)
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Serialize `body` as a 200 JSON reply, or a 500 error reply if that fails
pub fn encode<T: Serialize>(body: &T) -> warp::reply::Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            warp::reply::with_header(bytes, "content-type", "application/json").into_response()
        }
        Err(e) => {
            let err = ServeError::from(e);
            tracing::error!("Error serving predictions: {}", err);
            warp::reply::with_status(
                warp::reply::json(&json!({ "status": "error", "error": "Internal server error" })),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
            .into_response()
        }
    }
}

fn current_predictions(cache: PredictionCache) -> warp::reply::Response {
    let entry = cache.read();
    let response = PredictionResponse::from_entry(&entry, Utc::now());
    if response.is_fallback() {
        tracing::debug!("Serving fallback predictions, cache is {}", entry.label());
    }
    encode(&response)
}

/// All routes with CORS and request tracing applied
pub fn routes(
    cache: PredictionCache,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["Content-Type", "Authorization", "Accept"]);

    let predictions = warp::path("current-predictions")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::any().map(move || cache.clone()))
        .map(current_predictions);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "healthy" })));

    let index = warp::path::end().and(warp::get()).map(|| GREETING);

    predictions
        .or(health)
        .or(index)
        .with(cors)
        .with(warp::trace::request())
}

/// Serve until `shutdown` resolves
///
/// # Errors
/// [`ServeError::Bind`] if the address cannot be bound
pub async fn serve<F>(
    addr: SocketAddr,
    cache: PredictionCache,
    shutdown: F,
) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) = warp::serve(routes(cache))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|source| ServeError::Bind { addr, source })?;
    tracing::info!("Listening on http://{}", bound);
    server.await;
    tracing::info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use msense_core::{FailureKind, ScoreVector};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn fresh_entry_encodes_live_payload() {
        let scores = ScoreVector::from_raw([5.44, 4.3, 4.8]).unwrap();
        let response = PredictionResponse::from_entry(&CacheEntry::fresh(scores, at(0)), at(99));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "success",
                "predictions": [5.4, 4.3, 4.8],
                "next_minutes": [1, 2, 3],
                "timestamp": "1970-01-01T00:00:00.000000Z"
            })
        );
    }

    #[test]
    fn stale_entry_encodes_fallback() {
        let entry = CacheEntry::stale(FailureKind::NoData, Some(at(0)));
        let response = PredictionResponse::from_entry(&entry, at(60));
        assert!(response.is_fallback());
        assert_eq!(response.predictions, vec![6.2, 7.1, 7.8, 8.3]);
        assert_eq!(response.next_minutes, vec![15, 30, 45, 60]);
        assert_eq!(response.timestamp, "1970-01-01T00:01:00.000000Z");
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("boom"))
        }
    }

    #[tokio::test]
    async fn encoding_failure_yields_internal_error() {
        let response = encode(&Unencodable);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "status": "error", "error": "Internal server error" }));
    }
}
