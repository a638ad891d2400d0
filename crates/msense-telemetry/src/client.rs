//! Minimal DynamoDB JSON-protocol client
//!
//! Two operations are supported: a `Scan` limited to one item and a
//! paginated `ListTables`. Each request is signed with credentials resolved
//! from the [`CredentialChain`] handed to [`DynamoClient::new`].

use crate::credentials::AwsCredentials;
use crate::error::TelemetryError;
use crate::provider::CredentialChain;
use crate::record::Item;
use crate::sigv4::{sign_post, SigningParams};
use chrono::Utc;
use msense_core::StoreConfig;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const SERVICE: &str = "dynamodb";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const TARGET_PREFIX: &str = "DynamoDB_20120810";

/// Default regional endpoint
#[must_use]
pub fn default_endpoint(region: &str) -> String {
    format!("https://dynamodb.{region}.amazonaws.com")
}

#[derive(Debug, Deserialize)]
struct ScanOutput {
    #[serde(rename = "Items", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct ListTablesOutput {
    #[serde(rename = "TableNames", default)]
    table_names: Vec<String>,
    #[serde(rename = "LastEvaluatedTableName")]
    last_evaluated: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "Message", default)]
    message_upper: Option<String>,
}

/// Signed HTTP client for one store region
#[derive(Debug, Clone)]
pub struct DynamoClient {
    http: reqwest::Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: Arc<CredentialChain>,
}

impl DynamoClient {
    /// Build a client for `config`
    ///
    /// Credentials are resolved lazily, so a chain that cannot produce any
    /// still builds a client; its requests then fail before anything is sent.
    ///
    /// # Errors
    /// Fails if the endpoint is not an absolute `http(s)` URL with an
    /// empty path, or the HTTP client cannot be constructed
    pub fn new(
        config: &StoreConfig,
        credentials: CredentialChain,
    ) -> Result<Self, TelemetryError> {
        let raw = config
            .endpoint
            .clone()
            .unwrap_or_else(|| default_endpoint(&config.region));
        let invalid = |reason: &str| TelemetryError::InvalidEndpoint {
            endpoint: raw.clone(),
            reason: reason.to_string(),
        };

        let endpoint = Url::parse(&raw).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if endpoint.path() != "/" || endpoint.query().is_some() {
            return Err(invalid("endpoint must not carry a path or query"));
        }
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(invalid("missing host")),
        };

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            endpoint,
            host,
            region: config.region.clone(),
            credentials: Arc::new(credentials),
        })
    }

    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    #[inline]
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[inline]
    #[must_use]
    pub fn credentials(&self) -> &CredentialChain {
        &self.credentials
    }

    /// Credentials the next request would be signed with
    ///
    /// # Errors
    /// The chain's resolution failure
    pub async fn resolve_credentials(&self) -> Result<AwsCredentials, TelemetryError> {
        self.credentials.resolve(&self.http).await
    }

    /// First item of a one-item scan over `table`, if the table has any
    ///
    /// # Errors
    /// Transport, status and decode failures
    pub async fn scan_latest(&self, table: &str) -> Result<Option<Item>, TelemetryError> {
        let output: ScanOutput = self
            .call("Scan", &json!({ "TableName": table, "Limit": 1 }))
            .await?;
        Ok(output.items.into_iter().next())
    }

    /// Every table name visible to the credentials
    ///
    /// # Errors
    /// Transport, status and decode failures
    pub async fn list_tables(&self) -> Result<Vec<String>, TelemetryError> {
        let mut names = Vec::new();
        let mut start: Option<String> = None;
        loop {
            let body = match &start {
                Some(table) => json!({ "ExclusiveStartTableName": table }),
                None => json!({}),
            };
            let page: ListTablesOutput = self.call("ListTables", &body).await?;
            names.extend(page.table_names);
            match page.last_evaluated {
                Some(next) if start.as_deref() != Some(next.as_str()) => start = Some(next),
                _ => return Ok(names),
            }
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: &Value,
    ) -> Result<T, TelemetryError> {
        let credentials = self.credentials.resolve(&self.http).await?;
        let target = format!("{TARGET_PREFIX}.{operation}");
        let payload =
            serde_json::to_vec(body).map_err(|e| TelemetryError::Decode(e.to_string()))?;

        let params = SigningParams {
            credentials: &credentials,
            region: &self.region,
            service: SERVICE,
            time: Utc::now(),
        };
        let signed = sign_post(
            &params,
            &self.host,
            &[("content-type", CONTENT_TYPE), ("x-amz-target", target.as_str())],
            &payload,
        )?;

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", &target);
        for (name, value) in signed.pairs() {
            request = request.header(name, value);
        }

        tracing::debug!("Store request: {} -> {}", target, self.endpoint);
        let response = request.body(payload).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let err: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
            let err = TelemetryError::Status {
                status: status.as_u16(),
                error_type: err.error_type.unwrap_or_else(|| {
                    status.canonical_reason().unwrap_or("Unknown").to_string()
                }),
                message: err.message.or(err.message_upper).unwrap_or_default(),
            };
            if err.is_auth_failure() {
                self.credentials.invalidate();
            }
            return Err(err);
        }

        serde_json::from_slice(&bytes).map_err(|e| TelemetryError::Decode(e.to_string()))
    }
}
