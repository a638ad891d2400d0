//! Store-backed telemetry source

use crate::client::DynamoClient;
use crate::error::TelemetryError;
use crate::provider::CredentialChain;
use crate::record::map_item;
use async_trait::async_trait;
use msense_core::{FeatureVector, FetchError, StoreConfig, TelemetrySource};

/// Reads the latest biometric record from one store table
#[derive(Debug, Clone)]
pub struct DynamoSource {
    client: DynamoClient,
    table: String,
}

impl DynamoSource {
    #[must_use]
    pub fn new(client: DynamoClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// Build from configuration and the default credential chain
    ///
    /// # Errors
    /// Fails if the endpoint is invalid
    pub fn from_config(config: &StoreConfig) -> Result<Self, TelemetryError> {
        let credentials = CredentialChain::from_env();
        if credentials.is_empty() {
            tracing::warn!("No store credential sources configured; every fetch will fail");
        } else {
            tracing::info!("Store credential sources: {}", credentials.describe());
        }
        let client = DynamoClient::new(config, credentials)?;
        Ok(Self::new(client, config.table.clone()))
    }

    #[inline]
    #[must_use]
    pub fn client(&self) -> &DynamoClient {
        &self.client
    }

    #[inline]
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl TelemetrySource for DynamoSource {
    async fn fetch(&self) -> Result<FeatureVector, FetchError> {
        let item = match self.client.scan_latest(&self.table).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                tracing::info!("No data found in table {}", self.table);
                return Err(FetchError::NoData);
            }
            Err(e) => {
                if e.is_throttled() {
                    tracing::warn!("Store throttled scan of {}: {}", self.table, e);
                } else if e.is_auth_failure() {
                    tracing::error!("Store rejected credentials: {}", e);
                } else {
                    tracing::warn!("Error fetching from store: {}", e);
                }
                return Err(e.into());
            }
        };

        let features = map_item(&item).map_err(|e| {
            tracing::warn!("Unusable record in {}: {}", self.table, e);
            FetchError::from(e)
        })?;
        tracing::debug!("Fetched features: {:?}", features.as_array());
        Ok(features)
    }

    fn describe(&self) -> String {
        format!("dynamodb:{}@{}", self.table, self.client.region())
    }
}
